//! CSV export and console rendering of timeseries.

use std::io::Write;
use std::path::Path;

use crate::model::{ImportError, TimeSeries};

/// Timestamp format of the `time` column.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Writes `series` as CSV: `time` followed by one column per series column,
/// missing values as empty cells.
pub fn write_csv_to<W: Write>(series: &TimeSeries, writer: W) -> Result<(), ImportError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["time".to_string()];
    header.extend(series.columns.iter().map(|c| c.name.clone()));
    wtr.write_record(&header)?;

    for (row, time) in series.times.iter().enumerate() {
        let mut record = Vec::with_capacity(series.columns.len() + 1);
        record.push(time.format(TIME_FORMAT).to_string());
        for col in &series.columns {
            record.push(col.values[row].map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_csv(series: &TimeSeries, path: &Path) -> Result<(), ImportError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv_to(series, file)
}

/// Fixed-width table of the first `max_rows` rows, for terminal output.
pub fn render_table(series: &TimeSeries, max_rows: usize) -> String {
    let width = |name: &str| name.len().max(10);
    let mut out = format!("{:<20}", "time");
    for col in &series.columns {
        out.push_str(&format!(" {:>w$}", col.name, w = width(&col.name)));
    }
    out.push('\n');

    for (row, time) in series.times.iter().enumerate().take(max_rows) {
        out.push_str(&format!("{:<20}", time.format(TIME_FORMAT)));
        for col in &series.columns {
            let cell = col.values[row].map(|v| format!("{:.3}", v)).unwrap_or_else(|| "NaN".to_string());
            out.push_str(&format!(" {:>w$}", cell, w = width(&col.name)));
        }
        out.push('\n');
    }
    if series.len() > max_rows {
        out.push_str(&format!("... {} more rows\n", series.len() - max_rows));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> TimeSeries {
        let mut ts = TimeSeries::new(vec![
            Utc.with_ymd_and_hms(2020, 9, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 9, 1, 1, 0, 0).unwrap(),
        ]);
        ts.push_column("water_temp", vec![Some(15.25), None]).unwrap();
        ts.push_column("norkyst_water_temp0", vec![Some(14.0), Some(14.5)]).unwrap();
        ts
    }

    #[test]
    fn test_csv_layout() {
        let mut buf = Vec::new();
        write_csv_to(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "time,water_temp,norkyst_water_temp0\n\
             2020-09-01T00:00:00Z,15.25,14\n\
             2020-09-01T01:00:00Z,,14.5\n"
        );
    }

    #[test]
    fn test_csv_header_only_for_empty_series() {
        let mut buf = Vec::new();
        write_csv_to(&TimeSeries::default(), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "time\n");
    }

    #[test]
    fn test_render_table_truncates() {
        let table = render_table(&sample(), 1);
        assert!(table.starts_with("time"));
        assert!(table.contains("15.250"));
        assert!(table.contains("... 1 more rows"));
        assert!(!table.contains("14.500"));
    }
}
