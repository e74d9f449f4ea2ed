//! Post-processed MET Nordic weather forecasts from the THREDDS archive.
//!
//! The 00Z run of each day is used, giving an hourly forecast series at the
//! grid cell nearest to the site. There is no land mask: the forecast is
//! valid over land and sea.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;

use crate::config::PostProcessedConfig;
use crate::ingest::thredds::GridExtractor;
use crate::logging::{self, DataSource};
use crate::model::{Column, ImportError, TimeSeries};

pub struct PostProcessedImporter<'a> {
    extractor: GridExtractor<'a>,
}

impl<'a> PostProcessedImporter<'a> {
    pub fn new(
        client: &'a Client,
        config: &PostProcessedConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            extractor: GridExtractor::new(client, config.product(), DataSource::PostProcessed, start, end),
        }
    }

    /// One column per parameter, named after the parameter.
    ///
    /// Consecutive daily runs overlap (each run forecasts well beyond 24 h);
    /// when a time appears in several runs the latest run's value is kept,
    /// so every hour comes from the freshest forecast that covers it.
    pub fn data(&mut self, params: &[String], lon: f64, lat: f64) -> Result<TimeSeries, ImportError> {
        let mut combined: Option<TimeSeries> = None;
        for param in params {
            logging::info(DataSource::PostProcessed, None, &format!("Fetching {}", param));
            let series = dedup_times(self.extractor.extract(param, None, lat, lon)?);
            combined = Some(match combined {
                None => series,
                Some(mut acc) => {
                    acc.left_join(&series)?;
                    acc
                }
            });
        }
        Ok(combined.unwrap_or_default())
    }
}

/// Keeps only the last occurrence of each time, in ascending time order.
///
/// Files are read in day order, so the last occurrence of a time belongs to
/// the most recent run.
pub fn dedup_times(series: TimeSeries) -> TimeSeries {
    let mut last_index = std::collections::BTreeMap::new();
    for (i, t) in series.times.iter().enumerate() {
        last_index.insert(*t, i);
    }

    let keep: Vec<usize> = last_index.values().copied().collect();
    TimeSeries {
        times: keep.iter().map(|&i| series.times[i]).collect(),
        columns: series
            .columns
            .iter()
            .map(|col| Column {
                name: col.name.clone(),
                values: keep.iter().map(|&i| col.values[i]).collect(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_dedup_prefers_latest_run() {
        // run of day 1 covers 1T22..2T01, run of day 2 covers 2T00..2T01
        let mut series = TimeSeries::new(vec![at(1, 22), at(1, 23), at(2, 0), at(2, 1), at(2, 0), at(2, 1)]);
        series
            .push_column("air_temperature_2m", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(30.0), Some(40.0)])
            .unwrap();

        let deduped = dedup_times(series);
        assert_eq!(deduped.times, vec![at(1, 22), at(1, 23), at(2, 0), at(2, 1)]);
        assert_eq!(
            deduped.column("air_temperature_2m").unwrap().values,
            vec![Some(1.0), Some(2.0), Some(30.0), Some(40.0)]
        );
    }
}
