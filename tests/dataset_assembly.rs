//! Dataset Assembly Integration Tests
//!
//! Offline tests that put a combined dataset together from canned source
//! responses the way `DatasetBuilder::build` does, and check the CSV that
//! ends up on disk.

use chrono::{DateTime, TimeZone, Utc};

use timeseries_importer::dataset::{join_frost, norkyst_column};
use timeseries_importer::export;
use timeseries_importer::ingest::frost::parse_observations_csv;
use timeseries_importer::ingest::havvarsel::{WATER_TEMP_COLUMN, parse_response, resample_hourly};
use timeseries_importer::model::TimeSeries;

const BADEVANN: &str = r#"{
    "data": {
        "tstype": "badevann",
        "tseries": [{
            "header": {
                "id": {"buoyid": "1", "parameter": "temperature"},
                "extra": {"name": "Hvervenbukta", "pos": {"lon": 10.7812, "lat": 59.8325}}
            },
            "observations": [
                {"time": "2020-09-01T02:02:00Z", "body": {"value": "16.0"}},
                {"time": "2020-09-01T03:01:00Z", "body": {"value": "16.2"}},
                {"time": "2020-09-01T05:00:00Z", "body": {"value": "16.5"}}
            ]
        }]
    }
}"#;

const FROST_CSV: &str = "sourceId,referenceTime,air_temperature\n\
                         SN18700:0,2020-09-01T02:00:00.000Z,12.5\n\
                         SN18700:0,2020-09-01T04:00:00.000Z,13.5\n\
                         SN18700:0,2020-09-01T05:00:00.000Z,14.0\n";

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 9, 1, h, 0, 0).unwrap()
}

fn site_frame() -> TimeSeries {
    let (_, obs) = parse_response(BADEVANN, "1").unwrap();
    let water = resample_hourly(&obs);

    let mut data = TimeSeries::hourly(at(0), at(7));
    data.left_join(&water).unwrap();
    assert!(data.trim_to_column(WATER_TEMP_COLUMN));
    data
}

#[test]
fn test_site_frame_is_trimmed_to_observations() {
    let data = site_frame();
    assert_eq!(data.times, vec![at(2), at(3), at(4), at(5)]);
    assert_eq!(
        data.column(WATER_TEMP_COLUMN).unwrap().values,
        vec![Some(16.0), Some(16.2), None, Some(16.5)]
    );
}

#[test]
fn test_site_without_observations_keeps_empty_target_column() {
    let mut data = TimeSeries::hourly(at(0), at(3));
    data.left_join(&resample_hourly(&[])).unwrap();

    assert!(!data.trim_to_column(WATER_TEMP_COLUMN));
    assert_eq!(data.len(), 4);
    assert_eq!(data.column_names(), vec![WATER_TEMP_COLUMN]);

    let mut buf = Vec::new();
    export::write_csv_to(&data, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("time,water_temp\n2020-09-01T00:00:00Z,\n"));
}

#[test]
fn test_frost_station_columns_are_imputed_and_prefixed() {
    let mut data = site_frame();
    let obs = parse_observations_csv(FROST_CSV, "air_temperature").unwrap();
    join_frost(&mut data, &obs, "SN18700").unwrap();

    // 03:00 is one hour from both 02:00 and 04:00; the later one is used
    assert_eq!(
        data.column("SN18700air_temperature0").unwrap().values,
        vec![Some(12.5), Some(13.5), Some(13.5), Some(14.0)]
    );
}

#[test]
fn test_model_columns_join_on_time() {
    let mut data = site_frame();

    let mut ocean = TimeSeries::new(vec![at(1), at(2), at(3), at(4), at(5), at(6)]);
    ocean
        .push_column("temperature0", vec![Some(15.0), Some(15.1), Some(15.2), Some(15.3), Some(15.4), Some(15.5)])
        .unwrap();
    let renamed = norkyst_column("temperature", "temperature0");
    assert!(ocean.rename_column("temperature0", &renamed));
    data.left_join(&ocean).unwrap();

    assert_eq!(data.column_names(), vec![WATER_TEMP_COLUMN, "norkyst_water_temp0"]);
    assert_eq!(
        data.column("norkyst_water_temp0").unwrap().values,
        vec![Some(15.1), Some(15.2), Some(15.3), Some(15.4)]
    );
}

#[test]
fn test_dataset_csv_on_disk() {
    let mut data = site_frame();
    let obs = parse_observations_csv(FROST_CSV, "air_temperature").unwrap();
    join_frost(&mut data, &obs, "SN18700").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dataset_1.csv");
    export::write_csv(&data, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "time,water_temp,SN18700air_temperature0");
    assert_eq!(lines[1], "2020-09-01T02:00:00Z,16,12.5");
    assert_eq!(lines[2], "2020-09-01T03:00:00Z,16.2,13.5");
    assert_eq!(lines[3], "2020-09-01T04:00:00Z,,13.5");
    assert_eq!(lines.len(), 5);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    assert_eq!(reader.records().count(), 4);
}
