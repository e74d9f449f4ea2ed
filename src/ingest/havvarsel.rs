//! Havvarsel Frost client (bathing water observations).
//!
//! Retrieves water temperature observations for a single buoy from the
//! `obs/badevann` endpoint of havvarsel-frost.met.no and resamples them onto
//! an hourly grid.
//!
//! API reference: https://havvarsel-frost.met.no/docs/apiref#/obs%2Fbadevann/obsBadevannGet
//! Data structure: https://havvarsel-frost.met.no/docs/dataset_badevann
//!
//! Example:
//!   tsimport havvarsel -i 5 -S 2019-01-01T00:00 -E 2019-12-31T23:59

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::ingest::{json_f64, send_text};
use crate::logging::{self, DataSource};
use crate::model::{Column, ImportError, Location, TimeSeries};
use crate::timeutil::{floor_to_hour, iso_interval};

/// Column holding the resampled observations.
pub const WATER_TEMP_COLUMN: &str = "water_temp";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BadevannResponse {
    pub data: BadevannData,
}

#[derive(Debug, Deserialize)]
pub struct BadevannData {
    #[serde(default)]
    pub tseries: Vec<BadevannSeries>,
}

#[derive(Debug, Deserialize)]
pub struct BadevannSeries {
    pub header: BadevannHeader,
    #[serde(default)]
    pub observations: Vec<BadevannObservation>,
}

#[derive(Debug, Deserialize)]
pub struct BadevannHeader {
    pub id: BadevannId,
    pub extra: BadevannExtra,
}

#[derive(Debug, Deserialize)]
pub struct BadevannId {
    pub buoyid: serde_json::Value,
    pub parameter: String,
}

#[derive(Debug, Deserialize)]
pub struct BadevannExtra {
    #[serde(default)]
    pub name: String,
    pub pos: BadevannPosition,
}

#[derive(Debug, Deserialize)]
pub struct BadevannPosition {
    pub lon: serde_json::Value,
    pub lat: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct BadevannObservation {
    pub time: String,
    pub body: BadevannBody,
}

#[derive(Debug, Deserialize)]
pub struct BadevannBody {
    pub value: serde_json::Value,
}

// ============================================================================
// Client
// ============================================================================

pub struct HavvarselImporter<'a> {
    client: &'a Client,
    base_url: String,
    parameter: String,
}

impl<'a> HavvarselImporter<'a> {
    pub fn new(client: &'a Client, base_url: &str, parameter: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            parameter: parameter.to_string(),
        }
    }

    pub fn build_url(&self, buoy_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}/api/v1/obs/badevann/get?time={}&incobs=true&buoyids={}&parameter={}",
            self.base_url,
            iso_interval(start, end),
            buoy_id,
            self.parameter
        )
    }

    /// Fetches the site metadata and the hourly `water_temp` series.
    pub fn data(
        &self,
        buoy_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Location, TimeSeries), ImportError> {
        let url = self.build_url(buoy_id, start, end);
        logging::info(DataSource::Havvarsel, Some(buoy_id), &format!("Trying {}", url));

        let body = send_text(self.client.get(&url).header("Accept", "application/json"))?;
        let (location, observations) = parse_response(&body, buoy_id)?;
        logging::info(
            DataSource::Havvarsel,
            Some(buoy_id),
            &format!(
                "{} ({}) at lat {:.4}, lon {:.4}: {} observations",
                location.name,
                location.parameter,
                location.lat,
                location.lon,
                observations.len()
            ),
        );

        Ok((location, resample_hourly(&observations)))
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a badevann response. Only the first timeseries is used.
pub fn parse_response(
    body: &str,
    buoy_id: &str,
) -> Result<(Location, Vec<(DateTime<Utc>, Option<f64>)>), ImportError> {
    let response: BadevannResponse = serde_json::from_str(body)?;
    let series = response
        .data
        .tseries
        .into_iter()
        .next()
        .ok_or_else(|| ImportError::NoData(format!("no timeseries for buoy {}", buoy_id)))?;

    let header = series.header;
    let id = match &header.id.buoyid {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let lat = json_f64(&header.extra.pos.lat)
        .ok_or_else(|| ImportError::Parse("buoy latitude is not numeric".to_string()))?;
    let lon = json_f64(&header.extra.pos.lon)
        .ok_or_else(|| ImportError::Parse("buoy longitude is not numeric".to_string()))?;

    let location = Location {
        id,
        name: header.extra.name,
        parameter: header.id.parameter,
        lat,
        lon,
    };

    let observations = series
        .observations
        .iter()
        .map(|obs| {
            let time = DateTime::parse_from_rfc3339(&obs.time)
                .map_err(|e| ImportError::Parse(format!("bad observation time '{}': {}", obs.time, e)))?
                .with_timezone(&Utc);
            Ok((time, json_f64(&obs.body.value)))
        })
        .collect::<Result<Vec<_>, ImportError>>()?;

    Ok((location, observations))
}

/// Floors observations to the hour and keeps the first non-missing value per
/// hour.
///
/// Some buoys report a minute or so after the hour; flooring aligns them with
/// the hourly Frost and model data. The result covers every hour from the
/// first to the last observed hour, with gaps as `None`.
pub fn resample_hourly(observations: &[(DateTime<Utc>, Option<f64>)]) -> TimeSeries {
    let mut sorted: Vec<_> = observations.to_vec();
    sorted.sort_by_key(|(t, _)| *t);

    let mut hourly: BTreeMap<DateTime<Utc>, Option<f64>> = BTreeMap::new();
    for (t, v) in sorted {
        let slot = hourly.entry(floor_to_hour(t)).or_insert(None);
        if slot.is_none() {
            *slot = v;
        }
    }

    let (Some(&first), Some(&last)) = (hourly.keys().next(), hourly.keys().next_back()) else {
        return TimeSeries {
            times: Vec::new(),
            columns: vec![Column { name: WATER_TEMP_COLUMN.to_string(), values: Vec::new() }],
        };
    };

    let mut times = Vec::new();
    let mut values = Vec::new();
    let mut t = first;
    while t <= last {
        times.push(t);
        values.push(hourly.get(&t).copied().flatten());
        t += Duration::hours(1);
    }

    TimeSeries {
        times,
        columns: vec![Column { name: WATER_TEMP_COLUMN.to_string(), values }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RESPONSE: &str = r#"{
        "data": {
            "tstype": "badevann",
            "tseries": [{
                "header": {
                    "id": {"buoyid": "5", "parameter": "temperature"},
                    "extra": {"name": "Sjøbadet", "pos": {"lon": "10.7134", "lat": "59.9050"}}
                },
                "observations": [
                    {"time": "2020-09-01T10:01:00Z", "body": {"value": "15.2"}},
                    {"time": "2020-09-01T10:31:00Z", "body": {"value": "15.9"}},
                    {"time": "2020-09-01T12:00:00Z", "body": {"value": 16.1}}
                ]
            }]
        }
    }"#;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_response_location_and_observations() {
        let (location, obs) = parse_response(RESPONSE, "5").unwrap();
        assert_eq!(location.id, "5");
        assert_eq!(location.parameter, "temperature");
        assert_eq!(location.name, "Sjøbadet");
        assert!((location.lat - 59.905).abs() < 1e-9);
        assert!((location.lon - 10.7134).abs() < 1e-9);
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[2].1, Some(16.1));
    }

    #[test]
    fn test_empty_tseries_is_no_data() {
        let err = parse_response(r#"{"data": {"tseries": []}}"#, "99").unwrap_err();
        assert!(matches!(err, ImportError::NoData(_)));
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let err = parse_response("<html>", "5").unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));
    }

    #[test]
    fn test_resample_takes_first_value_per_hour_and_fills_gaps() {
        let (_, obs) = parse_response(RESPONSE, "5").unwrap();
        let hourly = resample_hourly(&obs);
        assert_eq!(hourly.times, vec![at(10), at(11), at(12)]);
        assert_eq!(
            hourly.column(WATER_TEMP_COLUMN).unwrap().values,
            vec![Some(15.2), None, Some(16.1)]
        );
    }

    #[test]
    fn test_resample_skips_missing_for_first() {
        let obs = vec![
            (at(10) + Duration::minutes(1), None),
            (at(10) + Duration::minutes(20), Some(14.0)),
        ];
        let hourly = resample_hourly(&obs);
        assert_eq!(hourly.column(WATER_TEMP_COLUMN).unwrap().values, vec![Some(14.0)]);
    }

    #[test]
    fn test_resample_empty_keeps_water_temp_column() {
        let hourly = resample_hourly(&[]);
        assert!(hourly.is_empty());
        assert_eq!(hourly.column_names(), vec![WATER_TEMP_COLUMN]);

        let mut grid = TimeSeries::hourly(at(0), at(3));
        grid.left_join(&hourly).unwrap();
        assert_eq!(grid.column(WATER_TEMP_COLUMN).unwrap().values, vec![None; 4]);
    }

    #[test]
    fn test_build_url() {
        let client = Client::new();
        let importer = HavvarselImporter::new(&client, "https://havvarsel-frost.met.no/", "temperature");
        let url = importer.build_url("5", at(0), at(23));
        assert_eq!(
            url,
            "https://havvarsel-frost.met.no/api/v1/obs/badevann/get?time=2020-09-01T00:00:00Z/2020-09-01T23:00:00Z&incobs=true&buoyids=5&parameter=temperature"
        );
    }
}
