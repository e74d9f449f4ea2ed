//! Frost client (frost.met.no station observations).
//!
//! Fetches observations for one station and element as CSV, batched by
//! calendar year because a single request returns at most 100 000
//! observations, and ranks the stations nearest to a site that actually
//! carry an element.
//!
//! Frost requires a registered client id, sent as the basic-auth user name
//! with an empty password.
//!
//! API reference: https://frost.met.no/api.html
//! Element table: https://frost.met.no/elementtable
//!
//! Example (slow, a year of hourly data):
//!   tsimport frost -i SN18700 -p air_temperature -S 2019-01-01T00:00 -E 2019-12-31T23:59

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::geo::haversine_km;
use crate::ingest::send_text;
use crate::logging::{self, DataSource};
use crate::model::{ImportError, Location, TimeSeries};
use crate::timeutil::{iso_interval, year_batches};

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SourcesResponse {
    #[serde(default)]
    pub data: Vec<FrostSource>,
}

#[derive(Debug, Deserialize)]
pub struct FrostSource {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub geometry: Option<FrostGeometry>,
}

#[derive(Debug, Deserialize)]
pub struct FrostGeometry {
    /// GeoJSON order: `[lon, lat]`.
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableResponse {
    #[serde(default)]
    pub data: Vec<AvailableSeries>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableSeries {
    #[serde(rename = "sourceId")]
    pub source_id: String,
}

/// A Frost station ranked by distance to a site.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyStation {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

// ============================================================================
// Client
// ============================================================================

pub struct FrostImporter<'a> {
    client: &'a Client,
    base_url: String,
    client_id: String,
}

impl<'a> FrostImporter<'a> {
    pub fn new(client: &'a Client, base_url: &str, client_id: Option<&str>) -> Result<Self, ImportError> {
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or(ImportError::MissingClientId)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, ImportError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| ImportError::Config(format!("invalid Frost URL: {}", e)))
    }

    fn get(&self, url: Url, station: Option<&str>) -> Result<String, ImportError> {
        logging::info(DataSource::Frost, station, &format!("Trying {}", url));
        send_text(self.client.get(url).basic_auth(&self.client_id, Some("")))
    }

    /// Observations of `element` at `station` between `start` and `end`.
    ///
    /// Columns are named `{element}{level}` for every value column Frost
    /// returns for the element (several levels/sensors are possible).
    pub fn observations(
        &self,
        station: &str,
        element: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, ImportError> {
        let mut series = TimeSeries::default();

        for (batch_start, batch_end) in year_batches(start, end) {
            let interval = iso_interval(batch_start, batch_end);
            let url = self.url(
                "/observations/v0.csv",
                &[
                    ("referencetime", interval.as_str()),
                    ("sources", station),
                    ("elements", element),
                ],
            )?;
            let body = self.get(url, Some(station))?;
            series.append(parse_observations_csv(&body, element)?)?;
        }

        Ok(series)
    }

    /// Observations of several elements at one station.
    ///
    /// An element that fails (typically a 404 when the station does not
    /// measure it) is logged and left out; the others are still returned, in
    /// request order.
    pub fn observations_by_element(
        &self,
        station: &str,
        elements: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<(String, TimeSeries)> {
        let mut fetched = Vec::new();
        for element in elements {
            match self.observations(station, element, start, end) {
                Ok(series) => fetched.push((element.clone(), series)),
                Err(e) => logging::log_failure(DataSource::Frost, station, &format!("Fetching {}", element), &e),
            }
        }
        logging::log_fetch_summary(DataSource::Frost, elements.len(), fetched.len(), elements.len() - fetched.len());
        fetched
    }

    /// The `n` stations closest to `location` that have `element` between
    /// `start` and `end`.
    pub fn nearest_stations(
        &self,
        location: &Location,
        n: usize,
        element: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NearbyStation>, ImportError> {
        let validtime = format!("{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"));
        let url = self.url(
            "/sources/v0.jsonld",
            &[("validtime", validtime.as_str()), ("elements", element)],
        )?;
        let sources: SourcesResponse = serde_json::from_str(&self.get(url, None)?)?;

        let interval = iso_interval(start, end);
        let url = self.url(
            "/observations/availableTimeSeries/v0.jsonld",
            &[("elements", element), ("referencetime", interval.as_str())],
        )?;
        let available: AvailableResponse = serde_json::from_str(&self.get(url, None)?)?;

        let ranked = rank_stations(&sources.data, &available.data, location, n);
        for station in &ranked {
            logging::info(
                DataSource::Frost,
                Some(&station.id),
                &format!(
                    "{} at lat {:.4}, lon {:.4}: {:.2} km",
                    station.name, station.lat, station.lon, station.distance_km
                ),
            );
        }
        Ok(ranked)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses an `observations/v0.csv` body.
///
/// The time column is `referenceTime`; value columns are every header that
/// contains the lowercased element name. Empty cells become `None`.
pub fn parse_observations_csv(body: &str, element: &str) -> Result<TimeSeries, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers()?.clone();
    let time_idx = headers
        .iter()
        .position(|h| h == "referenceTime")
        .ok_or_else(|| ImportError::Parse("Frost CSV has no referenceTime column".to_string()))?;
    let needle = element.to_lowercase();
    let value_idx: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.to_lowercase().contains(&needle))
        .map(|(i, _)| i)
        .collect();
    if value_idx.is_empty() {
        return Err(ImportError::Parse(format!("Frost CSV has no column for '{}'", element)));
    }

    let mut times = Vec::new();
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); value_idx.len()];
    for record in reader.records() {
        let record = record?;
        let raw_time = record.get(time_idx).unwrap_or("");
        let time = DateTime::parse_from_rfc3339(raw_time)
            .map_err(|e| ImportError::Parse(format!("bad referenceTime '{}': {}", raw_time, e)))?
            .with_timezone(&Utc);
        times.push(time);
        for (col, &idx) in columns.iter_mut().zip(&value_idx) {
            col.push(record.get(idx).and_then(|v| v.parse().ok()));
        }
    }

    let mut series = TimeSeries::new(times);
    for (level, values) in columns.into_iter().enumerate() {
        series.push_column(&format!("{}{}", element, level), values)?;
    }
    Ok(series)
}

/// Keeps the sources with coordinates whose id has an available timeseries,
/// and returns the `n` nearest to `location`.
///
/// Available-series ids look like `SN18700:0`; only the part before the
/// colon identifies the source.
pub fn rank_stations(
    sources: &[FrostSource],
    available: &[AvailableSeries],
    location: &Location,
    n: usize,
) -> Vec<NearbyStation> {
    let available_ids: HashSet<&str> = available
        .iter()
        .map(|a| a.source_id.split(':').next().unwrap_or(&a.source_id))
        .collect();

    let mut stations: Vec<NearbyStation> = sources
        .iter()
        .filter(|s| available_ids.contains(s.id.as_str()))
        .filter_map(|s| {
            let coords = &s.geometry.as_ref()?.coordinates;
            let (lon, lat) = (*coords.first()?, *coords.get(1)?);
            Some(NearbyStation {
                id: s.id.clone(),
                name: s.name.clone().unwrap_or_default(),
                lat,
                lon,
                distance_km: haversine_km((location.lat, location.lon), (lat, lon)),
            })
        })
        .collect();

    stations.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    stations.truncate(n);
    stations
}
