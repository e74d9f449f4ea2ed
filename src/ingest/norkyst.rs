//! NorKyst-800 ocean model timeseries from the MET THREDDS server.
//!
//! Hourly z-level output (from 2017-02-20 onwards):
//! https://thredds.met.no/thredds/fou-hi/norkyst800v2.html
//!
//! Examples:
//!
//! Sea surface elevation (single-level, no depth):
//!   tsimport norkyst --lon 3 --lat 60 -p zeta -S 2021-04-11T00:00 -E 2021-04-14T23:00
//!
//! Temperature at 100 m, from the last step before the start to the first
//! step after the end:
//!   tsimport norkyst --lon 3 --lat 60 --depth 100 -p temperature -S 2021-04-11T00:45 -E 2021-04-14T11:15

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;

use crate::config::NorKystConfig;
use crate::ingest::thredds::{GridExtractor, GridPoint};
use crate::logging::DataSource;
use crate::model::{ImportError, TimeSeries};

/// z-levels of the ZDEPTHS product, in metres.
pub const MODEL_DEPTHS: &[f64] = &[
    0.0, 3.0, 10.0, 15.0, 25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 250.0, 300.0, 500.0, 1000.0,
    2000.0, 3000.0,
];

pub fn is_model_depth(depth: f64) -> bool {
    MODEL_DEPTHS.iter().any(|&d| d == depth)
}

/// Column name for a parameter at a depth, e.g. `temperature10`.
pub fn column_name(param: &str, depth: Option<f64>) -> String {
    match depth {
        Some(d) => format!("{}{}", param, d),
        None => param.to_string(),
    }
}

pub struct NorKystImporter<'a> {
    extractor: GridExtractor<'a>,
}

impl<'a> NorKystImporter<'a> {
    pub fn new(client: &'a Client, config: &NorKystConfig, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            extractor: GridExtractor::new(client, config.product(), DataSource::NorKyst, start, end),
        }
    }

    pub fn locate(&mut self, lon: f64, lat: f64) -> Result<GridPoint, ImportError> {
        self.extractor.locate(lat, lon)
    }

    /// Timeseries of `param` at the wet cell nearest to `(lon, lat)`.
    ///
    /// With `depths` empty the parameter is read as single-level (or at the
    /// surface for 3-D parameters) into a column named `param`; otherwise one
    /// column `{param}{depth}` per requested depth.
    pub fn data(&mut self, param: &str, lon: f64, lat: f64, depths: &[f64]) -> Result<TimeSeries, ImportError> {
        if depths.is_empty() {
            return self.extractor.extract(param, None, lat, lon);
        }

        let mut combined: Option<TimeSeries> = None;
        for &depth in depths {
            let mut level = self.extractor.extract(param, Some(depth), lat, lon)?;
            level.rename_column(param, &column_name(param, Some(depth)));
            combined = Some(match combined {
                None => level,
                Some(mut acc) => {
                    acc.left_join(&level)?;
                    acc
                }
            });
        }
        Ok(combined.unwrap_or_default())
    }
}

/// Model depth `h` at the wet cell nearest to `(lon, lat)`, read from the
/// configured reference file.
pub fn simulated_depth(client: &Client, config: &NorKystConfig, lon: f64, lat: f64) -> Result<f64, ImportError> {
    let mask_var = config.mask_var.clone().unwrap_or_else(|| "h".to_string());
    let mut extractor = GridExtractor::with_files(
        client,
        config.product(),
        DataSource::NorKyst,
        vec![config.reference_url.clone()],
    );
    extractor
        .static_value(&mask_var, lat, lon)?
        .ok_or_else(|| ImportError::NoData(format!("{} is missing at the nearest cell", mask_var)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        assert_eq!(column_name("temperature", Some(0.0)), "temperature0");
        assert_eq!(column_name("temperature", Some(10.0)), "temperature10");
        assert_eq!(column_name("zeta", None), "zeta");
    }

    #[test]
    fn test_model_depths() {
        assert_eq!(MODEL_DEPTHS.len(), 16);
        assert!(is_model_depth(100.0));
        assert!(!is_model_depth(5.0));
        assert!(MODEL_DEPTHS.windows(2).all(|w| w[0] < w[1]));
    }
}
