//! Importer configuration.
//!
//! Everything has a default, so the tools run without a config file. A TOML
//! file passed with `--config` overrides individual fields; the Frost client
//! id is read from `FROST_CLIENT_ID` (a `.env` file is honoured) unless set
//! in the file.
//!
//! ```toml
//! output_dir = "out"
//!
//! [frost]
//! enabled = true
//! elements = [{ name = "air_temperature", stations = 2 }]
//!
//! [norkyst]
//! depths = [0, 3, 10, 50]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::thredds::GridProduct;
use crate::model::ImportError;

pub const FROST_CLIENT_ID_ENV: &str = "FROST_CLIENT_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the CSV files are written to.
    pub output_dir: PathBuf,
    /// Append-only log file; empty string disables file logging.
    pub log_file: String,
    /// Per-request timeout in seconds.
    pub http_timeout_secs: u64,
    pub havvarsel: HavvarselConfig,
    pub frost: FrostConfig,
    pub norkyst: NorKystConfig,
    pub postprocessed: PostProcessedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HavvarselConfig {
    pub base_url: String,
    pub parameter: String,
    /// Trim the dataset to the hours in which the site reported a value.
    pub restrict_to_observed_range: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrostConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    /// Whether the combined dataset pulls nearby Frost stations.
    pub enabled: bool,
    pub elements: Vec<FrostElement>,
}

/// A Frost element and how many of the nearest stations to fetch it from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrostElement {
    pub name: String,
    pub stations: usize,
}

/// NorKyst-800 ocean model, one OPeNDAP file per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NorKystConfig {
    /// `strftime` template producing one OPeNDAP URL per day.
    pub url_template: String,
    pub lat_var: String,
    pub lon_var: String,
    /// Bathymetry variable used to mask land cells.
    pub mask_var: Option<String>,
    /// Stride of the first, coarse pass of the nearest cell search.
    pub coarse_stride: usize,
    /// Model depths (metres) fetched for the combined dataset.
    pub depths: Vec<f64>,
    pub param: String,
    /// File used for the model depth lookup.
    pub reference_url: String,
}

/// Post-processed weather forecast, 00Z run of each day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessedConfig {
    pub url_template: String,
    pub lat_var: String,
    pub lon_var: String,
    pub coarse_stride: usize,
    pub params: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            log_file: "log.txt".to_string(),
            http_timeout_secs: 120,
            havvarsel: HavvarselConfig::default(),
            frost: FrostConfig::default(),
            norkyst: NorKystConfig::default(),
            postprocessed: PostProcessedConfig::default(),
        }
    }
}

impl Default for HavvarselConfig {
    fn default() -> Self {
        Self {
            base_url: "https://havvarsel-frost.met.no".to_string(),
            parameter: "temperature".to_string(),
            restrict_to_observed_range: true,
        }
    }
}

impl Default for FrostConfig {
    fn default() -> Self {
        let elements = [
            ("air_temperature", 4),
            ("wind_speed", 3),
            ("cloud_area_fraction", 3),
            ("mean(solar_irradiance PT1H)", 1),
            ("sum(duration_of_sunshine PT1H)", 2),
            ("mean(relative_humidity PT1H)", 2),
            ("mean(surface_downwelling_shortwave_flux_in_air PT1H)", 1),
        ]
        .into_iter()
        .map(|(name, stations)| FrostElement { name: name.to_string(), stations })
        .collect();

        Self {
            base_url: "https://frost.met.no".to_string(),
            client_id: None,
            enabled: false,
            elements,
        }
    }
}

impl Default for NorKystConfig {
    fn default() -> Self {
        Self {
            url_template: "https://thredds.met.no/thredds/dodsC/fou-hi/norkyst800m-1h/NorKyst-800m_ZDEPTHS_his.an.%Y%m%d00.nc".to_string(),
            lat_var: "lat".to_string(),
            lon_var: "lon".to_string(),
            mask_var: Some("h".to_string()),
            coarse_stride: 10,
            depths: vec![0.0, 3.0, 10.0],
            param: "temperature".to_string(),
            reference_url: "https://thredds.met.no/thredds/dodsC/fou-hi/norkyst800m-1h/NorKyst-800m_ZDEPTHS_his.an.2021100100.nc".to_string(),
        }
    }
}

impl NorKystConfig {
    pub fn product(&self) -> GridProduct {
        GridProduct {
            name: "NorKyst-800".to_string(),
            url_template: self.url_template.clone(),
            lat_var: self.lat_var.clone(),
            lon_var: self.lon_var.clone(),
            mask_var: self.mask_var.clone(),
            coarse_stride: self.coarse_stride,
        }
    }
}

impl Default for PostProcessedConfig {
    fn default() -> Self {
        Self {
            url_template: "https://thredds.met.no/thredds/dodsC/metpparchive/%Y/%m/%d/met_forecast_1_0km_nordic_%Y%m%dT00Z.nc".to_string(),
            lat_var: "latitude".to_string(),
            lon_var: "longitude".to_string(),
            coarse_stride: 10,
            params: [
                "air_temperature_2m",
                "wind_speed_10m",
                "wind_direction_10m",
                "precipitation_amount",
                "cloud_area_fraction",
                "integral_of_surface_downwelling_shortwave_flux_in_air_wrt_time",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl PostProcessedConfig {
    pub fn product(&self) -> GridProduct {
        GridProduct {
            name: "MET Nordic forecast".to_string(),
            url_template: self.url_template.clone(),
            lat_var: self.lat_var.clone(),
            lon_var: self.lon_var.clone(),
            mask_var: None,
            coarse_stride: self.coarse_stride,
        }
    }
}

impl Config {
    /// Loads `path` if given, otherwise the defaults, then resolves the Frost
    /// client id from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ImportError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| ImportError::Config(format!("cannot read {}: {}", p.display(), e)))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };

        if config.frost.client_id.is_none() {
            config.frost.client_id = std::env::var(FROST_CLIENT_ID_ENV).ok().filter(|s| !s.is_empty());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ImportError> {
        toml::from_str(text).map_err(|e| ImportError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        for grid in [self.norkyst.product(), self.postprocessed.product()] {
            if grid.coarse_stride == 0 {
                return Err(ImportError::Config("coarse_stride must be at least 1".to_string()));
            }
            if !grid.url_template.contains("%Y") {
                return Err(ImportError::Config(format!(
                    "url_template '{}' has no date placeholder",
                    grid.url_template
                )));
            }
        }
        if let Some(el) = self.frost.elements.iter().find(|e| e.stations == 0) {
            return Err(ImportError::Config(format!(
                "frost element '{}' asks for 0 stations",
                el.name
            )));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn log_file(&self) -> Option<&str> {
        (!self.log_file.is_empty()).then_some(self.log_file.as_str())
    }

    /// Shared blocking HTTP client for all sources.
    pub fn http_client(&self) -> Result<reqwest::blocking::Client, ImportError> {
        reqwest::blocking::Client::builder()
            .timeout(self.http_timeout())
            .user_agent(concat!("timeseries-importer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ImportError::Config(format!("cannot build HTTP client: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_importer_setup() {
        let config = Config::default();
        assert!(!config.frost.enabled);
        assert_eq!(config.frost.elements.len(), 7);
        assert_eq!(config.frost.elements[0], FrostElement { name: "air_temperature".into(), stations: 4 });
        assert_eq!(config.norkyst.depths, vec![0.0, 3.0, 10.0]);
        assert_eq!(config.postprocessed.params.len(), 6);
        assert_eq!(config.log_file(), Some("log.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            output_dir = "out"
            log_file = ""

            [frost]
            enabled = true
            elements = [{ name = "wind_speed", stations = 2 }]

            [norkyst]
            depths = [0, 50]

            [postprocessed]
            params = ["air_temperature_2m"]
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.log_file(), None);
        assert!(config.frost.enabled);
        assert_eq!(config.frost.base_url, "https://frost.met.no");
        assert_eq!(config.norkyst.depths, vec![0.0, 50.0]);
        assert_eq!(config.norkyst.mask_var.as_deref(), Some("h"));
        assert_eq!(config.postprocessed.lat_var, "latitude");
        assert_eq!(config.postprocessed.params, vec!["air_temperature_2m".to_string()]);
        assert_eq!(config.havvarsel.parameter, "temperature");
    }

    #[test]
    fn test_validation_rejects_zero_stride_and_stations() {
        let mut config = Config::default();
        config.norkyst.coarse_stride = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.frost.elements.push(FrostElement { name: "x".into(), stations: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Config::from_toml("output_dir = [").unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }
}
