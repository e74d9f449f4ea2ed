//! Timeseries importers for MET Norway sources.
//!
//! Fetches point timeseries from Havvarsel Frost (bathing site water
//! temperatures), Frost (station observations), the NorKyst-800 ocean model
//! and the post-processed MET Nordic forecast archive on THREDDS, and merges
//! them into hourly CSV datasets.
//!
//! ```no_run
//! use timeseries_importer::{config::Config, dataset::DatasetBuilder, timeutil::parse_cli_time};
//!
//! let config = Config::load(None)?;
//! let client = config.http_client()?;
//! let start = parse_cli_time("2020-09-01T00:00")?;
//! let end = parse_cli_time("2020-09-02T23:59")?;
//! let path = DatasetBuilder::new(&client, &config, "1", start, end)?.write(&config.output_dir)?;
//! println!("{}", path.display());
//! # Ok::<(), timeseries_importer::model::ImportError>(())
//! ```

pub mod config;
pub mod dataset;
pub mod export;
pub mod geo;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod timeutil;
pub mod verify;
