//! Combined dataset for a Havvarsel Frost bathing site.
//!
//! Builds an hourly UTC table around the site's water temperature series and
//! enriches it with nearby Frost station observations (optional), NorKyst-800
//! water temperatures and post-processed weather forecasts at the site. The
//! result is written as `dataset_{station_id}.csv` for data driven
//! prediction.
//!
//! Example:
//!   tsimport dataset -i 1 -S 2020-09-01T00:00 -E 2020-09-02T23:59

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;

use crate::config::Config;
use crate::export;
use crate::ingest::frost::FrostImporter;
use crate::ingest::havvarsel::{HavvarselImporter, WATER_TEMP_COLUMN};
use crate::ingest::norkyst::NorKystImporter;
use crate::ingest::postprocessed::PostProcessedImporter;
use crate::logging::{self, DataSource};
use crate::model::{Column, ImportError, Location, TimeSeries};

/// Prefix of the NorKyst water temperature columns, e.g. `norkyst_water_temp3`.
pub const NORKYST_TEMP_PREFIX: &str = "norkyst_water_temp";

pub struct DatasetBuilder<'a> {
    client: &'a Client,
    config: &'a Config,
    station_id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(
        client: &'a Client,
        config: &'a Config,
        station_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, ImportError> {
        if end < start {
            return Err(ImportError::Config(format!(
                "end time {} is before start time {}",
                end, start
            )));
        }
        Ok(Self {
            client,
            config,
            station_id: station_id.to_string(),
            start,
            end,
        })
    }

    pub fn output_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("dataset_{}.csv", self.station_id))
    }

    /// Builds the dataset and writes it to `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ImportError> {
        let data = self.build()?;
        let path = self.output_path(dir);
        logging::info(DataSource::System, None, "Dataset is constructed and will be saved now...");
        export::write_csv(&data, &path)?;
        logging::info(
            DataSource::System,
            None,
            &format!("Ready! {} rows x {} columns written to {}", data.len(), data.columns.len(), path.display()),
        );
        Ok(path)
    }

    pub fn build(&self) -> Result<TimeSeries, ImportError> {
        logging::rule(DataSource::System);
        logging::info(DataSource::System, None, "Starting the construction of a data set...");
        logging::rule(DataSource::System);

        let mut data = TimeSeries::hourly(self.start, self.end);

        // Havvarsel Frost site and water temperatures
        let havvarsel = HavvarselImporter::new(
            self.client,
            &self.config.havvarsel.base_url,
            &self.config.havvarsel.parameter,
        );
        let (location, water_temp) = havvarsel.data(&self.station_id, self.start, self.end)?;
        data.left_join(&water_temp)?;

        let (mut start, mut end) = (self.start, self.end);
        if self.config.havvarsel.restrict_to_observed_range {
            if data.trim_to_column(WATER_TEMP_COLUMN) {
                logging::info(
                    DataSource::Havvarsel,
                    Some(&self.station_id),
                    "The data fetching is restricted to the range when water temperatures are available",
                );
                start = data.times[0];
                end = data.times[data.len() - 1];
            } else {
                logging::warn(
                    DataSource::Havvarsel,
                    Some(&self.station_id),
                    "No water temperature observations in the requested period",
                );
            }
        }
        logging::rule(DataSource::System);

        if self.config.frost.enabled {
            self.add_frost(&mut data, &location, start, end)?;
        }

        // NorKyst-800 water temperature at the site
        logging::info(DataSource::NorKyst, None, "Fetching data from THREDDS");
        let norkyst_cfg = &self.config.norkyst;
        let mut norkyst = NorKystImporter::new(self.client, norkyst_cfg, start, end);
        let mut ocean = norkyst.data(&norkyst_cfg.param, location.lon, location.lat, &norkyst_cfg.depths)?;
        let names: Vec<String> = ocean.columns.iter().map(|c| c.name.clone()).collect();
        for name in names {
            ocean.rename_column(&name, &norkyst_column(&norkyst_cfg.param, &name));
        }
        data.left_join(&ocean)?;
        logging::rule(DataSource::System);

        // Post-processed forecasts at the site
        logging::info(DataSource::PostProcessed, None, "Fetching data from THREDDS");
        let mut pp = PostProcessedImporter::new(self.client, &self.config.postprocessed, start, end);
        let weather = pp.data(&self.config.postprocessed.params, location.lon, location.lat)?;
        data.left_join(&weather)?;
        logging::rule(DataSource::System);

        Ok(data)
    }

    fn add_frost(
        &self,
        data: &mut TimeSeries,
        location: &Location,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), ImportError> {
        let frost = FrostImporter::new(
            self.client,
            &self.config.frost.base_url,
            self.config.frost.client_id.as_deref(),
        )?;

        for element in &self.config.frost.elements {
            logging::rule(DataSource::Frost);
            logging::info(DataSource::Frost, None, &format!("Frost element: {}.", element.name));
            logging::info(DataSource::Frost, None, &format!("The closest {} Frost stations:", element.stations));

            let stations = match frost.nearest_stations(location, element.stations, &element.name, start, end) {
                Ok(stations) => stations,
                Err(e) => {
                    logging::log_failure(DataSource::Frost, &element.name, "Station lookup", &e);
                    continue;
                }
            };

            let (mut ok, mut failed) = (0, 0);
            for station in &stations {
                logging::info(DataSource::Frost, Some(&station.id), &format!("Fetching data for {}", station.id));
                match frost.observations(&station.id, &element.name, start, end) {
                    Ok(obs) if !obs.is_empty() => {
                        logging::info(DataSource::Frost, Some(&station.id), "Postprocessing the fetched data...");
                        join_frost(data, &obs, &station.id)?;
                        ok += 1;
                    }
                    Ok(_) => {
                        logging::warn(DataSource::Frost, Some(&station.id), "No observations returned");
                        failed += 1;
                    }
                    Err(e) => {
                        logging::log_failure(DataSource::Frost, &station.id, "Observation fetch", &e);
                        failed += 1;
                    }
                }
            }
            logging::log_fetch_summary(DataSource::Frost, stations.len(), ok, failed);
        }
        Ok(())
    }
}

// ============================================================================
// Joining helpers
// ============================================================================

/// NorKyst column name in the dataset: `temperature3` becomes
/// `norkyst_water_temp3`; other parameters get a `norkyst_` prefix.
pub fn norkyst_column(param: &str, column: &str) -> String {
    match column.strip_prefix(param) {
        Some(suffix) if param == "temperature" => format!("{}{}", NORKYST_TEMP_PREFIX, suffix),
        _ => format!("norkyst_{}", column),
    }
}

/// Aligns `obs` onto `times`.
///
/// Rows with an identical time are taken as they are. Grid times the
/// observations miss are filled with the temporally nearest observation
/// row (the later one on a tie). Returns the aligned series and the number
/// of imputed rows. `obs` must not be empty.
pub fn impute_nearest(times: &[DateTime<Utc>], obs: &TimeSeries) -> (TimeSeries, usize) {
    let mut order: Vec<usize> = (0..obs.len()).collect();
    order.sort_by_key(|&i| obs.times[i]);
    let sorted: Vec<DateTime<Utc>> = order.iter().map(|&i| obs.times[i]).collect();

    let mut imputed = 0;
    let rows: Vec<Option<usize>> = times
        .iter()
        .map(|t| {
            let pos = sorted.partition_point(|s| s < t);
            if pos < sorted.len() && sorted[pos] == *t {
                return Some(order[pos]);
            }
            let before = pos.checked_sub(1);
            let after = (pos < sorted.len()).then_some(pos);
            let pick = match (before, after) {
                (Some(b), Some(a)) => {
                    if *t - sorted[b] < sorted[a] - *t { b } else { a }
                }
                (Some(b), None) => b,
                (None, Some(a)) => a,
                (None, None) => return None,
            };
            imputed += 1;
            Some(order[pick])
        })
        .collect();

    let columns = obs
        .columns
        .iter()
        .map(|col| Column {
            name: col.name.clone(),
            values: rows.iter().map(|r| r.and_then(|i| col.values[i])).collect(),
        })
        .collect();
    (TimeSeries { times: times.to_vec(), columns }, imputed)
}

/// Adds a Frost station's columns to `data` as `{station}{element}{level}`.
pub fn join_frost(data: &mut TimeSeries, obs: &TimeSeries, station: &str) -> Result<(), ImportError> {
    let (mut aligned, imputed) = impute_nearest(&data.times, obs);
    if imputed > 0 {
        logging::info(
            DataSource::Frost,
            Some(station),
            &format!("The time series misses {} observation(s)...", imputed),
        );
        logging::info(
            DataSource::Frost,
            Some(station),
            "Missing observations have been filled with the value from the closest neighbor.",
        );
    }

    for col in &mut aligned.columns {
        col.name = format!("{}{}", station, col.name);
    }
    data.left_join(&aligned)?;
    logging::info(DataSource::Frost, Some(station), "Data is added to the data set");
    Ok(())
}
