//! `tsimport`: command line front end for the timeseries importers.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use timeseries_importer::config::Config;
use timeseries_importer::dataset::DatasetBuilder;
use timeseries_importer::export;
use timeseries_importer::ingest::frost::FrostImporter;
use timeseries_importer::ingest::havvarsel::HavvarselImporter;
use timeseries_importer::ingest::norkyst::{self, MODEL_DEPTHS, NorKystImporter};
use timeseries_importer::logging::{self, DataSource, LogLevel};
use timeseries_importer::timeutil::parse_cli_time;
use timeseries_importer::verify;

/// Rows printed to the console by the single-source commands.
const PREVIEW_ROWS: usize = 24;

#[derive(Parser)]
#[command(name = "tsimport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Import timeseries from Havvarsel Frost, Frost and THREDDS", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Overrides the configured output directory
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Period in UTC, `YYYY-MM-DDTHH:MM`.
#[derive(Args)]
struct Period {
    /// Start time
    #[arg(short = 'S', long)]
    start_time: String,
    /// End time
    #[arg(short = 'E', long)]
    end_time: String,
}

impl Period {
    fn parse(&self) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_cli_time(&self.start_time)?;
        let end = parse_cli_time(&self.end_time)?;
        if end < start {
            bail!("end time {} is before start time {}", self.end_time, self.start_time);
        }
        Ok((start, end))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Combined hourly dataset for a Havvarsel Frost bathing site
    Dataset {
        /// Havvarsel Frost buoy id
        #[arg(short = 'i', long, alias = "id")]
        station_id: String,
        #[command(flatten)]
        period: Period,
        /// Add observations from the nearest Frost stations
        #[arg(long)]
        with_frost: bool,
    },
    /// Water temperatures from Havvarsel Frost
    Havvarsel {
        #[arg(short = 'i', long, alias = "id")]
        station_id: String,
        #[command(flatten)]
        period: Period,
    },
    /// Station observations from Frost
    Frost {
        /// Frost source id, e.g. SN18700
        #[arg(short = 'i', long, alias = "id")]
        station_id: String,
        /// Frost element; repeat for several
        #[arg(short = 'p', long = "param", required = true)]
        params: Vec<String>,
        #[command(flatten)]
        period: Period,
    },
    /// NorKyst-800 model timeseries at the nearest wet cell
    Norkyst {
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(short = 'p', long = "param", default_value = "temperature")]
        param: String,
        /// Model depth in metres; omit for single-level parameters
        #[arg(long)]
        depth: Option<f64>,
        #[command(flatten)]
        period: Period,
    },
    /// NorKyst-800 bottom depth at the nearest wet cell
    SimulatedDepth {
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
    },
    /// Check which sources are reachable and print a JSON report
    Verify {
        /// Havvarsel Frost buoy id used for the check
        #[arg(short = 'i', long, alias = "id", default_value = "1")]
        station_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    let level: LogLevel = cli.log_level.parse().map_err(anyhow::Error::msg)?;
    logging::init_logger(level, config.log_file(), false);

    let client = config.http_client()?;

    match cli.command {
        Commands::Dataset { station_id, period, with_frost } => {
            let (start, end) = period.parse()?;
            if with_frost {
                config.frost.enabled = true;
            }
            let builder = DatasetBuilder::new(&client, &config, &station_id, start, end)?;
            let path = builder
                .write(&config.output_dir)
                .with_context(|| format!("building dataset for site {}", station_id))?;
            println!("{}", path.display());
        }
        Commands::Havvarsel { station_id, period } => {
            let (start, end) = period.parse()?;
            let importer = HavvarselImporter::new(&client, &config.havvarsel.base_url, &config.havvarsel.parameter);
            let (location, series) = importer.data(&station_id, start, end)?;
            logging::info(
                DataSource::Havvarsel,
                Some(&station_id),
                &format!("{} at lat {}, lon {}", location.name, location.lat, location.lon),
            );
            print!("{}", export::render_table(&series, PREVIEW_ROWS));
            save(&series, &config.output_dir, "data.csv")?;
        }
        Commands::Frost { station_id, params, period } => {
            let (start, end) = period.parse()?;
            let importer = FrostImporter::new(&client, &config.frost.base_url, config.frost.client_id.as_deref())?;
            for (param, series) in importer.observations_by_element(&station_id, &params, start, end) {
                print!("{}", export::render_table(&series, PREVIEW_ROWS));
                save(&series, &config.output_dir, &format!("data_{}.csv", param))?;
            }
        }
        Commands::Norkyst { lon, lat, param, depth, period } => {
            let (start, end) = period.parse()?;
            if let Some(d) = depth {
                if !norkyst::is_model_depth(d) {
                    bail!("depth {} is not a model depth; choose one of {:?}", d, MODEL_DEPTHS);
                }
            }
            let mut importer = NorKystImporter::new(&client, &config.norkyst, start, end);
            let point = importer.locate(lon, lat)?;
            logging::info(
                DataSource::NorKyst,
                None,
                &format!(
                    "Nearest wet cell ({}, {}) at lat {:.4}, lon {:.4}, {:.2} km away",
                    point.row, point.col, point.lat, point.lon, point.distance_km
                ),
            );
            let depths: Vec<f64> = depth.into_iter().collect();
            let series = importer.data(&param, lon, lat, &depths)?;
            print!("{}", export::render_table(&series, PREVIEW_ROWS));
            save(&series, &config.output_dir, &format!("norkyst_{}.csv", param))?;
        }
        Commands::SimulatedDepth { lon, lat } => {
            let depth = norkyst::simulated_depth(&client, &config.norkyst, lon, lat)?;
            println!("{}", depth);
        }
        Commands::Verify { station_id } => {
            let report = verify::run_full_verification(&config, &station_id)?;
            verify::print_summary(&report);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn save(series: &timeseries_importer::model::TimeSeries, dir: &Path, name: &str) -> anyhow::Result<()> {
    let path = dir.join(name);
    export::write_csv(series, &path).with_context(|| format!("writing {}", path.display()))?;
    logging::info(DataSource::System, None, &format!("Saved {}", path.display()));
    Ok(())
}
