//! Live Source Integration Tests
//!
//! These hit the real MET Norway services and are ignored by default.
//! Run with `cargo test -- --ignored`; the Frost tests also need
//! FROST_CLIENT_ID in the environment or a `.env` file.

use timeseries_importer::config::Config;
use timeseries_importer::ingest::frost::FrostImporter;
use timeseries_importer::ingest::havvarsel::{HavvarselImporter, WATER_TEMP_COLUMN};
use timeseries_importer::ingest::norkyst::{self, NorKystImporter};
use timeseries_importer::timeutil::parse_cli_time;
use timeseries_importer::verify::{self, VerificationStatus};

fn setup() -> (Config, reqwest::blocking::Client) {
    let config = Config::load(None).unwrap();
    let client = config.http_client().unwrap();
    (config, client)
}

#[test]
#[ignore]
fn test_havvarsel_site_returns_hourly_water_temperature() {
    let (config, client) = setup();
    let importer = HavvarselImporter::new(&client, &config.havvarsel.base_url, &config.havvarsel.parameter);
    let start = parse_cli_time("2020-09-01T00:00").unwrap();
    let end = parse_cli_time("2020-09-02T23:59").unwrap();

    let (location, series) = importer.data("1", start, end).unwrap();

    println!("{} at {}, {}: {} hours", location.name, location.lat, location.lon, series.len());
    assert!(series.count_values(WATER_TEMP_COLUMN) > 0);
    assert!(series.times.windows(2).all(|w| (w[1] - w[0]).num_hours() == 1));
}

#[test]
#[ignore]
fn test_frost_blindern_air_temperature() {
    let (config, client) = setup();
    let Ok(importer) = FrostImporter::new(&client, &config.frost.base_url, config.frost.client_id.as_deref()) else {
        println!("FROST_CLIENT_ID not set, skipping");
        return;
    };
    let start = parse_cli_time("2019-12-31T00:00").unwrap();
    let end = parse_cli_time("2020-01-01T23:00").unwrap();

    let series = importer.observations("SN18700", "air_temperature", start, end).unwrap();
    assert!(series.len() >= 24, "expected a value per hour across the year boundary");
}

#[test]
#[ignore]
fn test_norkyst_surface_temperature_at_sea() {
    let (config, client) = setup();
    let start = parse_cli_time("2021-10-01T00:00").unwrap();
    let end = parse_cli_time("2021-10-01T12:00").unwrap();
    let mut importer = NorKystImporter::new(&client, &config.norkyst, start, end);

    let point = importer.locate(3.0, 60.0).unwrap();
    assert!(point.distance_km < 1.0);

    let series = importer.data("temperature", 3.0, 60.0, &[0.0]).unwrap();
    assert!(series.count_values("temperature0") > 0);
}

#[test]
#[ignore]
fn test_simulated_depth_is_positive() {
    let (config, client) = setup();
    let depth = norkyst::simulated_depth(&client, &config.norkyst, 3.0, 60.0).unwrap();
    assert!(depth > 0.0);
}

#[test]
#[ignore]
fn test_full_verification_reaches_thredds() {
    let (config, _) = setup();
    let report = verify::run_full_verification(&config, "1").unwrap();
    verify::print_summary(&report);
    assert_ne!(report.norkyst.status, VerificationStatus::Failed);
}
