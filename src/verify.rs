//! Data Source Verification Module
//!
//! Checks the configured sources against the live services: whether the
//! Havvarsel Frost site answers with water temperatures, whether the Frost
//! client id is accepted, and whether the THREDDS products publish the
//! expected variables.
//!
//! Run this before a long import to find out which sources are reachable.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::{Config, FrostConfig, HavvarselConfig};
use crate::ingest::frost::FrostImporter;
use crate::ingest::havvarsel::{HavvarselImporter, WATER_TEMP_COLUMN};
use crate::ingest::opendap::DapDataset;
use crate::ingest::thredds::GridProduct;
use crate::model::ImportError;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub havvarsel: SourceVerification,
    pub frost: Vec<SourceVerification>,
    pub norkyst: SourceVerification,
    pub postprocessed: SourceVerification,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVerification {
    pub source: String,
    /// Site, station or dataset URL that was checked.
    pub target: String,
    pub status: VerificationStatus,
    pub http_status: Option<u16>,
    pub sample_data_count: usize,
    /// Expected variables the dataset does not publish.
    pub missing: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl SourceVerification {
    fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            status: VerificationStatus::Failed,
            http_status: None,
            sample_data_count: 0,
            missing: Vec::new(),
            error_message: None,
        }
    }

    fn record_error(&mut self, err: &ImportError) {
        if let ImportError::Http(code) = err {
            self.http_status = Some(*code);
        }
        self.error_message = Some(err.to_string());
    }

    pub fn is_working(&self) -> bool {
        self.status != VerificationStatus::Failed
    }
}

// ============================================================================
// Havvarsel Frost
// ============================================================================

/// Fetches the last `hours` of observations for a site.
pub fn verify_havvarsel_site(
    client: &Client,
    config: &HavvarselConfig,
    station_id: &str,
    now: DateTime<Utc>,
    hours: i64,
) -> SourceVerification {
    let mut result = SourceVerification::new("havvarsel", station_id);
    let importer = HavvarselImporter::new(client, &config.base_url, &config.parameter);

    match importer.data(station_id, now - Duration::hours(hours), now) {
        Ok((location, series)) => {
            result.target = format!("{} ({})", station_id, location.name);
            result.sample_data_count = series.count_values(WATER_TEMP_COLUMN);
            result.status = if result.sample_data_count > 0 {
                VerificationStatus::Success
            } else {
                VerificationStatus::PartialSuccess
            };
        }
        Err(e) => result.record_error(&e),
    }
    result
}

// ============================================================================
// Frost
// ============================================================================

/// Fetches the last `hours` of one element at one Frost station.
///
/// A 404 means the credentials were accepted but the station has no data for
/// the element, which counts as a partial success.
pub fn verify_frost_station(
    client: &Client,
    config: &FrostConfig,
    station: &str,
    element: &str,
    now: DateTime<Utc>,
    hours: i64,
) -> SourceVerification {
    let mut result = SourceVerification::new("frost", &format!("{} {}", station, element));

    let importer = match FrostImporter::new(client, &config.base_url, config.client_id.as_deref()) {
        Ok(importer) => importer,
        Err(e) => {
            result.record_error(&e);
            return result;
        }
    };

    match importer.observations(station, element, now - Duration::hours(hours), now) {
        Ok(series) => {
            result.sample_data_count = series.columns.iter().map(|c| series.count_values(&c.name)).sum();
            result.status = VerificationStatus::Success;
        }
        Err(e) => {
            result.record_error(&e);
            if result.http_status == Some(404) {
                result.status = VerificationStatus::PartialSuccess;
            }
        }
    }
    result
}

// ============================================================================
// THREDDS products
// ============================================================================

/// Reads the structure of one daily dataset and checks the expected
/// variables are published.
pub fn verify_grid_product(
    client: &Client,
    source: &str,
    product: &GridProduct,
    day: NaiveDate,
    expected: &[String],
) -> SourceVerification {
    let url = product.url_for(day);
    let mut result = SourceVerification::new(source, &url);

    match DapDataset::new(&url).dds(client) {
        Ok(vars) => {
            result.sample_data_count = vars.len();
            result.missing = expected
                .iter()
                .filter(|name| !vars.iter().any(|v| &v.name == *name))
                .cloned()
                .collect();
            result.status = if result.missing.is_empty() {
                VerificationStatus::Success
            } else {
                VerificationStatus::PartialSuccess
            };
        }
        Err(e) => result.record_error(&e),
    }
    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

/// Frost station used for the credential check (Oslo - Blindern).
pub const FROST_CHECK_STATION: &str = "SN18700";

pub fn run_full_verification(config: &Config, station_id: &str) -> Result<VerificationReport, ImportError> {
    let client = config.http_client()?;
    let now = Utc::now();
    // the newest daily files are published with a delay
    let day = now.date_naive() - Duration::days(1);

    let havvarsel = verify_havvarsel_site(&client, &config.havvarsel, station_id, now, 24 * 7);

    let frost = config
        .frost
        .elements
        .iter()
        .map(|element| verify_frost_station(&client, &config.frost, FROST_CHECK_STATION, &element.name, now, 48))
        .collect();

    let nk = &config.norkyst;
    let mut nk_expected = vec![nk.lat_var.clone(), nk.lon_var.clone(), nk.param.clone()];
    nk_expected.extend(nk.mask_var.clone());
    let norkyst = verify_grid_product(&client, "norkyst", &nk.product(), day, &nk_expected);

    let pp = &config.postprocessed;
    let mut pp_expected = vec![pp.lat_var.clone(), pp.lon_var.clone()];
    pp_expected.extend(pp.params.iter().cloned());
    let postprocessed = verify_grid_product(&client, "postprocessed", &pp.product(), day, &pp_expected);

    let mut report = VerificationReport {
        timestamp: now.to_rfc3339(),
        havvarsel,
        frost,
        norkyst,
        postprocessed,
        summary: VerificationSummary::default(),
    };
    report.summary = summarize(&report);
    Ok(report)
}

pub fn summarize(report: &VerificationReport) -> VerificationSummary {
    let all: Vec<&SourceVerification> = std::iter::once(&report.havvarsel)
        .chain(report.frost.iter())
        .chain([&report.norkyst, &report.postprocessed])
        .collect();
    let working = all.iter().filter(|r| r.is_working()).count();
    VerificationSummary {
        total: all.len(),
        working,
        failed: all.len() - working,
    }
}

fn print_line(result: &SourceVerification) {
    let status = match result.status {
        VerificationStatus::Success => format!("OK ({} values)", result.sample_data_count),
        VerificationStatus::PartialSuccess if !result.missing.is_empty() => {
            format!("Partial (missing: {:?})", result.missing)
        }
        VerificationStatus::PartialSuccess => "Responsive but no data".to_string(),
        VerificationStatus::Failed => format!("FAILED: {}", result.error_message.as_deref().unwrap_or("Unknown")),
    };
    println!("  {:<14} {} ... {}", result.source, result.target, status);
}

pub fn print_summary(report: &VerificationReport) {
    println!("===========================================================");
    println!("VERIFICATION SUMMARY ({})", report.timestamp);
    println!("===========================================================");
    print_line(&report.havvarsel);
    for result in &report.frost {
        print_line(result);
    }
    print_line(&report.norkyst);
    print_line(&report.postprocessed);
    println!();

    let rate = if report.summary.total > 0 {
        (report.summary.working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Overall Success Rate: {:.1}% ({}/{}, {} failed)",
        rate, report.summary.working, report.summary.total, report.summary.failed
    );
    println!("===========================================================");
}
