//! Core data types for the timeseries importers.
//!
//! This module defines the shared domain model imported by all other modules:
//! site metadata, the columnar `TimeSeries` frame every importer produces, and
//! the crate-wide error type. It performs no I/O.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

// ---------------------------------------------------------------------------
// Site metadata
// ---------------------------------------------------------------------------

/// Metadata for an observation site, as reported by the source that owns it.
///
/// For Havvarsel Frost this is the buoy header of the `tseries` entry; for
/// Frost it is a station from `sources/v0.jsonld`.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub parameter: String,
    /// WGS84 latitude.
    pub lat: f64,
    /// WGS84 longitude.
    pub lon: f64,
}

// ---------------------------------------------------------------------------
// Timeseries frame
// ---------------------------------------------------------------------------

/// A named column of optional values. `None` marks a missing observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Columnar timeseries indexed by UTC time.
///
/// Every column has exactly `times.len()` values. Times are not required to
/// be unique or sorted, but every importer in this crate produces ascending
/// times.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    pub times: Vec<DateTime<Utc>>,
    pub columns: Vec<Column>,
}

impl TimeSeries {
    pub fn new(times: Vec<DateTime<Utc>>) -> Self {
        Self { times, columns: Vec::new() }
    }

    /// Hourly grid from `start` to `end`, both inclusive.
    pub fn hourly(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut times = Vec::new();
        let mut t = start;
        while t <= end {
            times.push(t);
            t += Duration::hours(1);
        }
        Self::new(times)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Adds a column. Fails if the length differs from the time index or the
    /// name is already taken.
    pub fn push_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), ImportError> {
        if values.len() != self.times.len() {
            return Err(ImportError::ColumnMismatch(format!(
                "column '{}' has {} values for {} times",
                name,
                values.len(),
                self.times.len()
            )));
        }
        if self.column(name).is_some() {
            return Err(ImportError::ColumnMismatch(format!("duplicate column '{}'", name)));
        }
        self.columns.push(Column { name: name.to_string(), values });
        Ok(())
    }

    /// Renames a column in place. Returns `false` if `from` does not exist.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(col) => {
                col.name = to.to_string();
                true
            }
            None => false,
        }
    }

    /// `FROM self LEFT JOIN other ON time = time`.
    ///
    /// Every column of `other` is appended. Rows of `self` with no matching
    /// time in `other` get `None`. If `other` holds the same time more than
    /// once, the first row wins.
    pub fn left_join(&mut self, other: &TimeSeries) -> Result<(), ImportError> {
        let mut index: HashMap<DateTime<Utc>, usize> = HashMap::with_capacity(other.len());
        for (i, t) in other.times.iter().enumerate() {
            index.entry(*t).or_insert(i);
        }

        for col in &other.columns {
            let values = self
                .times
                .iter()
                .map(|t| index.get(t).and_then(|&i| col.values[i]))
                .collect();
            self.push_column(&col.name, values)?;
        }
        Ok(())
    }

    /// Restricts the rows to the span between the first and the last row in
    /// which `name` has a value. Returns `false` and leaves the series
    /// untouched when the column is absent or entirely missing.
    pub fn trim_to_column(&mut self, name: &str) -> bool {
        let Some(col) = self.column(name) else {
            return false;
        };
        let first = col.values.iter().position(Option::is_some);
        let last = col.values.iter().rposition(Option::is_some);
        let (Some(first), Some(last)) = (first, last) else {
            return false;
        };

        self.times = self.times[first..=last].to_vec();
        for col in &mut self.columns {
            col.values = col.values[first..=last].to_vec();
        }
        true
    }

    /// Appends the rows of `other`. Both series must carry the same columns
    /// in the same order.
    pub fn append(&mut self, other: TimeSeries) -> Result<(), ImportError> {
        if self.columns.is_empty() && self.times.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.column_names() != other.column_names() {
            return Err(ImportError::ColumnMismatch(format!(
                "cannot append columns {:?} to {:?}",
                other.column_names(),
                self.column_names()
            )));
        }
        self.times.extend(other.times);
        for (own, theirs) in self.columns.iter_mut().zip(other.columns) {
            own.values.extend(theirs.values);
        }
        Ok(())
    }

    /// Number of non-missing values in a column, or 0 if it does not exist.
    pub fn count_values(&self, name: &str) -> usize {
        self.column(name)
            .map(|c| c.values.iter().filter(|v| v.is_some()).count())
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching, parsing or assembling timeseries.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// The request could not be sent or the body could not be read.
    #[error("Request failed: {0}")]
    Request(String),
    /// The response body could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The source answered but held no usable data.
    #[error("No data available: {0}")]
    NoData(String),
    /// Frost requires a client id and none was configured.
    #[error("No Frost client id configured (set FROST_CLIENT_ID or frost.client_id)")]
    MissingClientId,
    /// The requested depth is not one of the model's z-levels.
    #[error("Depth {0} m is not available in the model output")]
    DepthNotAvailable(f64),
    /// The requested variable is not in the dataset.
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    /// Columns do not line up with the time index or with each other.
    #[error("Column mismatch: {0}")]
    ColumnMismatch(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ImportError::Http(status.as_u16()),
            None => ImportError::Request(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Parse(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
