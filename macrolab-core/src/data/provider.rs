//! Series source trait, raw record types, and structured fetch errors.
//!
//! The `SeriesSource` trait abstracts over where raw observations come from
//! (the FMP economic API, an archive of raw CSV files, synthetic data, or
//! records already in memory) so the pipeline can swap implementations and
//! mock them in tests.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::Indicator;

/// Field name of the date column in raw records and in the merged table header.
pub const DATE_FIELD: &str = "date";

/// Field name of the value column in raw records.
pub const VALUE_FIELD: &str = "value";

/// One loosely-typed row as delivered by a source.
///
/// Both fields are whatever JSON the provider sent (usually a string date and
/// a number or numeric string). `None` means the field was absent or null.
/// Any other fields on the wire are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub date: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl RawRecord {
    /// Typed record: ISO date string and a JSON number (null if non-finite).
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self {
            date: Some(Value::String(date.format("%Y-%m-%d").to_string())),
            value: Some(
                serde_json::Number::from_f64(value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            ),
        }
    }

    /// Record from text cells, as read from a CSV row.
    pub fn text(date: Option<&str>, value: Option<&str>) -> Self {
        Self {
            date: date.map(|s| Value::String(s.to_string())),
            value: value.map(|s| Value::String(s.to_string())),
        }
    }

    pub fn has_date(&self) -> bool {
        matches!(&self.date, Some(v) if !v.is_null())
    }

    pub fn has_value(&self) -> bool {
        matches!(&self.value, Some(v) if !v.is_null())
    }
}

/// Raw records for one indicator, before cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeries {
    pub indicator: Indicator,
    pub records: Vec<RawRecord>,
    pub source: DataSource,
}

impl RawSeries {
    pub fn new(indicator: Indicator, records: Vec<RawRecord>, source: DataSource) -> Self {
        Self {
            indicator,
            records,
            source,
        }
    }
}

/// Where raw data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Fmp,
    CsvArchive,
    Synthetic,
    InMemory,
}

/// Structured error types for fetch operations.
///
/// These are designed to be displayable in CLI output and run manifests.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("no raw data for indicator '{indicator}'")]
    NotFound { indicator: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("fetch error: {0}")]
    Other(String),
}

/// Trait for raw series sources (FMP, raw CSV archive, synthetic, in-memory).
///
/// Implementations handle the specifics of one source. Cleaning happens above
/// this trait — sources hand back rows exactly as they found them.
pub trait SeriesSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the raw records for one indicator.
    fn fetch(&self, indicator: &Indicator) -> Result<RawSeries, FetchError>;

    /// Whether the source currently accepts requests (not rate-limited or blocked).
    fn is_available(&self) -> bool {
        true
    }
}

/// Source backed by records already in memory, keyed by indicator id.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: HashMap<String, Vec<RawRecord>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register records for an indicator id, replacing any previous ones.
    pub fn with_records(mut self, id: impl Into<String>, records: Vec<RawRecord>) -> Self {
        self.records.insert(id.into(), records);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, records: Vec<RawRecord>) {
        self.records.insert(id.into(), records);
    }
}

impl SeriesSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, indicator: &Indicator) -> Result<RawSeries, FetchError> {
        let records = self
            .records
            .get(&indicator.id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                indicator: indicator.name.clone(),
            })?;
        Ok(RawSeries::new(
            indicator.clone(),
            records,
            DataSource::InMemory,
        ))
    }
}

/// Progress callback for multi-indicator operations.
pub trait DownloadProgress: Send + Sync {
    /// Called when starting to fetch an indicator.
    fn on_start(&self, indicator: &Indicator, index: usize, total: usize);

    /// Called when an indicator fetch completes.
    fn on_complete(
        &self,
        indicator: &Indicator,
        index: usize,
        total: usize,
        result: &Result<usize, FetchError>,
    );

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, indicator: &Indicator, index: usize, total: usize) {
        tracing::info!("[{}/{}] fetching {}", index + 1, total, indicator);
    }

    fn on_complete(
        &self,
        indicator: &Indicator,
        _index: usize,
        _total: usize,
        result: &Result<usize, FetchError>,
    ) {
        match result {
            Ok(rows) => tracing::info!(indicator = %indicator.name, rows, "fetched"),
            Err(e) => tracing::warn!(indicator = %indicator.name, error = %e, "fetch failed"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("download complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}
