//! Data collaborators: raw series sources, the raw CSV archive, and the
//! cleaned-series Parquet store.

pub mod circuit_breaker;
pub mod download;
pub mod fmp;
pub mod provider;
pub mod raw_csv;
pub mod schema;
pub mod store;
pub mod synthetic;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use download::{download_indicators, DownloadSummary};
pub use fmp::{FmpProvider, API_KEY_ENV};
pub use provider::{
    DataSource, DownloadProgress, FetchError, LogProgress, MemorySource, RawRecord, RawSeries,
    SeriesSource, DATE_FIELD, VALUE_FIELD,
};
pub use raw_csv::{raw_csv_path, read_raw_csv, read_raw_csv_from, write_raw_csv, CsvDirSource};
pub use schema::{ObservationSchema, SchemaError};
pub use store::{CleanedStore, StoreError, StoreMeta, StoreStatus};
pub use synthetic::SyntheticSource;
