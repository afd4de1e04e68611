//! MacroLab Core — domain types, loaders, and the temporal alignment pipeline.
//!
//! This crate contains the heart of the pipeline:
//! - Domain types (observations, indicators, cleaned/resampled series, merged table)
//! - Month-end calendar arithmetic
//! - Series sources (FMP, raw CSV archive, synthetic, in-memory) and the download orchestrator
//! - Cleaner, Resampler (forward-fill / linear), and outer-join Merger
//! - Validator producing diagnostic reports
//! - Parquet store for cleaned series

pub mod data;
pub mod domain;
pub mod transform;
pub mod validate;

pub use domain::{CleanedSeries, Indicator, MergedTable, Observation, ResampledSeries, TableColumn};
pub use transform::{merge, resample, Cleaner, DataError, MergeError, ResampleError, ResampleMethod};
pub use validate::{validate, Validate, ValidationReport};
