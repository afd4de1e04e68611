//! MacroLab Runner — pipeline orchestration and artifact export.
//!
//! This crate builds on `macrolab-core` to provide:
//! - TOML pipeline configuration with per-indicator method overrides
//! - Per-indicator fan-out (rayon) with failure isolation
//! - Single-pass and two-stage (clean to store, then merge) runs
//! - Merged-table CSV, validation JSON, and run manifest export

pub mod config;
pub mod export;
pub mod pipeline;

pub use config::{ConfigError, IndicatorSpec, PathsConfig, PipelineConfig};
pub use export::{
    read_manifest, read_table_csv, save_artifacts, table_to_csv, write_report_json,
    write_table_csv, ArtifactPaths, RunManifest, ValidationArtifact,
};
pub use pipeline::{
    clean_to_store, run_from_store, run_pipeline, table_hash, IndicatorError, IndicatorOutcome,
    PipelineRun, RunError, Stage, StageFailure,
};
