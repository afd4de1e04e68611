//! Artifact export — merged table CSV, validation JSON, and run manifest.
//!
//! A run's output directory holds:
//! - `merged_indicators.csv`: `date` followed by one column per indicator,
//!   ascending dates, empty cells where a series had no value
//! - `validation.json`: the table report plus one report per indicator
//! - `manifest.json`: what ran, over which range, and what came out
//!
//! The manifest carries a `schema_version`. Unknown versions are rejected on load.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use macrolab_core::data::DATE_FIELD;
use macrolab_core::{Indicator, MergedTable, ResampleMethod, TableColumn, ValidationReport};

use crate::pipeline::{IndicatorOutcome, PipelineRun};

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

pub const TABLE_FILE: &str = "merged_indicators.csv";
pub const VALIDATION_FILE: &str = "validation.json";
pub const MANIFEST_FILE: &str = "manifest.json";

// ─── CSV ────────────────────────────────────────────────────────────

/// Render the merged table as CSV.
pub fn table_to_csv(table: &MergedTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(table.header())?;

    for i in 0..table.len() {
        let Some((date, cells)) = table.row(i) else {
            continue;
        };
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(date.format("%Y-%m-%d").to_string());
        record.extend(cells.into_iter().map(|c| c.map(|v| v.to_string()).unwrap_or_default()));
        wtr.write_record(&record)?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

pub fn write_table_csv(path: &Path, table: &MergedTable) -> Result<()> {
    let csv = table_to_csv(table)?;
    fs::write(path, csv).with_context(|| format!("failed to write table to {}", path.display()))
}

/// Parse a merged-table CSV back into a [`MergedTable`].
///
/// Column ids are not stored in the CSV, so each column's indicator id is its name.
pub fn read_table_csv(path: &Path) -> Result<MergedTable> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_table_csv(file).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_table_csv<R: std::io::Read>(reader: R) -> Result<MergedTable> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut names = headers.iter();
    match names.next() {
        Some(first) if first.eq_ignore_ascii_case(DATE_FIELD) => {}
        other => bail!("first column must be '{DATE_FIELD}', found {other:?}"),
    }
    let mut columns: Vec<TableColumn> = names
        .map(|name| TableColumn {
            indicator: Indicator::new(name, name),
            values: Vec::new(),
        })
        .collect();

    let mut dates = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("row {}", line + 1))?;
        let date_cell = row.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_cell, "%Y-%m-%d")
            .with_context(|| format!("row {}: bad date '{date_cell}'", line + 1))?;
        dates.push(date);

        for (j, column) in columns.iter_mut().enumerate() {
            let cell = row.get(j + 1).unwrap_or_default();
            let value = if cell.is_empty() {
                None
            } else {
                Some(
                    cell.parse::<f64>()
                        .with_context(|| format!("row {}: bad value '{cell}'", line + 1))?,
                )
            };
            column.values.push(value);
        }
    }

    Ok(MergedTable { dates, columns })
}

// ─── JSON ───────────────────────────────────────────────────────────

/// `validation.json` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub table: ValidationReport,
    pub indicators: Vec<ValidationReport>,
}

pub fn write_report_json<T: Serialize + ?Sized>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("failed to write report to {}", path.display()))
}

/// `manifest.json` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub method: ResampleMethod,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub table_hash: String,
    pub outcomes: Vec<IndicatorOutcome>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunManifest {
    pub fn from_run(run: &PipelineRun) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: chrono::Utc::now(),
            method: run.method,
            start: run.start,
            end: run.end,
            rows: run.table.len(),
            columns: run.table.column_names().into_iter().map(String::from).collect(),
            table_hash: run.table_hash.clone(),
            outcomes: run.outcomes.clone(),
        }
    }
}

/// Load a manifest, rejecting unknown schema versions.
pub fn read_manifest(path: &Path) -> Result<RunManifest> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: RunManifest =
        serde_json::from_str(&json).context("failed to deserialize run manifest")?;
    ensure!(
        manifest.schema_version <= SCHEMA_VERSION,
        "unsupported schema version {} (max supported: {})",
        manifest.schema_version,
        SCHEMA_VERSION
    );
    Ok(manifest)
}

// ─── Run artifacts ──────────────────────────────────────────────────

/// Where [`save_artifacts`] put things.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub table: PathBuf,
    pub validation: PathBuf,
    pub manifest: PathBuf,
}

/// Write table, validation report, and manifest into `output_dir`.
pub fn save_artifacts(run: &PipelineRun, output_dir: &Path) -> Result<ArtifactPaths> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let paths = ArtifactPaths {
        table: output_dir.join(TABLE_FILE),
        validation: output_dir.join(VALIDATION_FILE),
        manifest: output_dir.join(MANIFEST_FILE),
    };

    write_table_csv(&paths.table, &run.table)?;

    let validation = ValidationArtifact {
        table: run.table_report.clone(),
        indicators: run
            .outcomes
            .iter()
            .filter_map(|o| o.report.clone())
            .collect(),
    };
    write_report_json(&paths.validation, &validation)?;
    write_report_json(&paths.manifest, &RunManifest::from_run(run))?;

    tracing::info!(dir = %output_dir.display(), "artifacts written");
    Ok(paths)
}
