//! Pipeline driver — wires sources, cleaner, store, resampler, and merger.
//!
//! Three entry points:
//! - `run_pipeline()`: source → clean → (store) → filter → resample → merge.
//! - `clean_to_store()`: source → clean → store. First half of the two-stage flow.
//! - `run_from_store()`: store → filter → resample → merge. Second half.
//!
//! Every indicator is processed independently (on the rayon pool when
//! `parallel` is set). A failing indicator is recorded in its outcome and
//! left out of the merge; the run only fails when nothing survives.

use std::fmt;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use macrolab_core::data::{CleanedStore, DataSource, FetchError, SeriesSource, StoreError};
use macrolab_core::transform::CleanStats;
use macrolab_core::{
    merge, resample, validate, CleanedSeries, Cleaner, DataError, Indicator, MergeError,
    MergedTable, ResampleError, ResampleMethod, ResampledSeries, ValidationReport,
};

use crate::config::{ConfigError, IndicatorSpec, PipelineConfig};

/// Pipeline stage at which an indicator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Clean,
    Store,
    Resample,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Clean => "clean",
            Stage::Store => "store",
            Stage::Resample => "resample",
        };
        f.write_str(s)
    }
}

/// One indicator's failure, tagged with the stage that raised it.
#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error("{indicator}: fetch failed: {source}")]
    Fetch {
        indicator: String,
        source: FetchError,
    },

    #[error("{indicator}: clean failed: {source}")]
    Clean {
        indicator: String,
        source: DataError,
    },

    #[error("{indicator}: store failed: {source}")]
    Store {
        indicator: String,
        source: StoreError,
    },

    #[error("{indicator}: resample failed: {source}")]
    Resample {
        indicator: String,
        source: ResampleError,
    },
}

impl IndicatorError {
    pub fn stage(&self) -> Stage {
        match self {
            IndicatorError::Fetch { .. } => Stage::Fetch,
            IndicatorError::Clean { .. } => Stage::Clean,
            IndicatorError::Store { .. } => Stage::Store,
            IndicatorError::Resample { .. } => Stage::Resample,
        }
    }

    pub fn indicator(&self) -> &str {
        match self {
            IndicatorError::Fetch { indicator, .. }
            | IndicatorError::Clean { indicator, .. }
            | IndicatorError::Store { indicator, .. }
            | IndicatorError::Resample { indicator, .. } => indicator,
        }
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("merge failed after {} indicator failures: {source}", .failures.len())]
    Merge {
        source: MergeError,
        failures: Vec<IndicatorError>,
    },
}

/// Why an indicator was left out of the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

/// What happened to one indicator during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorOutcome {
    pub indicator: Indicator,
    pub source: Option<DataSource>,
    pub method: Option<ResampleMethod>,
    pub clean_stats: Option<CleanStats>,
    pub cleaned_rows: usize,
    pub resampled_rows: usize,
    /// Report on the resampled series, with cleaner warnings folded in.
    pub report: Option<ValidationReport>,
    pub failure: Option<StageFailure>,
}

impl IndicatorOutcome {
    fn new(indicator: Indicator) -> Self {
        Self {
            indicator,
            source: None,
            method: None,
            clean_stats: None,
            cleaned_rows: 0,
            resampled_rows: 0,
            report: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    fn fail(&mut self, err: &IndicatorError) {
        tracing::warn!(indicator = %self.indicator.name, stage = %err.stage(), "{err}");
        self.failure = Some(StageFailure {
            stage: err.stage(),
            message: err.to_string(),
        });
    }
}

/// A completed run.
#[derive(Debug)]
pub struct PipelineRun {
    pub table: MergedTable,
    /// One per configured indicator, in declaration order.
    pub outcomes: Vec<IndicatorOutcome>,
    /// Failures of the indicators left out of the table.
    pub failures: Vec<IndicatorError>,
    pub table_report: ValidationReport,
    pub table_hash: String,
    pub method: ResampleMethod,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl PipelineRun {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Fetch, clean, optionally store, then resample and merge every configured indicator.
pub fn run_pipeline(
    config: &PipelineConfig,
    source: &dyn SeriesSource,
    store: Option<&CleanedStore>,
) -> Result<PipelineRun, RunError> {
    config.validate()?;
    tracing::info!(
        source = source.name(),
        indicators = config.indicators.len(),
        method = %config.method,
        "running pipeline"
    );

    let processed = fan_out(config, |spec| {
        let mut outcome = IndicatorOutcome::new(spec.indicator());
        let result = fetch_and_clean(source, spec, &mut outcome)
            .and_then(|cleaned| {
                if let Some(store) = store {
                    write_to_store(store, &cleaned)?;
                }
                Ok(cleaned)
            })
            .and_then(|cleaned| align(config, spec, &cleaned, &mut outcome));
        finish(outcome, result)
    });

    assemble(config, processed)
}

/// Fetch, clean, and write every configured indicator to the store.
pub fn clean_to_store(
    config: &PipelineConfig,
    source: &dyn SeriesSource,
    store: &CleanedStore,
) -> Result<Vec<IndicatorOutcome>, RunError> {
    config.validate()?;
    tracing::info!(source = source.name(), dir = %store.dir().display(), "cleaning to store");

    Ok(fan_out(config, |spec| {
        let mut outcome = IndicatorOutcome::new(spec.indicator());
        let result = fetch_and_clean(source, spec, &mut outcome)
            .and_then(|cleaned| write_to_store(store, &cleaned));
        if let Err(e) = &result {
            outcome.fail(e);
        }
        outcome
    }))
}

/// Load every configured indicator from the store, then resample and merge.
pub fn run_from_store(config: &PipelineConfig, store: &CleanedStore) -> Result<PipelineRun, RunError> {
    config.validate()?;
    tracing::info!(dir = %store.dir().display(), "merging from store");

    let processed = fan_out(config, |spec| {
        let mut outcome = IndicatorOutcome::new(spec.indicator());
        let result = store
            .load(&outcome.indicator)
            .map_err(|source| IndicatorError::Store {
                indicator: spec.name.clone(),
                source,
            })
            .and_then(|cleaned| {
                outcome.cleaned_rows = cleaned.len();
                align(config, spec, &cleaned, &mut outcome)
            });
        finish(outcome, result)
    });

    assemble(config, processed)
}

type Processed = (IndicatorOutcome, Result<ResampledSeries, IndicatorError>);

/// Map over the configured indicators, preserving declaration order.
fn fan_out<T, F>(config: &PipelineConfig, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&IndicatorSpec) -> T + Sync + Send,
{
    if config.parallel {
        config.indicators.par_iter().map(|spec| f(spec)).collect()
    } else {
        config.indicators.iter().map(|spec| f(spec)).collect()
    }
}

fn fetch_and_clean(
    source: &dyn SeriesSource,
    spec: &IndicatorSpec,
    outcome: &mut IndicatorOutcome,
) -> Result<CleanedSeries, IndicatorError> {
    let raw = source
        .fetch(&outcome.indicator)
        .map_err(|source| IndicatorError::Fetch {
            indicator: spec.name.clone(),
            source,
        })?;
    outcome.source = Some(raw.source);

    let (cleaned, stats) = Cleaner::clean_series(&raw).map_err(|source| IndicatorError::Clean {
        indicator: spec.name.clone(),
        source,
    })?;
    tracing::debug!(
        indicator = %spec.name,
        input = stats.input_rows,
        output = stats.output_rows,
        "cleaned"
    );
    outcome.clean_stats = Some(stats);
    outcome.cleaned_rows = cleaned.len();
    Ok(cleaned)
}

fn write_to_store(store: &CleanedStore, cleaned: &CleanedSeries) -> Result<(), IndicatorError> {
    store
        .write(cleaned)
        .map(|_| ())
        .map_err(|source| IndicatorError::Store {
            indicator: cleaned.indicator.name.clone(),
            source,
        })
}

/// Range filter, then resample with the indicator's method.
fn align(
    config: &PipelineConfig,
    spec: &IndicatorSpec,
    cleaned: &CleanedSeries,
    outcome: &mut IndicatorOutcome,
) -> Result<ResampledSeries, IndicatorError> {
    let to_err = |source| IndicatorError::Resample {
        indicator: spec.name.clone(),
        source,
    };

    let method = config.method_for(spec).map_err(to_err)?;
    outcome.method = Some(method);

    let filtered = cleaned.filter_range(config.start, config.end);
    let resampled = resample(&filtered, method).map_err(to_err)?;
    outcome.resampled_rows = resampled.len();

    let mut report = validate(&resampled);
    if let Some(stats) = &outcome.clean_stats {
        report.note_clean_stats(stats);
    }
    outcome.report = Some(report);

    Ok(resampled)
}

fn finish(
    mut outcome: IndicatorOutcome,
    result: Result<ResampledSeries, IndicatorError>,
) -> Processed {
    if let Err(e) = &result {
        outcome.fail(e);
    }
    (outcome, result)
}

/// Merge whatever succeeded and report on the table.
fn assemble(config: &PipelineConfig, processed: Vec<Processed>) -> Result<PipelineRun, RunError> {
    let mut outcomes = Vec::with_capacity(processed.len());
    let mut series = Vec::new();
    let mut failures = Vec::new();
    for (outcome, result) in processed {
        outcomes.push(outcome);
        match result {
            Ok(s) => series.push(s),
            Err(e) => failures.push(e),
        }
    }

    let table = match merge(&series) {
        Ok(table) => table,
        Err(source) => return Err(RunError::Merge { source, failures }),
    };

    let table_report = validate(&table);
    let table_hash = table_hash(&table);
    tracing::info!(
        rows = table.len(),
        columns = table.width(),
        failed = failures.len(),
        "merged table"
    );

    Ok(PipelineRun {
        table,
        outcomes,
        failures,
        table_report,
        table_hash,
        method: config.resample_method().map_err(ConfigError::from)?,
        start: config.start,
        end: config.end,
    })
}

/// BLAKE3 over the table's header, dates, and cells.
pub fn table_hash(table: &MergedTable) -> String {
    let mut hasher = blake3::Hasher::new();
    for name in table.header() {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    for (i, date) in table.dates.iter().enumerate() {
        hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
        for column in &table.columns {
            match column.values.get(i).copied().flatten() {
                Some(v) => hasher.update(&v.to_le_bytes()),
                None => hasher.update(b"-"),
            };
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrolab_core::data::{MemorySource, RawRecord};

    fn rows(points: &[(&str, &str)]) -> Vec<RawRecord> {
        points
            .iter()
            .map(|(d, v)| RawRecord::text(Some(*d), Some(*v)))
            .collect()
    }

    fn two_indicator_config() -> PipelineConfig {
        let mut config = PipelineConfig::new(vec![
            IndicatorSpec::new("A", "a"),
            IndicatorSpec::new("B", "b"),
        ]);
        config.parallel = false;
        config
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Resample.to_string(), "resample");
    }

    #[test]
    fn merges_in_declaration_order() {
        let source = MemorySource::new()
            .with_records("b", rows(&[("2020-02-15", "2")]))
            .with_records("a", rows(&[("2020-01-15", "1"), ("2020-03-15", "3")]));
        let run = run_pipeline(&two_indicator_config(), &source, None).unwrap();

        assert_eq!(run.table.column_names(), vec!["A", "B"]);
        assert_eq!(run.table.len(), 3);
        assert_eq!(run.succeeded(), 2);
        assert_eq!(run.method, ResampleMethod::ForwardFill);
        assert!(run.failures.is_empty());
    }

    #[test]
    fn failing_indicator_is_isolated() {
        let source = MemorySource::new().with_records("a", rows(&[("2020-01-15", "1")]));
        let run = run_pipeline(&two_indicator_config(), &source, None).unwrap();

        assert_eq!(run.table.width(), 1);
        assert_eq!(run.failed(), 1);
        let failure = run.outcomes[1].failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Fetch);
        assert_eq!(run.failures[0].indicator(), "B");
    }

    #[test]
    fn nothing_survives_is_a_merge_error() {
        let source = MemorySource::new().with_records("a", vec![RawRecord::text(None, Some("1"))]);
        let err = run_pipeline(&two_indicator_config(), &source, None).unwrap_err();
        match err {
            RunError::Merge { source, failures } => {
                assert_eq!(source, MergeError::EmptyInput);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].stage(), Stage::Clean);
                assert_eq!(failures[1].stage(), Stage::Fetch);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_method_override_fails_only_that_indicator() {
        let mut config = two_indicator_config();
        config.indicators[1].method = Some("spline".into());
        let source = MemorySource::new()
            .with_records("a", rows(&[("2020-01-15", "1")]))
            .with_records("b", rows(&[("2020-01-15", "2")]));

        let run = run_pipeline(&config, &source, None).unwrap();
        assert_eq!(run.table.column_names(), vec!["A"]);
        assert_eq!(run.outcomes[1].failure.as_ref().unwrap().stage, Stage::Resample);
    }

    #[test]
    fn date_filter_applies_before_resampling() {
        let mut config = two_indicator_config();
        config.indicators.truncate(1);
        config.start = NaiveDate::from_ymd_opt(2020, 2, 1);
        config.end = NaiveDate::from_ymd_opt(2020, 3, 31);
        let source = MemorySource::new().with_records(
            "a",
            rows(&[("2020-01-15", "1"), ("2020-02-15", "2"), ("2020-04-15", "4")]),
        );

        let run = run_pipeline(&config, &source, None).unwrap();
        assert_eq!(run.table.len(), 1);
        assert_eq!(run.table.dates[0], NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }

    #[test]
    fn duplicate_warnings_reach_the_outcome_report() {
        let mut config = two_indicator_config();
        config.indicators.truncate(1);
        let source = MemorySource::new().with_records(
            "a",
            rows(&[("2020-01-15", "1"), ("2020-01-15", "2")]),
        );

        let run = run_pipeline(&config, &source, None).unwrap();
        let report = run.outcomes[0].report.as_ref().unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("deduplicated upstream")));
        assert_eq!(run.table.value(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(), "A"), Some(2.0));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let source = MemorySource::new()
            .with_records("a", rows(&[("2020-01-15", "1"), ("2020-06-15", "6")]))
            .with_records("b", rows(&[("2020-03-01", "3")]));
        let mut config = two_indicator_config();
        let sequential = run_pipeline(&config, &source, None).unwrap();
        config.parallel = true;
        let parallel = run_pipeline(&config, &source, None).unwrap();

        assert_eq!(sequential.table, parallel.table);
        assert_eq!(sequential.table_hash, parallel.table_hash);
        assert_eq!(sequential.outcomes, parallel.outcomes);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = PipelineConfig::new(Vec::new());
        assert!(matches!(
            run_pipeline(&config, &MemorySource::new(), None),
            Err(RunError::Config(ConfigError::NoIndicators))
        ));
    }

    #[test]
    fn table_hash_tracks_content() {
        let source = MemorySource::new()
            .with_records("a", rows(&[("2020-01-15", "1")]))
            .with_records("b", rows(&[("2020-01-15", "2")]));
        let run = run_pipeline(&two_indicator_config(), &source, None).unwrap();

        let mut changed = run.table.clone();
        changed.columns[1].values[0] = None;
        assert_ne!(table_hash(&changed), run.table_hash);
    }
}
