//! MacroLab CLI — fetch, clean, merge, and validate macroeconomic indicators.
//!
//! Commands:
//! - `fetch` — download raw series from FMP into the raw CSV archive
//! - `clean` — clean raw series into the Parquet store
//! - `merge` — resample stored series and write the merged table
//! - `run` — clean, store, resample, and merge in one pass
//! - `validate` — report on raw CSV files or a merged table CSV
//! - `store status` — list stored series and their date ranges
//! - `init-config` — write a starter `macrolab.toml`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use macrolab_core::data::{
    download_indicators, raw_csv_path, read_raw_csv, CircuitBreaker, CleanedStore, CsvDirSource,
    DataSource, FetchError, FmpProvider, LogProgress, RawSeries, SeriesSource, SyntheticSource,
};
use macrolab_core::{validate, Indicator, ValidationReport};
use macrolab_runner::{
    clean_to_store, read_table_csv, run_from_store, run_pipeline, save_artifacts,
    IndicatorOutcome, PipelineConfig, PipelineRun,
};

const DEFAULT_CONFIG: &str = "macrolab.toml";

#[derive(Parser)]
#[command(
    name = "macrolab",
    about = "MacroLab CLI — align macroeconomic indicators onto a monthly grid"
)]
struct Cli {
    /// Pipeline config. Defaults to ./macrolab.toml, else the four FMP indicators.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download raw series from FMP into the raw CSV archive.
    Fetch {
        /// Only these indicators (name or id).
        #[arg(long, num_args = 1..)]
        indicators: Vec<String>,

        /// Generate synthetic series instead of calling the API.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Clean the raw archive into the Parquet store.
    Clean {
        #[arg(long, num_args = 1..)]
        indicators: Vec<String>,

        /// Where raw series come from.
        #[arg(long, value_enum, default_value_t = SourceArg::Archive)]
        source: SourceArg,
    },
    /// Resample stored series and write the merged table.
    Merge {
        #[command(flatten)]
        overrides: RunOverrides,
    },
    /// Clean, store, resample, and merge in one pass.
    Run {
        #[command(flatten)]
        overrides: RunOverrides,

        #[arg(long, value_enum, default_value_t = SourceArg::Archive)]
        source: SourceArg,

        /// Skip writing cleaned series to the store.
        #[arg(long, default_value_t = false)]
        no_store: bool,
    },
    /// Validate raw CSV files, or a merged table with --table.
    Validate {
        /// Files to inspect. Defaults to the configured raw archive.
        files: Vec<PathBuf>,

        /// Treat each file as a merged table CSV.
        #[arg(long, default_value_t = false)]
        table: bool,

        /// Print reports as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Cleaned-series store commands.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Write a starter config file.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// List stored series, row counts, and date ranges.
    Status,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    /// FMP economic-indicator API (needs FMP_API_KEY).
    Fmp,
    /// Raw CSV archive under `paths.raw_dir`.
    Archive,
    /// Deterministic synthetic series.
    Synthetic,
}

#[derive(clap::Args)]
struct RunOverrides {
    #[arg(long, num_args = 1..)]
    indicators: Vec<String>,

    /// Resampling method: forward-fill or linear.
    #[arg(long)]
    method: Option<String>,

    /// Start date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    end: Option<String>,

    /// Output directory for the table, report, and manifest.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Process indicators one at a time.
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Fetch {
            indicators,
            synthetic,
        } => run_fetch(cli.config.as_deref(), &indicators, synthetic),
        Commands::Clean { indicators, source } => {
            run_clean(cli.config.as_deref(), &indicators, source)
        }
        Commands::Merge { overrides } => run_merge(cli.config.as_deref(), &overrides),
        Commands::Run {
            overrides,
            source,
            no_store,
        } => run_all(cli.config.as_deref(), &overrides, source, no_store),
        Commands::Validate { files, table, json } => {
            run_validate(cli.config.as_deref(), &files, table, json)
        }
        Commands::Store { action } => match action {
            StoreAction::Status => run_store_status(cli.config.as_deref()),
        },
        Commands::InitConfig { path, force } => run_init_config(&path, force),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            PipelineConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("failed to load {DEFAULT_CONFIG}"))
        }
        None => {
            tracing::debug!("no {DEFAULT_CONFIG} found, using the default FMP indicators");
            Ok(PipelineConfig::default_fmp())
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn apply_overrides(config: &mut PipelineConfig, overrides: &RunOverrides) -> Result<()> {
    select(config, &overrides.indicators)?;
    if let Some(method) = &overrides.method {
        config.method = method.clone();
    }
    if let Some(start) = &overrides.start {
        config.start = Some(parse_date(start)?);
    }
    if let Some(end) = &overrides.end {
        config.end = Some(parse_date(end)?);
    }
    if let Some(dir) = &overrides.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if overrides.sequential {
        config.parallel = false;
    }
    config.validate()?;
    Ok(())
}

fn select(config: &mut PipelineConfig, wanted: &[String]) -> Result<()> {
    config.select(wanted);
    if config.indicators.is_empty() {
        bail!("none of {wanted:?} is a configured indicator");
    }
    Ok(())
}

fn synthetic_source(config: &PipelineConfig) -> SyntheticSource {
    let start = config
        .start
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default());
    let end = config
        .end
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    SyntheticSource::new(start, end)
}

fn fmp_source(config: &PipelineConfig) -> Result<FmpProvider> {
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = FmpProvider::from_env(circuit_breaker)
        .context("cannot reach FMP (set FMP_API_KEY or pass --synthetic)")?;
    Ok(provider.with_window(config.start, config.end))
}

fn build_source(config: &PipelineConfig, source: SourceArg) -> Result<Box<dyn SeriesSource>> {
    Ok(match source {
        SourceArg::Fmp => Box::new(fmp_source(config)?),
        SourceArg::Archive => Box::new(CsvDirSource::new(&config.paths.raw_dir)),
        SourceArg::Synthetic => Box::new(synthetic_source(config)),
    })
}

fn run_fetch(config_path: Option<&Path>, wanted: &[String], synthetic: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    select(&mut config, wanted)?;

    let source = if synthetic {
        build_source(&config, SourceArg::Synthetic)?
    } else {
        build_source(&config, SourceArg::Fmp)?
    };

    let summary = download_indicators(
        source.as_ref(),
        &config.paths.raw_dir,
        &config.indicator_list(),
        &LogProgress,
    );

    println!(
        "Fetched {}/{} indicators into {}",
        summary.succeeded,
        summary.total,
        config.paths.raw_dir.display()
    );
    if !summary.all_succeeded() {
        for (indicator, err) in &summary.errors {
            eprintln!("Error for {indicator}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_clean(config_path: Option<&Path>, wanted: &[String], source: SourceArg) -> Result<()> {
    let mut config = load_config(config_path)?;
    select(&mut config, wanted)?;

    let source = build_source(&config, source)?;
    let store = CleanedStore::new(&config.paths.cleaned_dir);
    let outcomes = clean_to_store(&config, source.as_ref(), &store)?;

    print_outcomes(&outcomes);
    println!("Store: {}", store.dir().display());
    if outcomes.iter().any(|o| !o.succeeded()) {
        std::process::exit(1);
    }
    Ok(())
}

fn run_merge(config_path: Option<&Path>, overrides: &RunOverrides) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, overrides)?;

    let store = CleanedStore::new(&config.paths.cleaned_dir);
    let run = run_from_store(&config, &store)?;
    finish_run(&config, &run)
}

fn run_all(
    config_path: Option<&Path>,
    overrides: &RunOverrides,
    source: SourceArg,
    no_store: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, overrides)?;

    let source = build_source(&config, source)?;
    let store = CleanedStore::new(&config.paths.cleaned_dir);
    let store_ref = if no_store { None } else { Some(&store) };

    let run = run_pipeline(&config, source.as_ref(), store_ref)?;
    finish_run(&config, &run)
}

fn finish_run(config: &PipelineConfig, run: &PipelineRun) -> Result<()> {
    print_outcomes(&run.outcomes);
    print_table_summary(run);

    let paths = save_artifacts(run, &config.paths.output_dir)?;
    println!("Table:      {}", paths.table.display());
    println!("Validation: {}", paths.validation.display());
    println!("Manifest:   {}", paths.manifest.display());
    Ok(())
}

fn run_validate(
    config_path: Option<&Path>,
    files: &[PathBuf],
    table: bool,
    json: bool,
) -> Result<()> {
    let reports = if table {
        if files.is_empty() {
            bail!("--table needs at least one merged table CSV");
        }
        files.iter().map(|path| table_report(path)).collect()
    } else if files.is_empty() {
        let config = load_config(config_path)?;
        archive_reports(&config.paths.raw_dir, &config.indicator_list())
    } else {
        files.iter().map(|path| raw_file_report(path)).collect()
    };

    if json {
        let out = serde_json::to_string_pretty(&reports).context("failed to serialize reports")?;
        println!("{out}");
    } else {
        for report in &reports {
            print_report(report);
        }
    }
    Ok(())
}

/// One report per indicator; unreadable files are reported, not fatal.
fn archive_reports(raw_dir: &Path, indicators: &[Indicator]) -> Vec<ValidationReport> {
    let archive = CsvDirSource::new(raw_dir);
    indicators
        .iter()
        .map(|ind| match archive.fetch(ind) {
            Ok(raw) => validate(&raw),
            Err(err) => {
                let reason = match err {
                    FetchError::NotFound { .. } => {
                        format!("file not found: {}", raw_csv_path(raw_dir, ind).display())
                    }
                    other => other.to_string(),
                };
                tracing::warn!(indicator = %ind.name, "{reason}");
                ValidationReport::unreadable(format!("raw: {}", ind.name), reason)
            }
        })
        .collect()
}

fn raw_file_report(path: &Path) -> ValidationReport {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace('_', " "))
        .unwrap_or_default();
    match read_raw_csv(path) {
        Ok(records) => {
            let raw = RawSeries::new(
                Indicator::new(stem.clone(), stem),
                records,
                DataSource::CsvArchive,
            );
            validate(&raw)
        }
        Err(err) => {
            tracing::warn!(file = %path.display(), "{err}");
            ValidationReport::unreadable(format!("raw: {stem}"), err.to_string())
        }
    }
}

fn table_report(path: &Path) -> ValidationReport {
    match read_table_csv(path) {
        Ok(table) => {
            let mut report = validate(&table);
            report.subject = format!("merged table: {}", path.display());
            report
        }
        Err(err) => {
            tracing::warn!(file = %path.display(), "{err:#}");
            ValidationReport::unreadable(
                format!("merged table: {}", path.display()),
                format!("{err:#}"),
            )
        }
    }
}

fn run_store_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = CleanedStore::new(&config.paths.cleaned_dir);

    println!("Store: {}", store.dir().display());
    println!();
    println!("{:<24} {:<25} {:>8}", "Indicator", "Date Range", "Rows");
    println!("{}", "-".repeat(59));
    for status in store.status(&config.indicator_list()) {
        let range = match (status.start_date, status.end_date) {
            (Some(s), Some(e)) => format!("{s} to {e}"),
            _ if status.stored => "(empty)".to_string(),
            _ => "(not stored)".to_string(),
        };
        let rows = status
            .row_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<24} {:<25} {:>8}", status.indicator.name, range, rows);
    }
    Ok(())
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    let toml = PipelineConfig::default_fmp().to_toml()?;
    std::fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_outcomes(outcomes: &[IndicatorOutcome]) {
    println!();
    println!(
        "{:<24} {:>8} {:>8} {:>10}  {}",
        "Indicator", "Cleaned", "Dropped", "Resampled", "Status"
    );
    println!("{}", "-".repeat(66));
    for o in outcomes {
        let dropped = o.clean_stats.map(|s| s.dropped()).unwrap_or(0);
        let status = match &o.failure {
            None => "ok".to_string(),
            Some(f) => format!("FAILED at {}: {}", f.stage, f.message),
        };
        println!(
            "{:<24} {:>8} {:>8} {:>10}  {}",
            o.indicator.name, o.cleaned_rows, dropped, o.resampled_rows, status
        );
    }
    println!();
}

fn print_table_summary(run: &PipelineRun) {
    println!("=== Merged Table ===");
    println!("Method:     {}", run.method);
    match (run.table.dates.first(), run.table.dates.last()) {
        (Some(first), Some(last)) => println!("Period:     {first} to {last}"),
        _ => println!("Period:     (empty)"),
    }
    println!("Rows:       {}", run.table.len());
    println!(
        "Columns:    {} ({} failed)",
        run.table.width(),
        run.failed()
    );
    println!("Missing:    {}", run.table_report.total_missing());
    println!("Hash:       {}", run.table_hash);
    for warn in &run.table_report.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}

fn print_report(report: &ValidationReport) {
    println!("=== {} ===", report.subject);
    println!("Rows:       {}", report.rows);
    println!(
        "Dates:      {}",
        if report.date_column_well_formed {
            "well formed"
        } else {
            "MALFORMED"
        }
    );
    for m in &report.missing_values {
        println!("Missing:    {:<24} {}", m.column, m.count);
    }
    for warn in &report.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}
