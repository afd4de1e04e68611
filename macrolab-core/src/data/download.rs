//! Download orchestrator: fetch raw series and archive them as CSV.

use std::path::Path;

use super::provider::{DownloadProgress, FetchError, SeriesSource};
use super::raw_csv::{raw_csv_path, write_raw_csv};
use crate::domain::Indicator;

/// Fetch every indicator from `source` and write `{raw_dir}/{File_Stem}.csv`.
///
/// An indicator that comes back with zero rows is reported as a failure and
/// leaves any existing file on disk alone.
pub fn download_indicators(
    source: &dyn SeriesSource,
    raw_dir: &Path,
    indicators: &[Indicator],
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = indicators.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors: Vec<(Indicator, FetchError)> = Vec::new();

    for (i, indicator) in indicators.iter().enumerate() {
        progress.on_start(indicator, i, total);

        let result = download_single(source, raw_dir, indicator);
        progress.on_complete(indicator, i, total, &result);

        match result {
            Ok(_) => succeeded += 1,
            Err(e) => {
                errors.push((indicator.clone(), e));
                failed += 1;
            }
        }

        // Bail out early if circuit breaker tripped
        if !source.is_available() {
            for rest in &indicators[(i + 1)..total] {
                errors.push((rest.clone(), FetchError::CircuitBreakerTripped));
                failed += 1;
            }
            break;
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    DownloadSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

/// fetch → archive. Returns the number of rows written.
fn download_single(
    source: &dyn SeriesSource,
    raw_dir: &Path,
    indicator: &Indicator,
) -> Result<usize, FetchError> {
    let raw = source.fetch(indicator)?;
    if raw.records.is_empty() {
        return Err(FetchError::NotFound {
            indicator: indicator.name.clone(),
        });
    }
    write_raw_csv(&raw_csv_path(raw_dir, indicator), &raw.records)?;
    Ok(raw.records.len())
}

/// Summary of a batch download.
#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(Indicator, FetchError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
