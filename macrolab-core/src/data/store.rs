//! Parquet store for cleaned series with Hive-style partitioning.
//!
//! Layout: `{dir}/indicator={ID}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Rewrites remove year partitions the new series no longer covers
//! - Schema check on load ([`ObservationSchema`])
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per indicator (hash, date range, row count)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provider::{DATE_FIELD, VALUE_FIELD};
use super::schema::{ObservationSchema, SchemaError};
use crate::domain::{CleanedSeries, Indicator, Observation};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored data for indicator '{indicator}'")]
    NotStored { indicator: String },

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("stored file failed schema check: {0}")]
    Schema(#[from] SchemaError),

    #[error("stored file is invalid: {0}")]
    Invalid(String),
}

/// Metadata sidecar for a stored indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub name: String,
    pub id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: usize,
    pub data_hash: String,
    pub stored_at: chrono::NaiveDateTime,
}

/// Store status for a single indicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub indicator: Indicator,
    pub stored: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: Option<usize>,
}

/// The cleaned-series store.
#[derive(Debug, Clone)]
pub struct CleanedStore {
    dir: PathBuf,
}

impl CleanedStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/indicator={ID}/`
    fn indicator_dir(&self, id: &str) -> PathBuf {
        self.dir.join(format!("indicator={id}"))
    }

    fn year_path(&self, id: &str, year: i32) -> PathBuf {
        self.indicator_dir(id).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.indicator_dir(id).join("meta.json")
    }

    /// Write a cleaned series, one Parquet file per calendar year.
    pub fn write(&self, series: &CleanedSeries) -> Result<StoreMeta, StoreError> {
        let id = &series.indicator.id;
        let ind_dir = self.indicator_dir(id);
        fs::create_dir_all(&ind_dir)
            .map_err(|e| StoreError::Io(format!("create {}: {e}", ind_dir.display())))?;

        let mut by_year: BTreeMap<i32, Vec<&Observation>> = BTreeMap::new();
        for obs in &series.observations {
            by_year.entry(obs.date.year()).or_default().push(obs);
        }

        for (year, observations) in &by_year {
            let df = observations_to_dataframe(observations)?;
            let path = self.year_path(id, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&df, &tmp_path)?;

            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                StoreError::Io(format!("atomic rename failed: {e}"))
            })?;
        }

        self.remove_stale_partitions(id, &by_year.keys().copied().collect())?;

        let meta = StoreMeta {
            name: series.indicator.name.clone(),
            id: id.clone(),
            start_date: series.first_date(),
            end_date: series.last_date(),
            row_count: series.len(),
            data_hash: hash_observations(&series.observations)?,
            stored_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Io(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(id), meta_json)
            .map_err(|e| StoreError::Io(format!("meta write: {e}")))?;

        tracing::debug!(indicator = %series.indicator.name, rows = meta.row_count, "stored cleaned series");
        Ok(meta)
    }

    fn remove_stale_partitions(&self, id: &str, keep: &HashSet<i32>) -> Result<(), StoreError> {
        for path in self.partition_files(id)? {
            let year = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok());
            if year.is_some_and(|y| !keep.contains(&y)) {
                fs::remove_file(&path)
                    .map_err(|e| StoreError::Io(format!("remove {}: {e}", path.display())))?;
            }
        }
        Ok(())
    }

    fn partition_files(&self, id: &str) -> Result<Vec<PathBuf>, StoreError> {
        let entries = fs::read_dir(self.indicator_dir(id))
            .map_err(|e| StoreError::Io(format!("read dir: {e}")))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StoreError::Io(format!("dir entry: {e}")))?
                .path();
            // Skip meta.json, .quarantined, .tmp
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Load a stored series, sorted by date ascending.
    ///
    /// Corrupt partitions are quarantined and skipped.
    pub fn load(&self, indicator: &Indicator) -> Result<CleanedSeries, StoreError> {
        let ind_dir = self.indicator_dir(&indicator.id);
        if !ind_dir.exists() {
            return Err(StoreError::NotStored {
                indicator: indicator.name.clone(),
            });
        }

        let mut observations = Vec::new();
        for path in self.partition_files(&indicator.id)? {
            match load_and_validate_parquet(&path) {
                Ok(obs) => observations.extend(obs),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    tracing::warn!(
                        file = %path.display(),
                        error = %e,
                        "quarantining corrupt store file"
                    );
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        observations.sort_by_key(|o| o.date);

        match self.get_meta(&indicator.id) {
            None if observations.is_empty() => Err(StoreError::NotStored {
                indicator: indicator.name.clone(),
            }),
            None => Ok(CleanedSeries::new(indicator.clone(), observations)),
            Some(meta) => {
                check_against_meta(&meta, &observations)?;
                Ok(CleanedSeries::new(indicator.clone(), observations))
            }
        }
    }

    /// Metadata for a stored indicator, if any.
    pub fn get_meta(&self, id: &str) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(id)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Which indicators are stored, and their date ranges.
    pub fn status(&self, indicators: &[Indicator]) -> Vec<StoreStatus> {
        indicators
            .iter()
            .map(|ind| {
                let meta = self.get_meta(&ind.id);
                StoreStatus {
                    indicator: ind.clone(),
                    stored: meta.is_some(),
                    start_date: meta.as_ref().and_then(|m| m.start_date),
                    end_date: meta.as_ref().and_then(|m| m.end_date),
                    row_count: meta.as_ref().map(|m| m.row_count),
                }
            })
            .collect()
    }
}

/// Loaded rows must match what `write` recorded.
fn check_against_meta(meta: &StoreMeta, observations: &[Observation]) -> Result<(), StoreError> {
    if observations.len() != meta.row_count {
        return Err(StoreError::Invalid(format!(
            "'{}': loaded {} rows, meta records {}",
            meta.id,
            observations.len(),
            meta.row_count
        )));
    }
    if hash_observations(observations)? != meta.data_hash {
        return Err(StoreError::Invalid(format!(
            "'{}': data hash does not match meta",
            meta.id
        )));
    }
    Ok(())
}

/// BLAKE3 over the JSON form of the observations.
pub fn hash_observations(observations: &[Observation]) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(observations)
        .map_err(|e| StoreError::Io(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn observations_to_dataframe(observations: &[&Observation]) -> Result<DataFrame, StoreError> {
    let days: Vec<i32> = observations
        .iter()
        .map(|o| (o.date - epoch()).num_days() as i32)
        .collect();
    let values: Vec<f64> = observations.iter().map(|o| o.value).collect();

    DataFrame::new(vec![
        Column::new(DATE_FIELD.into(), days)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
        Column::new(VALUE_FIELD.into(), values),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file =
        fs::File::create(path).map_err(|e| StoreError::Io(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Observation>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Io(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Invalid("empty parquet file".into()));
    }
    ObservationSchema::validate(&df)?;

    dataframe_to_observations(&df)
}

fn dataframe_to_observations(df: &DataFrame) -> Result<Vec<Observation>, StoreError> {
    let map_err = |e: PolarsError| StoreError::Parquet(format!("column read: {e}"));

    let date_ca = df
        .column(DATE_FIELD)
        .map_err(map_err)?
        .date()
        .map_err(|e| StoreError::Parquet(format!("date column type: {e}")))?;
    let value_ca = df
        .column(VALUE_FIELD)
        .map_err(map_err)?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("value column type: {e}")))?;

    let epoch = epoch();
    let mut observations = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let days = date_ca
            .get(i)
            .ok_or_else(|| StoreError::Invalid(format!("null date at row {i}")))?;
        let value = value_ca
            .get(i)
            .ok_or_else(|| StoreError::Invalid(format!("null value at row {i}")))?;
        observations.push(Observation::new(
            epoch + chrono::Duration::days(days as i64),
            value,
        ));
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("macrolab_store_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn gdp() -> Indicator {
        Indicator::new("Real GDP", "realGDP")
    }

    fn sample_series() -> CleanedSeries {
        CleanedSeries::new(
            gdp(),
            vec![
                Observation::new(d(2019, 10, 1), 19.2),
                Observation::new(d(2020, 1, 1), 19.0),
                Observation::new(d(2020, 4, 1), 17.3),
            ],
        )
    }

    #[test]
    fn epoch_is_unix_epoch() {
        assert_eq!(epoch(), d(1970, 1, 1));
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        let series = sample_series();

        let meta = store.write(&series).unwrap();
        assert_eq!(meta.row_count, 3);
        assert_eq!(meta.start_date, Some(d(2019, 10, 1)));
        assert!(dir.join("indicator=realGDP/2019.parquet").exists());
        assert!(dir.join("indicator=realGDP/2020.parquet").exists());

        let loaded = store.load(&gdp()).unwrap();
        assert_eq!(loaded, series);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rewrite_drops_stale_years() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        store.write(&sample_series()).unwrap();

        let shorter = sample_series().filter_range(Some(d(2020, 1, 1)), None);
        store.write(&shorter).unwrap();

        assert!(!dir.join("indicator=realGDP/2019.parquet").exists());
        assert_eq!(store.load(&gdp()).unwrap().len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_indicator_is_not_stored() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        assert!(matches!(store.load(&gdp()), Err(StoreError::NotStored { .. })));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_partition_is_quarantined() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        store.write(&sample_series()).unwrap();

        let bad = dir.join("indicator=realGDP/2019.parquet");
        fs::write(&bad, b"not parquet").unwrap();

        // Quarantined, and the short read is reported rather than returned.
        let err = store.load(&gdp()).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)), "{err}");
        assert!(!bad.exists());
        assert!(dir.join("indicator=realGDP/2019.parquet.quarantined").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn every_partition_corrupt_is_an_error() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        let series = CleanedSeries::new(
            gdp(),
            vec![
                Observation::new(d(2020, 1, 1), 19.0),
                Observation::new(d(2020, 4, 1), 17.3),
            ],
        );
        store.write(&series).unwrap();
        fs::write(dir.join("indicator=realGDP/2020.parquet"), b"junk").unwrap();

        assert!(matches!(store.load(&gdp()), Err(StoreError::Invalid(_))));
        assert!(dir.join("indicator=realGDP/2020.parquet.quarantined").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn tampered_values_fail_the_hash_check() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        store.write(&sample_series()).unwrap();

        let mut meta = store.get_meta("realGDP").unwrap();
        meta.data_hash = "0".repeat(64);
        fs::write(
            dir.join("indicator=realGDP/meta.json"),
            serde_json::to_string(&meta).unwrap(),
        )
        .unwrap();

        let err = store.load(&gdp()).unwrap_err();
        assert!(err.to_string().contains("hash"), "{err}");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_series_is_stored_as_empty() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        let meta = store.write(&CleanedSeries::empty(gdp())).unwrap();
        assert_eq!(meta.row_count, 0);
        assert_eq!(meta.start_date, None);
        assert!(store.load(&gdp()).unwrap().is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn status_reports_stored_and_missing() {
        let dir = temp_store_dir();
        let store = CleanedStore::new(&dir);
        store.write(&sample_series()).unwrap();

        let status = store.status(&[gdp(), Indicator::new("CPI", "cpi")]);
        assert!(status[0].stored);
        assert_eq!(status[0].row_count, Some(3));
        assert_eq!(status[0].end_date, Some(d(2020, 4, 1)));
        assert!(!status[1].stored);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = hash_observations(&sample_series().observations).unwrap();
        let b = hash_observations(&sample_series().observations).unwrap();
        assert_eq!(a, b);
        let other = hash_observations(&[Observation::new(d(2020, 1, 1), 1.0)]).unwrap();
        assert_ne!(a, other);
    }
}
