//! Raw CSV archive: one `{File_Stem}.csv` per indicator with `date,value` columns.
//!
//! Reading is deliberately permissive. Cells come back as text and are typed
//! later by the cleaner; a file without a `date` header yields records with no
//! date at all, which the cleaner reports as a missing date column.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::provider::{
    DataSource, FetchError, RawRecord, RawSeries, SeriesSource, DATE_FIELD, VALUE_FIELD,
};
use crate::domain::Indicator;

/// Read raw records from a CSV file.
pub fn read_raw_csv(path: &Path) -> Result<Vec<RawRecord>, FetchError> {
    let file = fs::File::open(path)
        .map_err(|e| FetchError::Io(format!("open {}: {e}", path.display())))?;
    read_raw_csv_from(file)
}

/// Read raw records from any CSV reader (header row required).
pub fn read_raw_csv_from<R: Read>(reader: R) -> Result<Vec<RawRecord>, FetchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| FetchError::Csv(format!("header: {e}")))?
        .clone();
    let position = |field: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(field))
    };
    let date_idx = position(DATE_FIELD);
    let value_idx = position(VALUE_FIELD);

    let mut records = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row.map_err(|e| FetchError::Csv(format!("row {}: {e}", line + 1)))?;
        records.push(RawRecord::text(
            date_idx.and_then(|i| row.get(i)),
            value_idx.and_then(|i| row.get(i)),
        ));
    }
    Ok(records)
}

/// Write raw records as `date,value` CSV.
///
/// Writes to a `.tmp` sibling then renames into place.
pub fn write_raw_csv(path: &Path, records: &[RawRecord]) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| FetchError::Io(format!("create {}: {e}", parent.display())))?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    {
        let mut wtr = csv::Writer::from_path(&tmp_path)
            .map_err(|e| FetchError::Csv(format!("create {}: {e}", tmp_path.display())))?;
        wtr.write_record([DATE_FIELD, VALUE_FIELD])
            .map_err(|e| FetchError::Csv(e.to_string()))?;
        for rec in records {
            wtr.write_record([cell(&rec.date), cell(&rec.value)])
                .map_err(|e| FetchError::Csv(e.to_string()))?;
        }
        wtr.flush()
            .map_err(|e| FetchError::Io(format!("flush {}: {e}", tmp_path.display())))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        FetchError::Io(format!("atomic rename failed: {e}"))
    })
}

fn cell(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Source reading `{dir}/{File_Stem}.csv` for each indicator.
#[derive(Debug, Clone)]
pub struct CsvDirSource {
    dir: PathBuf,
}

impl CsvDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the raw file for an indicator.
    pub fn path_for(&self, indicator: &Indicator) -> PathBuf {
        raw_csv_path(&self.dir, indicator)
    }
}

/// `{dir}/{File_Stem}.csv`
pub fn raw_csv_path(dir: &Path, indicator: &Indicator) -> PathBuf {
    dir.join(format!("{}.csv", indicator.file_stem()))
}

impl SeriesSource for CsvDirSource {
    fn name(&self) -> &str {
        "csv_archive"
    }

    fn fetch(&self, indicator: &Indicator) -> Result<RawSeries, FetchError> {
        let path = self.path_for(indicator);
        if !path.exists() {
            return Err(FetchError::NotFound {
                indicator: indicator.name.clone(),
            });
        }
        let records = read_raw_csv(&path)?;
        Ok(RawSeries::new(
            indicator.clone(),
            records,
            DataSource::CsvArchive,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("macrolab_raw_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_text_cells() {
        let data = "date,value\n2020-01-01,1.5\n2020-02-01,\n";
        let recs = read_raw_csv_from(data.as_bytes()).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].date, Some(Value::String("2020-01-01".into())));
        assert_eq!(recs[0].value, Some(Value::String("1.5".into())));
        assert_eq!(recs[1].value, Some(Value::String(String::new())));
    }

    #[test]
    fn header_lookup_ignores_case_and_order() {
        let data = "Value,Date\n3.0,2021-05-01\n";
        let recs = read_raw_csv_from(data.as_bytes()).unwrap();
        assert_eq!(recs[0].date, Some(Value::String("2021-05-01".into())));
        assert_eq!(recs[0].value, Some(Value::String("3.0".into())));
    }

    #[test]
    fn missing_date_header_yields_dateless_records() {
        let data = "when,value\n2020-01-01,1\n";
        let recs = read_raw_csv_from(data.as_bytes()).unwrap();
        assert!(!recs[0].has_date());
        assert!(recs[0].has_value());
    }

    #[test]
    fn write_then_read_preserves_cells() {
        let dir = temp_dir();
        let path = dir.join("Real_GDP.csv");
        let recs = vec![
            RawRecord::new(chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 2.5),
            RawRecord::text(Some("2020-04-01"), None),
        ];
        write_raw_csv(&path, &recs).unwrap();

        let back = read_raw_csv(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].value, Some(Value::String("2.5".into())));
        assert_eq!(back[1].value, Some(Value::String(String::new())));
        assert!(!dir.join("Real_GDP.csv.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn dir_source_resolves_file_stem() {
        let dir = temp_dir();
        let ind = Indicator::new("Federal Funds Rate", "federalFunds");
        write_raw_csv(
            &dir.join("Federal_Funds_Rate.csv"),
            &[RawRecord::text(Some("2020-01-01"), Some("1.55"))],
        )
        .unwrap();

        let src = CsvDirSource::new(&dir);
        let raw = src.fetch(&ind).unwrap();
        assert_eq!(raw.records.len(), 1);
        assert_eq!(raw.source, DataSource::CsvArchive);

        let missing = Indicator::new("Real GDP", "realGDP");
        assert!(matches!(src.fetch(&missing), Err(FetchError::NotFound { .. })));

        let _ = fs::remove_dir_all(&dir);
    }
}
