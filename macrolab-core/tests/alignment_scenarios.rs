//! End-to-end alignment scenarios: raw rows → clean → resample → merge → validate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use macrolab_core::data::{
    write_raw_csv, CleanedStore, CsvDirSource, RawRecord, SeriesSource, SyntheticSource,
};
use macrolab_core::{
    merge, resample, validate, Cleaner, DataError, Indicator, Observation, ResampleMethod,
    ResampledSeries,
};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "macrolab_scenario_test_{}_{id}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn rows(points: &[(&str, &str)]) -> Vec<RawRecord> {
    points
        .iter()
        .map(|(date, value)| RawRecord::text(Some(*date), Some(*value)))
        .collect()
}

#[test]
fn forward_fill_fills_the_missing_month() {
    let a = Indicator::new("A", "a");
    let raw = rows(&[("2020-01-31", "100"), ("2020-03-31", "102")]);
    let cleaned = Cleaner::clean(&a, &raw).unwrap();
    let resampled = resample(&cleaned, ResampleMethod::ForwardFill).unwrap();

    let pairs: Vec<_> = resampled
        .observations
        .iter()
        .map(|o| (o.date, o.value))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (d(2020, 1, 31), 100.0),
            (d(2020, 2, 29), 100.0),
            (d(2020, 3, 31), 102.0),
        ]
    );
}

#[test]
fn outer_join_of_offset_series() {
    // Columns taken as given, gap included; filling is the resampler's job.
    let a = ResampledSeries::new(
        Indicator::new("A", "a"),
        vec![
            Observation::new(d(2020, 1, 31), 100.0),
            Observation::new(d(2020, 3, 31), 102.0),
        ],
    );
    let b = ResampledSeries::new(
        Indicator::new("B", "b"),
        vec![
            Observation::new(d(2020, 2, 29), 7.0),
            Observation::new(d(2020, 3, 31), 8.0),
        ],
    );

    let table = merge(&[a, b]).unwrap();
    assert_eq!(table.dates, vec![d(2020, 1, 31), d(2020, 2, 29), d(2020, 3, 31)]);
    assert_eq!(
        table.column("A").unwrap().values,
        vec![Some(100.0), None, Some(102.0)]
    );
    assert_eq!(
        table.column("B").unwrap().values,
        vec![None, Some(7.0), Some(8.0)]
    );

    let report = validate(&table);
    assert_eq!(report.missing_in("A"), Some(1));
    assert_eq!(report.missing_in("B"), Some(1));
    assert!(report.date_column_well_formed);
}

#[test]
fn missing_date_field_is_a_data_error() {
    let raw = vec![RawRecord::text(None, Some("1.0")), RawRecord::text(None, Some("2.0"))];
    let err = Cleaner::clean(&Indicator::new("Real GDP", "realGDP"), &raw).unwrap_err();
    assert_eq!(
        err,
        DataError::MissingDateColumn {
            indicator: "Real GDP".into()
        }
    );
    assert!(err.to_string().contains("missing date column"));
}

#[test]
fn duplicate_raw_date_keeps_the_last_row() {
    let raw = rows(&[("2020-01-15", "1.0"), ("2020-01-15", "2.0")]);
    let cleaned = Cleaner::clean(&Indicator::new("A", "a"), &raw).unwrap();
    assert_eq!(cleaned.len(), 1);
    assert_eq!(cleaned.value_at(d(2020, 1, 15)), Some(2.0));
}

#[test]
fn mixed_frequencies_align_on_one_grid() {
    // Quarterly GDP and monthly rates, as the provider publishes them.
    let gdp = Cleaner::clean(
        &Indicator::new("Real GDP", "realGDP"),
        &rows(&[("2020-01-01", "19.0"), ("2020-04-01", "17.3"), ("2020-07-01", "18.6")]),
    )
    .unwrap();
    let ffr = Cleaner::clean(
        &Indicator::new("Federal Funds Rate", "federalFunds"),
        &rows(&[
            ("2020-02-01", "1.58"),
            ("2020-03-01", "0.65"),
            ("2020-04-01", "0.05"),
        ]),
    )
    .unwrap();

    let table = merge(&[
        resample(&gdp, ResampleMethod::ForwardFill).unwrap(),
        resample(&ffr, ResampleMethod::ForwardFill).unwrap(),
    ])
    .unwrap();

    assert_eq!(table.dates.first(), Some(&d(2020, 1, 31)));
    assert_eq!(table.dates.last(), Some(&d(2020, 7, 31)));
    assert_eq!(table.len(), 7);
    assert_eq!(table.value(d(2020, 3, 31), "Real GDP"), Some(19.0));
    assert_eq!(table.value(d(2020, 1, 31), "Federal Funds Rate"), None);
    assert_eq!(table.value(d(2020, 4, 30), "Federal Funds Rate"), Some(0.05));
    assert_eq!(table.value(d(2020, 5, 31), "Federal Funds Rate"), None);
}

#[test]
fn synthetic_series_survive_the_whole_pipeline() {
    let source = SyntheticSource::new(d(2015, 1, 1), d(2020, 12, 31));
    let indicators = [
        Indicator::new("Real GDP", "realGDP"),
        Indicator::new("Inflation Rate", "inflationRate"),
    ];

    let mut resampled = Vec::new();
    for ind in &indicators {
        let raw = source.fetch(ind).unwrap();
        let (cleaned, _stats) = Cleaner::clean_series(&raw).unwrap();
        assert!(cleaned.is_strictly_ascending());
        resampled.push(resample(&cleaned, ResampleMethod::Linear).unwrap());
    }
    for series in &resampled {
        assert!(validate(series).warnings.is_empty(), "{:?}", validate(series));
    }

    let table = merge(&resampled).unwrap();
    assert_eq!(table.width(), 2);
    assert!(validate(&table).date_column_well_formed);
}

#[test]
fn store_roundtrip_feeds_resampler() {
    let dir = temp_dir();
    let raw_dir = dir.join("raw");
    let ind = Indicator::new("Unemployment Rate", "unemploymentRate");

    write_raw_csv(
        &raw_dir.join("Unemployment_Rate.csv"),
        &rows(&[("2020-02-01", "3.5"), ("2020-01-01", "3.6"), ("2020-03-01", "4.4")]),
    )
    .unwrap();

    let raw = CsvDirSource::new(&raw_dir).fetch(&ind).unwrap();
    let cleaned = Cleaner::clean_series(&raw).unwrap().0;

    let store = CleanedStore::new(dir.join("cleaned"));
    store.write(&cleaned).unwrap();
    let loaded = store.load(&ind).unwrap();
    assert_eq!(loaded, cleaned);

    let resampled = resample(&loaded, ResampleMethod::ForwardFill).unwrap();
    assert_eq!(resampled.len(), 3);
    assert_eq!(resampled.value_at(d(2020, 3, 31)), Some(4.4));

    let _ = std::fs::remove_dir_all(&dir);
}
