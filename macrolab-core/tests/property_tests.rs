//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Idempotence: cleaning an already-clean series changes nothing
//! 2. Sortedness: cleaned and resampled dates are strictly ascending
//! 3. Coverage: forward-fill gives every grid month the latest prior value
//! 4. Merge completeness: the date axis is the union and every cell is retrievable
//! 5. Round-trip: merge one series, project it back out, get it unchanged

use std::collections::BTreeSet;

use chrono::NaiveDate;
use macrolab_core::data::RawRecord;
use macrolab_core::domain::{monthly_grid, CleanedSeries, Indicator, ResampledSeries};
use macrolab_core::{merge, resample, Cleaner, ResampleMethod};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
}

fn arb_record() -> impl Strategy<Value = RawRecord> {
    (0i64..6000, -1.0e6..1.0e6_f64).prop_map(|(offset, value)| {
        RawRecord::new(base_date() + chrono::Duration::days(offset), value)
    })
}

/// Raw rows with duplicates and disorder, plus the occasional junk row.
fn arb_raw() -> impl Strategy<Value = Vec<RawRecord>> {
    prop::collection::vec(
        prop_oneof![
            8 => arb_record(),
            1 => Just(RawRecord::text(Some("not-a-date"), Some("1.0"))),
            1 => Just(RawRecord::text(Some("2010-06-15"), Some("."))),
        ],
        1..80,
    )
}

fn arb_cleaned() -> impl Strategy<Value = CleanedSeries> {
    arb_raw().prop_filter_map("needs at least one typed row", |raw| {
        let series = Cleaner::clean(&Indicator::new("X", "x"), &raw).ok()?;
        (!series.is_empty()).then_some(series)
    })
}

fn arb_method() -> impl Strategy<Value = ResampleMethod> {
    prop_oneof![Just(ResampleMethod::ForwardFill), Just(ResampleMethod::Linear)]
}

fn arb_resampled_set() -> impl Strategy<Value = Vec<ResampledSeries>> {
    prop::collection::vec(arb_cleaned(), 1..5).prop_map(|cleaned| {
        cleaned
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let indicator = Indicator::new(format!("S{i}"), format!("s{i}"));
                let s = CleanedSeries::new(indicator, s.observations);
                resample(&s, ResampleMethod::ForwardFill).unwrap()
            })
            .collect()
    })
}

// ── 1. Idempotence ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn cleaning_is_idempotent(series in arb_cleaned()) {
        let again = Cleaner::clean(&series.indicator, &series.to_raw_records()).unwrap();
        prop_assert_eq!(again, series);
    }
}

// ── 2. Sortedness ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn cleaned_dates_strictly_ascending(raw in arb_raw()) {
        let series = Cleaner::clean(&Indicator::new("X", "x"), &raw).unwrap();
        prop_assert!(series.is_strictly_ascending());
        prop_assert!(series.observations.iter().all(|o| o.value.is_finite()));
    }

    #[test]
    fn resampled_dates_strictly_ascending(series in arb_cleaned(), method in arb_method()) {
        let resampled = resample(&series, method).unwrap();
        prop_assert!(resampled.is_strictly_ascending());
    }

    /// Linear output is a contiguous prefix of the grid, never longer than forward-fill.
    #[test]
    fn linear_is_a_grid_prefix(series in arb_cleaned()) {
        let linear = resample(&series, ResampleMethod::Linear).unwrap();
        let grid = monthly_grid(series.first_date().unwrap(), series.last_date().unwrap());
        let dates: Vec<_> = linear.dates().collect();
        prop_assert!(dates.len() <= grid.len());
        prop_assert_eq!(&grid[..dates.len()], &dates[..]);
    }
}

// ── 3. Forward-fill coverage ─────────────────────────────────────────

proptest! {
    #[test]
    fn forward_fill_covers_grid_with_latest_prior(series in arb_cleaned()) {
        let resampled = resample(&series, ResampleMethod::ForwardFill).unwrap();
        let grid = monthly_grid(series.first_date().unwrap(), series.last_date().unwrap());

        let dates: Vec<_> = resampled.dates().collect();
        prop_assert_eq!(dates, grid);

        for obs in &resampled.observations {
            let expected = series
                .observations
                .iter()
                .rev()
                .find(|o| o.date <= obs.date)
                .map(|o| o.value);
            prop_assert_eq!(Some(obs.value), expected);
        }
    }
}

// ── 4. Merge completeness ────────────────────────────────────────────

proptest! {
    #[test]
    fn merge_is_a_complete_outer_join(set in arb_resampled_set()) {
        let table = merge(&set).unwrap();

        let union: Vec<NaiveDate> = set
            .iter()
            .flat_map(|s| s.dates())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        prop_assert_eq!(&table.dates, &union);

        for s in &set {
            let column = table.column(&s.indicator.name).unwrap();
            prop_assert_eq!(column.values.len(), table.dates.len());
            prop_assert_eq!(column.values.iter().flatten().count(), s.len());
            for obs in &s.observations {
                prop_assert_eq!(table.value(obs.date, &s.indicator.name), Some(obs.value));
            }
        }
    }
}

// ── 5. Round-trip ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn single_merge_projects_back(series in arb_cleaned(), method in arb_method()) {
        let resampled = resample(&series, method).unwrap();
        let table = merge(std::slice::from_ref(&resampled)).unwrap();
        prop_assert_eq!(table.project(&resampled.indicator.name), Some(resampled));
    }
}
