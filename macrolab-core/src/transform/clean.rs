//! Cleaner: raw records → [`CleanedSeries`].
//!
//! Types the loosely-typed rows, drops what cannot be typed, sorts by date,
//! and collapses repeated dates.
//!
//! **Duplicate dates: the last occurrence in input order wins.** Providers
//! publish revisions by re-sending a date; the later row is the revision.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::data::provider::{RawRecord, RawSeries};
use crate::domain::{CleanedSeries, Indicator, Observation};

/// Structurally invalid raw input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("missing date column for indicator '{indicator}'")]
    MissingDateColumn { indicator: String },

    #[error("missing value column for indicator '{indicator}'")]
    MissingValueColumn { indicator: String },
}

/// What the cleaner dropped or collapsed on the way through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanStats {
    pub input_rows: usize,
    /// Rows whose date was absent or unparseable.
    pub dropped_dates: usize,
    /// Rows whose value was absent, non-numeric, or non-finite.
    pub dropped_values: usize,
    /// Rows discarded because a later row carried the same date.
    pub duplicates_collapsed: usize,
    pub output_rows: usize,
}

impl CleanStats {
    pub fn dropped(&self) -> usize {
        self.dropped_dates + self.dropped_values + self.duplicates_collapsed
    }
}

/// Cleaner for raw series.
pub struct Cleaner;

impl Cleaner {
    /// Clean one indicator's raw records.
    pub fn clean(indicator: &Indicator, raw: &[RawRecord]) -> Result<CleanedSeries, DataError> {
        Self::clean_with_stats(indicator, raw).map(|(series, _)| series)
    }

    /// Clean a loaded raw series.
    pub fn clean_series(raw: &RawSeries) -> Result<(CleanedSeries, CleanStats), DataError> {
        Self::clean_with_stats(&raw.indicator, &raw.records)
    }

    /// Clean and report what was dropped.
    pub fn clean_with_stats(
        indicator: &Indicator,
        raw: &[RawRecord],
    ) -> Result<(CleanedSeries, CleanStats), DataError> {
        let mut stats = CleanStats {
            input_rows: raw.len(),
            ..CleanStats::default()
        };

        if raw.is_empty() {
            return Ok((CleanedSeries::empty(indicator.clone()), stats));
        }
        if !raw.iter().any(RawRecord::has_date) {
            return Err(DataError::MissingDateColumn {
                indicator: indicator.name.clone(),
            });
        }
        if !raw.iter().any(RawRecord::has_value) {
            return Err(DataError::MissingValueColumn {
                indicator: indicator.name.clone(),
            });
        }

        // BTreeMap keeps dates sorted; insert order makes the last row win.
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for rec in raw {
            let Some(date) = rec.date.as_ref().and_then(parse_date) else {
                stats.dropped_dates += 1;
                continue;
            };
            let Some(value) = rec.value.as_ref().and_then(parse_value) else {
                stats.dropped_values += 1;
                continue;
            };
            if by_date.insert(date, value).is_some() {
                stats.duplicates_collapsed += 1;
            }
        }

        let observations: Vec<Observation> = by_date
            .into_iter()
            .map(|(date, value)| Observation::new(date, value))
            .collect();
        stats.output_rows = observations.len();

        if stats.dropped() > 0 {
            tracing::debug!(
                indicator = %indicator.name,
                dropped_dates = stats.dropped_dates,
                dropped_values = stats.dropped_values,
                duplicates = stats.duplicates_collapsed,
                "dropped raw rows while cleaning"
            );
        }

        Ok((CleanedSeries::new(indicator.clone(), observations), stats))
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a date-like JSON value into a calendar date.
///
/// Accepts ISO dates, slash dates, naive timestamps, RFC 3339 timestamps
/// (date part), and `YYYY-MM` (first of month). Anything else is `None`.
pub fn parse_date(raw: &Value) -> Option<NaiveDate> {
    let text = raw.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok()
}

/// Parse a value-like JSON value into a finite float.
///
/// Numbers and numeric strings are accepted; `""`, `"."`, `"nan"`, `"null"`
/// and non-finite results are treated as missing.
pub fn parse_value(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || trimmed == "."
                || trimmed.eq_ignore_ascii_case("nan")
                || trimmed.eq_ignore_ascii_case("null")
            {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ind() -> Indicator {
        Indicator::new("Real GDP", "realGDP")
    }

    fn rec(date: &str, value: Value) -> RawRecord {
        RawRecord {
            date: Some(json!(date)),
            value: Some(value),
        }
    }

    #[test]
    fn sorts_ascending() {
        let raw = vec![
            rec("2020-03-01", json!(3.0)),
            rec("2020-01-01", json!(1.0)),
            rec("2020-02-01", json!(2.0)),
        ];
        let s = Cleaner::clean(&ind(), &raw).unwrap();
        let dates: Vec<_> = s.dates().collect();
        assert_eq!(dates, vec![d(2020, 1, 1), d(2020, 2, 1), d(2020, 3, 1)]);
    }

    #[test]
    fn last_duplicate_wins() {
        let raw = vec![
            rec("2020-01-15", json!(1.0)),
            rec("2020-02-15", json!(5.0)),
            rec("2020-01-15", json!(2.0)),
        ];
        let (s, stats) = Cleaner::clean_with_stats(&ind(), &raw).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.value_at(d(2020, 1, 15)), Some(2.0));
        assert_eq!(stats.duplicates_collapsed, 1);
    }

    #[test]
    fn drops_bad_dates_and_values() {
        let raw = vec![
            rec("not a date", json!(1.0)),
            rec("2020-01-01", json!(".")),
            rec("2020-02-01", json!("abc")),
            rec("2020-03-01", json!("4.5")),
            RawRecord {
                date: Some(json!("2020-04-01")),
                value: None,
            },
        ];
        let (s, stats) = Cleaner::clean_with_stats(&ind(), &raw).unwrap();
        assert_eq!(s.observations, vec![Observation::new(d(2020, 3, 1), 4.5)]);
        assert_eq!(stats.dropped_dates, 1);
        assert_eq!(stats.dropped_values, 3);
        assert_eq!(stats.output_rows, 1);
    }

    #[test]
    fn missing_date_column_is_an_error() {
        let raw = vec![RawRecord {
            date: None,
            value: Some(json!(1.0)),
        }];
        assert_eq!(
            Cleaner::clean(&ind(), &raw),
            Err(DataError::MissingDateColumn {
                indicator: "Real GDP".into()
            })
        );
    }

    #[test]
    fn missing_value_column_is_an_error() {
        let raw = vec![RawRecord {
            date: Some(json!("2020-01-01")),
            value: None,
        }];
        assert!(matches!(
            Cleaner::clean(&ind(), &raw),
            Err(DataError::MissingValueColumn { .. })
        ));
    }

    #[test]
    fn empty_input_is_empty_series() {
        let s = Cleaner::clean(&ind(), &[]).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn error_message_names_the_column() {
        let err = DataError::MissingDateColumn {
            indicator: "CPI".into(),
        };
        assert!(err.to_string().contains("missing date column"));
    }

    #[test]
    fn parse_date_shapes() {
        assert_eq!(parse_date(&json!("2020-01-31")), Some(d(2020, 1, 31)));
        assert_eq!(parse_date(&json!("2020/01/31")), Some(d(2020, 1, 31)));
        assert_eq!(parse_date(&json!("01/31/2020")), Some(d(2020, 1, 31)));
        assert_eq!(parse_date(&json!("2020-01-31 00:00:00")), Some(d(2020, 1, 31)));
        assert_eq!(parse_date(&json!("2020-01-31T12:00:00")), Some(d(2020, 1, 31)));
        assert_eq!(parse_date(&json!("2020-01-31T12:00:00Z")), Some(d(2020, 1, 31)));
        assert_eq!(parse_date(&json!("2024-07")), Some(d(2024, 7, 1)));
        assert_eq!(parse_date(&json!("2020-02-30")), None);
        assert_eq!(parse_date(&json!(20200131)), None);
        assert_eq!(parse_date(&json!("")), None);
    }

    #[test]
    fn parse_value_shapes() {
        assert_eq!(parse_value(&json!(1.5)), Some(1.5));
        assert_eq!(parse_value(&json!(" 2.25 ")), Some(2.25));
        assert_eq!(parse_value(&json!(".")), None);
        assert_eq!(parse_value(&json!("NaN")), None);
        assert_eq!(parse_value(&json!("inf")), None);
        assert_eq!(parse_value(&json!(true)), None);
        assert_eq!(parse_value(&Value::Null), None);
    }

    #[test]
    fn input_is_untouched() {
        let raw = vec![rec("2020-02-01", json!(2.0)), rec("2020-01-01", json!(1.0))];
        let before = raw.clone();
        let _ = Cleaner::clean(&ind(), &raw).unwrap();
        assert_eq!(raw, before);
    }
}
