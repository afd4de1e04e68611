//! Validator: diagnostic inspection of raw, cleaned, resampled, and merged data.
//!
//! Validation never fails. Problems come back as data in a
//! [`ValidationReport`] for logs and the run's `validation.json`.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::provider::{RawSeries, DATE_FIELD, VALUE_FIELD};
use crate::domain::{is_month_end, next_month_end, CleanedSeries, MergedTable, Observation, ResampledSeries};
use crate::transform::clean::{parse_date, CleanStats};

/// Missing-cell count for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCount {
    pub column: String,
    pub count: usize,
}

/// Result of inspecting one series or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// What was inspected, e.g. `"cleaned: Real GDP"`.
    pub subject: String,
    pub rows: usize,
    /// Per-column census, in column order.
    pub missing_values: Vec<MissingCount>,
    pub date_column_well_formed: bool,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn new(subject: impl Into<String>, rows: usize) -> Self {
        Self {
            subject: subject.into(),
            rows,
            missing_values: Vec::new(),
            date_column_well_formed: true,
            warnings: Vec::new(),
        }
    }

    /// Report for a subject whose data could not be read at all.
    pub fn unreadable(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut report = Self::new(subject, 0);
        report.date_column_well_formed = false;
        report.warnings.push(reason.into());
        report
    }

    pub fn total_missing(&self) -> usize {
        self.missing_values.iter().map(|m| m.count).sum()
    }

    /// Missing count for a column, if the column was inspected.
    pub fn missing_in(&self, column: &str) -> Option<usize> {
        self.missing_values
            .iter()
            .find(|m| m.column == column)
            .map(|m| m.count)
    }

    /// No missing cells, a well-formed date column, and no warnings.
    pub fn is_clean(&self) -> bool {
        self.date_column_well_formed && self.total_missing() == 0 && self.warnings.is_empty()
    }

    /// Record what the cleaner dropped upstream of this subject.
    pub fn note_clean_stats(&mut self, stats: &CleanStats) {
        if stats.duplicates_collapsed > 0 {
            self.warnings.push(format!(
                "{} duplicate dates were found and deduplicated upstream",
                stats.duplicates_collapsed
            ));
        }
        if stats.dropped_dates > 0 {
            self.warnings.push(format!(
                "{} rows with unparseable dates were dropped upstream",
                stats.dropped_dates
            ));
        }
        if stats.dropped_values > 0 {
            self.warnings.push(format!(
                "{} rows with missing or non-numeric values were dropped upstream",
                stats.dropped_values
            ));
        }
    }

    fn missing(&mut self, column: impl Into<String>, count: usize) {
        self.missing_values.push(MissingCount {
            column: column.into(),
            count,
        });
    }
}

/// Anything the validator can inspect.
pub trait Validate {
    fn validation_report(&self) -> ValidationReport;
}

/// Inspect a series or table.
pub fn validate<T: Validate + ?Sized>(subject: &T) -> ValidationReport {
    subject.validation_report()
}

impl Validate for RawSeries {
    fn validation_report(&self) -> ValidationReport {
        let mut report = ValidationReport::new(
            format!("raw: {}", self.indicator.name),
            self.records.len(),
        );

        let missing_dates = self.records.iter().filter(|r| !r.has_date()).count();
        let missing_values = self.records.iter().filter(|r| !r.has_value()).count();
        report.missing(DATE_FIELD, missing_dates);
        report.missing(VALUE_FIELD, missing_values);

        if self.records.is_empty() {
            report.warnings.push("no rows".into());
            return report;
        }
        if missing_dates == self.records.len() {
            report.date_column_well_formed = false;
            report.warnings.push("missing date column".into());
            return report;
        }
        if missing_values == self.records.len() {
            report.warnings.push("missing value column".into());
        }

        let parsed: Vec<Option<NaiveDate>> = self
            .records
            .iter()
            .filter(|r| r.has_date())
            .map(|r| r.date.as_ref().and_then(parse_date))
            .collect();

        let unparseable = parsed.iter().filter(|d| d.is_none()).count();
        if unparseable > 0 {
            report.date_column_well_formed = false;
            report
                .warnings
                .push(format!("{unparseable} dates could not be parsed"));
        }

        let dates: Vec<NaiveDate> = parsed.into_iter().flatten().collect();
        let distinct: HashSet<NaiveDate> = dates.iter().copied().collect();
        let duplicates = dates.len() - distinct.len();
        if duplicates > 0 {
            report
                .warnings
                .push(format!("{duplicates} duplicate dates (cleaning keeps the last)"));
        }
        if dates.windows(2).any(|w| w[1] < w[0]) {
            report.warnings.push("rows are not in date order".into());
        }

        report
    }
}

fn inspect_observations(report: &mut ValidationReport, observations: &[Observation]) {
    let non_finite = observations.iter().filter(|o| !o.value.is_finite()).count();
    report.missing(VALUE_FIELD, non_finite);
    report.date_column_well_formed = observations.windows(2).all(|w| w[0].date < w[1].date);
    if !report.date_column_well_formed {
        report
            .warnings
            .push("dates are not strictly ascending".into());
    }
}

impl Validate for CleanedSeries {
    fn validation_report(&self) -> ValidationReport {
        let mut report =
            ValidationReport::new(format!("cleaned: {}", self.indicator.name), self.len());
        inspect_observations(&mut report, &self.observations);
        if self.is_empty() {
            report.warnings.push("no rows".into());
        }
        report
    }
}

impl Validate for ResampledSeries {
    fn validation_report(&self) -> ValidationReport {
        let mut report =
            ValidationReport::new(format!("resampled: {}", self.indicator.name), self.len());
        inspect_observations(&mut report, &self.observations);
        if self.is_empty() {
            report.warnings.push("no rows".into());
        }

        let off_grid = self.dates().filter(|d| !is_month_end(*d)).count();
        if off_grid > 0 {
            report
                .warnings
                .push(format!("{off_grid} dates are not month-ends"));
        }

        let on_grid: Vec<NaiveDate> = self.dates().filter(|d| is_month_end(*d)).collect();
        let gaps = on_grid
            .windows(2)
            .filter(|w| next_month_end(w[0]) != Some(w[1]))
            .count();
        if gaps > 0 {
            report.warnings.push(format!("{gaps} gaps in the monthly grid"));
        }

        report
    }
}

impl Validate for MergedTable {
    fn validation_report(&self) -> ValidationReport {
        let mut report = ValidationReport::new("merged table", self.len());

        report.date_column_well_formed = self.dates.windows(2).all(|w| w[0] < w[1]);
        if !report.date_column_well_formed {
            report
                .warnings
                .push("dates are not strictly ascending".into());
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            let name = column.indicator.name.as_str();
            report.missing(name, column.missing());

            if !seen.insert(name) {
                report.warnings.push(format!("duplicate column '{name}'"));
            }
            if column.values.len() != self.dates.len() {
                report.warnings.push(format!(
                    "column '{name}' has {} cells for {} dates",
                    column.values.len(),
                    self.dates.len()
                ));
            }
            if !column.values.is_empty() && column.values.iter().all(Option::is_none) {
                report.warnings.push(format!("column '{name}' has no values"));
            }
        }

        report
    }
}
