//! Cleaned and resampled series.
//!
//! Both are plain ordered sequences of [`Observation`]s tagged with their
//! [`Indicator`]. The invariants (strictly ascending, unique dates, finite
//! values) are established by the cleaner and the resampler; these types
//! never reorder or mutate their contents.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::observation::{Indicator, Observation};
use crate::data::provider::RawRecord;

/// A cleaned series: sorted strictly ascending, unique dates, no missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedSeries {
    pub indicator: Indicator,
    pub observations: Vec<Observation>,
}

impl CleanedSeries {
    pub fn new(indicator: Indicator, observations: Vec<Observation>) -> Self {
        Self {
            indicator,
            observations,
        }
    }

    pub fn empty(indicator: Indicator) -> Self {
        Self::new(indicator, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.observations.iter().map(|o| o.date)
    }

    /// Value observed exactly on `date`, if any.
    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        value_at(&self.observations, date)
    }

    /// True when dates are strictly ascending (sorted and unique).
    pub fn is_strictly_ascending(&self) -> bool {
        is_strictly_ascending(&self.observations)
    }

    /// New series restricted to `[start, end]` (either bound optional, both inclusive).
    pub fn filter_range(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> CleanedSeries {
        let observations = self
            .observations
            .iter()
            .filter(|o| start.map_or(true, |s| o.date >= s))
            .filter(|o| end.map_or(true, |e| o.date <= e))
            .copied()
            .collect();
        CleanedSeries::new(self.indicator.clone(), observations)
    }

    /// Render back into raw records (ISO dates, numeric values).
    ///
    /// Cleaning the result yields a series equal to `self`.
    pub fn to_raw_records(&self) -> Vec<RawRecord> {
        self.observations
            .iter()
            .map(|o| RawRecord::new(o.date, o.value))
            .collect()
    }
}

/// A series on the month-end grid: exactly one observation per month in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampledSeries {
    pub indicator: Indicator,
    pub observations: Vec<Observation>,
}

impl ResampledSeries {
    pub fn new(indicator: Indicator, observations: Vec<Observation>) -> Self {
        Self {
            indicator,
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.observations.first().map(|o| o.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.observations.iter().map(|o| o.date)
    }

    pub fn value_at(&self, date: NaiveDate) -> Option<f64> {
        value_at(&self.observations, date)
    }

    pub fn is_strictly_ascending(&self) -> bool {
        is_strictly_ascending(&self.observations)
    }
}

/// Binary search on a date-sorted observation slice.
fn value_at(observations: &[Observation], date: NaiveDate) -> Option<f64> {
    observations
        .binary_search_by_key(&date, |o| o.date)
        .ok()
        .map(|i| observations[i].value)
}

pub(crate) fn is_strictly_ascending(observations: &[Observation]) -> bool {
    observations.windows(2).all(|w| w[0].date < w[1].date)
}
