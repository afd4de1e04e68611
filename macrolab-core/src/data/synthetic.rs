//! Synthetic raw series for offline development, tests, and benchmarks.
//!
//! Each indicator gets a deterministic random walk seeded from its id. Rows
//! arrive at a jittered monthly or quarterly cadence and deliberately include
//! the defects real feeds have: repeated dates and `"."` missing markers.
//! Data produced here is tagged [`DataSource::Synthetic`].

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataSource, FetchError, RawRecord, RawSeries, SeriesSource};
use crate::domain::Indicator;

/// Deterministic synthetic source over `[start, end]`.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    start: NaiveDate,
    end: NaiveDate,
    defect_rate: f64,
}

impl SyntheticSource {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            defect_rate: 0.05,
        }
    }

    /// Probability that a row is duplicated or blanked (clamped to `[0, 0.5]`).
    pub fn with_defect_rate(mut self, rate: f64) -> Self {
        self.defect_rate = rate.clamp(0.0, 0.5);
        self
    }

    /// Generate the raw rows for one indicator id.
    pub fn generate(&self, id: &str) -> Vec<RawRecord> {
        let seed: [u8; 32] = *blake3::hash(id.as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        // Quarterly series (GDP-like) or monthly series (rates, prices).
        let step_days: i64 = if rng.gen_bool(0.3) { 91 } else { 30 };
        let mut level: f64 = rng.gen_range(1.0..100.0);

        let mut records = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            level *= 1.0 + rng.gen_range(-0.02..0.02);

            let roll: f64 = rng.gen();
            if roll < self.defect_rate {
                records.push(RawRecord::text(
                    Some(&current.format("%Y-%m-%d").to_string()),
                    Some("."),
                ));
            } else {
                records.push(RawRecord::new(current, level));
                if roll < self.defect_rate * 2.0 {
                    // Revised print for the same date.
                    records.push(RawRecord::new(current, level * 1.001));
                }
            }

            let jitter = rng.gen_range(-3..=3);
            current += chrono::Duration::days(step_days + jitter);
        }
        records
    }
}

impl SeriesSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, indicator: &Indicator) -> Result<RawSeries, FetchError> {
        Ok(RawSeries::new(
            indicator.clone(),
            self.generate(&indicator.id),
            DataSource::Synthetic,
        ))
    }
}
