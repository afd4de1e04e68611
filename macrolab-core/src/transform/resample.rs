//! Resampler: cleaned series → contiguous month-end grid.
//!
//! The grid runs from the month-end of the first observation to the
//! month-end of the last, one point per calendar month.
//!
//! - **Forward-fill**: each grid point takes the latest observation at or
//!   before it. The first grid point is never earlier than the first
//!   observation, so nothing is omitted.
//! - **Linear**: each grid point is interpolated between its two bracketing
//!   observations, weighted by calendar days. Grid points past the last
//!   observation are omitted rather than extrapolated, which can drop the
//!   final month-end when the series does not end on one.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{monthly_grid, CleanedSeries, Observation, ResampledSeries};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResampleError {
    #[error("duplicate input dates: {date} appears more than once")]
    DuplicateInputDates { date: NaiveDate },

    #[error("unsorted input: {date} is out of order")]
    UnsortedInput { date: NaiveDate },

    #[error("unsupported method '{0}' (expected 'forward-fill' or 'linear')")]
    UnsupportedMethod(String),
}

/// How values are placed on the monthly grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleMethod {
    #[default]
    ForwardFill,
    Linear,
}

impl ResampleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleMethod::ForwardFill => "forward-fill",
            ResampleMethod::Linear => "linear",
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResampleMethod {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward-fill" | "forward_fill" | "ffill" => Ok(ResampleMethod::ForwardFill),
            "linear" => Ok(ResampleMethod::Linear),
            _ => Err(ResampleError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Resample a cleaned series onto the month-end grid.
pub fn resample(
    series: &CleanedSeries,
    method: ResampleMethod,
) -> Result<ResampledSeries, ResampleError> {
    check_ascending(&series.observations)?;

    let (Some(first), Some(last)) = (series.first_date(), series.last_date()) else {
        return Ok(ResampledSeries::new(series.indicator.clone(), Vec::new()));
    };
    let grid = monthly_grid(first, last);

    let observations = match method {
        ResampleMethod::ForwardFill => forward_fill(&series.observations, &grid),
        ResampleMethod::Linear => linear(&series.observations, &grid),
    };

    Ok(ResampledSeries::new(series.indicator.clone(), observations))
}

/// Resample with a method given by name.
pub fn resample_named(series: &CleanedSeries, method: &str) -> Result<ResampledSeries, ResampleError> {
    resample(series, method.parse()?)
}

fn check_ascending(observations: &[Observation]) -> Result<(), ResampleError> {
    for pair in observations.windows(2) {
        let (prev, next) = (pair[0].date, pair[1].date);
        if next == prev {
            return Err(ResampleError::DuplicateInputDates { date: next });
        }
        if next < prev {
            return Err(ResampleError::UnsortedInput { date: next });
        }
    }
    Ok(())
}

fn forward_fill(observations: &[Observation], grid: &[NaiveDate]) -> Vec<Observation> {
    let mut out = Vec::with_capacity(grid.len());
    let mut idx = 0;
    let mut current: Option<f64> = None;

    for &point in grid {
        while idx < observations.len() && observations[idx].date <= point {
            current = Some(observations[idx].value);
            idx += 1;
        }
        if let Some(value) = current {
            out.push(Observation::new(point, value));
        }
    }
    out
}

fn linear(observations: &[Observation], grid: &[NaiveDate]) -> Vec<Observation> {
    let mut out = Vec::with_capacity(grid.len());
    // Index of the last observation at or before the grid point.
    let mut left = 0;

    for &point in grid {
        while left + 1 < observations.len() && observations[left + 1].date <= point {
            left += 1;
        }
        let lo = observations[left];
        if point < lo.date {
            continue;
        }
        if point == lo.date {
            out.push(Observation::new(point, lo.value));
            continue;
        }
        let Some(hi) = observations.get(left + 1) else {
            // Past the last observation.
            continue;
        };
        let span = (hi.date - lo.date).num_days() as f64;
        let offset = (point - lo.date).num_days() as f64;
        // Weighted form stays finite where `hi - lo` would overflow.
        let t = offset / span;
        let value = lo.value * (1.0 - t) + hi.value * t;
        out.push(Observation::new(point, value));
    }
    out
}
