//! Observation and Indicator — the fundamental data units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single dated value of one indicator.
///
/// `value` is always finite once it leaves the cleaner; absent values are
/// dropped rather than carried as NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// A named macroeconomic series plus the identifier its provider knows it by.
///
/// `name` is the display name and the merged-table column header
/// (e.g. "Real GDP"); `id` selects the source data (e.g. `realGDP`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub id: String,
}

impl Indicator {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// File stem used for per-indicator CSV files: spaces become underscores.
    ///
    /// "Real GDP" → "Real_GDP"
    pub fn file_stem(&self) -> String {
        self.name
            .trim()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect()
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
