//! MergedTable — the wide, date-keyed result of the outer join.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::observation::{Indicator, Observation};
use super::series::ResampledSeries;
use crate::data::provider::DATE_FIELD;

/// One indicator's column, positionally aligned with [`MergedTable::dates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableColumn {
    pub indicator: Indicator,
    pub values: Vec<Option<f64>>,
}

impl TableColumn {
    /// Number of absent cells.
    pub fn missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Wide table: a strictly ascending date axis plus one column per indicator.
///
/// Column order is the order the series were handed to the merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTable {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<TableColumn>,
}

impl MergedTable {
    /// Number of rows (dates).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of indicator columns (excluding the date column).
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Header row: the date field name followed by each indicator name.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(DATE_FIELD.to_string())
            .chain(self.columns.iter().map(|c| c.indicator.name.clone()))
            .collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.indicator.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.indicator.name == name)
    }

    /// Cell lookup by date and column name.
    pub fn value(&self, date: NaiveDate, name: &str) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        self.column(name)?.values.get(row).copied().flatten()
    }

    /// Row `i` as (date, cells in column order).
    pub fn row(&self, i: usize) -> Option<(NaiveDate, Vec<Option<f64>>)> {
        let date = *self.dates.get(i)?;
        let cells = self
            .columns
            .iter()
            .map(|c| c.values.get(i).copied().flatten())
            .collect();
        Some((date, cells))
    }

    /// Project one column back out as a series of its present cells.
    pub fn project(&self, name: &str) -> Option<ResampledSeries> {
        let column = self.column(name)?;
        let observations = self
            .dates
            .iter()
            .zip(&column.values)
            .filter_map(|(date, value)| value.map(|v| Observation::new(*date, v)))
            .collect();
        Some(ResampledSeries::new(column.indicator.clone(), observations))
    }
}
