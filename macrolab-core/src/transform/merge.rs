//! Merger: outer join of resampled series into a [`MergedTable`].
//!
//! Date axis = union of every input's dates (BTreeSet, so sorted and unique).
//! Cells are looked up per series; a date a series lacks stays absent.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{MergedTable, ResampledSeries, TableColumn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("empty input: no series to merge")]
    EmptyInput,

    #[error("duplicate column '{name}': indicator names must be unique")]
    DuplicateColumn { name: String },
}

/// Outer-join the series. Column order follows input order.
pub fn merge(series: &[ResampledSeries]) -> Result<MergedTable, MergeError> {
    if series.is_empty() {
        return Err(MergeError::EmptyInput);
    }

    let mut names = HashSet::new();
    for s in series {
        if !names.insert(s.indicator.name.as_str()) {
            return Err(MergeError::DuplicateColumn {
                name: s.indicator.name.clone(),
            });
        }
    }

    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.dates())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns = series
        .iter()
        .map(|s| {
            let lookup: HashMap<NaiveDate, f64> =
                s.observations.iter().map(|o| (o.date, o.value)).collect();
            TableColumn {
                indicator: s.indicator.clone(),
                values: dates.iter().map(|d| lookup.get(d).copied()).collect(),
            }
        })
        .collect();

    Ok(MergedTable { dates, columns })
}
