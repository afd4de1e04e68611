//! Domain types for MacroLab

pub mod calendar;
pub mod observation;
pub mod series;
pub mod table;

pub use calendar::{is_month_end, month_end, monthly_grid, next_month_end};
pub use observation::{Indicator, Observation};
pub use series::{CleanedSeries, ResampledSeries};
pub use table::{MergedTable, TableColumn};
