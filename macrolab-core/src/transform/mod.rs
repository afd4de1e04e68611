//! The alignment pipeline: clean → resample → merge.

pub mod clean;
pub mod merge;
pub mod resample;

pub use clean::{parse_date, parse_value, CleanStats, Cleaner, DataError};
pub use merge::{merge, MergeError};
pub use resample::{resample, resample_named, ResampleError, ResampleMethod};
