//! Month-end calendar arithmetic for the monthly grid.

use chrono::{Datelike, Months, NaiveDate};

/// Last calendar day of the month containing `date`.
///
/// Returns `None` only at the very edge of chrono's representable range.
pub fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// Whether `date` is the last day of its month.
pub fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == Some(date)
}

/// Month-end following the month of `date`.
pub fn next_month_end(date: NaiveDate) -> Option<NaiveDate> {
    month_end(date.with_day(1)?.checked_add_months(Months::new(1))?)
}

/// Every month-end from the month of `first` to the month of `last`, inclusive.
///
/// Empty when `first > last`.
pub fn monthly_grid(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut grid = Vec::new();
    if first > last {
        return grid;
    }
    let Some(stop) = month_end(last) else {
        return grid;
    };

    let mut current = month_end(first);
    while let Some(point) = current {
        if point > stop {
            break;
        }
        grid.push(point);
        current = next_month_end(point);
    }
    grid
}
