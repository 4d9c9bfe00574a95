//! Calendar rows for `dim_time`.

use chrono::{Datelike, NaiveDate};

use crate::models::TimeRow;

/// Builds the row for one calendar day. Fiscal periods follow the calendar.
#[must_use]
pub fn time_row(date: NaiveDate) -> TimeRow {
    let month = date.month();
    let quarter = ((month - 1) / 3 + 1) as i32;
    let day = date.day();
    let weekday = date.weekday().num_days_from_monday() as i32;
    let is_month_end = date.succ_opt().map_or(true, |next| next.month() != month);

    TimeRow {
        date_value: date,
        year: date.year(),
        quarter,
        month: month as i32,
        month_name: date.format("%B").to_string(),
        week_of_year: date.iso_week().week() as i32,
        day_of_month: day as i32,
        day_of_week: weekday,
        day_name: date.format("%A").to_string(),
        is_weekend: weekday >= 5,
        is_month_start: day == 1,
        is_month_end,
        is_quarter_start: day == 1 && matches!(month, 1 | 4 | 7 | 10),
        is_quarter_end: is_month_end && matches!(month, 3 | 6 | 9 | 12),
        is_year_start: day == 1 && month == 1,
        is_year_end: day == 31 && month == 12,
        fiscal_year: date.year(),
        fiscal_quarter: quarter,
    }
}

/// One row per day in `start..=end`; empty when the range is inverted.
#[must_use]
pub fn time_rows(start: NaiveDate, end: NaiveDate) -> Vec<TimeRow> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(time_row)
        .collect()
}
