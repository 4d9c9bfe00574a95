use chrono::NaiveDate;

/// One calendar day of `dim_time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub date_value: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    pub month: i32,
    pub month_name: String,
    /// ISO 8601 week number.
    pub week_of_year: i32,
    pub day_of_month: i32,
    /// Monday is 0.
    pub day_of_week: i32,
    pub day_name: String,
    pub is_weekend: bool,
    pub is_month_start: bool,
    pub is_month_end: bool,
    pub is_quarter_start: bool,
    pub is_quarter_end: bool,
    pub is_year_start: bool,
    pub is_year_end: bool,
    pub fiscal_year: i32,
    pub fiscal_quarter: i32,
}
