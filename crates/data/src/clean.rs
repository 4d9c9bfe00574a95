//! Value cleaning for warehouse columns.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use market_warehouse_core::RawValue;

use crate::relaxed_json::parse_field;

/// Bound for liquidity and volume metrics (`NUMERIC(20,10)` integer range).
pub const VOLUME_BOUND: f64 = 1e10;
/// Bound for prices, spreads and scores in `[0, 1]`.
pub const PRICE_BOUND: f64 = 1.0;
/// Bound for relative price changes.
pub const PRICE_CHANGE_BOUND: f64 = 10.0;
/// Bound for fee rates.
pub const FEE_BOUND: f64 = 1000.0;
/// Outcome prices beyond this magnitude are treated as sentinels.
pub const OUTCOME_PRICE_SANITY: f64 = 10.0;

/// Why [`clean_numeric`] dropped a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unparseable,
    OutOfBounds,
}

/// Parses a numeric field, rejecting values with `abs(value) >= bound`.
///
/// Numbers and numeric strings are accepted. Booleans, nested values and
/// non-finite numbers are not numeric.
pub fn clean_numeric_checked(value: Option<&RawValue>, bound: f64) -> Result<Option<f64>, Rejection> {
    let parsed = match value {
        None | Some(RawValue::Null) => return Ok(None),
        Some(RawValue::Int(i)) => *i as f64,
        Some(RawValue::Float(f)) => *f,
        Some(RawValue::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>().map_err(|_| Rejection::Unparseable)?
        }
        Some(_) => return Err(Rejection::Unparseable),
    };
    if !parsed.is_finite() {
        return Err(Rejection::Unparseable);
    }
    if parsed.abs() >= bound {
        return Err(Rejection::OutOfBounds);
    }
    Ok(Some(parsed))
}

/// [`clean_numeric_checked`] collapsed to an option.
#[must_use]
pub fn clean_numeric(value: Option<&RawValue>, bound: f64) -> Option<f64> {
    clean_numeric_checked(value, bound).ok().flatten()
}

/// Drops nulls and blank strings.
#[must_use]
pub fn clean_value(value: Option<&RawValue>) -> Option<&RawValue> {
    match value? {
        RawValue::Null => None,
        RawValue::String(s) if s.trim().is_empty() => None,
        other => Some(other),
    }
}

/// Text form of a scalar field.
#[must_use]
pub fn clean_text(value: Option<&RawValue>) -> Option<String> {
    match clean_value(value)? {
        RawValue::String(s) => Some(s.trim().to_string()),
        RawValue::List(_) | RawValue::Map(_) => None,
        other => other.as_key(),
    }
}

/// Boolean field; accepts `true`/`false` strings and 0/1 numbers.
#[must_use]
pub fn clean_bool(value: Option<&RawValue>) -> Option<bool> {
    match clean_value(value)? {
        RawValue::Bool(b) => Some(*b),
        RawValue::Int(0) => Some(false),
        RawValue::Int(1) => Some(true),
        RawValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Timestamp field; RFC 3339, `YYYY-MM-DD HH:MM:SS[+zz]` or a bare date.
#[must_use]
pub fn clean_timestamp(value: Option<&RawValue>) -> Option<DateTime<Utc>> {
    let text = clean_text(value)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(&text, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Calendar date of a timestamp field, in UTC.
#[must_use]
pub fn clean_date(value: Option<&RawValue>) -> Option<NaiveDate> {
    clean_timestamp(value).map(|ts| ts.date_naive())
}

/// Re-encodes a nested field as JSON, decoding text-encoded values first.
#[must_use]
pub fn clean_json(value: Option<&RawValue>) -> Option<serde_json::Value> {
    parse_field(value).map(|v| v.to_json())
}

/// Splits an outcome price pair into yes/no prices.
///
/// Accepts a list or its text encoding. Each price is parsed on its own;
/// prices whose magnitude exceeds [`OUTCOME_PRICE_SANITY`] become `None`.
#[must_use]
pub fn outcome_prices(value: Option<&RawValue>) -> (Option<f64>, Option<f64>) {
    let Some(RawValue::List(prices)) = parse_field(value) else {
        return (None, None);
    };
    let price = |i: usize| {
        clean_numeric(prices.get(i), VOLUME_BOUND).filter(|p| p.abs() <= OUTCOME_PRICE_SANITY)
    };
    (price(0), price(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_clean_numeric_bounds() {
        let big = RawValue::from("15000000000");
        let ok = RawValue::from("42.5");
        assert_eq!(clean_numeric(Some(&big), VOLUME_BOUND), None);
        assert_eq!(clean_numeric(Some(&ok), VOLUME_BOUND), Some(42.5));
        assert_eq!(
            clean_numeric_checked(Some(&big), VOLUME_BOUND),
            Err(Rejection::OutOfBounds)
        );
    }

    #[test]
    fn test_bound_is_exclusive() {
        assert_eq!(clean_numeric(Some(&RawValue::Float(1.0)), PRICE_BOUND), None);
        assert_eq!(
            clean_numeric(Some(&RawValue::Float(-0.99)), PRICE_BOUND),
            Some(-0.99)
        );
    }

    #[test]
    fn test_clean_numeric_rejects_non_numbers() {
        assert_eq!(clean_numeric(None, VOLUME_BOUND), None);
        assert_eq!(clean_numeric(Some(&RawValue::Bool(true)), VOLUME_BOUND), None);
        assert_eq!(clean_numeric(Some(&RawValue::from("abc")), VOLUME_BOUND), None);
        assert_eq!(clean_numeric(Some(&RawValue::from("NaN")), VOLUME_BOUND), None);
        assert_eq!(clean_numeric(Some(&RawValue::Int(12)), VOLUME_BOUND), Some(12.0));
    }

    #[test]
    fn test_clean_value_blank_strings() {
        assert!(clean_value(Some(&RawValue::from("  "))).is_none());
        assert!(clean_value(Some(&RawValue::Null)).is_none());
        assert!(clean_value(Some(&RawValue::from("x"))).is_some());
    }

    #[test]
    fn test_clean_bool_forms() {
        assert_eq!(clean_bool(Some(&RawValue::Bool(false))), Some(false));
        assert_eq!(clean_bool(Some(&RawValue::from("True"))), Some(true));
        assert_eq!(clean_bool(Some(&RawValue::Int(1))), Some(true));
        assert_eq!(clean_bool(Some(&RawValue::from("maybe"))), None);
    }

    #[test]
    fn test_clean_timestamp_formats() {
        let rfc = clean_timestamp(Some(&RawValue::from("2024-11-05T12:30:00Z"))).unwrap();
        assert_eq!((rfc.hour(), rfc.minute()), (12, 30));

        let offset = clean_timestamp(Some(&RawValue::from("2024-11-05 12:30:00+00"))).unwrap();
        assert_eq!(offset, rfc);

        let date = clean_date(Some(&RawValue::from("2023-02-28"))).unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 2, 28));

        assert!(clean_timestamp(Some(&RawValue::from("soon"))).is_none());
    }

    #[test]
    fn test_outcome_prices() {
        let text = RawValue::from(r#"["0.65", "0.35"]"#);
        assert_eq!(outcome_prices(Some(&text)), (Some(0.65), Some(0.35)));

        let sentinel = RawValue::List(vec![RawValue::Float(0.4), RawValue::Float(99.0)]);
        assert_eq!(outcome_prices(Some(&sentinel)), (Some(0.4), None));

        let single = RawValue::from("['1']");
        assert_eq!(outcome_prices(Some(&single)), (Some(1.0), None));

        assert_eq!(outcome_prices(Some(&RawValue::from("n/a"))), (None, None));
    }

    #[test]
    fn test_outcome_prices_reject_negative_sentinels() {
        let huge = RawValue::from(r#"["-20000000000", "0.5"]"#);
        assert_eq!(outcome_prices(Some(&huge)), (None, Some(0.5)));

        let negative = RawValue::List(vec![RawValue::Float(-11.0), RawValue::Float(-0.25)]);
        assert_eq!(outcome_prices(Some(&negative)), (None, Some(-0.25)));
    }
}
