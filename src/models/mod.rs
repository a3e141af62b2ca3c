//! Typed views over the schema-less records kept in the realtime database.
//!
//! Records are written by several clients and carry no enforced schema, so
//! every view here is built leniently: a missing or mistyped field falls
//! back to a safe default instead of failing the whole record.

pub mod images;
pub mod property;
pub mod request;
pub mod transaction;
pub mod user;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

pub use property::{Agent, Property};
pub use request::PropertyRequest;
pub use transaction::{NewTransaction, Transaction, TransactionStatus};
pub use user::{User, UserKind, UserProfile};

/// Fallback label for missing grouping fields (location, type)
pub const UNKNOWN: &str = "Unknown";

/// Non-empty string field. Empty strings count as absent.
pub(crate) fn str_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn string_field(record: &Value, key: &str) -> Option<String> {
    str_field(record, key).map(str::to_string)
}

/// Number of children of a map field, 0 when absent or not a map
pub(crate) fn map_len(record: &Value, key: &str) -> usize {
    record
        .get(key)
        .and_then(Value::as_object)
        .map(Map::len)
        .unwrap_or(0)
}

/// Numeric coercion for plain numeric fields (`amount`, `points`).
///
/// Numbers pass through, numeric strings are parsed, anything else is 0.
pub(crate) fn number_field(record: &Value, key: &str) -> f64 {
    match record.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Normalizes a rent value to a number.
///
/// Strings are cleaned by dropping every character that is not a digit or a
/// decimal point, then the longest leading decimal is parsed. Missing or
/// unparsable rent is 0.
pub fn normalize_rent(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            parse_leading_decimal(&cleaned).unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// Parses `digits[.digits]` from the start of an already-cleaned string
fn parse_leading_decimal(cleaned: &str) -> Option<f64> {
    let end = match cleaned.match_indices('.').nth(1) {
        Some((second_dot, _)) => second_dot,
        None => cleaned.len(),
    };
    cleaned[..end].parse::<f64>().ok()
}

/// Parses a record timestamp.
///
/// Accepts RFC 3339 strings, naive ISO date-times and dates (read as UTC),
/// and epoch milliseconds. Anything else is `None`.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
            }
            s.parse::<i64>().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// First parseable timestamp among `keys`
pub(crate) fn timestamp_field(record: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(parse_timestamp)
}
