use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::config::{NAME_MAX_LEN, PRICE_MAX_CENTS};
use crate::db::models::encode_timestamp;
use crate::db::table::{Column, ColumnKind};

/// A value ready to be bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn push_bind(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            SqlValue::Null => qb.push_bind(Option::<String>::None),
            SqlValue::Bool(v) => qb.push_bind(v),
            SqlValue::Int(v) => qb.push_bind(v),
            SqlValue::Real(v) => qb.push_bind(v),
            SqlValue::Text(v) => qb.push_bind(v),
        };
    }
}

/// How strictly caller JSON is matched against a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Upsert input: exact JSON types, range and length checks.
    Write,
    /// Search input: scalars are converted where the meaning is obvious.
    Filter,
}

/// Convert one JSON value into the stored representation of `column`.
pub fn coerce(column: &Column, value: &Value, mode: Mode) -> Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let name = column.name;
    match column.kind {
        ColumnKind::Uuid => match (value, mode) {
            (Value::String(s), Mode::Write) => Uuid::parse_str(s.trim())
                .map(|id| SqlValue::Text(id.hyphenated().to_string()))
                .map_err(|_| format!("{name} must be a uuid")),
            (_, Mode::Write) => Err(format!("{name} must be a uuid string")),
            (v, Mode::Filter) => scalar_text(v)
                .map(|s| SqlValue::Text(s.to_lowercase()))
                .ok_or_else(|| format!("{name} needs a scalar value")),
        },
        ColumnKind::Timestamp if mode == Mode::Filter => time_span(value)
            .map(|span| SqlValue::Text(span.start))
            .map_err(|e| format!("{name} {e}")),
        ColumnKind::Text | ColumnKind::Timestamp => match (value, mode) {
            (Value::String(s), Mode::Write) if s.chars().count() > NAME_MAX_LEN => {
                Err(format!("{name} is longer than {NAME_MAX_LEN} characters"))
            }
            (Value::String(s), Mode::Write) => Ok(SqlValue::Text(s.clone())),
            (_, Mode::Write) => Err(format!("{name} must be a string")),
            (v, Mode::Filter) => scalar_text(v)
                .map(SqlValue::Text)
                .ok_or_else(|| format!("{name} needs a scalar value")),
        },
        ColumnKind::Bool => match (value, mode) {
            (Value::Bool(b), _) => Ok(SqlValue::Bool(*b)),
            (Value::String(s), Mode::Filter) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(format!("{name} must be a boolean")),
            },
            (Value::Number(n), Mode::Filter) => match n.as_i64() {
                Some(1) => Ok(SqlValue::Bool(true)),
                Some(0) => Ok(SqlValue::Bool(false)),
                _ => Err(format!("{name} must be a boolean")),
            },
            _ => Err(format!("{name} must be a boolean")),
        },
        ColumnKind::SmallInt | ColumnKind::PositiveSmallInt => {
            let min = if column.kind == ColumnKind::PositiveSmallInt { 1 } else { i64::from(i16::MIN) };
            match (value, mode) {
                (Value::Number(n), Mode::Write) => match n.as_i64() {
                    Some(i) if (min..=i64::from(i16::MAX)).contains(&i) => Ok(SqlValue::Int(i)),
                    Some(_) => Err(format!("{name} must be between {min} and {}", i16::MAX)),
                    None => Err(format!("{name} must be an integer")),
                },
                (_, Mode::Write) => Err(format!("{name} must be an integer")),
                (v, Mode::Filter) => filter_number(v).ok_or_else(|| format!("{name} must be numeric")),
            }
        }
        ColumnKind::Price => {
            let price = decimal(value).ok_or_else(|| format!("{name} must be a decimal number"))?;
            let cents = price * Decimal::ONE_HUNDRED;
            match mode {
                Mode::Write => {
                    let cents = cents
                        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                        .to_i64()
                        .filter(|c| c.abs() <= PRICE_MAX_CENTS)
                        .ok_or_else(|| format!("{name} is out of range"))?;
                    Ok(SqlValue::Int(cents))
                }
                // A filter bound like 10.005 is compared exactly, not rounded.
                Mode::Filter if cents.fract().is_zero() => cents
                    .to_i64()
                    .map(SqlValue::Int)
                    .ok_or_else(|| format!("{name} is out of range")),
                Mode::Filter => cents
                    .to_f64()
                    .map(SqlValue::Real)
                    .ok_or_else(|| format!("{name} is out of range")),
            }
        }
        ColumnKind::Enum(values) => {
            let text = match (value, mode) {
                (Value::String(s), _) => s.trim().to_uppercase(),
                (_, Mode::Write) => return Err(format!("{name} must be a string")),
                (v, Mode::Filter) => scalar_text(v)
                    .map(|s| s.to_uppercase())
                    .ok_or_else(|| format!("{name} needs a scalar value"))?,
            };
            if mode == Mode::Write && !values.contains(&text.as_str()) {
                return Err(format!("{name} must be one of {}", values.join(", ")));
            }
            Ok(SqlValue::Text(text))
        }
    }
}

/// The stretch of time a filter value names, as stored text bounds: a date
/// covers its whole day, `2024-05-01 18:30` its whole minute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpan {
    pub start: String,
    /// Exclusive.
    pub end: String,
}

const MINUTE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
const SECOND_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const FRACTION_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn time_span(value: &Value) -> Result<TimeSpan, String> {
    let text = value
        .as_str()
        .map(str::trim)
        .ok_or_else(|| "must be a date or time string".to_string())?;
    let (start, width) = parse_instant(text).ok_or_else(|| format!("'{text}' is not a date or time"))?;
    Ok(TimeSpan {
        start: encode_timestamp(start),
        end: encode_timestamp(start + width),
    })
}

/// UTC instant plus the precision the caller wrote it with. Naive forms are
/// taken as UTC, like the printed records.
fn parse_instant(text: &str) -> Option<(DateTime<Utc>, Duration)> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some((date.and_hms_opt(0, 0, 0)?.and_utc(), Duration::days(1)));
    }
    let naive = |formats: &[&str]| {
        formats
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
            .map(|n| n.and_utc())
    };
    if let Some(ts) = naive(MINUTE_FORMATS) {
        return Some((ts, Duration::minutes(1)));
    }
    if let Some(ts) = naive(SECOND_FORMATS) {
        return Some((ts, Duration::seconds(1)));
    }
    if let Some(ts) = naive(FRACTION_FORMATS) {
        return Some((ts, Duration::microseconds(1)));
    }
    let ts = DateTime::parse_from_rfc3339(text).ok()?.with_timezone(&Utc);
    let width = if ts.timestamp_subsec_nanos() == 0 {
        Duration::seconds(1)
    } else {
        Duration::microseconds(1)
    };
    Some((ts, width))
}

/// Text form of a JSON scalar, as used by pattern operators.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn filter_number(value: &Value) -> Option<SqlValue> {
    let number = match value {
        Value::Number(n) => n.clone(),
        Value::String(s) => serde_json::Number::from_str(s.trim()).ok()?,
        _ => return None,
    };
    number
        .as_i64()
        .map(SqlValue::Int)
        .or_else(|| number.as_f64().map(SqlValue::Real))
}

/// Exact decimal parse of a JSON number or numeric string.
fn decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table::table;
    use crate::types::EntityKind;
    use serde_json::json;

    fn column(kind: EntityKind, name: &str) -> &'static Column {
        table(kind).column(name).unwrap()
    }

    #[test]
    fn enum_values_are_uppercased_then_checked() {
        let ty = column(EntityKind::Event, "type");
        assert_eq!(coerce(ty, &json!("inplay"), Mode::Write), Ok(SqlValue::Text("INPLAY".into())));
        assert!(coerce(ty, &json!("live"), Mode::Write).is_err());
        // Filters don't validate; an unknown value simply matches nothing.
        assert_eq!(coerce(ty, &json!("live"), Mode::Filter), Ok(SqlValue::Text("LIVE".into())));
    }

    #[test]
    fn prices_round_to_hundredths() {
        let price = column(EntityKind::Selection, "price");
        assert_eq!(coerce(price, &json!(10.01), Mode::Write), Ok(SqlValue::Int(1001)));
        assert_eq!(coerce(price, &json!("2.345"), Mode::Write), Ok(SqlValue::Int(235)));
        assert_eq!(coerce(price, &json!(3), Mode::Write), Ok(SqlValue::Int(300)));
        assert!(coerce(price, &json!(100_000_000), Mode::Write).is_err());
        assert!(coerce(price, &json!("cheap"), Mode::Write).is_err());
    }

    #[test]
    fn filter_prices_keep_fractional_cents() {
        let price = column(EntityKind::Selection, "price");
        assert_eq!(coerce(price, &json!(1), Mode::Filter), Ok(SqlValue::Int(100)));
        assert_eq!(coerce(price, &json!(10.005), Mode::Filter), Ok(SqlValue::Real(1000.5)));
    }

    #[test]
    fn small_ints_are_range_checked_on_write() {
        let columns = column(EntityKind::Market, "columns");
        assert_eq!(coerce(columns, &json!(5), Mode::Write), Ok(SqlValue::Int(5)));
        assert!(coerce(columns, &json!(0), Mode::Write).is_err());
        assert!(coerce(columns, &json!(40_000), Mode::Write).is_err());
        assert!(coerce(columns, &json!("5"), Mode::Write).is_err());
        assert_eq!(coerce(columns, &json!("5"), Mode::Filter), Ok(SqlValue::Int(5)));
    }

    #[test]
    fn text_is_length_limited_on_write() {
        let name = column(EntityKind::Sport, "name");
        let long = "x".repeat(NAME_MAX_LEN + 1);
        assert!(coerce(name, &json!(long), Mode::Write).is_err());
        assert!(coerce(name, &json!(42), Mode::Write).is_err());
        assert_eq!(coerce(name, &json!(42), Mode::Filter), Ok(SqlValue::Text("42".into())));
    }

    #[test]
    fn booleans_accept_common_spellings_in_filters() {
        let active = column(EntityKind::Sport, "is_active");
        assert_eq!(coerce(active, &json!("true"), Mode::Filter), Ok(SqlValue::Bool(true)));
        assert_eq!(coerce(active, &json!(0), Mode::Filter), Ok(SqlValue::Bool(false)));
        assert!(coerce(active, &json!("yes"), Mode::Write).is_err());
    }

    #[test]
    fn parent_ids_must_be_uuids_on_write() {
        let sport_id = column(EntityKind::Event, "sport_id");
        let id = Uuid::new_v4();
        assert_eq!(
            coerce(sport_id, &json!(id.to_string().to_uppercase()), Mode::Write),
            Ok(SqlValue::Text(id.to_string()))
        );
        assert!(coerce(sport_id, &json!("nope"), Mode::Write).is_err());
    }

    #[test]
    fn printed_minutes_cover_the_whole_minute() {
        let span = time_span(&json!("2024-05-01 18:30")).unwrap();
        assert_eq!(span.start, "2024-05-01T18:30:00.000000Z");
        assert_eq!(span.end, "2024-05-01T18:31:00.000000Z");
    }

    #[test]
    fn dates_cover_the_whole_day() {
        let span = time_span(&json!("2024-12-31")).unwrap();
        assert_eq!(span.start, "2024-12-31T00:00:00.000000Z");
        assert_eq!(span.end, "2025-01-01T00:00:00.000000Z");
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let span = time_span(&json!("2024-05-01T20:30:15+02:00")).unwrap();
        assert_eq!(span.start, "2024-05-01T18:30:15.000000Z");
        assert_eq!(span.end, "2024-05-01T18:30:16.000000Z");

        let exact = time_span(&json!("2024-05-01T18:30:15.250000Z")).unwrap();
        assert_eq!(exact.end, "2024-05-01T18:30:15.250001Z");
    }

    #[test]
    fn filter_timestamps_must_parse() {
        let created = column(EntityKind::Sport, "created_at");
        assert!(coerce(created, &json!("yesterday"), Mode::Filter).is_err());
        assert!(coerce(created, &json!(1_700_000_000), Mode::Filter).is_err());
        assert_eq!(
            coerce(created, &json!("2024-05-01 18:30"), Mode::Filter),
            Ok(SqlValue::Text("2024-05-01T18:30:00.000000Z".into()))
        );
    }

    #[test]
    fn null_passes_through() {
        let outcome = column(EntityKind::Selection, "outcome");
        assert_eq!(coerce(outcome, &Value::Null, Mode::Write), Ok(SqlValue::Null));
    }
}
