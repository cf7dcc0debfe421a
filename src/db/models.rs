//! Row types as stored in SQLite, and their conversion into domain records.
//! Ids are hyphenated UUID text, timestamps fixed-width UTC text, prices
//! integer hundredths.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::STORED_TIME_FORMAT;
use crate::error::{AppError, Result};
use crate::types::{Event, Market, Record, Selection, Sport};

#[derive(Debug, sqlx::FromRow)]
pub struct SportRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    pub order: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
    pub id: String,
    pub sport_id: String,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    #[sqlx(rename = "type")]
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MarketRow {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    pub order: i64,
    pub schema: i64,
    pub columns: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SelectionRow {
    pub id: String,
    pub market_id: String,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    pub price: Option<i64>,
    pub outcome: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(STORED_TIME_FORMAT).to_string()
}

pub fn decode_timestamp(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, STORED_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| AppError::Corrupt(format!("timestamp '{text}': {e}")))
}

fn decode_id(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| AppError::Corrupt(format!("id '{text}': {e}")))
}

fn decode_small(value: i64, column: &str) -> Result<i16> {
    i16::try_from(value).map_err(|_| AppError::Corrupt(format!("{column} {value} out of range")))
}

fn decode_enum<T: std::str::FromStr<Err = String>>(text: Option<String>) -> Result<Option<T>> {
    text.map(|t| t.parse::<T>().map_err(AppError::Corrupt)).transpose()
}

impl TryFrom<SportRow> for Sport {
    type Error = AppError;

    fn try_from(row: SportRow) -> Result<Self> {
        Ok(Sport {
            id: decode_id(&row.id)?,
            name: row.name,
            display_name: row.display_name,
            slug: row.slug,
            order: decode_small(row.order, "order")?,
            is_active: row.is_active,
            created_at: decode_timestamp(&row.created_at)?,
            updated_at: decode_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = AppError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Event {
            id: decode_id(&row.id)?,
            sport_id: decode_id(&row.sport_id)?,
            name: row.name,
            display_name: row.display_name,
            slug: row.slug,
            event_type: decode_enum(row.event_type)?,
            status: decode_enum(row.status)?,
            is_active: row.is_active,
            created_at: decode_timestamp(&row.created_at)?,
            updated_at: decode_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<MarketRow> for Market {
    type Error = AppError;

    fn try_from(row: MarketRow) -> Result<Self> {
        Ok(Market {
            id: decode_id(&row.id)?,
            event_id: decode_id(&row.event_id)?,
            name: row.name,
            display_name: row.display_name,
            slug: row.slug,
            order: decode_small(row.order, "order")?,
            schema: decode_small(row.schema, "schema")?,
            columns: decode_small(row.columns, "columns")?,
            is_active: row.is_active,
            created_at: decode_timestamp(&row.created_at)?,
            updated_at: decode_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<SelectionRow> for Selection {
    type Error = AppError;

    fn try_from(row: SelectionRow) -> Result<Self> {
        Ok(Selection {
            id: decode_id(&row.id)?,
            market_id: decode_id(&row.market_id)?,
            name: row.name,
            display_name: row.display_name,
            slug: row.slug,
            price: row.price.map(|cents| Decimal::new(cents, 2)),
            outcome: decode_enum(row.outcome)?,
            is_active: row.is_active,
            created_at: decode_timestamp(&row.created_at)?,
            updated_at: decode_timestamp(&row.updated_at)?,
        })
    }
}

impl From<Sport> for Record {
    fn from(r: Sport) -> Self {
        Record::Sport(r)
    }
}

impl From<Event> for Record {
    fn from(r: Event) -> Self {
        Record::Event(r)
    }
}

impl From<Market> for Record {
    fn from(r: Market) -> Self {
        Record::Market(r)
    }
}

impl From<Selection> for Record {
    fn from(r: Selection) -> Self {
        Record::Selection(r)
    }
}
