use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::config::DISPLAY_TIME_FORMAT;

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// The four levels of the taxonomy, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sport,
    Event,
    Market,
    Selection,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Sport,
        EntityKind::Event,
        EntityKind::Market,
        EntityKind::Selection,
    ];

    pub fn parent(self) -> Option<EntityKind> {
        match self {
            EntityKind::Sport => None,
            EntityKind::Event => Some(EntityKind::Sport),
            EntityKind::Market => Some(EntityKind::Event),
            EntityKind::Selection => Some(EntityKind::Market),
        }
    }

    pub fn child(self) -> Option<EntityKind> {
        match self {
            EntityKind::Sport => Some(EntityKind::Event),
            EntityKind::Event => Some(EntityKind::Market),
            EntityKind::Market => Some(EntityKind::Selection),
            EntityKind::Selection => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Sport => "sport",
            EntityKind::Event => "event",
            EntityKind::Market => "market",
            EntityKind::Selection => "selection",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Enumerated column values
// ---------------------------------------------------------------------------

macro_rules! db_enum {
    ($(#[$meta:meta])* $name:ident, $type_name:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// Name of the enum type in the store.
            pub const TYPE_NAME: &'static str = $type_name;
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("'{other}' is not a valid {}", $type_name)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.as_str())
            }
        }
    };
}

db_enum!(
    /// Whether an event is being traded live or before kick-off.
    EventType, "eventtype", {
        Inplay => "INPLAY",
        Preplay => "PREPLAY",
    }
);

db_enum!(EventStatus, "eventstatus", {
    Inplay => "INPLAY",
    Preplay => "PREPLAY",
    Ended => "ENDED",
});

db_enum!(SelectionOutcome, "selectionoutcome", {
    Win => "WIN",
    Void => "VOID",
    Lose => "LOSE",
    Place => "PLACE",
    Unsettled => "UNSETTLED",
});

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sport {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    pub order: i16,
    pub is_active: bool,
    #[serde(serialize_with = "display_time")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "display_time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub sport_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub status: Option<EventStatus>,
    pub is_active: bool,
    #[serde(serialize_with = "display_time")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "display_time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Market {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    pub order: i16,
    pub schema: i16,
    pub columns: i16,
    pub is_active: bool,
    #[serde(serialize_with = "display_time")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "display_time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub id: Uuid,
    pub market_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub slug: String,
    pub price: Option<Decimal>,
    pub outcome: Option<SelectionOutcome>,
    pub is_active: bool,
    #[serde(serialize_with = "display_time")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "display_time")]
    pub updated_at: DateTime<Utc>,
}

/// Any taxonomy record, as returned by `search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Sport(Sport),
    Event(Event),
    Market(Market),
    Selection(Selection),
}

fn display_time<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format(DISPLAY_TIME_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hierarchy_links_both_ways() {
        for kind in EntityKind::ALL {
            if let Some(child) = kind.child() {
                assert_eq!(child.parent(), Some(kind));
            }
        }
        assert_eq!(EntityKind::Sport.parent(), None);
        assert_eq!(EntityKind::Selection.child(), None);
    }

    #[test]
    fn enum_values_parse_only_uppercase() {
        assert_eq!("INPLAY".parse::<EventType>(), Ok(EventType::Inplay));
        assert!("inplay".parse::<EventType>().is_err());
        assert_eq!("ENDED".parse::<EventStatus>(), Ok(EventStatus::Ended));
        assert_eq!(SelectionOutcome::VALUES.len(), 5);
        assert_eq!(SelectionOutcome::TYPE_NAME, "selectionoutcome");
    }

    #[test]
    fn records_print_minute_timestamps() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 59).unwrap();
        let event = Event {
            id: Uuid::nil(),
            sport_id: Uuid::nil(),
            name: "Final".into(),
            display_name: "The Final".into(),
            slug: "final".into(),
            event_type: Some(EventType::Preplay),
            status: None,
            is_active: true,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(Record::Event(event)).unwrap();
        assert_eq!(json["created_at"], "2024-05-01 18:30");
        assert_eq!(json["type"], "PREPLAY");
        assert!(json["status"].is_null());
    }
}
