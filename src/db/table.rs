use crate::types::{EntityKind, EventStatus, EventType, SelectionOutcome};

/// Storage type of a column, which decides how JSON input is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Bool,
    SmallInt,
    /// Small integer that must be >= 1.
    PositiveSmallInt,
    /// Fixed-point with 2 fractional digits, stored as integer hundredths.
    Price,
    Timestamp,
    /// One of a closed set of uppercase values.
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Accepted from caller input by upsert.
    pub writable: bool,
}

const fn col(name: &'static str, kind: ColumnKind, writable: bool) -> Column {
    Column { name, kind, writable }
}

#[derive(Debug)]
pub struct TableDef {
    pub kind: EntityKind,
    pub name: &'static str,
    /// Alias used in generated SELECTs.
    pub prefix: &'static str,
    /// Foreign-key column pointing at the parent table.
    pub parent_column: Option<&'static str>,
    pub columns: &'static [Column],
}

pub const ID: &str = "id";
pub const NAME: &str = "name";
pub const SLUG: &str = "slug";
pub const IS_ACTIVE: &str = "is_active";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

static SPORT: TableDef = TableDef {
    kind: EntityKind::Sport,
    name: "sport",
    prefix: "s",
    parent_column: None,
    columns: &[
        col(ID, ColumnKind::Uuid, false),
        col(NAME, ColumnKind::Text, true),
        col("display_name", ColumnKind::Text, true),
        col(SLUG, ColumnKind::Text, false),
        col("order", ColumnKind::SmallInt, true),
        col(IS_ACTIVE, ColumnKind::Bool, true),
        col(CREATED_AT, ColumnKind::Timestamp, false),
        col(UPDATED_AT, ColumnKind::Timestamp, false),
    ],
};

static EVENT: TableDef = TableDef {
    kind: EntityKind::Event,
    name: "event",
    prefix: "e",
    parent_column: Some("sport_id"),
    columns: &[
        col(ID, ColumnKind::Uuid, false),
        col("sport_id", ColumnKind::Uuid, true),
        col(NAME, ColumnKind::Text, true),
        col("display_name", ColumnKind::Text, true),
        col(SLUG, ColumnKind::Text, false),
        col("type", ColumnKind::Enum(EventType::VALUES), true),
        col("status", ColumnKind::Enum(EventStatus::VALUES), true),
        col(IS_ACTIVE, ColumnKind::Bool, true),
        col(CREATED_AT, ColumnKind::Timestamp, false),
        col(UPDATED_AT, ColumnKind::Timestamp, false),
    ],
};

static MARKET: TableDef = TableDef {
    kind: EntityKind::Market,
    name: "market",
    prefix: "m",
    parent_column: Some("event_id"),
    columns: &[
        col(ID, ColumnKind::Uuid, false),
        col("event_id", ColumnKind::Uuid, true),
        col(NAME, ColumnKind::Text, true),
        col("display_name", ColumnKind::Text, true),
        col(SLUG, ColumnKind::Text, false),
        col("order", ColumnKind::SmallInt, true),
        col("schema", ColumnKind::SmallInt, true),
        col("columns", ColumnKind::PositiveSmallInt, true),
        col(IS_ACTIVE, ColumnKind::Bool, true),
        col(CREATED_AT, ColumnKind::Timestamp, false),
        col(UPDATED_AT, ColumnKind::Timestamp, false),
    ],
};

static SELECTION: TableDef = TableDef {
    kind: EntityKind::Selection,
    name: "selection",
    prefix: "sel",
    parent_column: Some("market_id"),
    columns: &[
        col(ID, ColumnKind::Uuid, false),
        col("market_id", ColumnKind::Uuid, true),
        col(NAME, ColumnKind::Text, true),
        col("display_name", ColumnKind::Text, true),
        col(SLUG, ColumnKind::Text, false),
        col("price", ColumnKind::Price, true),
        col("outcome", ColumnKind::Enum(SelectionOutcome::VALUES), true),
        col(IS_ACTIVE, ColumnKind::Bool, true),
        col(CREATED_AT, ColumnKind::Timestamp, false),
        col(UPDATED_AT, ColumnKind::Timestamp, false),
    ],
};

/// Static table definition for each entity kind.
pub fn table(kind: EntityKind) -> &'static TableDef {
    match kind {
        EntityKind::Sport => &SPORT,
        EntityKind::Event => &EVENT,
        EntityKind::Market => &MARKET,
        EntityKind::Selection => &SELECTION,
    }
}

/// Double-quoted identifier. Only ever called with names from the static
/// definitions above; several of them (`order`, `type`) are SQL keywords.
pub fn quoted(name: &str) -> String {
    format!("\"{name}\"")
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn parent(&self) -> Option<&'static TableDef> {
        self.kind.parent().map(table)
    }

    pub fn child(&self) -> Option<&'static TableDef> {
        self.kind.child().map(table)
    }

    /// `prefix."column"`
    pub fn qualified(&self, column: &Column) -> String {
        format!("{}.{}", self.prefix, quoted(column.name))
    }

    /// Every column, prefix-qualified and aliased back to its bare name so
    /// rows decode with `FromRow`.
    pub fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} AS {}", self.qualified(c), quoted(c.name)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_child_table_points_at_its_parent() {
        for kind in EntityKind::ALL {
            let def = table(kind);
            assert_eq!(def.kind, kind);
            match def.parent() {
                Some(parent) => {
                    let fk = def.parent_column.expect("child tables carry a parent column");
                    assert_eq!(fk, format!("{}_id", parent.name));
                    assert!(def.column(fk).is_some_and(|c| c.writable));
                }
                None => assert!(def.parent_column.is_none()),
            }
        }
    }

    #[test]
    fn derived_columns_are_not_writable() {
        for kind in EntityKind::ALL {
            let def = table(kind);
            for name in [ID, SLUG, CREATED_AT, UPDATED_AT] {
                assert!(!def.column(name).unwrap().writable, "{}.{name}", def.name);
            }
        }
    }

    #[test]
    fn select_list_quotes_keywords() {
        let list = table(EntityKind::Market).select_list();
        assert!(list.starts_with(r#"m."id" AS "id", m."event_id" AS "event_id""#));
        assert!(list.contains(r#"m."order" AS "order""#));
    }
}
