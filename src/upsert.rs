use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use crate::cascade::{self, CascadeReport, Firing};
use crate::db::models::encode_timestamp;
use crate::db::table::{quoted, Column, TableDef, CREATED_AT, ID, IS_ACTIVE, NAME, SLUG, UPDATED_AT};
use crate::error::{AppError, Result};
use crate::query::value::{coerce, Mode, SqlValue};
use crate::slug::slugify;

#[derive(Debug)]
pub struct UpsertOutcome {
    pub id: Uuid,
    pub created: bool,
    pub cascade: CascadeReport,
}

/// Turn caller input into the column assignments to write. Keys that aren't
/// writable columns of `table` are ignored; `slug` is derived from `name`.
pub fn prepare(table: &'static TableDef, data: &Map<String, Value>) -> Result<Vec<(&'static Column, SqlValue)>> {
    let mut changes = Vec::new();
    for column in table.columns.iter().filter(|c| c.writable) {
        let Some(value) = data.get(column.name) else {
            continue;
        };
        let value = coerce(column, value, Mode::Write).map_err(AppError::Validation)?;
        changes.push((column, value));
    }

    if let Some(name) = data.get(NAME).and_then(Value::as_str).filter(|n| !n.is_empty()) {
        let slug = slugify(Some(name)).unwrap_or_default();
        if slug.is_empty() {
            return Err(AppError::Validation(format!(
                "name '{name}' needs at least one letter or digit"
            )));
        }
        if let Some(slug_column) = table.column(SLUG) {
            changes.push((slug_column, SqlValue::Text(slug)));
        }
    }
    Ok(changes)
}

/// Insert-or-merge `data` into the row `id` of `table`, then run the cascade
/// protocol for the write. Runs entirely on the caller's transaction.
pub async fn upsert(
    conn: &mut SqliteConnection,
    table: &'static TableDef,
    id: Uuid,
    data: &Map<String, Value>,
) -> Result<UpsertOutcome> {
    let changes = prepare(table, data)?;
    let id_text = id.hyphenated().to_string();
    let now = encode_timestamp(Utc::now());

    let prior: Option<bool> = sqlx::query_scalar(&format!(
        "SELECT {} FROM {} WHERE {} = ?",
        quoted(IS_ACTIVE),
        table.name,
        quoted(ID),
    ))
    .bind(id_text.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let mut qb = match prior {
        None => insert_statement(table, &id_text, &now, changes),
        Some(_) => update_statement(table, &id_text, &now, changes),
    };
    qb.build().execute(&mut *conn).await?;

    let current: bool = sqlx::query_scalar(&format!(
        "SELECT {} FROM {} WHERE {} = ?",
        quoted(IS_ACTIVE),
        table.name,
        quoted(ID),
    ))
    .bind(id_text.as_str())
    .fetch_one(&mut *conn)
    .await?;

    let cascade = match Firing::after_write(table.kind, id, prior, current) {
        Some(firing) => cascade::propagate(conn, firing, &now).await?,
        None => CascadeReport::default(),
    };

    debug!(
        entity = %table.kind,
        id = %id,
        created = prior.is_none(),
        is_active = current,
        firings = cascade.firings,
        "upsert applied",
    );
    Ok(UpsertOutcome { id, created: prior.is_none(), cascade })
}

fn insert_statement<'a>(
    table: &TableDef,
    id: &str,
    now: &str,
    changes: Vec<(&'static Column, SqlValue)>,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} ({}", table.name, quoted(ID)));
    for (column, _) in &changes {
        qb.push(format!(", {}", quoted(column.name)));
    }
    qb.push(format!(", {}, {}) VALUES (", quoted(CREATED_AT), quoted(UPDATED_AT)));
    qb.push_bind(id.to_string());
    for (_, value) in changes {
        qb.push(", ");
        value.push_bind(&mut qb);
    }
    qb.push(", ");
    qb.push_bind(now.to_string());
    qb.push(", ");
    qb.push_bind(now.to_string());
    qb.push(")");
    qb
}

/// Only supplied columns are written. `updated_at` never moves backwards,
/// even if the clock does.
fn update_statement<'a>(
    table: &TableDef,
    id: &str,
    now: &str,
    changes: Vec<(&'static Column, SqlValue)>,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", table.name));
    for (column, value) in changes {
        qb.push(format!("{} = ", quoted(column.name)));
        value.push_bind(&mut qb);
        qb.push(", ");
    }
    let updated_at = quoted(UPDATED_AT);
    qb.push(format!("{updated_at} = max({updated_at}, "));
    qb.push_bind(now.to_string());
    qb.push(format!(") WHERE {} = ", quoted(ID)));
    qb.push_bind(id.to_string());
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::table::table;
    use crate::types::EntityKind;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn names(changes: &[(&'static Column, SqlValue)]) -> Vec<&'static str> {
        changes.iter().map(|(c, _)| c.name).collect()
    }

    #[test]
    fn name_derives_slug() {
        let changes = prepare(table(EntityKind::Sport), &object(json!({"name": "Football Club!"}))).unwrap();
        assert_eq!(names(&changes), vec!["name", "slug"]);
        assert_eq!(changes[1].1, SqlValue::Text("football-club".into()));
    }

    #[test]
    fn id_slug_and_unknown_keys_are_ignored() {
        let changes = prepare(
            table(EntityKind::Sport),
            &object(json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "slug": "hand-picked",
                "created_at": "2000-01-01",
                "colour": "red",
                "order": 3
            })),
        )
        .unwrap();
        assert_eq!(names(&changes), vec!["order"]);
    }

    #[test]
    fn empty_name_keeps_existing_slug() {
        let changes = prepare(table(EntityKind::Market), &object(json!({"name": ""}))).unwrap();
        assert_eq!(names(&changes), vec!["name"]);
    }

    #[test]
    fn separator_only_name_is_rejected() {
        let err = prepare(table(EntityKind::Market), &object(json!({"name": "!!!"}))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn enums_are_uppercased() {
        let changes = prepare(
            table(EntityKind::Event),
            &object(json!({"type": "inplay", "status": "Ended"})),
        )
        .unwrap();
        assert_eq!(changes[0].1, SqlValue::Text("INPLAY".into()));
        assert_eq!(changes[1].1, SqlValue::Text("ENDED".into()));
    }

    #[test]
    fn wrong_types_are_validation_errors() {
        let err = prepare(table(EntityKind::Sport), &object(json!({"is_active": "yes"}))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn update_writes_only_supplied_columns() {
        let changes = prepare(table(EntityKind::Sport), &object(json!({"order": 2}))).unwrap();
        let qb = update_statement(table(EntityKind::Sport), "x", "now", changes);
        assert_eq!(
            qb.sql(),
            r#"UPDATE sport SET "order" = ?, "updated_at" = max("updated_at", ?) WHERE "id" = ?"#
        );
    }

    #[test]
    fn insert_stamps_both_timestamps() {
        let changes = prepare(table(EntityKind::Sport), &object(json!({"name": "Golf"}))).unwrap();
        let qb = insert_statement(table(EntityKind::Sport), "x", "now", changes);
        assert_eq!(
            qb.sql(),
            r#"INSERT INTO sport ("id", "name", "slug", "created_at", "updated_at") VALUES (?, ?, ?, ?, ?)"#
        );
    }
}
