use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{EventStatus, EventType, SelectionOutcome};

/// Enum types are lookup tables; enum columns reference them by foreign key.
const ENUM_TYPES: &[(&str, &[&str])] = &[
    (EventType::TYPE_NAME, EventType::VALUES),
    (EventStatus::TYPE_NAME, EventStatus::VALUES),
    (SelectionOutcome::TYPE_NAME, SelectionOutcome::VALUES),
];

/// Entity tables in dependency order.
const TABLES: &[(&str, &str)] = &[
    (
        "sport",
        r#"
        CREATE TABLE sport (
            "id"           TEXT PRIMARY KEY NOT NULL,
            "name"         TEXT NOT NULL CHECK (length("name") <= 100),
            "display_name" TEXT NOT NULL CHECK (length("display_name") <= 100),
            "slug"         TEXT NOT NULL UNIQUE,
            "order"        INTEGER NOT NULL,
            "is_active"    INTEGER NOT NULL DEFAULT 0 CHECK ("is_active" IN (0, 1)),
            "created_at"   TEXT NOT NULL,
            "updated_at"   TEXT NOT NULL
        )
        "#,
    ),
    (
        "event",
        r#"
        CREATE TABLE event (
            "id"           TEXT PRIMARY KEY NOT NULL,
            "sport_id"     TEXT NOT NULL
                           CONSTRAINT event_sport_id REFERENCES sport ("id") ON DELETE CASCADE,
            "name"         TEXT NOT NULL CHECK (length("name") <= 100),
            "display_name" TEXT NOT NULL CHECK (length("display_name") <= 100),
            "slug"         TEXT NOT NULL UNIQUE,
            "type"         TEXT REFERENCES eventtype ("value"),
            "status"       TEXT REFERENCES eventstatus ("value"),
            "is_active"    INTEGER NOT NULL DEFAULT 0 CHECK ("is_active" IN (0, 1)),
            "created_at"   TEXT NOT NULL,
            "updated_at"   TEXT NOT NULL
        );
        CREATE INDEX event_sport_id_idx ON event ("sport_id", "is_active")
        "#,
    ),
    (
        "market",
        r#"
        CREATE TABLE market (
            "id"           TEXT PRIMARY KEY NOT NULL,
            "event_id"     TEXT NOT NULL
                           CONSTRAINT market_event_id REFERENCES event ("id") ON DELETE CASCADE,
            "name"         TEXT NOT NULL CHECK (length("name") <= 100),
            "display_name" TEXT NOT NULL CHECK (length("display_name") <= 100),
            "slug"         TEXT NOT NULL UNIQUE,
            "order"        INTEGER NOT NULL,
            "schema"       INTEGER NOT NULL,
            "columns"      INTEGER NOT NULL CHECK ("columns" > 0),
            "is_active"    INTEGER NOT NULL DEFAULT 0 CHECK ("is_active" IN (0, 1)),
            "created_at"   TEXT NOT NULL,
            "updated_at"   TEXT NOT NULL
        );
        CREATE INDEX market_event_id_idx ON market ("event_id", "is_active")
        "#,
    ),
    (
        "selection",
        r#"
        CREATE TABLE selection (
            "id"           TEXT PRIMARY KEY NOT NULL,
            "market_id"    TEXT NOT NULL
                           CONSTRAINT selection_market_id REFERENCES market ("id") ON DELETE CASCADE,
            "name"         TEXT NOT NULL CHECK (length("name") <= 100),
            "display_name" TEXT NOT NULL CHECK (length("display_name") <= 100),
            "slug"         TEXT NOT NULL UNIQUE,
            "price"        INTEGER,
            "outcome"      TEXT REFERENCES selectionoutcome ("value"),
            "is_active"    INTEGER NOT NULL DEFAULT 0 CHECK ("is_active" IN (0, 1)),
            "created_at"   TEXT NOT NULL,
            "updated_at"   TEXT NOT NULL
        );
        CREATE INDEX selection_market_id_idx ON selection ("market_id", "is_active")
        "#,
    ),
];

/// What `create_schema` actually created. Empty when everything existed.
#[derive(Debug, Default)]
pub struct SchemaReport {
    pub created: Vec<&'static str>,
}

async fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

/// Ensure the enum types and the four entity tables exist. Each object is
/// checked first and left alone if present.
pub async fn create_schema(conn: &mut SqliteConnection) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();

    for &(type_name, values) in ENUM_TYPES {
        if table_exists(conn, type_name).await? {
            debug!(enum_type = type_name, "enum type already present");
            continue;
        }
        sqlx::query(&format!(
            r#"CREATE TABLE {type_name} ("value" TEXT PRIMARY KEY NOT NULL)"#
        ))
        .execute(&mut *conn)
        .await?;
        for value in values {
            sqlx::query(&format!(r#"INSERT INTO {type_name} ("value") VALUES (?)"#))
                .bind(*value)
                .execute(&mut *conn)
                .await?;
        }
        report.created.push(type_name);
    }

    for &(name, ddl) in TABLES {
        if table_exists(conn, name).await? {
            debug!(table = name, "table already present");
            continue;
        }
        sqlx::raw_sql(ddl).execute(&mut *conn).await?;
        report.created.push(name);
    }

    info!(created = ?report.created, "schema ready");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::empty_db;

    #[tokio::test]
    async fn creates_everything_once() {
        let db = empty_db().await;
        let mut tx = db.begin().await.unwrap();

        let first = create_schema(&mut tx).await.unwrap();
        assert_eq!(
            first.created,
            vec!["eventtype", "eventstatus", "selectionoutcome", "sport", "event", "market", "selection"]
        );

        let second = create_schema(&mut tx).await.unwrap();
        assert!(second.created.is_empty());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn enum_tables_are_seeded() {
        let db = empty_db().await;
        let mut tx = db.begin().await.unwrap();
        create_schema(&mut tx).await.unwrap();

        let outcomes: Vec<String> =
            sqlx::query_scalar(r#"SELECT "value" FROM selectionoutcome ORDER BY "value""#)
                .fetch_all(&mut *tx)
                .await
                .unwrap();
        assert_eq!(outcomes, vec!["LOSE", "PLACE", "UNSETTLED", "VOID", "WIN"]);
    }

    #[tokio::test]
    async fn enum_columns_reject_unknown_values() {
        let db = empty_db().await;
        let mut tx = db.begin().await.unwrap();
        create_schema(&mut tx).await.unwrap();

        sqlx::query(
            r#"INSERT INTO sport ("id", "name", "display_name", "slug", "order", "created_at", "updated_at")
               VALUES ('s1', 'S', 'S', 's', 0, 'now', 'now')"#,
        )
        .execute(&mut *tx)
        .await
        .unwrap();
        let result = sqlx::query(
            r#"INSERT INTO event ("id", "sport_id", "name", "display_name", "slug", "type", "created_at", "updated_at")
               VALUES ('e1', 's1', 'E', 'E', 'e', 'LIVE', 'now', 'now')"#,
        )
        .execute(&mut *tx)
        .await;
        assert!(result.is_err());
    }
}
