use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;
use uuid::Uuid;

use crate::db::models::{EventRow, MarketRow, SelectionRow, SportRow};
use crate::db::table::{quoted, table, TableDef, CREATED_AT, ID};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::query::Filter;
use crate::types::{EntityKind, Event, Market, Record, Selection, Sport};
use crate::upsert::{self, UpsertOutcome};

/// The operations available on one entity type. Each call is one transaction:
/// committed when it returns `Ok`, rolled back otherwise.
pub struct Resource<'a> {
    db: &'a Database,
    table: &'static TableDef,
}

impl<'a> Resource<'a> {
    pub fn new(db: &'a Database, kind: EntityKind) -> Self {
        Self { db, table: table(kind) }
    }

    pub async fn upsert(&self, id: Uuid, data: &Value) -> Result<Uuid> {
        Ok(self.upsert_with_report(id, data).await?.id)
    }

    pub async fn upsert_with_report(&self, id: Uuid, data: &Value) -> Result<UpsertOutcome> {
        let data = data
            .as_object()
            .ok_or_else(|| AppError::Validation(format!("{} data must be a JSON object", self.table.kind)))?;

        let mut tx = self.db.begin_write().await?;
        let outcome = upsert::upsert(&mut tx, self.table, id, data).await?;
        tx.commit().await?;

        info!(
            entity = %self.table.kind,
            id = %outcome.id,
            created = outcome.created,
            deactivated = outcome.cascade.deactivated.len(),
            "resource upserted",
        );
        Ok(outcome)
    }

    /// Remove the row; descendants go with it through the foreign keys.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut tx = self.db.begin_write().await?;
        let deleted = sqlx::query(&format!("DELETE FROM {} WHERE {} = ?", self.table.name, quoted(ID)))
            .bind(id.hyphenated().to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound(format!("{} {id}", self.table.kind)));
        }
        tx.commit().await?;

        info!(entity = %self.table.kind, id = %id, "resource deleted");
        Ok(())
    }

    pub async fn search(&self, criteria: &Value) -> Result<Vec<Record>> {
        let filter = Filter::from_json(self.table, criteria)?;
        let mut tx = self.db.begin().await?;
        let records = match self.table.kind {
            EntityKind::Sport => fetch::<SportRow, Sport>(&mut tx, self.table, &filter).await?,
            EntityKind::Event => fetch::<EventRow, Event>(&mut tx, self.table, &filter).await?,
            EntityKind::Market => fetch::<MarketRow, Market>(&mut tx, self.table, &filter).await?,
            EntityKind::Selection => fetch::<SelectionRow, Selection>(&mut tx, self.table, &filter).await?,
        };
        tx.commit().await?;

        info!(
            entity = %self.table.kind,
            criteria = filter.len(),
            matched = records.len(),
            "search complete",
        );
        Ok(records)
    }
}

async fn fetch<R, T>(conn: &mut SqliteConnection, table: &TableDef, filter: &Filter) -> Result<Vec<Record>>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    T: TryFrom<R, Error = AppError> + Into<Record>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM {} {}",
        table.select_list(),
        table.name,
        table.prefix,
    ));
    filter.push_where(&mut qb);
    qb.push(format!(
        " ORDER BY {}.{}, {}.{}",
        table.prefix,
        quoted(CREATED_AT),
        table.prefix,
        quoted(ID),
    ));

    let rows: Vec<R> = qb.build_query_as().fetch_all(&mut *conn).await?;
    rows.into_iter().map(|row| T::try_from(row).map(Into::into)).collect()
}
