pub mod models;
pub mod schema;
pub mod table;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Owned handle on the datastore. Built once at startup, passed by
/// reference, closed explicitly before the process exits.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&cfg.database_url)
            .map_err(AppError::Connection)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            // `like` is case-sensitive, `ilike` lowers both sides.
            .pragma("case_sensitive_like", "ON")
            .with_regexp();

        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            // An in-memory database lives exactly as long as its connection.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(AppError::Connection)?;

        info!(url = %cfg.database_url, "database connected");
        Ok(Self { pool })
    }

    /// Read transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Write transaction. Takes the write lock up front, waiting up to the
    /// busy timeout for a competing writer, so a read-then-write command
    /// never has to upgrade its lock halfway through.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::config::Config;

    /// Fresh in-memory database without any tables.
    pub async fn empty_db() -> Database {
        Database::connect(&Config::in_memory())
            .await
            .expect("in-memory database")
    }

    /// Fresh in-memory database with the full schema.
    pub async fn memory_db() -> Database {
        let db = empty_db().await;
        let mut tx = db.begin_write().await.expect("begin");
        schema::create_schema(&mut tx).await.expect("schema");
        tx.commit().await.expect("commit");
        db
    }
}
