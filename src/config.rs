use crate::error::{AppError, Result};

pub const DATABASE_URL: &str = "sqlite:sports.db";

/// Upper bound on `name` / `display_name` length (characters).
pub const NAME_MAX_LEN: usize = 100;

/// Format used when records are printed by `search`.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Fixed-width UTC format for stored timestamps. Lexicographic order matches
/// chronological order, which lets filters compare them as text.
pub const STORED_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Prices are NUMERIC(10, 2): at most 8 integer digits.
pub const PRICE_MAX_CENTS: i64 = 9_999_999_999;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    /// How long a write waits on a competing writer before failing (DB_BUSY_TIMEOUT_MS)
    pub busy_timeout_ms: u64,
    /// Pool size (DB_MAX_CONNECTIONS). One command uses one connection.
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DATABASE_URL.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
            busy_timeout_ms: std::env::var("DB_BUSY_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("DB_BUSY_TIMEOUT_MS must be a number of milliseconds".to_string())
                })?,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    AppError::Config("DB_MAX_CONNECTIONS must be a positive integer".to_string())
                })?,
        })
    }

    /// Private in-memory database, used by the test suites.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            log_level: "debug".to_string(),
            busy_timeout_ms: 1000,
            max_connections: 1,
        }
    }
}
