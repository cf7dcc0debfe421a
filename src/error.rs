use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection error: {0}")]
    Connection(sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Process exit status for this error class. Argument errors caught by
    /// clap itself also exit with 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Json(_) => 1,
            AppError::Validation(_) => 2,
            AppError::Database(_) | AppError::Corrupt(_) => 3,
            AppError::NotFound(_) => 4,
            AppError::Connection(_) | AppError::Config(_) => 5,
        }
    }
}
