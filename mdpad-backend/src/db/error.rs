//! Store error type
//!
//! Engine failures are passed through unchanged; the store adds no retry.

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Value is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),

    /// Raised by a transaction callback or visitor to roll back its transaction
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    pub fn aborted(reason: impl Into<String>) -> Self {
        StoreError::Aborted(reason.into())
    }
}
