use common::TransactionId;
use thiserror::Error;

/// Errors that can occur when interacting with the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction was not found in the store.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// A stored column held a value outside its expected vocabulary.
    #[error("Invalid {column} value in stored row: {value}")]
    InvalidColumn {
        column: &'static str,
        value: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
