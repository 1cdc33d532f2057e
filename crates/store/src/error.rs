use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Cache backend failed.
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back into its record shape.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A unique field collided with an existing row.
    #[error("duplicate {field}")]
    Duplicate { field: &'static str },

    /// An external call exceeded its deadline.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },
}
