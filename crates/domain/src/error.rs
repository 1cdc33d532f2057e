//! Domain error types.

use common::{BookId, CartItemId, RecordId};
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested book does not exist.
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    /// The requested ledger record does not exist.
    #[error("Record {0} not found")]
    RecordNotFound(RecordId),

    /// The requested cart line does not exist.
    #[error("Cart item {0} not found")]
    CartItemNotFound(CartItemId),

    /// Another book already uses this ISBN.
    #[error("ISBN {0} is already in the catalog")]
    IsbnTaken(String),

    /// An error occurred in the storage layer.
    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),

    /// An error occurred while enqueueing a background job.
    #[error("Job queue error: {0}")]
    Jobs(#[from] jobs::JobError),
}
