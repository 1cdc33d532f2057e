//! Shared value types used across the workspace.

pub mod duration;
pub mod types;

pub use duration::{BorrowDuration, ParseDurationError};
pub use types::{Amount, BookId, CartItemId, RecordId, UserId};
