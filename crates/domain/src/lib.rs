//! Domain services for the e-library backend.
//!
//! This crate wires storage and the job queue into the three
//! user-facing services:
//! - `CatalogService` for browsing and managing books, with a
//!   read-through cache on detail lookups
//! - `LedgerService` for granting and reading borrow records
//! - `CartService` for queue-backed cart additions and direct reads

pub mod carts;
pub mod catalog;
pub mod error;
pub mod ledger;

pub use carts::CartService;
pub use catalog::CatalogService;
pub use error::DomainError;
pub use ledger::LedgerService;
