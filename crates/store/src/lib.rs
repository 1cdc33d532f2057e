//! Persistence layer for the e-library backend.
//!
//! This crate defines the storage traits and their backends:
//! - Catalog, ledger, cart, coupon, and affiliate stores as async traits
//! - PostgreSQL implementations for production
//! - In-memory implementations for tests and local development
//! - A Redis-backed cache fronting catalog reads

pub mod cache;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;

pub use cache::{Cache, DEFAULT_TTL, InMemoryCache, NEGATIVE_TTL, RedisCache};
pub use error::StoreError;
pub use memory::{
    InMemoryAffiliateStore, InMemoryBookStore, InMemoryCartStore, InMemoryCouponStore,
    InMemoryRecordStore,
};
pub use model::{
    Affiliate, Book, BookPatch, BookQuery, BorrowRecord, CartItem, CommissionEntry, Coupon,
    EntitlementClaim, NewBook, Page, PriceTier, RecordQuery, SortSpec, UpsertOutcome, slugify,
};
pub use postgres::{
    PostgresAffiliateStore, PostgresBookStore, PostgresCartStore, PostgresCouponStore,
    PostgresRecordStore, connect, run_migrations,
};
pub use repository::{AffiliateStore, BookStore, CartStore, CouponStore, RecordStore};
