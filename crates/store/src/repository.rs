//! Repository traits implemented by each storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, CartItemId, RecordId, UserId};

use crate::error::StoreError;
use crate::model::{
    Affiliate, Book, BookQuery, BorrowRecord, CartItem, CommissionEntry, Coupon, EntitlementClaim,
    Page, RecordQuery, UpsertOutcome,
};

/// Storage for catalog books.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Inserts a new book. Fails with `Duplicate` when the ISBN is
    /// already taken.
    async fn insert(&self, book: Book) -> Result<Book, StoreError>;

    async fn find(&self, id: BookId) -> Result<Option<Book>, StoreError>;

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StoreError>;

    /// Writes the full row back. A book deleted in the meantime is a
    /// no-op.
    async fn update(&self, book: &Book) -> Result<(), StoreError>;

    /// Returns whether a row was actually removed.
    async fn delete(&self, id: BookId) -> Result<bool, StoreError>;

    async fn query(&self, query: &BookQuery) -> Result<Page<Book>, StoreError>;

    /// Fetches the books for the given ids, skipping unknown ones.
    async fn by_ids(&self, ids: &[BookId]) -> Result<Vec<Book>, StoreError>;

    async fn increment_borrow_count(&self, id: BookId) -> Result<(), StoreError>;

    async fn increment_access_count(&self, id: BookId) -> Result<(), StoreError>;
}

/// Storage for the entitlement ledger.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find-or-insert under the active-window rule, atomically per
    /// `(user_id, book_id)` pair.
    ///
    /// When the pair already has an active record (null or future due
    /// date) its duration is replaced in place and the due date
    /// recomputed; otherwise a fresh record is inserted. Concurrent
    /// calls for the same pair must never leave two active records.
    async fn upsert_active(
        &self,
        claim: &EntitlementClaim,
    ) -> Result<(BorrowRecord, UpsertOutcome), StoreError>;

    /// Inserts a record verbatim, bypassing the active-window rule.
    async fn insert(&self, record: BorrowRecord) -> Result<BorrowRecord, StoreError>;

    async fn find(&self, id: RecordId) -> Result<Option<BorrowRecord>, StoreError>;

    async fn query(&self, query: &RecordQuery) -> Result<Page<BorrowRecord>, StoreError>;

    /// All records for the pair, newest first.
    async fn for_pair(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Vec<BorrowRecord>, StoreError>;

    /// Records of the user that are active at `now`.
    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>, StoreError>;
}

/// Storage for cart lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn insert(&self, item: CartItem) -> Result<CartItem, StoreError>;

    async fn find(&self, id: CartItemId) -> Result<Option<CartItem>, StoreError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CartItem>, StoreError>;

    async fn delete(&self, id: CartItemId) -> Result<bool, StoreError>;

    /// Removes the `(user_id, book_id)` line if present.
    async fn delete_for_pair(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<bool, StoreError>;
}

/// Storage for coupons and their usage log.
#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    /// Logs a redemption. Returns `false` when the user already
    /// redeemed this coupon or the coupon is unknown.
    async fn record_usage(&self, code: &str, user_id: UserId) -> Result<bool, StoreError>;
}

/// Storage for affiliate accounts and credited commissions.
#[async_trait]
pub trait AffiliateStore: Send + Sync {
    /// Inserts a new affiliate. Fails with `Duplicate` when the refer
    /// code is already taken.
    async fn insert(&self, affiliate: Affiliate) -> Result<Affiliate, StoreError>;

    async fn find_by_refer_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError>;

    /// Credits a commission exactly once per
    /// `(refer_code, payment_id, book_id)`. The first delivery inserts
    /// the entry and bumps the affiliate's purchase count and
    /// commission amount; re-deliveries return `false` and change
    /// nothing.
    async fn record_commission(&self, entry: CommissionEntry) -> Result<bool, StoreError>;
}
