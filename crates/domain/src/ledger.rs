//! Entitlement ledger service: grants, history, and the active shelf.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::{BookId, RecordId, UserId};
use store::{Book, BookStore, BorrowRecord, EntitlementClaim, Page, RecordQuery, RecordStore};

use crate::error::DomainError;

/// Grants and reads borrow records.
pub struct LedgerService {
    records: Arc<dyn RecordStore>,
    books: Arc<dyn BookStore>,
}

impl LedgerService {
    pub fn new(records: Arc<dyn RecordStore>, books: Arc<dyn BookStore>) -> Self {
        Self { records, books }
    }

    /// Grants access for a paid line. An active record for the same
    /// pair is extended in place rather than duplicated; either way the
    /// book's borrow counter moves, since each grant is a paid event.
    #[tracing::instrument(skip(self, claim), fields(user_id = %claim.user_id, book_id = %claim.book_id))]
    pub async fn grant(&self, claim: &EntitlementClaim) -> Result<BorrowRecord, DomainError> {
        let (record, outcome) = self.records.upsert_active(claim).await?;
        self.books.increment_borrow_count(claim.book_id).await?;
        metrics::counter!("entitlements_granted").increment(1);
        tracing::info!(record_id = %record.id, ?outcome, "entitlement granted");
        Ok(record)
    }

    /// Loads one record by id.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: RecordId) -> Result<BorrowRecord, DomainError> {
        self.records
            .find(id)
            .await?
            .ok_or(DomainError::RecordNotFound(id))
    }

    /// Pages through records, optionally filtered by user or book.
    #[tracing::instrument(skip(self, query))]
    pub async fn list(&self, query: &RecordQuery) -> Result<Page<BorrowRecord>, DomainError> {
        Ok(self.records.query(query).await?)
    }

    /// Everything the user can read right now.
    #[tracing::instrument(skip(self))]
    pub async fn active_shelf(&self, user_id: UserId) -> Result<Vec<BorrowRecord>, DomainError> {
        Ok(self.records.active_for_user(user_id, Utc::now()).await?)
    }

    /// The active shelf joined to catalog rows. Records whose book has
    /// been deleted from the catalog are dropped from the result.
    #[tracing::instrument(skip(self))]
    pub async fn active_books(
        &self,
        user_id: UserId,
    ) -> Result<Vec<(BorrowRecord, Book)>, DomainError> {
        let records = self.records.active_for_user(user_id, Utc::now()).await?;
        let ids: Vec<BookId> = records.iter().map(|record| record.book_id).collect();
        let by_id: HashMap<BookId, Book> = self
            .books
            .by_ids(&ids)
            .await?
            .into_iter()
            .map(|book| (book.id, book))
            .collect();
        Ok(records
            .into_iter()
            .filter_map(|record| {
                let book = by_id.get(&record.book_id).cloned()?;
                Some((record, book))
            })
            .collect())
    }
}
