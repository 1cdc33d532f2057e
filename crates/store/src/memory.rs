//! In-memory storage backends.
//!
//! Used by tests and by deployments that run without PostgreSQL. Each
//! store keeps its state behind an async `RwLock`; the ledger performs
//! its find-or-insert inside a single write-lock critical section so
//! concurrent upserts for the same pair cannot race.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookId, CartItemId, RecordId, UserId};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{
    Affiliate, Book, BookQuery, BorrowRecord, CartItem, CommissionEntry, Coupon, EntitlementClaim,
    Page, RecordQuery, UpsertOutcome,
};
use crate::repository::{AffiliateStore, BookStore, CartStore, CouponStore, RecordStore};

/// In-memory catalog store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookStore {
    books: Arc<RwLock<HashMap<BookId, Book>>>,
}

impl InMemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored books (for tests).
    pub async fn book_count(&self) -> usize {
        self.books.read().await.len()
    }
}

fn compare_books(a: &Book, b: &Book, field: &str) -> Ordering {
    match field {
        "title" => a.title.cmp(&b.title),
        "author" => a.author.cmp(&b.author),
        "amount_borrowed" => a.amount_borrowed.cmp(&b.amount_borrowed),
        "access_times" => a.access_times.cmp(&b.access_times),
        "published_date" => a.published_date.cmp(&b.published_date),
        _ => a.created_at.cmp(&b.created_at),
    }
}

fn matches_query(book: &Book, query: &BookQuery) -> bool {
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        if !book.title.to_lowercase().contains(&needle)
            && !book.author.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    if let Some(genre) = &query.genre
        && !book.genres.iter().any(|g| g == genre)
    {
        return false;
    }
    if let Some((from, to)) = query.price_between {
        let in_range = book.prices.iter().any(|tier| {
            tier.duration == common::BorrowDuration::OneMonth
                && tier.price > from
                && tier.price < to
        });
        if !in_range {
            return false;
        }
    }
    true
}

fn paginate<T: Clone>(mut items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let total = items.len() as u64;
    let limit = limit.max(1);
    // Widen before multiplying; a hostile page number must not overflow.
    let start = (u64::from(page.max(1)) - 1).saturating_mul(u64::from(limit));
    let results = if start >= total {
        Vec::new()
    } else {
        items.drain(start as usize..).take(limit as usize).collect()
    };
    Page::new(results, page.max(1), limit, total)
}

#[async_trait]
impl BookStore for InMemoryBookStore {
    async fn insert(&self, book: Book) -> Result<Book, StoreError> {
        let mut books = self.books.write().await;
        if books.values().any(|b| b.isbn == book.isbn) {
            return Err(StoreError::Duplicate { field: "isbn" });
        }
        books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn find(&self, id: BookId) -> Result<Option<Book>, StoreError> {
        Ok(self.books.read().await.get(&id).cloned())
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StoreError> {
        Ok(self
            .books
            .read()
            .await
            .values()
            .find(|b| b.isbn == isbn)
            .cloned())
    }

    async fn update(&self, book: &Book) -> Result<(), StoreError> {
        let mut books = self.books.write().await;
        if let Some(slot) = books.get_mut(&book.id) {
            *slot = book.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: BookId) -> Result<bool, StoreError> {
        Ok(self.books.write().await.remove(&id).is_some())
    }

    async fn query(&self, query: &BookQuery) -> Result<Page<Book>, StoreError> {
        let books = self.books.read().await;
        let mut matched: Vec<Book> = books
            .values()
            .filter(|b| matches_query(b, query))
            .cloned()
            .collect();
        match &query.sort {
            Some(sort) => {
                matched.sort_by(|a, b| {
                    let ordering = compare_books(a, b, &sort.field);
                    if sort.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
            }
            None => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        Ok(paginate(matched, query.page, query.limit))
    }

    async fn by_ids(&self, ids: &[BookId]) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().await;
        Ok(ids.iter().filter_map(|id| books.get(id).cloned()).collect())
    }

    async fn increment_borrow_count(&self, id: BookId) -> Result<(), StoreError> {
        if let Some(book) = self.books.write().await.get_mut(&id) {
            book.amount_borrowed += 1;
        }
        Ok(())
    }

    async fn increment_access_count(&self, id: BookId) -> Result<(), StoreError> {
        if let Some(book) = self.books.write().await.get_mut(&id) {
            book.access_times += 1;
        }
        Ok(())
    }
}

/// In-memory entitlement ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<Vec<BorrowRecord>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (for tests).
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn upsert_active(
        &self,
        claim: &EntitlementClaim,
    ) -> Result<(BorrowRecord, UpsertOutcome), StoreError> {
        // The whole find-or-insert runs under one write lock.
        let mut records = self.records.write().await;
        let now = Utc::now();
        let existing = records
            .iter_mut()
            .find(|r| r.user_id == claim.user_id && r.book_id == claim.book_id && r.is_active_at(now));
        match existing {
            Some(record) => {
                record.duration = claim.duration;
                record.price = claim.price;
                record.pay_by = claim.pay_by.clone();
                record.due_date = claim.due_date(now);
                record.is_bought = claim.duration.is_purchase();
                record.updated_at = now;
                Ok((record.clone(), UpsertOutcome::Extended))
            }
            None => {
                let record = claim.to_record(now);
                records.push(record.clone());
                Ok((record, UpsertOutcome::Created))
            }
        }
    }

    async fn insert(&self, record: BorrowRecord) -> Result<BorrowRecord, StoreError> {
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn find(&self, id: RecordId) -> Result<Option<BorrowRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn query(&self, query: &RecordQuery) -> Result<Page<BorrowRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<BorrowRecord> = records
            .iter()
            .filter(|r| query.user_id.is_none_or(|u| r.user_id == u))
            .filter(|r| query.book_id.is_none_or(|b| r.book_id == b))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matched, query.page, query.limit))
    }

    async fn for_pair(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<Vec<BorrowRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matched: Vec<BorrowRecord> = records
            .iter()
            .filter(|r| r.user_id == user_id && r.book_id == book_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn active_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BorrowRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active_at(now))
            .cloned()
            .collect())
    }
}

/// In-memory cart store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    items: Arc<RwLock<Vec<CartItem>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored lines (for tests).
    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn insert(&self, item: CartItem) -> Result<CartItem, StoreError> {
        let mut items = self.items.write().await;
        if items
            .iter()
            .any(|i| i.user_id == item.user_id && i.book_id == item.book_id)
        {
            return Err(StoreError::Duplicate { field: "cart item" });
        }
        items.push(item.clone());
        Ok(item)
    }

    async fn find(&self, id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        Ok(self.items.read().await.iter().find(|i| i.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CartItem>, StoreError> {
        let items = self.items.read().await;
        let mut matched: Vec<CartItem> = items
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn delete(&self, id: CartItemId) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() < before)
    }

    async fn delete_for_pair(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| !(i.user_id == user_id && i.book_id == book_id));
        Ok(items.len() < before)
    }
}

/// In-memory coupon store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<String, Coupon>>>,
}

impl InMemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError> {
        let mut coupons = self.coupons.write().await;
        if coupons.contains_key(&coupon.code) {
            return Err(StoreError::Duplicate { field: "coupon code" });
        }
        coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(coupon)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self.coupons.read().await.get(code).cloned())
    }

    async fn record_usage(&self, code: &str, user_id: UserId) -> Result<bool, StoreError> {
        let mut coupons = self.coupons.write().await;
        let Some(coupon) = coupons.get_mut(code) else {
            return Ok(false);
        };
        if coupon.used_by.contains(&user_id) {
            return Ok(false);
        }
        coupon.used_by.push(user_id);
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct AffiliateState {
    affiliates: HashMap<String, Affiliate>,
    commissions: Vec<CommissionEntry>,
}

/// In-memory affiliate store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAffiliateStore {
    state: Arc<RwLock<AffiliateState>>,
}

impl InMemoryAffiliateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of credited commissions (for tests).
    pub async fn commission_count(&self) -> usize {
        self.state.read().await.commissions.len()
    }
}

#[async_trait]
impl AffiliateStore for InMemoryAffiliateStore {
    async fn insert(&self, affiliate: Affiliate) -> Result<Affiliate, StoreError> {
        let mut state = self.state.write().await;
        if state.affiliates.contains_key(&affiliate.refer_code) {
            return Err(StoreError::Duplicate { field: "refer code" });
        }
        state
            .affiliates
            .insert(affiliate.refer_code.clone(), affiliate.clone());
        Ok(affiliate)
    }

    async fn find_by_refer_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError> {
        Ok(self.state.read().await.affiliates.get(code).cloned())
    }

    async fn record_commission(&self, entry: CommissionEntry) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let already_credited = state.commissions.iter().any(|c| {
            c.refer_code == entry.refer_code
                && c.payment_id == entry.payment_id
                && c.book_id == entry.book_id
        });
        if already_credited {
            return Ok(false);
        }
        let Some(affiliate) = state.affiliates.get_mut(&entry.refer_code) else {
            return Ok(false);
        };
        affiliate.purchase_count += 1;
        affiliate.commission_amount += entry.amount;
        state.commissions.push(entry);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Amount, BorrowDuration};
    use crate::model::{NewBook, PriceTier, SortSpec};

    fn make_book(title: &str, isbn: &str, monthly_price: f64) -> Book {
        NewBook {
            title: title.to_string(),
            author: "Author".to_string(),
            isbn: isbn.to_string(),
            genres: vec!["fiction".to_string()],
            summary: String::new(),
            cover_image: String::new(),
            total_pages: 100,
            digital_content: String::new(),
            published_date: None,
            prices: vec![PriceTier {
                duration: BorrowDuration::OneMonth,
                price: Amount::new(monthly_price),
            }],
        }
        .into_book()
    }

    fn make_claim(user_id: UserId, book_id: BookId, duration: BorrowDuration) -> EntitlementClaim {
        EntitlementClaim {
            book_id,
            user_id,
            duration,
            price: Amount::new(10.0),
            pay_by: "provider".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_isbn() {
        let store = InMemoryBookStore::new();
        store.insert(make_book("A", "isbn-1", 10.0)).await.unwrap();

        let result = store.insert(make_book("B", "isbn-1", 12.0)).await;
        assert!(matches!(
            result,
            Err(StoreError::Duplicate { field: "isbn" })
        ));
        assert_eq!(store.book_count().await, 1);
    }

    #[tokio::test]
    async fn update_replaces_row_and_delete_removes_it() {
        let store = InMemoryBookStore::new();
        let mut book = store.insert(make_book("A", "isbn-1", 10.0)).await.unwrap();

        book.title = "A2".to_string();
        store.update(&book).await.unwrap();
        assert_eq!(store.find(book.id).await.unwrap().unwrap().title, "A2");

        assert!(store.delete(book.id).await.unwrap());
        assert!(!store.delete(book.id).await.unwrap());
        assert!(store.find(book.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_matches_search_over_title_and_author() {
        let store = InMemoryBookStore::new();
        store
            .insert(make_book("Dune Messiah", "isbn-1", 10.0))
            .await
            .unwrap();
        store
            .insert(make_book("Foundation", "isbn-2", 10.0))
            .await
            .unwrap();

        let query = BookQuery {
            search: Some("dune".to_string()),
            ..Default::default()
        };
        let page = store.query(&query).await.unwrap();
        assert_eq!(page.total_results, 1);
        assert_eq!(page.results[0].title, "Dune Messiah");
    }

    #[tokio::test]
    async fn query_filters_by_genre_and_price_window() {
        let store = InMemoryBookStore::new();
        store.insert(make_book("A", "isbn-1", 5.0)).await.unwrap();
        store.insert(make_book("B", "isbn-2", 15.0)).await.unwrap();

        let query = BookQuery {
            genre: Some("fiction".to_string()),
            price_between: Some((Amount::new(10.0), Amount::new(20.0))),
            ..Default::default()
        };
        let page = store.query(&query).await.unwrap();
        assert_eq!(page.total_results, 1);
        assert_eq!(page.results[0].title, "B");

        let query = BookQuery {
            genre: Some("biography".to_string()),
            ..Default::default()
        };
        assert_eq!(store.query(&query).await.unwrap().total_results, 0);
    }

    #[tokio::test]
    async fn query_sorts_and_paginates() {
        let store = InMemoryBookStore::new();
        for (i, title) in ["Charlie", "Alpha", "Bravo"].iter().enumerate() {
            store
                .insert(make_book(title, &format!("isbn-{i}"), 10.0))
                .await
                .unwrap();
        }

        let query = BookQuery {
            sort: Some(SortSpec::parse("title:asc")),
            limit: 2,
            page: 1,
            ..Default::default()
        };
        let page = store.query(&query).await.unwrap();
        assert_eq!(page.total_results, 3);
        assert_eq!(page.total_pages, 2);
        let titles: Vec<_> = page.results.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Bravo"]);

        let query = BookQuery {
            sort: Some(SortSpec::parse("title:asc")),
            limit: 2,
            page: 2,
            ..Default::default()
        };
        let page = store.query(&query).await.unwrap();
        assert_eq!(page.results[0].title, "Charlie");
    }

    #[tokio::test]
    async fn query_with_huge_page_number_is_empty() {
        let store = InMemoryBookStore::new();
        store
            .insert(make_book("Alpha", "isbn-1", 10.0))
            .await
            .unwrap();

        let query = BookQuery {
            page: u32::MAX,
            limit: 100,
            ..Default::default()
        };
        let page = store.query(&query).await.unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.total_results, 1);
        assert_eq!(page.page, u32::MAX);
    }

    #[tokio::test]
    async fn counters_increment_in_place() {
        let store = InMemoryBookStore::new();
        let book = store.insert(make_book("A", "isbn-1", 10.0)).await.unwrap();

        store.increment_borrow_count(book.id).await.unwrap();
        store.increment_access_count(book.id).await.unwrap();
        store.increment_access_count(book.id).await.unwrap();

        let stored = store.find(book.id).await.unwrap().unwrap();
        assert_eq!(stored.amount_borrowed, 1);
        assert_eq!(stored.access_times, 2);
    }

    #[tokio::test]
    async fn upsert_creates_then_extends_in_place() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();

        let (first, outcome) = store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::OneMonth))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let (second, outcome) = store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::SixMonths))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Extended);
        assert_eq!(second.id, first.id);
        assert_eq!(second.duration, BorrowDuration::SixMonths);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn upsert_extension_recomputes_due_date() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();

        let (first, _) = store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::OneMonth))
            .await
            .unwrap();
        let (second, _) = store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::OneYear))
            .await
            .unwrap();

        assert!(second.due_date.unwrap() > first.due_date.unwrap());
    }

    #[tokio::test]
    async fn upsert_to_permanent_clears_due_date() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();

        store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::OneMonth))
            .await
            .unwrap();
        let (record, outcome) = store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::Forever))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Extended);
        assert!(record.is_bought);
        assert!(record.due_date.is_none());
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn upsert_leaves_expired_record_and_inserts_new() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();

        let now = Utc::now();
        let mut expired = make_claim(user_id, book_id, BorrowDuration::OneMonth).to_record(now);
        expired.due_date = Some(now - chrono::Duration::days(3));
        store.insert(expired.clone()).await.unwrap();

        let (fresh, outcome) = store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::OneMonth))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_ne!(fresh.id, expired.id);
        let all = store.for_pair(user_id, book_id).await.unwrap();
        assert_eq!(all.len(), 2);
        let active: Vec<_> = all.iter().filter(|r| r.is_active_at(Utc::now())).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, fresh.id);
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_single_record() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();

        let claim_a = make_claim(user_id, book_id, BorrowDuration::OneMonth);
        let claim_b = make_claim(user_id, book_id, BorrowDuration::OneYear);
        let a = store.upsert_active(&claim_a);
        let b = store.upsert_active(&claim_b);
        let (a, b) = tokio::join!(a, b);
        a.unwrap();
        b.unwrap();

        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn active_for_user_skips_expired_records() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();

        let now = Utc::now();
        let mut expired = make_claim(user_id, BookId::new(), BorrowDuration::OneMonth)
            .to_record(now);
        expired.due_date = Some(now - chrono::Duration::days(1));
        store.insert(expired).await.unwrap();
        store
            .upsert_active(&make_claim(user_id, BookId::new(), BorrowDuration::OneMonth))
            .await
            .unwrap();

        let active = store.active_for_user(user_id, Utc::now()).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn record_query_filters_by_user_and_book() {
        let store = InMemoryRecordStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();
        store
            .upsert_active(&make_claim(user_id, book_id, BorrowDuration::OneMonth))
            .await
            .unwrap();
        store
            .upsert_active(&make_claim(UserId::new(), book_id, BorrowDuration::OneMonth))
            .await
            .unwrap();

        let query = RecordQuery {
            user_id: Some(user_id),
            ..Default::default()
        };
        assert_eq!(store.query(&query).await.unwrap().total_results, 1);

        let query = RecordQuery {
            book_id: Some(book_id),
            ..Default::default()
        };
        assert_eq!(store.query(&query).await.unwrap().total_results, 2);
    }

    #[tokio::test]
    async fn cart_insert_rejects_duplicate_pair() {
        let store = InMemoryCartStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();

        store.insert(CartItem::new(user_id, book_id)).await.unwrap();
        let result = store.insert(CartItem::new(user_id, book_id)).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn cart_delete_for_pair_is_idempotent() {
        let store = InMemoryCartStore::new();
        let user_id = UserId::new();
        let book_id = BookId::new();
        store.insert(CartItem::new(user_id, book_id)).await.unwrap();

        assert!(store.delete_for_pair(user_id, book_id).await.unwrap());
        assert!(!store.delete_for_pair(user_id, book_id).await.unwrap());
        assert_eq!(store.item_count().await, 0);
    }

    #[tokio::test]
    async fn cart_lists_only_own_lines() {
        let store = InMemoryCartStore::new();
        let user_id = UserId::new();
        store
            .insert(CartItem::new(user_id, BookId::new()))
            .await
            .unwrap();
        store
            .insert(CartItem::new(UserId::new(), BookId::new()))
            .await
            .unwrap();

        assert_eq!(store.list_for_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn coupon_usage_is_recorded_once_per_user() {
        let store = InMemoryCouponStore::new();
        store.insert(Coupon::new("SPRING10", 10)).await.unwrap();
        let user_id = UserId::new();

        assert!(store.record_usage("SPRING10", user_id).await.unwrap());
        assert!(!store.record_usage("SPRING10", user_id).await.unwrap());
        assert!(!store.record_usage("UNKNOWN", user_id).await.unwrap());

        let coupon = store.find_by_code("SPRING10").await.unwrap().unwrap();
        assert_eq!(coupon.used_by, vec![user_id]);
    }

    #[tokio::test]
    async fn commission_credits_once_per_payment_item() {
        let store = InMemoryAffiliateStore::new();
        store
            .insert(Affiliate::new(UserId::new(), "REF123"))
            .await
            .unwrap();
        let book_id = BookId::new();
        let entry = CommissionEntry {
            refer_code: "REF123".to_string(),
            book_id,
            payment_id: "PAY-1".to_string(),
            amount: Amount::new(2.5),
            created_at: Utc::now(),
        };

        assert!(store.record_commission(entry.clone()).await.unwrap());
        assert!(!store.record_commission(entry).await.unwrap());

        let affiliate = store.find_by_refer_code("REF123").await.unwrap().unwrap();
        assert_eq!(affiliate.purchase_count, 1);
        assert_eq!(affiliate.commission_amount, Amount::new(2.5));
        assert_eq!(store.commission_count().await, 1);
    }

    #[tokio::test]
    async fn commission_for_unknown_affiliate_is_dropped() {
        let store = InMemoryAffiliateStore::new();
        let entry = CommissionEntry {
            refer_code: "NOBODY".to_string(),
            book_id: BookId::new(),
            payment_id: "PAY-1".to_string(),
            amount: Amount::new(2.5),
            created_at: Utc::now(),
        };
        assert!(!store.record_commission(entry).await.unwrap());
        assert_eq!(store.commission_count().await, 0);
    }
}
