//! Persisted record shapes shared by every storage backend.

use chrono::{DateTime, Utc};
use common::{Amount, BookId, BorrowDuration, CartItemId, RecordId, UserId};
use serde::{Deserialize, Serialize};

/// One price tier of a book: what a given borrow duration costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub duration: BorrowDuration,
    pub price: Amount,
}

/// A catalog book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    /// URL slug derived from the title.
    pub slug: String,
    pub author: String,
    /// Unique across the catalog.
    pub isbn: String,
    pub genres: Vec<String>,
    pub summary: String,
    pub cover_image: String,
    pub total_pages: i32,
    pub digital_content: String,
    pub published_date: Option<DateTime<Utc>>,
    /// How many entitlements have been granted for this book.
    pub amount_borrowed: i64,
    /// How many times the book detail has been opened.
    pub access_times: i64,
    /// Never empty for a sellable book.
    pub prices: Vec<PriceTier>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// The price tier for a duration, if the book offers one.
    pub fn price_for(&self, duration: BorrowDuration) -> Option<Amount> {
        self.prices
            .iter()
            .find(|tier| tier.duration == duration)
            .map(|tier| tier.price)
    }
}

/// Turns a title into its URL slug: lowercase, alphanumeric words
/// joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Input for creating a catalog book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub total_pages: i32,
    #[serde(default)]
    pub digital_content: String,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    pub prices: Vec<PriceTier>,
}

impl NewBook {
    /// Materializes the book with a fresh id, generated slug and zeroed
    /// counters.
    pub fn into_book(self) -> Book {
        let now = Utc::now();
        let slug = slugify(&self.title);
        Book {
            id: BookId::new(),
            title: self.title,
            slug,
            author: self.author,
            isbn: self.isbn,
            genres: self.genres,
            summary: self.summary,
            cover_image: self.cover_image,
            total_pages: self.total_pages,
            digital_content: self.digital_content,
            published_date: self.published_date,
            amount_borrowed: 0,
            access_times: 0,
            prices: self.prices,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a catalog book. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub genres: Option<Vec<String>>,
    pub summary: Option<String>,
    pub cover_image: Option<String>,
    pub total_pages: Option<i32>,
    pub digital_content: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub prices: Option<Vec<PriceTier>>,
}

impl BookPatch {
    /// Applies the patch in place. Changing the title regenerates the
    /// slug; any change bumps `updated_at`.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
            book.slug = slugify(title);
        }
        if let Some(author) = &self.author {
            book.author = author.clone();
        }
        if let Some(isbn) = &self.isbn {
            book.isbn = isbn.clone();
        }
        if let Some(genres) = &self.genres {
            book.genres = genres.clone();
        }
        if let Some(summary) = &self.summary {
            book.summary = summary.clone();
        }
        if let Some(cover_image) = &self.cover_image {
            book.cover_image = cover_image.clone();
        }
        if let Some(total_pages) = self.total_pages {
            book.total_pages = total_pages;
        }
        if let Some(digital_content) = &self.digital_content {
            book.digital_content = digital_content.clone();
        }
        if let Some(published_date) = self.published_date {
            book.published_date = Some(published_date);
        }
        if let Some(prices) = &self.prices {
            book.prices = prices.clone();
        }
        book.updated_at = Utc::now();
    }
}

/// A borrow entitlement in the ledger.
///
/// A record is *active* while `due_date` is null (permanent purchase)
/// or still in the future. The ledger guarantees at most one active
/// record per `(user_id, book_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub id: RecordId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub duration: BorrowDuration,
    /// What was paid for this grant.
    pub price: Amount,
    /// Payment channel tag, e.g. `"provider"`.
    pub pay_by: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub is_bought: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BorrowRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_none_or(|due| due > now)
    }
}

/// Input to the ledger upsert: the entitlement a user has just paid
/// for (or is being granted manually).
#[derive(Debug, Clone)]
pub struct EntitlementClaim {
    pub book_id: BookId,
    pub user_id: UserId,
    pub duration: BorrowDuration,
    pub price: Amount,
    pub pay_by: String,
}

impl EntitlementClaim {
    /// Due date implied by the claimed duration, reckoned from `now`.
    pub fn due_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration.term().map(|term| now + term)
    }

    /// Materializes a fresh ledger record for this claim.
    pub fn to_record(&self, now: DateTime<Utc>) -> BorrowRecord {
        BorrowRecord {
            id: RecordId::new(),
            book_id: self.book_id,
            user_id: self.user_id,
            duration: self.duration,
            price: self.price,
            pay_by: self.pay_by.clone(),
            borrow_date: now,
            due_date: self.due_date(now),
            is_bought: self.duration.is_purchase(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the ledger upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No active record existed; a new one was inserted.
    Created,
    /// An active record existed; its duration was replaced in place.
    Extended,
}

/// One line in a user's cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(user_id: UserId, book_id: BookId) -> Self {
        Self {
            id: CartItemId::new(),
            user_id,
            book_id,
            created_at: Utc::now(),
        }
    }
}

/// A percent-off coupon and the users who already redeemed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub percent: u32,
    #[serde(default)]
    pub used_by: Vec<UserId>,
}

impl Coupon {
    pub fn new(code: impl Into<String>, percent: u32) -> Self {
        Self {
            code: code.into(),
            percent,
            used_by: Vec::new(),
        }
    }
}

/// An affiliate account credited when referred checkouts complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affiliate {
    pub user_id: UserId,
    pub refer_code: String,
    pub link_count: i64,
    pub purchase_count: i64,
    pub commission_amount: Amount,
    pub commission_percent: u32,
}

impl Affiliate {
    pub const DEFAULT_COMMISSION_PERCENT: u32 = 25;

    pub fn new(user_id: UserId, refer_code: impl Into<String>) -> Self {
        Self {
            user_id,
            refer_code: refer_code.into(),
            link_count: 0,
            purchase_count: 0,
            commission_amount: Amount::zero(),
            commission_percent: Self::DEFAULT_COMMISSION_PERCENT,
        }
    }
}

/// One credited commission. The `(refer_code, payment_id, book_id)`
/// triple is unique so a re-delivered job cannot credit twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionEntry {
    pub refer_code: String,
    pub book_id: BookId,
    pub payment_id: String,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub results: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_results: u64,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, page: u32, limit: u32, total_results: u64) -> Self {
        let total_pages = total_results.div_ceil(u64::from(limit.max(1))) as u32;
        Self {
            results,
            page,
            limit,
            total_pages,
            total_results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

/// Sort directive in `field:direction` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    /// Parses `"title:asc"` / `"created_at:desc"`; a bare field name
    /// sorts ascending.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((field, direction)) => Self {
                field: field.to_string(),
                descending: direction.eq_ignore_ascii_case("desc"),
            },
            None => Self {
                field: raw.to_string(),
                descending: false,
            },
        }
    }
}

/// Catalog browse filters.
#[derive(Debug, Clone)]
pub struct BookQuery {
    /// Case-insensitive substring over title and author.
    pub search: Option<String>,
    /// Exact membership in the book's genre list.
    pub genre: Option<String>,
    /// Books whose one-month tier price lies strictly between the
    /// bounds.
    pub price_between: Option<(Amount, Amount)>,
    pub sort: Option<SortSpec>,
    pub page: u32,
    pub limit: u32,
}

impl Default for BookQuery {
    fn default() -> Self {
        Self {
            search: None,
            genre: None,
            price_between: None,
            sort: None,
            page: 1,
            limit: 10,
        }
    }
}

/// Ledger listing filters.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
    pub page: u32,
    pub limit: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            book_id: None,
            page: 1,
            limit: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Book {
        NewBook {
            title: "The Rust Book".to_string(),
            author: "Steve Klabnik".to_string(),
            isbn: "978-1593278281".to_string(),
            genres: vec!["programming".to_string()],
            summary: String::new(),
            cover_image: String::new(),
            total_pages: 560,
            digital_content: String::new(),
            published_date: None,
            prices: vec![
                PriceTier {
                    duration: BorrowDuration::OneMonth,
                    price: Amount::new(10.0),
                },
                PriceTier {
                    duration: BorrowDuration::Forever,
                    price: Amount::new(40.0),
                },
            ],
        }
        .into_book()
    }

    #[test]
    fn slugify_strips_and_joins() {
        assert_eq!(slugify("The Rust Book"), "the-rust-book");
        assert_eq!(slugify("C++ , in 21 days!"), "c-in-21-days");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
    }

    #[test]
    fn new_book_generates_slug_and_zeroes_counters() {
        let book = sample_book();
        assert_eq!(book.slug, "the-rust-book");
        assert_eq!(book.amount_borrowed, 0);
        assert_eq!(book.access_times, 0);
    }

    #[test]
    fn price_for_finds_matching_tier() {
        let book = sample_book();
        assert_eq!(
            book.price_for(BorrowDuration::OneMonth),
            Some(Amount::new(10.0))
        );
        assert_eq!(book.price_for(BorrowDuration::OneYear), None);
    }

    #[test]
    fn patch_regenerates_slug_on_title_change() {
        let mut book = sample_book();
        let patch = BookPatch {
            title: Some("Programming Rust".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut book);
        assert_eq!(book.slug, "programming-rust");
        assert_eq!(book.author, "Steve Klabnik");
    }

    #[test]
    fn record_activity_window() {
        let now = Utc::now();
        let claim = EntitlementClaim {
            book_id: BookId::new(),
            user_id: UserId::new(),
            duration: BorrowDuration::OneMonth,
            price: Amount::new(10.0),
            pay_by: "provider".to_string(),
        };
        let record = claim.to_record(now);
        assert!(record.is_active_at(now));
        assert!(!record.is_active_at(now + chrono::Duration::days(31)));
    }

    #[test]
    fn permanent_claim_has_no_due_date() {
        let now = Utc::now();
        let claim = EntitlementClaim {
            book_id: BookId::new(),
            user_id: UserId::new(),
            duration: BorrowDuration::Forever,
            price: Amount::new(40.0),
            pay_by: "provider".to_string(),
        };
        let record = claim.to_record(now);
        assert!(record.is_bought);
        assert!(record.due_date.is_none());
        assert!(record.is_active_at(now + chrono::Duration::days(4000)));
    }

    #[test]
    fn page_counts_round_up() {
        let page = Page::new(vec![1, 2, 3], 1, 10, 23);
        assert_eq!(page.total_pages, 3);
        let page = Page::new(Vec::<i32>::new(), 1, 10, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn sort_spec_parses_direction() {
        let spec = SortSpec::parse("title:desc");
        assert_eq!(spec.field, "title");
        assert!(spec.descending);
        let spec = SortSpec::parse("author");
        assert!(!spec.descending);
    }
}
