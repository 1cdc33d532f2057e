//! Catalog service: browse, cached detail reads, and admin writes.

use std::sync::Arc;
use std::time::Duration;

use common::BookId;
use store::cache::{Cache, DEFAULT_TTL, NEGATIVE_TTL};
use store::{Book, BookPatch, BookQuery, BookStore, NewBook, Page, StoreError};

use crate::error::DomainError;

/// Cache payload meaning "this id has no book".
const NEGATIVE_ENTRY: &str = "null";

fn cache_key(id: BookId) -> String {
    id.to_string()
}

/// Serves catalog reads through the cache and keeps it coherent on
/// admin writes.
///
/// The cache is strictly best-effort: a cache failure is logged and the
/// read falls through to the store, never to the caller.
pub struct CatalogService {
    books: Arc<dyn BookStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl CatalogService {
    /// Creates a catalog service with the default cache lifetime.
    pub fn new(books: Arc<dyn BookStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            books,
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    /// Overrides how long cached books stay fresh.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Loads a book by id through the cache.
    ///
    /// Misses are cached too, with a short lifetime, so repeated
    /// lookups of an id that has no book do not hammer the store.
    #[tracing::instrument(skip(self))]
    pub async fn get_book(&self, id: BookId) -> Result<Book, DomainError> {
        let key = cache_key(id);
        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                if cached == NEGATIVE_ENTRY {
                    metrics::counter!("catalog_cache_hits").increment(1);
                    return Err(DomainError::BookNotFound(id));
                }
                match serde_json::from_str(&cached) {
                    Ok(book) => {
                        metrics::counter!("catalog_cache_hits").increment(1);
                        return Ok(book);
                    }
                    Err(error) => {
                        tracing::warn!(%error, "discarding undecodable cache entry");
                        let _ = self.cache.delete(&key).await;
                    }
                }
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "cache read failed, falling back to the store");
            }
        }
        metrics::counter!("catalog_cache_misses").increment(1);

        match self.books.find(id).await? {
            Some(book) => {
                self.cache_book(&book).await;
                Ok(book)
            }
            None => {
                if let Err(error) = self.cache.set(&key, NEGATIVE_ENTRY, NEGATIVE_TTL).await {
                    tracing::warn!(%error, "failed to cache book miss");
                }
                Err(DomainError::BookNotFound(id))
            }
        }
    }

    /// Browses the catalog with filters and pagination. Listings bypass
    /// the cache; they change with every write.
    #[tracing::instrument(skip(self, query))]
    pub async fn browse(&self, query: &BookQuery) -> Result<Page<Book>, DomainError> {
        Ok(self.books.query(query).await?)
    }

    /// Adds a book to the catalog. The ISBN must be unused.
    #[tracing::instrument(skip(self, new_book), fields(isbn = %new_book.isbn))]
    pub async fn create_book(&self, new_book: NewBook) -> Result<Book, DomainError> {
        let isbn = new_book.isbn.clone();
        if self.books.find_by_isbn(&isbn).await?.is_some() {
            return Err(DomainError::IsbnTaken(isbn));
        }
        match self.books.insert(new_book.into_book()).await {
            Ok(book) => Ok(book),
            // Lost the race on the unique index.
            Err(StoreError::Duplicate { .. }) => Err(DomainError::IsbnTaken(isbn)),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies a partial update and drops the cached copy.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_book(&self, id: BookId, patch: BookPatch) -> Result<Book, DomainError> {
        let mut book = self
            .books
            .find(id)
            .await?
            .ok_or(DomainError::BookNotFound(id))?;
        if let Some(isbn) = &patch.isbn
            && *isbn != book.isbn
            && self.books.find_by_isbn(isbn).await?.is_some()
        {
            return Err(DomainError::IsbnTaken(isbn.clone()));
        }
        patch.apply_to(&mut book);
        self.books.update(&book).await?;
        self.invalidate(id).await;
        Ok(book)
    }

    /// Removes a book and its cached copy.
    #[tracing::instrument(skip(self))]
    pub async fn delete_book(&self, id: BookId) -> Result<(), DomainError> {
        if !self.books.delete(id).await? {
            return Err(DomainError::BookNotFound(id));
        }
        self.invalidate(id).await;
        Ok(())
    }

    async fn cache_book(&self, book: &Book) {
        match serde_json::to_string(book) {
            Ok(payload) => {
                if let Err(error) = self.cache.set(&cache_key(book.id), &payload, self.ttl).await {
                    tracing::warn!(%error, "failed to cache book");
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize book for cache"),
        }
    }

    async fn invalidate(&self, id: BookId) {
        if let Err(error) = self.cache.delete(&cache_key(id)).await {
            tracing::warn!(%error, "failed to invalidate cached book");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Amount, BorrowDuration};
    use store::{InMemoryBookStore, InMemoryCache, PriceTier};

    fn sample_book(title: &str, isbn: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Test Author".to_string(),
            isbn: isbn.to_string(),
            genres: vec!["fiction".to_string()],
            summary: String::new(),
            cover_image: String::new(),
            total_pages: 200,
            digital_content: String::new(),
            published_date: None,
            prices: vec![PriceTier {
                duration: BorrowDuration::OneMonth,
                price: Amount::new(8.0),
            }],
        }
    }

    fn service() -> (CatalogService, Arc<InMemoryBookStore>, Arc<InMemoryCache>) {
        let books = Arc::new(InMemoryBookStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let service = CatalogService::new(books.clone(), cache.clone());
        (service, books, cache)
    }

    #[tokio::test]
    async fn test_get_book_fills_cache() {
        let (service, books, cache) = service();
        let book = books
            .insert(sample_book("Dune", "978-1").into_book())
            .await
            .unwrap();

        let found = service.get_book(book.id).await.unwrap();
        assert_eq!(found.title, "Dune");
        assert!(cache.contains(&cache_key(book.id)).await);
    }

    #[tokio::test]
    async fn test_cached_read_survives_store_change() {
        let (service, books, _cache) = service();
        let mut book = books
            .insert(sample_book("Dune", "978-1").into_book())
            .await
            .unwrap();

        service.get_book(book.id).await.unwrap();

        // Mutate the store behind the cache's back.
        book.title = "Changed".to_string();
        books.update(&book).await.unwrap();

        let found = service.get_book(book.id).await.unwrap();
        assert_eq!(found.title, "Dune");
    }

    #[tokio::test]
    async fn test_miss_is_negative_cached() {
        let (service, _books, cache) = service();
        let id = BookId::new();

        let result = service.get_book(id).await;
        assert!(matches!(result, Err(DomainError::BookNotFound(_))));
        assert!(cache.contains(&cache_key(id)).await);

        // Second lookup answers from the cache.
        let result = service.get_book(id).await;
        assert!(matches!(result, Err(DomainError::BookNotFound(_))));
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_falls_back() {
        let (service, books, cache) = service();
        let book = books
            .insert(sample_book("Dune", "978-1").into_book())
            .await
            .unwrap();
        cache
            .set(&cache_key(book.id), "{not json", DEFAULT_TTL)
            .await
            .unwrap();

        let found = service.get_book(book.id).await.unwrap();
        assert_eq!(found.title, "Dune");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_isbn() {
        let (service, _books, _cache) = service();

        service.create_book(sample_book("First", "978-1")).await.unwrap();
        let result = service.create_book(sample_book("Second", "978-1")).await;

        assert!(matches!(result, Err(DomainError::IsbnTaken(_))));
    }

    #[tokio::test]
    async fn test_update_invalidates_cache() {
        let (service, _books, _cache) = service();
        let book = service
            .create_book(sample_book("Old Title", "978-1"))
            .await
            .unwrap();
        service.get_book(book.id).await.unwrap();

        let patch = BookPatch {
            title: Some("New Title".to_string()),
            ..Default::default()
        };
        let updated = service.update_book(book.id, patch).await.unwrap();
        assert_eq!(updated.slug, "new-title");

        let found = service.get_book(book.id).await.unwrap();
        assert_eq!(found.title, "New Title");
    }

    #[tokio::test]
    async fn test_update_rejects_taken_isbn() {
        let (service, _books, _cache) = service();
        service.create_book(sample_book("First", "978-1")).await.unwrap();
        let second = service
            .create_book(sample_book("Second", "978-2"))
            .await
            .unwrap();

        let patch = BookPatch {
            isbn: Some("978-1".to_string()),
            ..Default::default()
        };
        let result = service.update_book(second.id, patch).await;
        assert!(matches!(result, Err(DomainError::IsbnTaken(_))));
    }

    #[tokio::test]
    async fn test_delete_invalidates_cache() {
        let (service, _books, _cache) = service();
        let book = service
            .create_book(sample_book("Doomed", "978-1"))
            .await
            .unwrap();
        service.get_book(book.id).await.unwrap();

        service.delete_book(book.id).await.unwrap();

        let result = service.get_book(book.id).await;
        assert!(matches!(result, Err(DomainError::BookNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_unknown_book() {
        let (service, _books, _cache) = service();
        let result = service.delete_book(BookId::new()).await;
        assert!(matches!(result, Err(DomainError::BookNotFound(_))));
    }

    #[tokio::test]
    async fn test_browse_passes_filters_through() {
        let (service, _books, _cache) = service();
        service.create_book(sample_book("Rust in Action", "978-1")).await.unwrap();
        service.create_book(sample_book("Gardening", "978-2")).await.unwrap();

        let query = BookQuery {
            search: Some("rust".to_string()),
            ..Default::default()
        };
        let page = service.browse(&query).await.unwrap();
        assert_eq!(page.total_results, 1);
        assert_eq!(page.results[0].title, "Rust in Action");
    }
}
