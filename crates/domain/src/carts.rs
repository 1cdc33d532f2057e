//! Cart service. Additions go through the job queue; reads and
//! removals hit the store directly.

use std::sync::Arc;

use common::{BookId, CartItemId, UserId};
use jobs::{CartAddJob, Job, JobQueue};
use store::{BookStore, CartItem, CartStore};

use crate::error::DomainError;

pub struct CartService {
    carts: Arc<dyn CartStore>,
    books: Arc<dyn BookStore>,
    queue: Arc<dyn JobQueue>,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        books: Arc<dyn BookStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            carts,
            books,
            queue,
        }
    }

    /// Queues an add-to-cart for the pair. The line appears once the
    /// job is processed; callers get no insert result to wait on, so
    /// the only upfront check is that the book exists.
    #[tracing::instrument(skip(self))]
    pub async fn add(&self, user_id: UserId, book_id: BookId) -> Result<(), DomainError> {
        if self.books.find(book_id).await?.is_none() {
            return Err(DomainError::BookNotFound(book_id));
        }
        self.queue
            .enqueue(Job::AddToCart(CartAddJob { user_id, book_id }))
            .await?;
        Ok(())
    }

    /// Lists the user's cart lines.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: UserId) -> Result<Vec<CartItem>, DomainError> {
        Ok(self.carts.list_for_user(user_id).await?)
    }

    /// Removes one cart line by id.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: CartItemId) -> Result<(), DomainError> {
        if !self.carts.delete(id).await? {
            return Err(DomainError::CartItemNotFound(id));
        }
        Ok(())
    }
}
