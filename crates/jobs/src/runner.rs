//! Executes queued jobs against the stores.

use std::sync::Arc;

use chrono::Utc;
use store::{AffiliateStore, BookStore, CartItem, CartStore, CommissionEntry, CouponStore};

use crate::error::JobError;
use crate::queue::{
    BookAccessJob, CartAddJob, CartCleanupJob, CommissionJob, CouponUsageJob, InMemoryJobQueue,
    Job, QueuedJob,
};

/// Drains the queue and runs each job to completion.
///
/// Every handler is safe to replay: commission credit and coupon usage
/// dedupe in the store, and cart operations converge on the same final
/// state. A failed job is logged and dropped; the enqueueing side never
/// waits on it.
pub struct JobRunner {
    queue: InMemoryJobQueue,
    books: Arc<dyn BookStore>,
    carts: Arc<dyn CartStore>,
    coupons: Arc<dyn CouponStore>,
    affiliates: Arc<dyn AffiliateStore>,
}

impl JobRunner {
    pub fn new(
        queue: InMemoryJobQueue,
        books: Arc<dyn BookStore>,
        carts: Arc<dyn CartStore>,
        coupons: Arc<dyn CouponStore>,
        affiliates: Arc<dyn AffiliateStore>,
    ) -> Self {
        Self {
            queue,
            books,
            carts,
            coupons,
            affiliates,
        }
    }

    /// Consumes jobs until the queue closes. Run this on its own task.
    pub async fn run(self) {
        while let Some(queued) = self.queue.next().await {
            self.handle(queued).await;
        }
        tracing::info!("job queue closed, runner stopping");
    }

    /// Runs every job already waiting in the queue. Returns how many ran.
    pub async fn run_pending(&self) -> usize {
        let mut handled = 0;
        while let Some(queued) = self.queue.try_next().await {
            self.handle(queued).await;
            handled += 1;
        }
        handled
    }

    #[tracing::instrument(
        skip(self, queued),
        fields(job_id = queued.id.value(), kind = queued.job.kind())
    )]
    async fn handle(&self, queued: QueuedJob) {
        metrics::counter!("jobs_processed_total").increment(1);
        match self.dispatch(queued.job).await {
            Ok(()) => tracing::debug!("job complete"),
            Err(error) => {
                metrics::counter!("jobs_failed_total").increment(1);
                tracing::error!(%error, "job failed");
            }
        }
    }

    async fn dispatch(&self, job: Job) -> Result<(), JobError> {
        match job {
            Job::CreateCommissionAffiliate(payload) => self.credit_commission(payload).await,
            Job::AddCouponUsage(payload) => self.mark_coupon_used(payload).await,
            Job::CheckCartToDelete(payload) => self.clear_cart_line(payload).await,
            Job::IncreaseAccessTimeBook(payload) => self.touch_book(payload).await,
            Job::AddToCart(payload) => self.add_to_cart(payload).await,
        }
    }

    async fn credit_commission(&self, payload: CommissionJob) -> Result<(), JobError> {
        let Some(affiliate) = self
            .affiliates
            .find_by_refer_code(&payload.refer_code)
            .await?
        else {
            tracing::warn!(
                refer_code = %payload.refer_code,
                "commission for unknown refer code dropped"
            );
            return Ok(());
        };

        let amount = payload.price.percent_of(affiliate.commission_percent);
        let entry = CommissionEntry {
            refer_code: payload.refer_code.clone(),
            book_id: payload.book_id,
            payment_id: payload.payment_id,
            amount,
            created_at: Utc::now(),
        };
        if self.affiliates.record_commission(entry).await? {
            tracing::info!(
                refer_code = %payload.refer_code,
                duration = %payload.duration,
                %amount,
                "commission credited"
            );
        } else {
            tracing::debug!("commission already credited");
        }
        Ok(())
    }

    async fn mark_coupon_used(&self, payload: CouponUsageJob) -> Result<(), JobError> {
        // No-op for unknown codes and repeat users.
        self.coupons
            .record_usage(&payload.code, payload.user_id)
            .await?;
        Ok(())
    }

    async fn clear_cart_line(&self, payload: CartCleanupJob) -> Result<(), JobError> {
        self.carts
            .delete_for_pair(payload.user_id, payload.book_id)
            .await?;
        Ok(())
    }

    async fn touch_book(&self, payload: BookAccessJob) -> Result<(), JobError> {
        self.books.increment_access_count(payload.book_id).await?;
        Ok(())
    }

    async fn add_to_cart(&self, payload: CartAddJob) -> Result<(), JobError> {
        // A repeat add replaces the existing line, refreshing its
        // timestamp, so the pair never holds more than one line.
        self.carts
            .delete_for_pair(payload.user_id, payload.book_id)
            .await?;
        self.carts
            .insert(CartItem::new(payload.user_id, payload.book_id))
            .await?;
        Ok(())
    }
}
