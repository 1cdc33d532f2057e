//! Job descriptions and the queue they travel through.
//!
//! Fulfillment side effects (commission credit, coupon usage, cart
//! cleanup) run as background jobs so a slow store cannot delay the
//! payment redirect. Delivery is at-least-once; every handler must
//! tolerate a re-delivered job.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use common::{Amount, BookId, BorrowDuration, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::JobError;

/// Monotonic id assigned when a job is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload for crediting an affiliate after a referred purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionJob {
    pub refer_code: String,
    pub book_id: BookId,
    /// Provider payment id; part of the dedupe key.
    pub payment_id: String,
    /// What the buyer paid for this line.
    pub price: Amount,
    /// The duration the referred buyer purchased.
    pub duration: BorrowDuration,
}

/// Payload for marking a coupon as used by a buyer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponUsageJob {
    pub code: String,
    pub user_id: UserId,
}

/// Payload for removing a purchased book from the buyer's cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartCleanupJob {
    pub user_id: UserId,
    pub book_id: BookId,
}

/// Payload for bumping a book's access counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAccessJob {
    pub book_id: BookId,
}

/// Payload for adding a book to a user's cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartAddJob {
    pub user_id: UserId,
    pub book_id: BookId,
}

/// A background job and its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Job {
    CreateCommissionAffiliate(CommissionJob),
    AddCouponUsage(CouponUsageJob),
    CheckCartToDelete(CartCleanupJob),
    IncreaseAccessTimeBook(BookAccessJob),
    AddToCart(CartAddJob),
}

impl Job {
    /// Queue name of this job, used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::CreateCommissionAffiliate(_) => "create-commission-affiliate",
            Job::AddCouponUsage(_) => "add-coupon-usage",
            Job::CheckCartToDelete(_) => "check-cart-to-delete",
            Job::IncreaseAccessTimeBook(_) => "increase-access-time-book",
            Job::AddToCart(_) => "add-to-cart",
        }
    }
}

/// A job that has been accepted by the queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: Job,
}

/// Producer side of the background queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Accepts a job for later execution.
    async fn enqueue(&self, job: Job) -> Result<JobId, JobError>;
}

#[derive(Debug)]
struct QueueState {
    tx: mpsc::UnboundedSender<QueuedJob>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>,
    next_id: AtomicU64,
    log: std::sync::Mutex<Vec<Job>>,
}

/// In-process queue backed by an unbounded channel.
#[derive(Debug, Clone)]
pub struct InMemoryJobQueue {
    state: Arc<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(QueueState {
                tx,
                rx: tokio::sync::Mutex::new(rx),
                next_id: AtomicU64::new(0),
                log: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Waits for the next job. Returns `None` once the queue closes.
    pub async fn next(&self) -> Option<QueuedJob> {
        self.state.rx.lock().await.recv().await
    }

    /// Takes the next job only if one is already waiting.
    pub async fn try_next(&self) -> Option<QueuedJob> {
        self.state.rx.lock().await.try_recv().ok()
    }

    /// How many jobs of `kind` have ever been enqueued. For test
    /// assertions.
    pub fn enqueued_count(&self, kind: &str) -> usize {
        self.state
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.kind() == kind)
            .count()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobError> {
        let id = JobId(self.state.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.state.log.lock().unwrap().push(job.clone());
        tracing::debug!(job_id = id.value(), kind = job.kind(), "job enqueued");
        self.state
            .tx
            .send(QueuedJob { id, job })
            .map_err(|_| JobError::QueueClosed)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access_job() -> Job {
        Job::IncreaseAccessTimeBook(BookAccessJob {
            book_id: BookId::new(),
        })
    }

    #[test]
    fn kind_names_are_kebab_case() {
        let job = Job::CreateCommissionAffiliate(CommissionJob {
            refer_code: "FRIEND25".to_string(),
            book_id: BookId::new(),
            payment_id: "PAY-1".to_string(),
            price: Amount::new(10.0),
            duration: BorrowDuration::OneMonth,
        });
        assert_eq!(job.kind(), "create-commission-affiliate");
        assert_eq!(access_job().kind(), "increase-access-time-book");
    }

    #[test]
    fn commission_payload_carries_the_purchased_line() {
        let job = Job::CreateCommissionAffiliate(CommissionJob {
            refer_code: "FRIEND25".to_string(),
            book_id: BookId::new(),
            payment_id: "PAY-1".to_string(),
            price: Amount::new(10.0),
            duration: BorrowDuration::ThreeMonths,
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["data"]["refer_code"], "FRIEND25");
        assert_eq!(value["data"]["payment_id"], "PAY-1");
        assert_eq!(value["data"]["price"], 10.0);
        assert_eq!(value["data"]["duration"], "3 months");
    }

    #[test]
    fn job_serializes_with_tagged_kind() {
        let user_id = UserId::new();
        let job = Job::AddCouponUsage(CouponUsageJob {
            code: "WELCOME10".to_string(),
            user_id,
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "add-coupon-usage");
        assert_eq!(value["data"]["code"], "WELCOME10");

        let parsed: Job = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.kind(), "add-coupon-usage");
    }

    #[tokio::test]
    async fn enqueue_assigns_sequential_ids() {
        let queue = InMemoryJobQueue::new();

        let first = queue.enqueue(access_job()).await.unwrap();
        let second = queue.enqueue(access_job()).await.unwrap();

        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 2);
    }

    #[tokio::test]
    async fn jobs_come_out_in_order() {
        let queue = InMemoryJobQueue::new();
        let book_id = BookId::new();

        queue
            .enqueue(Job::IncreaseAccessTimeBook(BookAccessJob { book_id }))
            .await
            .unwrap();
        queue
            .enqueue(Job::CheckCartToDelete(CartCleanupJob {
                user_id: UserId::new(),
                book_id,
            }))
            .await
            .unwrap();

        let first = queue.try_next().await.unwrap();
        let second = queue.try_next().await.unwrap();
        assert_eq!(first.job.kind(), "increase-access-time-book");
        assert_eq!(second.job.kind(), "check-cart-to-delete");
        assert!(queue.try_next().await.is_none());
    }

    #[tokio::test]
    async fn enqueued_count_tracks_kinds() {
        let queue = InMemoryJobQueue::new();

        queue.enqueue(access_job()).await.unwrap();
        queue.enqueue(access_job()).await.unwrap();

        assert_eq!(queue.enqueued_count("increase-access-time-book"), 2);
        assert_eq!(queue.enqueued_count("add-to-cart"), 0);
    }
}
