//! Background job queue for fulfillment side effects.
//!
//! Checkout confirmation fans its per-item side effects out as jobs:
//! - crediting affiliate commission
//! - marking a coupon as used
//! - clearing purchased books from the cart
//! - bumping book counters
//!
//! Handlers are idempotent so at-least-once delivery is safe.

pub mod error;
pub mod queue;
pub mod runner;

pub use error::JobError;
pub use queue::{
    BookAccessJob, CartAddJob, CartCleanupJob, CommissionJob, CouponUsageJob, InMemoryJobQueue,
    Job, JobId, JobQueue, QueuedJob,
};
pub use runner::JobRunner;
