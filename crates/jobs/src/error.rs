use thiserror::Error;

/// Errors surfaced by the job queue and its handlers.
#[derive(Debug, Error)]
pub enum JobError {
    /// A storage operation failed while handling a job.
    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),

    /// The queue has been closed and accepts no more jobs.
    #[error("Job queue is closed")]
    QueueClosed,
}
