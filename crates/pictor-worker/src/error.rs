use pictor_core::AppError;
use pictor_db::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    /// The delivery no longer owns the job: its window lapsed and it was
    /// redelivered or reaped.
    #[error("Job {0} is no longer held by this delivery")]
    LeaseLost(Uuid),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Queue(err.to_string())
    }
}
