//! At-least-once job queue.
//!
//! `reserve` increments the attempt counter and hides the job for the
//! visibility window. A job neither completed nor failed within the window is
//! delivered again while attempts remain. Retryable failures wait out an
//! exponential backoff; terminal failures and exhausted jobs are
//! dead-lettered (`failed_terminal`).

mod memory;
mod postgres;

pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;

use std::time::Duration;

use async_trait::async_trait;
use pictor_core::models::{FailureKind, Job, JobState, JobType};
use pictor_core::{Config, TaskError};
use uuid::Uuid;

use crate::error::QueueResult;

/// Maximum delay in seconds before retrying a failed job. Caps exponential backoff
/// so that high attempt counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub fn compute_retry_backoff_seconds(attempts: u32) -> u64 {
    2_u64
        .checked_pow(attempts)
        .unwrap_or(MAX_RETRY_BACKOFF_SECS)
        .min(MAX_RETRY_BACKOFF_SECS)
}

/// State a job moves to after a failed delivery, and the delay before it is
/// claimable again.
pub(crate) fn state_after_failure(job: &Job, error: &TaskError) -> (JobState, Duration) {
    if error.is_recoverable() && !job.attempts_exhausted() {
        let backoff = compute_retry_backoff_seconds(job.attempts);
        (
            JobState::Failed(FailureKind::Retryable),
            Duration::from_secs(backoff),
        )
    } else {
        (JobState::Failed(FailureKind::Terminal), Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub visibility_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

impl QueueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.job_max_attempts(),
            visibility_timeout: config.job_visibility_timeout(),
        }
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job. It is durable once this returns (for durable backends).
    async fn add(&self, job_type: JobType, payload: serde_json::Value) -> QueueResult<Uuid>;

    /// Claim the next visible job, if any.
    async fn reserve(&self) -> QueueResult<Option<Job>>;

    /// Acknowledge the delivery `job` came from.
    async fn complete(&self, job: &Job) -> QueueResult<()>;

    /// Report a failed delivery. Returns the state the job moved to.
    async fn fail(&self, job: &Job, error: &TaskError) -> QueueResult<JobState>;

    async fn get(&self, id: Uuid) -> QueueResult<Option<Job>>;

    /// Dead-lettered jobs, most recently failed first.
    async fn dead_letters(&self, limit: u32) -> QueueResult<Vec<Job>>;

    /// Dead-letter jobs abandoned on their final attempt. Returns how many.
    async fn reap_expired(&self) -> QueueResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn job(attempts: u32, max_attempts: u32) -> Job {
        Job {
            id: Uuid::nil(),
            job_type: JobType::Transform,
            payload: serde_json::Value::Null,
            state: JobState::Active,
            attempts,
            max_attempts,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(64), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn recoverable_failure_with_attempts_left_is_retried() {
        let err = TaskError::recoverable(anyhow::anyhow!("network"));
        let (state, delay) = state_after_failure(&job(1, 3), &err);
        assert_eq!(state, JobState::Failed(FailureKind::Retryable));
        assert_eq!(delay, Duration::from_secs(2));
    }

    #[test]
    fn recoverable_failure_on_last_attempt_is_dead_lettered() {
        let err = TaskError::recoverable(anyhow::anyhow!("network"));
        let (state, _) = state_after_failure(&job(3, 3), &err);
        assert!(state.is_dead_lettered());
    }

    #[test]
    fn unrecoverable_failure_is_dead_lettered_immediately() {
        let err = TaskError::unrecoverable(anyhow::anyhow!("bad input"));
        let (state, _) = state_after_failure(&job(1, 3), &err);
        assert!(state.is_dead_lettered());
    }
}
