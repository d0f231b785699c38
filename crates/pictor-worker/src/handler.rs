use async_trait::async_trait;
use pictor_core::models::Job;
use pictor_core::TaskError;

/// Executes reserved jobs.
///
/// Implemented by the application. An `Err` aborts the delivery; whether the
/// job is retried depends on [`TaskError::is_recoverable`] and the attempts
/// left. Handlers do not retry internally.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), TaskError>;
}
