use std::sync::Arc;

use async_trait::async_trait;
use pictor_core::models::{Job, JobState, JobType};
use pictor_core::{IdGenerator, TaskError};
use pictor_db::JobRepository;
use uuid::Uuid;

use super::{state_after_failure, JobQueue, QueueSettings};
use crate::error::{QueueError, QueueResult};

/// Durable queue over the `jobs` table. Safe to share between processes:
/// claims use `FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct PgJobQueue {
    repository: JobRepository,
    ids: Arc<dyn IdGenerator>,
    settings: QueueSettings,
}

impl PgJobQueue {
    pub fn new(
        repository: JobRepository,
        ids: Arc<dyn IdGenerator>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            repository,
            ids,
            settings,
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[tracing::instrument(skip(self, payload))]
    async fn add(&self, job_type: JobType, payload: serde_json::Value) -> QueueResult<Uuid> {
        let job = self
            .repository
            .create_job(self.ids.next_id(), job_type, payload, self.settings.max_attempts)
            .await?;
        tracing::info!(job_id = %job.id, job_type = %job_type, "Job submitted to queue");
        Ok(job.id)
    }

    async fn reserve(&self) -> QueueResult<Option<Job>> {
        Ok(self
            .repository
            .claim_next_job(self.settings.visibility_timeout)
            .await?)
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        if !self.repository.mark_completed(job.id, job.attempts).await? {
            return Err(QueueError::LeaseLost(job.id));
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &TaskError) -> QueueResult<JobState> {
        let (state, delay) = state_after_failure(job, error);
        let updated = self
            .repository
            .mark_failed(job.id, job.attempts, state, &error.to_string(), delay)
            .await?;
        if !updated {
            return Err(QueueError::LeaseLost(job.id));
        }
        Ok(state)
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<Job>> {
        Ok(self.repository.get_job(id).await?)
    }

    async fn dead_letters(&self, limit: u32) -> QueueResult<Vec<Job>> {
        Ok(self.repository.list_dead_letters(limit).await?)
    }

    async fn reap_expired(&self) -> QueueResult<u64> {
        Ok(self.repository.reap_expired().await?)
    }
}
