use std::sync::Arc;

use chrono::{DateTime, Utc};
use pictor_core::models::{Job, JobType, TransformJobPayload, TransformMode, TransformRequest};
use pictor_core::{AppError, AppResult, IdGenerator};
use pictor_db::ImageRepository;
use pictor_worker::JobQueue;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

/// Progress of a transform job as reported to its submitter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: Uuid,
    pub state: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub image_id: Uuid,
    pub target_image_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    fn from_job(job: &Job, payload: &TransformJobPayload) -> Self {
        Self {
            id: job.id,
            state: job.state.to_string(),
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            last_error: job.last_error.clone(),
            image_id: payload.image_id,
            target_image_id: payload.target_image_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Validates transform requests and enqueues them; the pixels are produced
/// later by the transform job handler.
#[derive(Clone)]
pub struct TransformService {
    repository: Arc<dyn ImageRepository>,
    queue: Arc<dyn JobQueue>,
    ids: Arc<dyn IdGenerator>,
}

impl TransformService {
    pub fn new(
        repository: Arc<dyn ImageRepository>,
        queue: Arc<dyn JobQueue>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            repository,
            queue,
            ids,
        }
    }

    /// Enqueue a transform of `image_id` and return the job id.
    ///
    /// Nothing is enqueued unless the image exists, belongs to `caller_id` and
    /// the options are valid for its dimensions.
    #[tracing::instrument(skip(self, request), fields(image_id = %image_id, caller_id = %caller_id))]
    pub async fn submit(
        &self,
        image_id: Uuid,
        caller_id: Uuid,
        request: TransformRequest,
    ) -> AppResult<Uuid> {
        request.validate()?;
        if request.options.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one transformation is required".to_string(),
            ));
        }

        let image = self
            .repository
            .find_by_id(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))?;
        if !image.is_owned_by(caller_id) {
            return Err(AppError::Unauthorized(
                "Image belongs to another user".to_string(),
            ));
        }

        request
            .options
            .check_bounds(image.width, image.height)
            .map_err(AppError::InvalidInput)?;

        let target_image_id = match request.mode {
            TransformMode::InPlace => image.id,
            TransformMode::NewDerivative => self.ids.next_id(),
        };

        let payload = TransformJobPayload {
            image_id: image.id,
            caller_id,
            target_image_id,
            source_key: image.stored_file_name.clone(),
            mode: request.mode,
            options: request.options,
        };

        let job_id = self
            .queue
            .add(JobType::Transform, serde_json::to_value(&payload)?)
            .await?;

        tracing::info!(
            job_id = %job_id,
            target_image_id = %target_image_id,
            mode = ?payload.mode,
            "Transform job queued"
        );
        Ok(job_id)
    }

    /// Job status, visible only to the caller who submitted it.
    pub async fn job_status(&self, job_id: Uuid, caller_id: Uuid) -> AppResult<JobStatus> {
        let not_found = || AppError::NotFound(format!("Job {} not found", job_id));

        let job = self.queue.get(job_id).await?.ok_or_else(not_found)?;
        if job.job_type != JobType::Transform {
            return Err(not_found());
        }
        let payload: TransformJobPayload = job
            .try_payload_as()
            .map_err(|e| AppError::Internal(format!("Unreadable job payload: {}", e)))?;
        if payload.caller_id != caller_id {
            return Err(not_found());
        }

        Ok(JobStatus::from_job(&job, &payload))
    }
}
