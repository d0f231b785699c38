//! Postgres `jobs` table.
//!
//! Holds the raw state transitions. Retry policy (backoff, when to
//! dead-letter) is decided by the queue in `pictor-worker`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pictor_core::models::{Job, JobState, JobType};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};

#[derive(Debug, Clone)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub state: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for JobRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            payload: row.try_get("payload")?,
            state: row.try_get("state")?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| RepositoryError::CorruptRow(format!("job {}: {}", row.id, e));
        let job_type: JobType = row.job_type.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let state: JobState = row.state.parse().map_err(|e| corrupt(format!("{}", e)))?;

        Ok(Job {
            id: row.id,
            job_type,
            payload: row.payload,
            state,
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, job_type, payload, state, attempts, max_attempts, last_error, \
     created_at, updated_at";

/// Claimable: waiting jobs whose delay has passed, and active jobs whose
/// visibility window lapsed while attempts remain.
const CLAIMABLE: &str = "((state IN ('queued', 'failed_retryable') AND available_at <= NOW()) \
     OR (state = 'active' AND available_at <= NOW() AND attempts < max_attempts))";

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, payload), fields(db.table = "jobs", db.operation = "insert"))]
    pub async fn create_job(
        &self,
        id: Uuid,
        job_type: JobType,
        payload: serde_json::Value,
        max_attempts: u32,
    ) -> RepositoryResult<Job> {
        let query = format!(
            r#"
            INSERT INTO jobs (id, job_type, payload, state, attempts, max_attempts, available_at)
            VALUES ($1, $2, $3, 'queued', 0, $4, NOW())
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let row: JobRow = sqlx::query_as::<Postgres, JobRow>(&query)
            .bind(id)
            .bind(job_type.to_string())
            .bind(payload)
            .bind(max_attempts as i32)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, job_id = %id, "Failed to insert job into database");
                RepositoryError::from(e)
            })?;

        row.try_into()
    }

    /// Claim the oldest claimable job, bump its attempt counter and hide it
    /// for `visibility`.
    #[tracing::instrument(skip(self), fields(db.table = "jobs", db.operation = "claim"))]
    pub async fn claim_next_job(&self, visibility: Duration) -> RepositoryResult<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            r#"
            SELECT {}
            FROM jobs
            WHERE {}
            ORDER BY available_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
            JOB_COLUMNS, CLAIMABLE
        );
        let candidate: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&select)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(candidate) = candidate else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let update = format!(
            r#"
            UPDATE jobs
            SET state = 'active',
                attempts = attempts + 1,
                available_at = NOW() + ($2::double precision * INTERVAL '1 second'),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let row: JobRow = sqlx::query_as::<Postgres, JobRow>(&update)
            .bind(candidate.id)
            .bind(visibility.as_secs_f64())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        let job: Job = row.try_into()?;
        tracing::debug!(job_id = %job.id, attempts = job.attempts, "Job claimed");
        Ok(Some(job))
    }

    /// Returns false when `attempt` no longer owns the job (its window lapsed
    /// and another delivery took over).
    #[tracing::instrument(skip(self), fields(db.table = "jobs", db.operation = "update"))]
    pub async fn mark_completed(&self, id: Uuid, attempt: u32) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed', last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND state = 'active' AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(attempt as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failed delivery. `retry_after` sets the delay before a
    /// `failed_retryable` job becomes claimable again.
    #[tracing::instrument(skip(self, error), fields(db.table = "jobs", db.operation = "update"))]
    pub async fn mark_failed(
        &self,
        id: Uuid,
        attempt: u32,
        state: JobState,
        error: &str,
        retry_after: Duration,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $3,
                last_error = $4,
                available_at = NOW() + ($5::double precision * INTERVAL '1 second'),
                updated_at = NOW()
            WHERE id = $1 AND state = 'active' AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(attempt as i32)
        .bind(state.as_str())
        .bind(error)
        .bind(retry_after.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "jobs", db.operation = "select"))]
    pub async fn get_job(&self, id: Uuid) -> RepositoryResult<Option<Job>> {
        let query = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        let row: Option<JobRow> = sqlx::query_as::<Postgres, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    /// Dead-lettered jobs, most recently failed first.
    #[tracing::instrument(skip(self), fields(db.table = "jobs", db.operation = "select"))]
    pub async fn list_dead_letters(&self, limit: u32) -> RepositoryResult<Vec<Job>> {
        let query = format!(
            "SELECT {} FROM jobs WHERE state = 'failed_terminal' ORDER BY updated_at DESC LIMIT $1",
            JOB_COLUMNS
        );
        let rows: Vec<JobRow> = sqlx::query_as::<Postgres, JobRow>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    /// Dead-letter active jobs whose window lapsed on their final attempt.
    /// Returns the number of jobs moved.
    #[tracing::instrument(skip(self), fields(db.table = "jobs", db.operation = "reap"))]
    pub async fn reap_expired(&self) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed_terminal',
                last_error = COALESCE(last_error, 'visibility window expired on final attempt'),
                updated_at = NOW()
            WHERE state = 'active'
                AND available_at <= NOW()
                AND attempts >= max_attempts
            "#,
        )
        .execute(&self.pool)
        .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            tracing::warn!(reaped, "Dead-lettered jobs abandoned on their final attempt");
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pictor_core::models::FailureKind;

    fn row(state: &str) -> JobRow {
        JobRow {
            id: Uuid::new_v4(),
            job_type: "transform".into(),
            payload: serde_json::json!({}),
            state: state.into(),
            attempts: 2,
            max_attempts: 3,
            last_error: Some("boom".into()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_maps_to_job() {
        let job = Job::try_from(row("failed_retryable")).unwrap();
        assert_eq!(job.state, JobState::Failed(FailureKind::Retryable));
        assert_eq!(job.job_type, JobType::Transform);
        assert_eq!((job.attempts, job.max_attempts), (2, 3));
    }

    #[test]
    fn unknown_state_is_corrupt() {
        assert!(matches!(
            Job::try_from(row("paused")),
            Err(RepositoryError::CorruptRow(_))
        ));
    }
}
