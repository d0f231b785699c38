use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pictor_core::models::{FailureKind, Job, JobState, JobType};
use pictor_core::{IdGenerator, TaskError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{state_after_failure, JobQueue, QueueSettings};
use crate::error::{QueueError, QueueResult};

#[derive(Debug)]
struct Entry {
    job: Job,
    /// Earliest delivery for waiting jobs, end of the window for active ones.
    available_at: Instant,
    seq: u64,
}

impl Entry {
    fn is_claimable(&self, now: Instant) -> bool {
        if self.available_at > now {
            return false;
        }
        match self.job.state {
            JobState::Queued | JobState::Failed(FailureKind::Retryable) => true,
            JobState::Active => !self.job.attempts_exhausted(),
            _ => false,
        }
    }

    fn is_abandoned(&self, now: Instant) -> bool {
        self.job.state == JobState::Active
            && self.available_at <= now
            && self.job.attempts_exhausted()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Uuid, Entry>,
    next_seq: u64,
}

/// Single-process queue. Jobs are lost on restart.
///
/// Time is read from `tokio::time`, so tests can step through visibility
/// windows and backoffs with a paused clock.
#[derive(Debug)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
    ids: Arc<dyn IdGenerator>,
    settings: QueueSettings,
    unavailable: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new(ids: Arc<dyn IdGenerator>, settings: QueueSettings) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ids,
            settings,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every operation fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every job in enqueue order.
    pub async fn jobs(&self) -> Vec<Job> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.job.clone()).collect()
    }

    fn check_available(&self) -> QueueResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("queue unavailable".to_string()));
        }
        Ok(())
    }

    /// The stored entry for `job`, provided `job`'s delivery still holds it.
    fn held_entry<'a>(inner: &'a mut Inner, job: &Job) -> QueueResult<&'a mut Entry> {
        let entry = inner
            .entries
            .get_mut(&job.id)
            .ok_or(QueueError::JobNotFound(job.id))?;
        if entry.job.state != JobState::Active || entry.job.attempts != job.attempts {
            return Err(QueueError::LeaseLost(job.id));
        }
        Ok(entry)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn add(&self, job_type: JobType, payload: serde_json::Value) -> QueueResult<Uuid> {
        self.check_available()?;
        let now = Utc::now();
        let job = Job {
            id: self.ids.next_id(),
            job_type,
            payload,
            state: JobState::Queued,
            attempts: 0,
            max_attempts: self.settings.max_attempts,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;

        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            id,
            Entry {
                job,
                available_at: Instant::now(),
                seq,
            },
        );

        tracing::debug!(job_id = %id, job_type = %job_type, "Job enqueued");
        Ok(id)
    }

    async fn reserve(&self) -> QueueResult<Option<Job>> {
        self.check_available()?;
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner
            .entries
            .values_mut()
            .filter(|e| e.is_claimable(now))
            .min_by_key(|e| (e.available_at, e.seq))
        else {
            return Ok(None);
        };

        if entry.job.state == JobState::Active {
            tracing::warn!(
                job_id = %entry.job.id,
                attempts = entry.job.attempts,
                "Visibility window expired, redelivering job"
            );
        }

        entry.job.state = JobState::Active;
        entry.job.attempts += 1;
        entry.job.updated_at = Utc::now();
        entry.available_at = now + self.settings.visibility_timeout;
        Ok(Some(entry.job.clone()))
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let entry = Self::held_entry(&mut inner, job)?;
        entry.job.state = JobState::Completed;
        entry.job.last_error = None;
        entry.job.updated_at = Utc::now();
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &TaskError) -> QueueResult<JobState> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        let entry = Self::held_entry(&mut inner, job)?;

        let (state, delay) = state_after_failure(&entry.job, error);
        entry.job.state = state;
        entry.job.last_error = Some(error.to_string());
        entry.job.updated_at = Utc::now();
        entry.available_at = Instant::now() + delay;
        Ok(state)
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<Job>> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .await
            .entries
            .get(&id)
            .map(|e| e.job.clone()))
    }

    async fn dead_letters(&self, limit: u32) -> QueueResult<Vec<Job>> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        let mut dead: Vec<Job> = inner
            .entries
            .values()
            .filter(|e| e.job.state.is_dead_lettered())
            .map(|e| e.job.clone())
            .collect();
        dead.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        dead.truncate(limit as usize);
        Ok(dead)
    }

    async fn reap_expired(&self) -> QueueResult<u64> {
        self.check_available()?;
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut reaped = 0;
        for entry in inner.entries.values_mut().filter(|e| e.is_abandoned(now)) {
            entry.job.state = JobState::Failed(FailureKind::Terminal);
            entry
                .job
                .last_error
                .get_or_insert_with(|| "visibility window expired on final attempt".to_string());
            entry.job.updated_at = Utc::now();
            reaped += 1;
        }
        if reaped > 0 {
            tracing::warn!(reaped, "Dead-lettered jobs abandoned on their final attempt");
        }
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MAX_RETRY_BACKOFF_SECS;
    use pictor_core::SequentialIdGenerator;
    use std::time::Duration;

    fn queue() -> MemoryJobQueue {
        MemoryJobQueue::new(
            Arc::new(SequentialIdGenerator::new()),
            QueueSettings {
                max_attempts: 3,
                visibility_timeout: Duration::from_secs(300),
            },
        )
    }

    fn retryable() -> TaskError {
        TaskError::recoverable(anyhow::anyhow!("storage timeout"))
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_job_is_redelivered_after_window() {
        let queue = queue();
        let id = queue.add(JobType::Transform, serde_json::json!({})).await.unwrap();

        let first = queue.reserve().await.unwrap().unwrap();
        assert_eq!((first.id, first.attempts), (id, 1));
        assert!(queue.reserve().await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(queue.reserve().await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(2)).await;
        let second = queue.reserve().await.unwrap().unwrap();
        assert_eq!((second.id, second.attempts), (id, 2));

        // The first delivery lost its lease.
        assert!(matches!(
            queue.complete(&first).await,
            Err(QueueError::LeaseLost(_))
        ));
        queue.complete(&second).await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().unwrap().state, JobState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_waits_out_backoff() {
        let queue = queue();
        queue.add(JobType::Transform, serde_json::json!({})).await.unwrap();

        let job = queue.reserve().await.unwrap().unwrap();
        let state = queue.fail(&job, &retryable()).await.unwrap();
        assert_eq!(state, JobState::Failed(FailureKind::Retryable));

        // attempt 1 => 2s backoff
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(queue.reserve().await.unwrap().is_none());
        tokio::time::advance(Duration::from_secs(1)).await;
        let again = queue.reserve().await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        assert_eq!(again.last_error.as_deref(), Some("storage timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_on_last_attempt_dead_letters() {
        let queue = queue();
        let id = queue.add(JobType::Transform, serde_json::json!({})).await.unwrap();

        for attempt in 1..=3 {
            tokio::time::advance(Duration::from_secs(MAX_RETRY_BACKOFF_SECS)).await;
            let job = queue.reserve().await.unwrap().unwrap();
            assert_eq!(job.attempts, attempt);
            let state = queue.fail(&job, &retryable()).await.unwrap();
            if attempt < 3 {
                assert_eq!(state, JobState::Failed(FailureKind::Retryable));
            } else {
                assert_eq!(state, JobState::Failed(FailureKind::Terminal));
            }
        }

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(queue.reserve().await.unwrap().is_none());
        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
    }

    #[tokio::test]
    async fn terminal_failure_dead_letters_on_first_attempt() {
        let queue = queue();
        queue.add(JobType::Transform, serde_json::json!({})).await.unwrap();

        let job = queue.reserve().await.unwrap().unwrap();
        let err = TaskError::unrecoverable(anyhow::anyhow!("image not found"));
        let state = queue.fail(&job, &err).await.unwrap();

        assert!(state.is_dead_lettered());
        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("image not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_final_attempt_is_reaped() {
        let queue = MemoryJobQueue::new(
            Arc::new(SequentialIdGenerator::new()),
            QueueSettings {
                max_attempts: 1,
                visibility_timeout: Duration::from_secs(10),
            },
        );
        let id = queue.add(JobType::Transform, serde_json::json!({})).await.unwrap();
        queue.reserve().await.unwrap().unwrap();

        assert_eq!(queue.reap_expired().await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(queue.reserve().await.unwrap().is_none());
        assert_eq!(queue.reap_expired().await.unwrap(), 1);
        assert!(queue.get(id).await.unwrap().unwrap().state.is_dead_lettered());
    }

    #[tokio::test]
    async fn jobs_are_delivered_in_enqueue_order() {
        let queue = queue();
        let a = queue.add(JobType::Transform, serde_json::json!({"n": 1})).await.unwrap();
        let b = queue.add(JobType::Transform, serde_json::json!({"n": 2})).await.unwrap();
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, a);
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, b);
    }
}
