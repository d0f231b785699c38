//! Worker pool: polling, bounded concurrency, reaping, shutdown.
//!
//! Shutdown stops claiming new jobs. In-flight jobs keep running; a job cut
//! off by process exit is redelivered once its visibility window lapses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pictor_core::models::{Job, JobState};
use pictor_core::Config;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::QueueResult;
use crate::handler::JobHandler;
use crate::queue::JobQueue;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Zero disables the reaper.
    pub reap_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.worker_concurrency(),
            poll_interval: config.worker_poll_interval(),
            reap_interval: config.job_reap_interval(),
        }
    }
}

/// Run one delivery of `job` through `handler` and report the outcome to the queue.
#[tracing::instrument(
    skip(queue, handler, job),
    fields(job.id = %job.id, job.type = %job.job_type, job.attempt = job.attempts)
)]
pub async fn process_job(
    queue: &dyn JobQueue,
    handler: &dyn JobHandler,
    job: Job,
) -> QueueResult<JobState> {
    let started = Instant::now();
    match handler.handle(&job).await {
        Ok(()) => {
            queue.complete(&job).await?;
            tracing::info!(
                job_id = %job.id,
                duration_ms = started.elapsed().as_millis() as u64,
                "Job completed successfully"
            );
            Ok(JobState::Completed)
        }
        Err(e) => {
            tracing::error!(
                job_id = %job.id,
                error = %e,
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                unrecoverable = !e.is_recoverable(),
                "Job execution failed"
            );
            let state = queue.fail(&job, &e).await?;
            if state.is_dead_lettered() {
                tracing::error!(job_id = %job.id, "Job dead-lettered, will not retry");
            } else {
                tracing::info!(job_id = %job.id, state = %state, "Job scheduled for retry");
            }
            Ok(state)
        }
    }
}

/// Reserve and process a single job inline. Returns `None` when nothing was claimable.
pub async fn process_next(
    queue: &dyn JobQueue,
    handler: &dyn JobHandler,
) -> QueueResult<Option<JobState>> {
    match queue.reserve().await? {
        Some(job) => Ok(Some(process_job(queue, handler, job).await?)),
        None => Ok(None),
    }
}

pub struct WorkerPool {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl WorkerPool {
    /// Spawn the polling loop (and the reaper, when enabled).
    pub fn start(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Self::run(queue, handler, config, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    async fn run(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            concurrency = config.concurrency,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let (reaper_shutdown_tx, mut reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if !config.reap_interval.is_zero() {
            let queue = queue.clone();
            let reap_interval = config.reap_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reap_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = queue.reap_expired().await {
                                tracing::error!(error = %e, "Job reaper failed");
                            }
                        }
                        _ = reaper_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                _ = sleep(config.poll_interval) => {
                    while Self::claim_and_dispatch_one(&queue, &handler, &semaphore).await {}
                }
            }
        }

        tracing::info!("Worker pool stopped");
    }

    /// Returns true when a job was dispatched.
    async fn claim_and_dispatch_one(
        queue: &Arc<dyn JobQueue>,
        handler: &Arc<dyn JobHandler>,
        semaphore: &Arc<Semaphore>,
    ) -> bool {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return false;
            }
        };

        match queue.reserve().await {
            Ok(Some(job)) => {
                let queue = queue.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let job_id = job.id;
                    if let Err(e) = process_job(queue.as_ref(), handler.as_ref(), job).await {
                        tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome");
                    }
                });
                true
            }
            Ok(None) => {
                tracing::trace!("No jobs available in queue");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reserve job from queue");
                false
            }
        }
    }

    /// Stop claiming jobs and wait for the polling loop to exit.
    pub async fn shutdown(self) {
        tracing::info!("Initiating worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Worker pool task ended abnormally");
        }
    }
}
