//! Backend selection and service wiring

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pictor_cache::{Cache, ImageCache, MemoryCache, PgCache};
use pictor_core::{Config, IdGenerator};
use pictor_db::{ImageRepository, InMemoryImageRepository, JobRepository, PgImageRepository};
use pictor_processing::{ImageProcessor, RasterProcessor};
use pictor_storage::{create_storage, Storage};
use pictor_worker::{JobQueue, MemoryJobQueue, PgJobQueue, QueueSettings};

use crate::services::{ImageService, TransformService};
use crate::state::AppState;
use crate::task_handlers::TransformJobHandler;

/// The swappable infrastructure behind the services.
#[derive(Clone)]
pub struct Backends {
    pub storage: Arc<dyn Storage>,
    pub processor: Arc<dyn ImageProcessor>,
    pub repository: Arc<dyn ImageRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub cache: Arc<dyn Cache>,
}

/// Postgres-backed repository, queue and cache when `DATABASE_URL` is set;
/// process-local ones otherwise.
pub async fn setup_backends(config: &Config, ids: Arc<dyn IdGenerator>) -> Result<Backends> {
    let storage = create_storage(config, ids.clone()).context("Failed to create storage")?;
    let processor = RasterProcessor::from_font_path(config.watermark_font_path())
        .context("Failed to load watermark font")?;
    if !processor.has_font() {
        tracing::warn!("No watermark font available; watermark transforms will be rejected");
    }
    let settings = QueueSettings::from_config(config);

    let (repository, queue, cache): (
        Arc<dyn ImageRepository>,
        Arc<dyn JobQueue>,
        Arc<dyn Cache>,
    ) = match config.database_url() {
        Some(url) => {
            let pool = pictor_db::connect(url, config.db_max_connections())
                .await
                .context("Failed to connect to database")?;
            pictor_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            (
                Arc::new(PgImageRepository::new(pool.clone())),
                Arc::new(PgJobQueue::new(JobRepository::new(pool.clone()), ids, settings)),
                Arc::new(PgCache::new(pool)),
            )
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set; images, jobs and cache live in process memory and are lost on restart"
            );
            (
                Arc::new(InMemoryImageRepository::new()),
                Arc::new(MemoryJobQueue::new(ids, settings)),
                Arc::new(MemoryCache::new()),
            )
        }
    };
    spawn_cache_purge(cache.clone(), config.job_reap_interval());

    Ok(Backends {
        storage,
        processor: Arc::new(processor),
        repository,
        queue,
        cache,
    })
}

/// Wire the use-case services and the transform job handler over `backends`.
pub fn initialize_services(
    config: &Config,
    backends: Backends,
    ids: Arc<dyn IdGenerator>,
) -> Result<(Arc<AppState>, Arc<TransformJobHandler>)> {
    let cache = ImageCache::new(backends.cache);

    let images = ImageService::new(
        backends.storage.clone(),
        backends.processor.clone(),
        backends.repository.clone(),
        cache.clone(),
        ids.clone(),
        config.max_upload_size_bytes(),
    );
    let transforms =
        TransformService::new(backends.repository.clone(), backends.queue.clone(), ids);
    let job_handler = TransformJobHandler::new(
        backends.storage.clone(),
        backends.processor,
        backends.repository,
        cache,
    );

    let state = AppState {
        images,
        transforms,
        storage: backends.storage,
        queue: backends.queue,
    };

    tracing::info!(
        storage = %state.storage.backend_type(),
        max_upload_bytes = config.max_upload_size_bytes(),
        "Services initialized"
    );

    Ok((Arc::new(state), Arc::new(job_handler)))
}

/// Expired entries are never returned, but they are only reclaimed by a purge.
fn spawn_cache_purge(cache: Arc<dyn Cache>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match cache.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired cache entries"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired cache entries"),
            }
        }
    });
}
