//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use pictor_core::{Config, UuidGenerator};
use pictor_worker::JobQueue;

use crate::state::AppState;
use crate::task_handlers::TransformJobHandler;

/// Everything `main` needs to serve HTTP and run workers.
pub struct Application {
    pub state: Arc<AppState>,
    pub router: Router,
    pub queue: Arc<dyn JobQueue>,
    pub job_handler: Arc<TransformJobHandler>,
}

/// Build backends, services and routes from configuration.
pub async fn initialize_app(config: &Config) -> Result<Application> {
    let ids = Arc::new(UuidGenerator);

    let backends = services::setup_backends(config, ids.clone())
        .await
        .context("Failed to initialize backends")?;
    let queue = backends.queue.clone();

    let (state, job_handler) = services::initialize_services(config, backends, ids)?;
    let router = routes::setup_routes(config, state.clone());

    Ok(Application {
        state,
        router,
        queue,
        job_handler,
    })
}
