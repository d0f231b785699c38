//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use pictor_core::{Config, StorageBackend};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/images/upload", post(handlers::images::upload_image))
        .route("/images", get(handlers::images::list_images))
        .route(
            "/images/{id}",
            get(handlers::images::get_image).delete(handlers::images::delete_image),
        )
        .route(
            "/images/transform/{id}",
            post(handlers::jobs::submit_transform),
        )
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .with_state(state);

    let router = match local_files_route(config) {
        Some((base_url, dir)) => {
            tracing::info!(base_url = %base_url, path = %dir, "Serving local files");
            api.nest_service(base_url, ServeDir::new(dir))
        }
        None => api,
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(
                config.max_upload_size_bytes() + MULTIPART_OVERHEAD_BYTES,
            )),
    )
}

/// Local-backend URLs are served by this process when the base URL is a path.
fn local_files_route(config: &Config) -> Option<(&str, &str)> {
    let base_url = config.local_storage_base_url().trim_end_matches('/');
    let servable = config.storage_backend() == StorageBackend::Local
        && base_url.starts_with('/')
        && base_url.len() > 1;
    servable.then(|| (base_url, config.local_storage_path()))
}
