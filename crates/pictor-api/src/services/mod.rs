//! Use cases behind the HTTP handlers.
//!
//! Every operation returns `AppResult` and takes the caller id explicitly;
//! handlers only translate between HTTP and these calls.

pub mod images;
pub mod transform;

pub use images::ImageService;
pub use transform::{JobStatus, TransformService};

use pictor_core::{AppError, AppResult};

/// Run CPU-bound image work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Image task panicked: {}", e)))?
}
