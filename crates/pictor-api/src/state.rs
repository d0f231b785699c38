//! Shared handler state.

use std::sync::Arc;

use pictor_storage::Storage;
use pictor_worker::JobQueue;

use crate::services::{ImageService, TransformService};

#[derive(Clone)]
pub struct AppState {
    pub images: ImageService,
    pub transforms: TransformService,
    /// Probed by the health check.
    pub storage: Arc<dyn Storage>,
    pub queue: Arc<dyn JobQueue>,
}
