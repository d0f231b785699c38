//! Non-durable repository for tests and single-process development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use pictor_core::models::Image;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::image::ImageRepository;

#[derive(Debug, Default)]
pub struct InMemoryImageRepository {
    images: RwLock<HashMap<Uuid, Image>>,
    failing_saves: AtomicUsize,
}

impl InMemoryImageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes (`save` or `update`) fail with `Unavailable`.
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn injected_failure(&self, id: Uuid) -> RepositoryResult<()> {
        let should_fail = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RepositoryError::Unavailable(format!(
                "injected failure saving image {}",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageRepository for InMemoryImageRepository {
    async fn save(&self, image: &Image) -> RepositoryResult<Image> {
        self.injected_failure(image.id)?;

        let mut images = self.images.write().await;
        let mut stored = image.clone();
        if let Some(existing) = images.get(&image.id) {
            stored.owner_id = existing.owner_id;
            stored.created_at = existing.created_at;
        }
        images.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, image: &Image) -> RepositoryResult<Option<Image>> {
        self.injected_failure(image.id)?;

        let mut images = self.images.write().await;
        let Some(existing) = images.get_mut(&image.id) else {
            return Ok(None);
        };
        let mut stored = image.clone();
        stored.owner_id = existing.owner_id;
        stored.created_at = existing.created_at;
        *existing = stored.clone();
        Ok(Some(stored))
    }

    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Image>> {
        Ok(self.images.read().await.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Vec<Image>> {
        let mut owned: Vec<Image> = self
            .images
            .read()
            .await
            .values()
            .filter(|image| image.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned)
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.images.write().await.remove(&id).is_some())
    }
}
