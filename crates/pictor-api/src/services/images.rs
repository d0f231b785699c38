use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use pictor_cache::ImageCache;
use pictor_core::constants::IMAGES_FOLDER;
use pictor_core::models::{Image, ImageView};
use pictor_core::{AppError, AppResult, IdGenerator};
use pictor_db::ImageRepository;
use pictor_processing::ImageProcessor;
use pictor_storage::Storage;
use uuid::Uuid;

use super::run_blocking;

/// Signed URLs are resolved this many at a time when listing.
const URL_RESOLVE_CONCURRENCY: usize = 16;

/// Upload, read and delete.
///
/// Reads go through the cache and always resolve a fresh URL from storage;
/// cached records never carry one. Writes invalidate the affected keys.
#[derive(Clone)]
pub struct ImageService {
    storage: Arc<dyn Storage>,
    processor: Arc<dyn ImageProcessor>,
    repository: Arc<dyn ImageRepository>,
    cache: ImageCache,
    ids: Arc<dyn IdGenerator>,
    max_upload_bytes: usize,
}

impl ImageService {
    pub fn new(
        storage: Arc<dyn Storage>,
        processor: Arc<dyn ImageProcessor>,
        repository: Arc<dyn ImageRepository>,
        cache: ImageCache,
        ids: Arc<dyn IdGenerator>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            storage,
            processor,
            repository,
            cache,
            ids,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    #[tracing::instrument(skip(self, data), fields(owner_id = %caller_id, size_bytes = data.len()))]
    pub async fn upload(
        &self,
        caller_id: Uuid,
        original_name: &str,
        data: Vec<u8>,
    ) -> AppResult<ImageView> {
        if data.is_empty() {
            return Err(AppError::InvalidImage("Uploaded file is empty".to_string()));
        }
        if data.len() > self.max_upload_bytes {
            return Err(AppError::InvalidInput(format!(
                "File of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_upload_bytes
            )));
        }

        let processor = self.processor.clone();
        let (metadata, data) = run_blocking(move || {
            let metadata = processor.metadata(&data)?;
            Ok((metadata, data))
        })
        .await?;

        let key = self.storage.generate_key(original_name, IMAGES_FOLDER);
        self.storage
            .upload(&key, data, metadata.format.mime_type())
            .await?;

        let now = Utc::now();
        let image = Image {
            id: self.ids.next_id(),
            owner_id: caller_id,
            original_file_name: original_name.to_string(),
            stored_file_name: key.clone(),
            mime_type: metadata.format.mime_type().to_string(),
            size: metadata.size,
            width: metadata.width,
            height: metadata.height,
            format: metadata.format,
            created_at: now,
            updated_at: now,
        };

        let image = match self.repository.save(&image).await {
            Ok(saved) => saved,
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&key).await {
                    tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned upload");
                }
                return Err(e.into());
            }
        };

        self.invalidate_owner_listing(caller_id).await;

        tracing::info!(
            image_id = %image.id,
            key = %key,
            width = image.width,
            height = image.height,
            format = %image.format,
            "Image uploaded"
        );

        self.to_view(image).await
    }

    /// Owner-scoped read by id.
    #[tracing::instrument(skip(self), fields(image_id = %id, owner_id = %caller_id))]
    pub async fn get_by_id(&self, id: Uuid, caller_id: Uuid) -> AppResult<ImageView> {
        let image = self.load(id).await?;
        if !image.is_owned_by(caller_id) {
            return Err(AppError::Unauthorized(
                "Image belongs to another user".to_string(),
            ));
        }
        self.to_view(image).await
    }

    /// All images of `owner_id`, newest first.
    #[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn get_by_owner(&self, owner_id: Uuid) -> AppResult<Vec<ImageView>> {
        let images = match self.cache.get_owner_listing(owner_id).await {
            Ok(Some(images)) => {
                tracing::debug!(count = images.len(), "Owner listing cache hit");
                images
            }
            Ok(None) => self.load_owner_listing(owner_id).await?,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, falling back to repository");
                self.load_owner_listing(owner_id).await?
            }
        };

        stream::iter(images)
            .map(|image| self.to_view(image))
            .buffered(URL_RESOLVE_CONCURRENCY)
            .try_collect()
            .await
    }

    #[tracing::instrument(skip(self), fields(image_id = %id, owner_id = %caller_id))]
    pub async fn delete(&self, id: Uuid, caller_id: Uuid) -> AppResult<()> {
        let image = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", id)))?;
        if !image.is_owned_by(caller_id) {
            return Err(AppError::Unauthorized(
                "Image belongs to another user".to_string(),
            ));
        }

        self.storage.delete(&image.stored_file_name).await?;
        self.repository.delete(id).await?;

        self.invalidate_image(id).await;
        self.invalidate_owner_listing(image.owner_id).await;

        tracing::info!(key = %image.stored_file_name, "Image deleted");
        Ok(())
    }

    /// Record by id, from cache when possible.
    async fn load(&self, id: Uuid) -> AppResult<Image> {
        match self.cache.get_image(id).await {
            Ok(Some(image)) => {
                tracing::debug!("Image cache hit");
                return Ok(image);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, falling back to repository");
            }
        }

        let image = self
            .repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", id)))?;

        if let Err(e) = self.cache.put_image(&image).await {
            tracing::warn!(error = %e, "Failed to populate image cache");
        }
        Ok(image)
    }

    async fn load_owner_listing(&self, owner_id: Uuid) -> AppResult<Vec<Image>> {
        let images = self.repository.find_by_owner(owner_id).await?;
        if let Err(e) = self.cache.put_owner_listing(owner_id, &images).await {
            tracing::warn!(error = %e, "Failed to populate owner listing cache");
        }
        Ok(images)
    }

    async fn to_view(&self, image: Image) -> AppResult<ImageView> {
        let url = self.storage.public_url(&image.stored_file_name).await?;
        Ok(ImageView { image, url })
    }

    // Request-path invalidation failures leave entries to expire with their TTL.
    async fn invalidate_image(&self, id: Uuid) {
        if let Err(e) = self.cache.invalidate_image(id).await {
            tracing::warn!(image_id = %id, error = %e, "Failed to invalidate image cache");
        }
    }

    async fn invalidate_owner_listing(&self, owner_id: Uuid) {
        if let Err(e) = self.cache.invalidate_owner_listing(owner_id).await {
            tracing::warn!(owner_id = %owner_id, error = %e, "Failed to invalidate owner listing cache");
        }
    }
}
