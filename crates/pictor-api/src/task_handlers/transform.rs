use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use pictor_cache::ImageCache;
use pictor_core::constants::{DERIVATIVE_NAME_PREFIX, TRANSFORMED_FOLDER};
use pictor_core::models::{Image, Job, TransformJobPayload, TransformMode};
use pictor_core::{AppError, TaskError, TaskResultExt};
use pictor_db::ImageRepository;
use pictor_processing::{ImageMetadata, ImageProcessor};
use pictor_storage::Storage;

use crate::services::run_blocking;

/// Runs the transform pipeline for one delivery of a transform job.
///
/// Every delivery writes the record under the payload's `target_image_id`,
/// so a redelivered job overwrites its own earlier result.
pub struct TransformJobHandler {
    storage: Arc<dyn Storage>,
    processor: Arc<dyn ImageProcessor>,
    repository: Arc<dyn ImageRepository>,
    cache: ImageCache,
}

impl TransformJobHandler {
    pub fn new(
        storage: Arc<dyn Storage>,
        processor: Arc<dyn ImageProcessor>,
        repository: Arc<dyn ImageRepository>,
        cache: ImageCache,
    ) -> Self {
        Self {
            storage,
            processor,
            repository,
            cache,
        }
    }

    fn build_record(
        source: &Image,
        payload: &TransformJobPayload,
        key: String,
        output: &ImageMetadata,
    ) -> Image {
        let now = Utc::now();
        let (original_file_name, created_at) = match payload.mode {
            TransformMode::InPlace => (source.original_file_name.clone(), source.created_at),
            TransformMode::NewDerivative => (
                format!("{}{}", DERIVATIVE_NAME_PREFIX, source.original_file_name),
                now,
            ),
        };

        Image {
            id: payload.target_image_id,
            owner_id: source.owner_id,
            original_file_name,
            stored_file_name: key,
            mime_type: output.format.mime_type().to_string(),
            size: output.size,
            width: output.width,
            height: output.height,
            format: output.format,
            created_at,
            updated_at: now,
        }
    }

    async fn discard_output(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove unrecorded transform output");
        }
    }
}

#[async_trait]
impl pictor_worker::JobHandler for TransformJobHandler {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, attempt = job.attempts))]
    async fn handle(&self, job: &Job) -> Result<(), TaskError> {
        let payload: TransformJobPayload = job.try_payload_as().unrecoverable()?;
        let image_id = payload.image_id;

        let source = self
            .repository
            .find_by_id(image_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))?;

        tracing::debug!(image_id = %image_id, key = %payload.source_key, "Downloading source");
        let data = self
            .storage
            .download(&payload.source_key)
            .await
            .map_err(AppError::from)?;

        let processor = self.processor.clone();
        let options = payload.options.clone();
        let (output, metadata) = run_blocking(move || {
            let output = processor.transform(&data, &options)?;
            let metadata = processor.metadata(&output)?;
            Ok((output, metadata))
        })
        .await?;

        tracing::debug!(
            image_id = %image_id,
            width = metadata.width,
            height = metadata.height,
            format = %metadata.format,
            "Transform finished"
        );

        let key = self.storage.generate_key(
            &format!("output.{}", metadata.format.extension()),
            TRANSFORMED_FOLDER,
        );
        self.storage
            .upload(&key, output, metadata.format.mime_type())
            .await
            .map_err(AppError::from)?;

        let record = Self::build_record(&source, &payload, key.clone(), &metadata);
        let stored = match payload.mode {
            // The source may have been deleted since it was read; never recreate it.
            TransformMode::InPlace => self.repository.update(&record).await,
            TransformMode::NewDerivative => self.repository.save(&record).await.map(Some),
        };
        let record = match stored {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.discard_output(&key).await;
                return Err(AppError::NotFound(format!(
                    "Image {} was deleted during the transform",
                    image_id
                ))
                .into());
            }
            Err(e) => {
                self.discard_output(&key).await;
                return Err(AppError::from(e).into());
            }
        };

        // A failed invalidation fails the delivery; the retry rewrites the
        // same record and tries again.
        self.cache
            .invalidate_image(record.id)
            .await
            .map_err(AppError::from)?;
        self.cache
            .invalidate_owner_listing(record.owner_id)
            .await
            .map_err(AppError::from)?;

        tracing::info!(
            image_id = %image_id,
            target_image_id = %record.id,
            key = %key,
            "Transformed image stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use pictor_cache::MemoryCache;
    use pictor_core::models::{ImageFormat, JobState, JobType, TransformOptions};
    use pictor_core::UuidGenerator;
    use pictor_db::{InMemoryImageRepository, RepositoryResult};
    use pictor_processing::RasterProcessor;
    use pictor_storage::MemoryStorage;
    use pictor_worker::JobHandler;
    use uuid::Uuid;

    /// Deletes each record right after handing it out, as a concurrent
    /// `DELETE /images/{id}` would between the worker's read and write.
    struct DeletedAfterRead {
        inner: InMemoryImageRepository,
    }

    #[async_trait]
    impl ImageRepository for DeletedAfterRead {
        async fn save(&self, image: &Image) -> RepositoryResult<Image> {
            self.inner.save(image).await
        }

        async fn update(&self, image: &Image) -> RepositoryResult<Option<Image>> {
            self.inner.update(image).await
        }

        async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<Image>> {
            let found = self.inner.find_by_id(id).await?;
            self.inner.delete(id).await?;
            Ok(found)
        }

        async fn find_by_owner(&self, owner_id: Uuid) -> RepositoryResult<Vec<Image>> {
            self.inner.find_by_owner(owner_id).await
        }

        async fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
            self.inner.delete(id).await
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn job_for(payload: &TransformJobPayload) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            job_type: JobType::Transform,
            payload: serde_json::to_value(payload).unwrap(),
            state: JobState::Active,
            attempts: 1,
            max_attempts: 3,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn source() -> Image {
        let created = Utc::now() - chrono::Duration::days(1);
        Image {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            original_file_name: "cat.png".to_string(),
            stored_file_name: "images/a.png".to_string(),
            mime_type: "image/png".to_string(),
            size: 100,
            width: 80,
            height: 60,
            format: ImageFormat::Png,
            created_at: created,
            updated_at: created,
        }
    }

    fn payload(source: &Image, mode: TransformMode, target: Uuid) -> TransformJobPayload {
        TransformJobPayload {
            image_id: source.id,
            caller_id: source.owner_id,
            target_image_id: target,
            source_key: source.stored_file_name.clone(),
            mode,
            options: TransformOptions::default(),
        }
    }

    fn output() -> ImageMetadata {
        ImageMetadata {
            width: 40,
            height: 30,
            format: ImageFormat::Webp,
            size: 12,
        }
    }

    #[test]
    fn in_place_keeps_identity_and_creation_time() {
        let src = source();
        let record = TransformJobHandler::build_record(
            &src,
            &payload(&src, TransformMode::InPlace, src.id),
            "transformed/b.webp".to_string(),
            &output(),
        );

        assert_eq!(record.id, src.id);
        assert_eq!(record.created_at, src.created_at);
        assert_eq!(record.original_file_name, "cat.png");
        assert_eq!(record.mime_type, "image/webp");
        assert_eq!((record.width, record.height, record.size), (40, 30, 12));
        assert!(record.updated_at > src.updated_at);
    }

    #[test]
    fn derivative_gets_prefixed_name_and_new_creation_time() {
        let src = source();
        let target = Uuid::new_v4();
        let record = TransformJobHandler::build_record(
            &src,
            &payload(&src, TransformMode::NewDerivative, target),
            "transformed/c.webp".to_string(),
            &output(),
        );

        assert_eq!(record.id, target);
        assert_eq!(record.owner_id, src.owner_id);
        assert_eq!(record.original_file_name, "transformed-cat.png");
        assert!(record.created_at > src.created_at);
        assert_eq!(record.stored_file_name, "transformed/c.webp");
    }

    #[tokio::test]
    async fn in_place_transform_of_deleted_image_is_terminal_and_cleans_up() {
        let src = source();
        let storage = Arc::new(MemoryStorage::new(Arc::new(UuidGenerator)));
        storage
            .upload(&src.stored_file_name, png(8, 6), "image/png")
            .await
            .unwrap();
        let repository = Arc::new(DeletedAfterRead {
            inner: InMemoryImageRepository::new(),
        });
        repository.save(&src).await.unwrap();

        let handler = TransformJobHandler::new(
            storage.clone(),
            Arc::new(RasterProcessor::new()),
            repository.clone(),
            ImageCache::new(Arc::new(MemoryCache::new())),
        );
        let job = job_for(&payload(&src, TransformMode::InPlace, src.id));

        let err = handler.handle(&job).await.unwrap_err();

        assert!(!err.is_recoverable());
        assert!(repository.inner.find_by_id(src.id).await.unwrap().is_none());
        assert_eq!(storage.keys().await, vec![src.stored_file_name.clone()]);
    }
}
