//! Typed cache entries for the image read path.
//!
//! Only records are cached. URLs are resolved after every read, so a cached
//! entry never carries one.

use std::sync::Arc;
use std::time::Duration;

use pictor_core::constants::IMAGE_CACHE_TTL;
use pictor_core::models::Image;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::traits::{Cache, CacheResult};

pub fn image_key(id: Uuid) -> String {
    format!("image:{}", id)
}

pub fn owner_listing_key(owner_id: Uuid) -> String {
    format!("user_images:{}", owner_id)
}

#[derive(Clone)]
pub struct ImageCache {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ImageCache {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            ttl: IMAGE_CACHE_TTL,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_image(&self, id: Uuid) -> CacheResult<Option<Image>> {
        self.get_json(&image_key(id)).await
    }

    pub async fn put_image(&self, image: &Image) -> CacheResult<()> {
        self.put_json(&image_key(image.id), image).await
    }

    pub async fn invalidate_image(&self, id: Uuid) -> CacheResult<()> {
        self.cache.delete(&image_key(id)).await
    }

    pub async fn get_owner_listing(&self, owner_id: Uuid) -> CacheResult<Option<Vec<Image>>> {
        self.get_json(&owner_listing_key(owner_id)).await
    }

    pub async fn put_owner_listing(&self, owner_id: Uuid, images: &[Image]) -> CacheResult<()> {
        self.put_json(&owner_listing_key(owner_id), images).await
    }

    pub async fn invalidate_owner_listing(&self, owner_id: Uuid) -> CacheResult<()> {
        self.cache.delete(&owner_listing_key(owner_id)).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // An unreadable entry is a miss; the next write replaces it.
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let raw = serde_json::to_string(value)?;
        self.cache.set(key, raw, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCache;
    use chrono::Utc;
    use pictor_core::models::ImageFormat;

    fn image(owner_id: Uuid) -> Image {
        let now = Utc::now();
        Image {
            id: Uuid::new_v4(),
            owner_id,
            original_file_name: "cat.png".into(),
            stored_file_name: "images/cat.png".into(),
            mime_type: "image/png".into(),
            size: 42,
            width: 4,
            height: 2,
            format: ImageFormat::Png,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_key_formats() {
        let id = Uuid::nil();
        assert_eq!(image_key(id), "image:00000000-0000-0000-0000-000000000000");
        assert_eq!(
            owner_listing_key(id),
            "user_images:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_image_roundtrip_and_invalidate() {
        let cache = ImageCache::new(Arc::new(MemoryCache::new()));
        let img = image(Uuid::new_v4());

        assert!(cache.get_image(img.id).await.unwrap().is_none());
        cache.put_image(&img).await.unwrap();
        assert_eq!(cache.get_image(img.id).await.unwrap(), Some(img.clone()));

        cache.invalidate_image(img.id).await.unwrap();
        assert!(cache.get_image(img.id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_listing_uses_ten_minute_ttl() {
        let cache = ImageCache::new(Arc::new(MemoryCache::new()));
        let owner = Uuid::new_v4();
        cache
            .put_owner_listing(owner, &[image(owner), image(owner)])
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get_owner_listing(owner).await.unwrap().map(|l| l.len()), Some(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get_owner_listing(owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new());
        let id = Uuid::new_v4();
        backend
            .set(&image_key(id), "not json".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = ImageCache::new(backend);
        assert!(cache.get_image(id).await.unwrap().is_none());
    }
}
