//! In-process storage used by tests and single-process development setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pictor_core::{IdGenerator, StorageBackend};
use tokio::sync::RwLock;

use crate::keys::{generate_storage_key, validate_key};
use crate::traits::{Storage, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// Keeps objects in a map. Every `public_url` call is counted and returns a
/// URL carrying that call number, so callers can tell fresh URLs apart.
#[derive(Debug)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
    ids: Arc<dyn IdGenerator>,
    url_calls: AtomicUsize,
    failing_uploads: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            ids,
            url_calls: AtomicUsize::new(0),
            failing_uploads: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` uploads fail with `UploadFailed`.
    pub fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    pub fn url_calls(&self) -> usize {
        self.url_calls.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        let should_fail = self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StorageError::UploadFailed(format!(
                "injected failure for {}",
                key
            )));
        }
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn generate_key(&self, original_name: &str, folder: &str) -> String {
        generate_storage_key(self.ids.as_ref(), original_name, folder)
    }

    async fn public_url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let n = self.url_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("memory://{}?v={}", key, n))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    /// Behaves like the local backend: unsigned URLs, nothing expires.
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pictor_core::SequentialIdGenerator;

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let storage = MemoryStorage::new(Arc::new(SequentialIdGenerator::new()));
        storage.fail_next_uploads(1);

        assert!(storage.upload("images/a", vec![1], "image/png").await.is_err());
        storage.upload("images/a", vec![1], "image/png").await.unwrap();
        assert_eq!(storage.download("images/a").await.unwrap(), vec![1]);
        assert_eq!(
            storage.content_type("images/a").await.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn urls_are_fresh_per_call() {
        let storage = MemoryStorage::new(Arc::new(SequentialIdGenerator::new()));
        let a = storage.public_url("images/a").await.unwrap();
        let b = storage.public_url("images/a").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(storage.url_calls(), 2);
    }
}
