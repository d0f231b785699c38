//! Storage abstraction trait

use async_trait::async_trait;
use pictor_core::{AppError, StorageBackend};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Stored object {}", key)),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Durable byte storage for images.
///
/// Keys are storage locators, not URLs. Call [`Storage::public_url`] whenever a
/// URL has to be handed out: remote backends return signed URLs that expire.
/// No method retries internally.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, replacing anything already there.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Fetch the bytes stored under `key`. Fails with `NotFound` when missing.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Remove the object under `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Allocate a fresh key in `folder` keeping the extension of `original_name`.
    fn generate_key(&self, original_name: &str, folder: &str) -> String;

    /// URL a client can read the object from.
    async fn public_url(&self, key: &str) -> StorageResult<String>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
