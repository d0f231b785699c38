use std::time::Duration;

use async_trait::async_trait;
use pictor_core::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode cached value: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}

/// Key/value store with expiring entries.
///
/// An expired entry behaves exactly like a missing one.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> CacheResult<u64>;
}
