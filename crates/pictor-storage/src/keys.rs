//! Shared key generation and validation for storage backends.

use std::path::{Component, Path};

use pictor_core::IdGenerator;

use crate::traits::{StorageError, StorageResult};

const MAX_EXTENSION_LEN: usize = 10;

/// Build `{folder}/{id}{.ext}` for an upload named `original_name`.
///
/// The extension is lowercased and dropped when it is missing or not plain
/// alphanumeric, so user-supplied names never leak into the key layout.
pub fn generate_storage_key(ids: &dyn IdGenerator, original_name: &str, folder: &str) -> String {
    let folder = folder.trim_matches('/');
    let id = ids.next_id();
    match extension_of(original_name) {
        Some(ext) => format!("{}/{}.{}", folder, id, ext),
        None => format!("{}/{}", folder, id),
    }
}

fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Reject keys that could escape a backend's root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    let only_normal = Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !only_normal {
        return Err(StorageError::InvalidKey(format!(
            "Storage key resolves outside storage directory: {}",
            key
        )));
    }
    Ok(())
}
