//! Pictor Storage Library
//!
//! Byte storage for original and transformed images behind the [`Storage`]
//! trait, with a local filesystem backend and an S3-compatible object store
//! backend.
//!
//! # Storage key format
//!
//! `{folder}/{uuid}{.ext}`, for example `images/6f1c...e2.jpg` or
//! `transformed/0b3a...91.webp`. Keys must not be empty, absolute, contain
//! `..` segments or backslashes. Key generation lives in the `keys` module so
//! every backend produces the same layout.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use pictor_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
