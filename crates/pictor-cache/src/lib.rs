//! Pictor Cache Library
//!
//! A string key/value cache with per-entry expiry, and the typed view the
//! image read path uses on top of it. [`MemoryCache`] is process-local;
//! [`PgCache`] is shared by every process pointed at the same database.

pub mod images;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use images::{image_key, owner_listing_key, ImageCache};
pub use memory::MemoryCache;
pub use postgres::PgCache;
pub use traits::{Cache, CacheError, CacheResult};
