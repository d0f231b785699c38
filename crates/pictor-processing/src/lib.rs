//! Pictor Processing Library
//!
//! Pure pixel work over in-memory buffers: metadata extraction and the
//! fixed-order transform pipeline. Nothing here touches storage or the
//! database, and every call is synchronous; async callers should run it on
//! the blocking thread pool.

pub mod compression;
pub mod error;
pub mod metadata;
pub mod ops;
pub mod pipeline;
pub mod processor;

pub use error::{ProcessingError, ProcessingResult};
pub use metadata::ImageMetadata;
pub use pipeline::{plan, Step};
pub use processor::{ImageProcessor, RasterProcessor};
