//! Pictor Core Library
//!
//! Domain models, the error taxonomy, configuration and id generation shared by
//! every pictor crate.

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod models;
pub mod storage_types;
pub mod task_error;

pub use config::{Config, PictorConfig, ProcessRole};
pub use error::{AppError, AppResult, ErrorMetadata, LogLevel};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
