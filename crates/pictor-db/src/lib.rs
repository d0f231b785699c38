//! Pictor persistence layer
//!
//! The [`ImageRepository`] trait with Postgres and in-memory implementations,
//! the Postgres job table behind the durable queue, and pool setup.

pub mod error;
pub mod image;
pub mod job;
pub mod memory;
pub mod pool;

pub use error::{RepositoryError, RepositoryResult};
pub use image::{ImageRepository, PgImageRepository};
pub use job::JobRepository;
pub use memory::InMemoryImageRepository;
pub use pool::{connect, run_migrations};
