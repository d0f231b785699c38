//! Job queue and worker infrastructure.
//!
//! [`JobQueue`] gives at-least-once delivery with a visibility window and a
//! bounded number of attempts. [`WorkerPool`] polls a queue and hands each
//! reserved job to a [`JobHandler`].

pub mod error;
pub mod handler;
pub mod pool;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use handler::JobHandler;
pub use pool::{process_job, process_next, WorkerConfig, WorkerPool};
pub use queue::{
    compute_retry_backoff_seconds, JobQueue, MemoryJobQueue, PgJobQueue, QueueSettings,
    MAX_RETRY_BACKOFF_SECS,
};
