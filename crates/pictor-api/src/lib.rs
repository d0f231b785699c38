//! Pictor API
//!
//! Use cases (upload, read, transform submission, delete, job status), the
//! background transform job handler, and the axum HTTP boundary.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod services;
pub mod setup;
pub mod state;
pub mod task_handlers;
pub mod telemetry;
pub mod utils;

pub use state::AppState;
