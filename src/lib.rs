// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ai;
pub mod api;
pub mod compose;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod history;
pub mod images;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod relevance;
pub mod retry;
pub mod scheduler;
pub mod sink;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::error::{CallError, PipelineError};
pub use crate::orchestrator::{Components, Pipeline};
pub use crate::retry::RetryPolicy;
