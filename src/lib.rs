// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod blob;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod records;
pub mod rollup;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::ingest::types::{Article, ErrorRecord, ErrorType, FeedKind, FeedSource, RawEntry};
pub use crate::ingest::{Pipeline, RunOutput};
