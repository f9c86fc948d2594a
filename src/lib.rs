// Export modules for library usage
pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod extract;
pub mod github;
pub mod metrics;
pub mod output;
pub mod repolist;
pub mod vcs;

// Re-export commonly used types
pub use crate::config::ExtractionConfig;
pub use crate::errors::{ExtractError, Result};
pub use crate::extract::{ExtractionOrchestrator, RunSummary};
pub use crate::github::RateLimitedClient;
pub use crate::metrics::{FieldValue, MetricsCollector, Snapshot};
pub use crate::output::{CheckpointSink, CsvCheckpointSink, PersistStage};
pub use crate::repolist::RepositoryRecord;
pub use crate::vcs::SnapshotResolver;
