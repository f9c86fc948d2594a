//! Error taxonomy for the extraction pipeline.
//!
//! Failures fall into distinct severities with distinct propagation rules:
//!
//! - **Fatal configuration** errors (missing input file, bad detector path)
//!   abort the run before any repository is touched.
//! - **Per-repository** failures (clone failure, empty history) mark one
//!   repository failed; the batch continues.
//! - **Per-snapshot** failures (no qualifying commit, checkout failure,
//!   detector timeout) skip one snapshot; the repository continues.
//! - **Transient** remote failures are retried inside the API client and
//!   never surface here.
//! - **Definitive absence** (404/422) is not an error at all; the client
//!   returns "no data".

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Missing or invalid configuration. The only variant that aborts a run.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("clone of {name} from {url} failed: {reason}")]
    CloneFailed {
        name: String,
        url: String,
        reason: String,
    },

    #[error("repository at {0} has no commit history")]
    EmptyHistory(PathBuf),

    #[error("checkout of {commit} in {path} failed: {reason}")]
    CheckoutFailed {
        commit: String,
        path: PathBuf,
        reason: String,
    },

    #[error("no default branch could be restored in {path} (tried {tried:?})")]
    BranchRestoreFailed { path: PathBuf, tried: Vec<String> },

    #[error("no commit found in {path} before {date}")]
    NoQualifyingCommit { path: PathBuf, date: String },

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExtractError {
    /// Whether this error must abort the whole run.
    ///
    /// Everything except configuration errors is absorbed at repository or
    /// snapshot granularity by the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Short category label used in log context.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::CloneFailed { .. } => "clone",
            Self::EmptyHistory(_) => "history",
            Self::CheckoutFailed { .. } => "checkout",
            Self::BranchRestoreFailed { .. } => "restore",
            Self::NoQualifyingCommit { .. } => "resolve",
            Self::Git(_) => "git",
            Self::Io(_) => "io",
            Self::Csv(_) => "csv",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
