//! Idempotent repository cloning with a transfer deadline.

use crate::errors::{ExtractError, Result};
use crate::repolist::RepositoryRecord;
use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// A fresh clone was created.
    Cloned,
    /// An existing local clone was reused untouched.
    Reused,
}

/// Ensure the repository has a local clone at its configured path.
///
/// Reuses an existing clone (idempotent). A fresh clone carries a wall-clock
/// deadline enforced through the transfer-progress callback; an aborted or
/// failed clone removes the partial directory so a later attempt never sees
/// a half-written clone.
pub fn ensure_clone(record: &RepositoryRecord, timeout: Duration) -> Result<CloneOutcome> {
    if record.clone_path.join(".git").exists() {
        debug!("reusing existing clone of {}", record.name);
        return Ok(CloneOutcome::Reused);
    }

    if let Some(parent) = record.clone_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!("cloning {} from {}", record.name, record.url);
    let deadline = Instant::now() + timeout;
    let mut callbacks = RemoteCallbacks::new();
    // Returning false from the progress callback aborts the fetch.
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);

    match RepoBuilder::new()
        .fetch_options(fetch)
        .clone(&record.url, &record.clone_path)
    {
        Ok(_) => Ok(CloneOutcome::Cloned),
        Err(e) => {
            if record.clone_path.exists() {
                if let Err(cleanup) = std::fs::remove_dir_all(&record.clone_path) {
                    warn!(
                        "could not remove partial clone {}: {}",
                        record.clone_path.display(),
                        cleanup
                    );
                }
            }
            Err(ExtractError::CloneFailed {
                name: record.name.clone(),
                url: record.url.clone(),
                reason: e.message().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(dir: &std::path::Path) -> RepositoryRecord {
        RepositoryRecord {
            name: "demo".into(),
            url: "https://invalid.invalid/acme/demo.git".into(),
            owner: "acme".into(),
            slug: "demo".into(),
            clone_path: dir.join("demo"),
        }
    }

    #[test]
    fn existing_clone_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let record = record(dir.path());
        git2::Repository::init(&record.clone_path).unwrap();

        let outcome = ensure_clone(&record, Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, CloneOutcome::Reused);
    }

    #[test]
    fn failed_clone_reports_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let record = record(dir.path());

        let err = ensure_clone(&record, Duration::from_secs(5)).unwrap_err();
        match err {
            ExtractError::CloneFailed { name, .. } => assert_eq!(name, "demo"),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!PathBuf::from(&record.clone_path).exists());
    }
}
