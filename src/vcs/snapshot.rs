//! Snapshot resolution: find the qualifying commit for a target date, check
//! it out, and restore the default branch afterwards.
//!
//! A snapshot is the repository state at the latest commit dated strictly
//! before the end of the target calendar date (local 23:59:59). Checkout is
//! forced and mutates the shared working tree; the caller owns the tree
//! exclusively until it calls [`SnapshotResolver::restore_default_branch`],
//! which must be attempted even when checkout or metric collection failed so
//! the clone is never left mid-snapshot.

use crate::errors::{ExtractError, Result};
use chrono::{Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{BranchType, ObjectType, Oid, Repository, Sort};
use log::debug;
use std::path::Path;

pub struct SnapshotResolver {
    /// Default-branch candidates, tried in order. Conventions vary across
    /// repositories, so this is a prioritized list rather than a single name;
    /// the symbolic `origin/HEAD` target is the final fallback.
    candidates: Vec<String>,
}

impl Default for SnapshotResolver {
    fn default() -> Self {
        Self::new(vec!["main".to_string(), "master".to_string()])
    }
}

impl SnapshotResolver {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    /// Identifier of the newest commit dated at or before the end of the
    /// target calendar date, or `None` when the history starts later.
    ///
    /// Deterministic: the same clone state and target date always resolve to
    /// the same commit.
    pub fn resolve_commit_before(
        &self,
        clone: &Path,
        target_date: NaiveDate,
    ) -> Result<Option<String>> {
        let boundary = end_of_day_timestamp(target_date);
        let repo = Repository::open(clone)?;
        let mut walk = repo.revwalk()?;
        if walk.push_head().is_err() {
            return Ok(None);
        }
        walk.set_sorting(Sort::TIME)?;

        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            if commit.time().seconds() <= boundary {
                return Ok(Some(commit.id().to_string()));
            }
        }
        Ok(None)
    }

    /// Forced checkout of a commit, detaching HEAD.
    pub fn checkout(&self, clone: &Path, commit_id: &str) -> Result<()> {
        let repo = Repository::open(clone)?;
        let attempt = || -> std::result::Result<(), git2::Error> {
            let oid = Oid::from_str(commit_id)?;
            let commit = repo.find_commit(oid)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
            repo.set_head_detached(oid)
        };
        attempt().map_err(|e| ExtractError::CheckoutFailed {
            commit: commit_id.to_string(),
            path: clone.to_path_buf(),
            reason: e.message().to_string(),
        })
    }

    /// Put the working tree back on a default branch, trying each candidate
    /// name in order and finally the symbolic `origin/HEAD` target. Returns
    /// the branch name that won.
    pub fn restore_default_branch(&self, clone: &Path) -> Result<String> {
        let repo = Repository::open(clone)?;
        let mut tried = Vec::new();

        for name in &self.candidates {
            tried.push(name.clone());
            if checkout_local_branch(&repo, name).is_ok() {
                debug!("restored {} in {}", name, clone.display());
                return Ok(name.clone());
            }
        }

        tried.push("origin/HEAD".to_string());
        if let Some(name) = checkout_symbolic_default(&repo) {
            debug!("restored {} (via origin/HEAD) in {}", name, clone.display());
            return Ok(name);
        }

        Err(ExtractError::BranchRestoreFailed {
            path: clone.to_path_buf(),
            tried,
        })
    }
}

fn checkout_local_branch(
    repo: &Repository,
    name: &str,
) -> std::result::Result<(), git2::Error> {
    let branch = repo.find_branch(name, BranchType::Local)?;
    let refname = branch
        .get()
        .name()
        .ok_or_else(|| git2::Error::from_str("branch reference has no utf-8 name"))?
        .to_string();
    let target = branch.get().peel(ObjectType::Commit)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(&target, Some(&mut checkout))?;
    repo.set_head(&refname)
}

/// Follow `refs/remotes/origin/HEAD` to the remote's default branch, creating
/// a matching local branch when one doesn't exist yet.
fn checkout_symbolic_default(repo: &Repository) -> Option<String> {
    let head_ref = repo.find_reference("refs/remotes/origin/HEAD").ok()?;
    let target = head_ref.symbolic_target()?;
    let short = target.strip_prefix("refs/remotes/origin/")?.to_string();

    if repo.find_branch(&short, BranchType::Local).is_err() {
        let commit = head_ref.peel_to_commit().ok()?;
        repo.branch(&short, &commit, false).ok()?;
    }
    checkout_local_branch(repo, &short).ok()?;
    Some(short)
}

/// Epoch timestamp of 23:59:59 local time on the given calendar date.
pub fn end_of_day_timestamp(date: NaiveDate) -> i64 {
    let time = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    let dt = date.and_time(time);
    match Local.from_local_datetime(&dt) {
        LocalResult::Single(t) => t.timestamp(),
        LocalResult::Ambiguous(t, _) => t.timestamp(),
        LocalResult::None => Utc.from_utc_datetime(&dt).timestamp(),
    }
}

#[doc(hidden)]
pub mod test_support {
    //! Fixture helpers shared by unit and integration tests.

    use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature, Time};
    use std::path::Path;

    /// Initialize an empty repository with `main` as the initial branch.
    pub fn init_repo(dir: &Path) -> Repository {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("refs/heads/main");
        Repository::init_opts(dir, &opts).expect("init fixture repository")
    }

    /// Add a commit with a fixed author/committer timestamp (UTC).
    pub fn commit_at(repo: &Repository, content: &str, secs: i64, email: &str) -> Oid {
        let workdir = repo.workdir().expect("fixture repo has a workdir");
        std::fs::write(workdir.join("data.txt"), content).expect("write fixture file");

        let mut index = repo.index().expect("open index");
        index
            .add_path(Path::new("data.txt"))
            .expect("stage fixture file");
        index.write().expect("write index");
        let tree_id = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_id).expect("find tree");

        let sig = Signature::new("Fixture", email, &Time::new(secs, 0)).expect("signature");
        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&Commit> = parent.iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, content, &tree, &parents)
            .expect("create fixture commit")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{commit_at, init_repo};
    use super::*;
    use chrono::DateTime;

    /// A calendar date comfortably after the given epoch timestamp in every
    /// timezone (two days later).
    fn date_after(secs: i64) -> NaiveDate {
        DateTime::from_timestamp(secs + 2 * 86_400, 0)
            .expect("valid timestamp")
            .date_naive()
    }

    fn date_before(secs: i64) -> NaiveDate {
        DateTime::from_timestamp(secs - 2 * 86_400, 0)
            .expect("valid timestamp")
            .date_naive()
    }

    #[test]
    fn resolves_newest_commit_before_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_at(&repo, "a", 1_600_000_000, "alice@example.com");
        commit_at(&repo, "b", 1_600_500_000, "bob@example.com");

        let resolver = SnapshotResolver::default();
        let resolved = resolver
            .resolve_commit_before(dir.path(), date_after(1_600_000_000))
            .unwrap();
        assert_eq!(resolved, Some(first.to_string()));
    }

    #[test]
    fn resolution_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_at(&repo, "a", 1_600_000_000, "alice@example.com");
        commit_at(&repo, "b", 1_600_100_000, "bob@example.com");

        let resolver = SnapshotResolver::default();
        let date = date_after(1_600_100_000);
        let first = resolver.resolve_commit_before(dir.path(), date).unwrap();
        let second = resolver.resolve_commit_before(dir.path(), date).unwrap();
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn no_commit_before_history_start() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_at(&repo, "a", 1_600_000_000, "alice@example.com");

        let resolver = SnapshotResolver::default();
        let resolved = resolver
            .resolve_commit_before(dir.path(), date_before(1_600_000_000))
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn checkout_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_at(&repo, "old content", 1_600_000_000, "alice@example.com");
        commit_at(&repo, "new content", 1_600_500_000, "alice@example.com");

        let resolver = SnapshotResolver::default();
        resolver.checkout(dir.path(), &first.to_string()).unwrap();
        let content = std::fs::read_to_string(dir.path().join("data.txt")).unwrap();
        assert_eq!(content, "old content");

        let branch = resolver.restore_default_branch(dir.path()).unwrap();
        assert_eq!(branch, "main");
        let content = std::fs::read_to_string(dir.path().join("data.txt")).unwrap();
        assert_eq!(content, "new content");
        assert!(!Repository::open(dir.path()).unwrap().head_detached().unwrap());
    }

    #[test]
    fn checkout_of_unknown_commit_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_at(&repo, "a", 1_600_000_000, "alice@example.com");

        let resolver = SnapshotResolver::default();
        let err = resolver
            .checkout(dir.path(), "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef")
            .unwrap_err();
        assert_eq!(err.category(), "checkout");
        assert!(!err.is_fatal());
    }

    #[test]
    fn restore_reports_all_tried_candidates() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());

        // No commits: no branch exists to restore.
        let resolver = SnapshotResolver::default();
        let err = resolver.restore_default_branch(dir.path()).unwrap_err();
        match err {
            ExtractError::BranchRestoreFailed { tried, .. } => {
                assert_eq!(tried, vec!["main", "master", "origin/HEAD"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn restore_falls_back_to_legacy_branch_name() {
        let dir = tempfile::tempdir().unwrap();
        let repo = {
            let mut opts = git2::RepositoryInitOptions::new();
            opts.initial_head("refs/heads/master");
            Repository::init_opts(dir.path(), &opts).unwrap()
        };
        commit_at(&repo, "a", 1_600_000_000, "alice@example.com");

        let resolver = SnapshotResolver::default();
        let branch = resolver.restore_default_branch(dir.path()).unwrap();
        assert_eq!(branch, "master");
    }

    #[test]
    fn end_of_day_orders_with_dates() {
        let early = end_of_day_timestamp(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let late = end_of_day_timestamp(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(late - early, 86_400);
    }
}
