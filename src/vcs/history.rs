//! Read-only commit history replay.

use crate::errors::Result;
use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, Sort};
use std::path::Path;

/// One non-merge commit as seen by the social metrics pass.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    /// Author email, lowercased.
    pub author_email: String,
    /// Author timestamp, seconds since epoch.
    pub timestamp: i64,
    /// Author timezone offset from UTC, in minutes.
    pub offset_minutes: i32,
}

/// Author date of the repository's earliest commit, or `None` for an empty
/// history.
pub fn origin_commit_date(clone: &Path) -> Result<Option<DateTime<Utc>>> {
    let repo = Repository::open(clone)?;
    let mut walk = repo.revwalk()?;
    if walk.push_head().is_err() {
        // Unborn HEAD: a repository with no commits at all.
        return Ok(None);
    }
    walk.set_sorting(Sort::TIME | Sort::REVERSE)?;

    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        let when = commit.author().when();
        return Ok(Utc.timestamp_opt(when.seconds(), 0).single());
    }
    Ok(None)
}

/// All non-merge commits authored at or before `cutoff` (epoch seconds),
/// newest first. Merge commits are excluded to keep authorship counts
/// meaningful.
pub fn commits_until(clone: &Path, cutoff: i64) -> Result<Vec<CommitInfo>> {
    let repo = Repository::open(clone)?;
    let mut walk = repo.revwalk()?;
    if walk.push_head().is_err() {
        return Ok(Vec::new());
    }
    walk.set_sorting(Sort::TIME)?;

    let mut commits = Vec::new();
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        if commit.parent_count() > 1 {
            continue;
        }
        let when = commit.author().when();
        if when.seconds() > cutoff {
            continue;
        }
        let email = commit
            .author()
            .email()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        commits.push(CommitInfo {
            author_email: email,
            timestamp: when.seconds(),
            offset_minutes: when.offset_minutes(),
        });
    }
    Ok(commits)
}
