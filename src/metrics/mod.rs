//! Metric collection for one snapshot.
//!
//! [`MetricsCollector`] is a facade over three independent sub-passes:
//!
//! - a pure local pass replaying commit history up to the cutoff
//!   ([`social`]);
//! - remote collaboration-artifact queries through the rate-limited client
//!   ([`collaboration`]), plus the threshold indicators derived from both
//!   ([`indicators`]);
//! - the external static-analysis tool run against the checked-out working
//!   tree ([`smells`]).
//!
//! Any sub-pass may be absent (dry run, no token, no detector, timeout);
//! the returned mapping is then partial. Field names are discovered
//! dynamically, so new smell categories simply become new columns at
//! serialization time.

pub mod collaboration;
pub mod indicators;
pub mod smells;
pub mod social;

use crate::config::ExtractionConfig;
use crate::github::RateLimitedClient;
use crate::repolist::RepositoryRecord;
use crate::vcs::history;
use crate::vcs::snapshot::end_of_day_timestamp;
use chrono::NaiveDate;
use log::warn;
use smells::SmellDetector;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A single named metric value. Booleans serialize as 1/0 to keep the
/// output table purely numeric.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(true) => write!(f, "1"),
            Self::Bool(false) => write!(f, "0"),
        }
    }
}

/// One extracted (repository, project-year) record. Immutable once appended
/// to the result set.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub name: String,
    pub owner: String,
    pub slug: String,
    pub year: u32,
    pub target_date: NaiveDate,
    pub origin_date: NaiveDate,
    /// Abbreviated commit identifier, empty when resolution failed.
    pub commit: String,
    pub fields: BTreeMap<String, FieldValue>,
}

pub struct MetricsCollector {
    client: Option<RateLimitedClient>,
    detector: Option<SmellDetector>,
    results_root: PathBuf,
    per_page: usize,
    max_pages: usize,
}

impl MetricsCollector {
    pub fn new(
        client: Option<RateLimitedClient>,
        detector: Option<SmellDetector>,
        results_root: PathBuf,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            client,
            detector,
            results_root,
            per_page: config.per_page,
            max_pages: config.max_pages,
        }
    }

    /// Remote calls consumed so far, for the end-of-run summary.
    pub fn api_calls(&self) -> u64 {
        self.client.as_ref().map_or(0, RateLimitedClient::calls_made)
    }

    /// Collect all available metrics for one snapshot.
    ///
    /// `tree_checked_out` gates the technical pass: the detector only runs
    /// when the working tree actually holds the snapshot state. The social
    /// pass reads history directly and runs regardless.
    pub fn collect(
        &mut self,
        record: &RepositoryRecord,
        year: u32,
        target_date: NaiveDate,
        tree_checked_out: bool,
    ) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();

        let cutoff = end_of_day_timestamp(target_date);
        let commits = match history::commits_until(&record.clone_path, cutoff) {
            Ok(commits) => commits,
            Err(e) => {
                warn!(
                    "history replay failed for {} year {}: {}",
                    record.name, year, e
                );
                Vec::new()
            }
        };
        let social = social::compute(&commits);
        fields.extend(social.fields());

        if let Some(client) = self.client.as_mut() {
            let collab = collaboration::collect(
                client,
                &record.owner,
                &record.slug,
                target_date,
                self.per_page,
                self.max_pages,
            );
            fields.extend(collab.fields());
            // Indicators need both passes; without remote data the
            // radio-silence threshold would fire spuriously.
            fields.extend(indicators::indicators(&social, &collab));
        }

        if tree_checked_out {
            if let Some(detector) = &self.detector {
                let out_dir = self
                    .results_root
                    .join(&record.name)
                    .join(format!("year_{}", year))
                    .join("smells");
                fields.extend(detector.run(&record.clone_path, &out_dir));
            }
        }

        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_render_for_csv() {
        assert_eq!(FieldValue::Int(42).to_string(), "42");
        assert_eq!(FieldValue::Float(0.75).to_string(), "0.75");
        assert_eq!(FieldValue::Bool(true).to_string(), "1");
        assert_eq!(FieldValue::Bool(false).to_string(), "0");
    }

    #[test]
    fn local_only_collector_produces_social_fields() {
        use crate::vcs::snapshot::test_support::{commit_at, init_repo};

        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path().join("clone").as_path());
        commit_at(&repo, "a", 1_577_836_800, "alice@example.com"); // 2020-01-01
        commit_at(&repo, "b", 1_580_515_200, "bob@example.com"); // 2020-02-01

        let record = RepositoryRecord {
            name: "demo".into(),
            url: "https://github.com/acme/demo".into(),
            owner: "acme".into(),
            slug: "demo".into(),
            clone_path: dir.path().join("clone"),
        };
        let config = ExtractionConfig::default();
        let mut collector =
            MetricsCollector::new(None, None, dir.path().join("results"), &config);

        let target = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
        let fields = collector.collect(&record, 1, target, true);

        assert_eq!(fields["commit_count"], FieldValue::Int(2));
        assert_eq!(fields["author_count"], FieldValue::Int(2));
        // No client: no collaboration fields, no indicators.
        assert!(!fields.contains_key("issue_count"));
        assert!(!fields.contains_key("radio_silence"));
        // No detector: no technical fields.
        assert!(!fields.contains_key("total_code_smells"));
        assert_eq!(collector.api_calls(), 0);
    }
}
