//! Social metrics derived from local commit history.
//!
//! A pure pass over the commits authored up to the cutoff: no network, no
//! subprocess. Concentration is the share of commits belonging to the top
//! contributor, the input to the lone-wolf indicator.

use crate::metrics::FieldValue;
use crate::vcs::history::CommitInfo;
use std::collections::BTreeMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocialMetrics {
    pub commit_count: usize,
    pub author_count: usize,
    pub timezone_count: usize,
    pub days_active: i64,
    /// Share of commits by the top contributor, rounded to 4 decimals.
    /// `None` for an empty history.
    pub contributor_concentration: Option<f64>,
}

pub fn compute(commits: &[CommitInfo]) -> SocialMetrics {
    if commits.is_empty() {
        return SocialMetrics::default();
    }

    let mut per_author: HashMap<&str, usize> = HashMap::new();
    let mut timezones: std::collections::HashSet<i32> = std::collections::HashSet::new();
    let mut first = i64::MAX;
    let mut last = i64::MIN;

    for commit in commits {
        *per_author.entry(commit.author_email.as_str()).or_insert(0) += 1;
        timezones.insert(commit.offset_minutes);
        first = first.min(commit.timestamp);
        last = last.max(commit.timestamp);
    }

    let top = per_author.values().copied().max().unwrap_or(0);
    let concentration = (top as f64 / commits.len() as f64 * 10_000.0).round() / 10_000.0;

    SocialMetrics {
        commit_count: commits.len(),
        author_count: per_author.len(),
        timezone_count: timezones.len(),
        days_active: (last - first) / 86_400,
        contributor_concentration: Some(concentration),
    }
}

impl SocialMetrics {
    pub fn fields(&self) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "commit_count".to_string(),
            FieldValue::Int(self.commit_count as i64),
        );
        fields.insert(
            "author_count".to_string(),
            FieldValue::Int(self.author_count as i64),
        );
        fields.insert(
            "timezone_count".to_string(),
            FieldValue::Int(self.timezone_count as i64),
        );
        fields.insert(
            "days_active".to_string(),
            FieldValue::Int(self.days_active),
        );
        if let Some(concentration) = self.contributor_concentration {
            fields.insert(
                "contributor_concentration".to_string(),
                FieldValue::Float(concentration),
            );
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(email: &str, timestamp: i64, offset: i32) -> CommitInfo {
        CommitInfo {
            author_email: email.to_string(),
            timestamp,
            offset_minutes: offset,
        }
    }

    #[test]
    fn empty_history_yields_defaults() {
        let metrics = compute(&[]);
        assert_eq!(metrics.commit_count, 0);
        assert_eq!(metrics.contributor_concentration, None);
        assert!(!metrics.fields().contains_key("contributor_concentration"));
    }

    #[test]
    fn counts_distinct_authors_and_timezones() {
        let commits = vec![
            commit("alice@example.com", 1_600_000_000, 0),
            commit("alice@example.com", 1_600_086_400, 60),
            commit("bob@example.com", 1_600_172_800, -300),
        ];
        let metrics = compute(&commits);
        assert_eq!(metrics.commit_count, 3);
        assert_eq!(metrics.author_count, 2);
        assert_eq!(metrics.timezone_count, 3);
        assert_eq!(metrics.days_active, 2);
    }

    #[test]
    fn concentration_is_top_author_share() {
        let commits = vec![
            commit("alice@example.com", 1, 0),
            commit("alice@example.com", 2, 0),
            commit("alice@example.com", 3, 0),
            commit("bob@example.com", 4, 0),
        ];
        let metrics = compute(&commits);
        assert_eq!(metrics.contributor_concentration, Some(0.75));
    }

    #[test]
    fn concentration_rounds_to_four_decimals() {
        let commits = vec![
            commit("alice@example.com", 1, 0),
            commit("alice@example.com", 2, 0),
            commit("bob@example.com", 3, 0),
        ];
        let metrics = compute(&commits);
        assert_eq!(metrics.contributor_concentration, Some(0.6667));
    }
}
