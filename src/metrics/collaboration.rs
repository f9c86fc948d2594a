//! Collaboration-artifact metrics from the remote API.
//!
//! The issues listing returns both issues and pull requests (PRs carry a
//! `pull_request` key). One paginated call sorted by creation ascending
//! serves both counts; items created after the cutoff are filtered out
//! client-side. Participation is approximated by the comment count per item.

use crate::github::RateLimitedClient;
use crate::metrics::FieldValue;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollaborationMetrics {
    pub issue_count: usize,
    pub pr_count: usize,
    pub issue_participants_mean: f64,
    pub pr_participants_mean: f64,
}

/// Count issues and pull requests created on or before `cutoff`.
///
/// A missing or removed repository (the client returns no data) yields zero
/// counts, not an error.
pub fn collect(
    client: &mut RateLimitedClient,
    owner: &str,
    slug: &str,
    cutoff: NaiveDate,
    per_page: usize,
    max_pages: usize,
) -> CollaborationMetrics {
    let path = format!("/repos/{}/{}/issues", owner, slug);
    let params = [
        ("state".to_string(), "all".to_string()),
        ("sort".to_string(), "created".to_string()),
        ("direction".to_string(), "asc".to_string()),
    ];
    // Ascending creation order lets pagination stop at the first page whose
    // last item is already past the cutoff.
    let cutoff_str = cutoff.format("%Y-%m-%d").to_string();
    let items = client.get_paginated(&path, &params, per_page, max_pages, |item| {
        created_date(item).is_some_and(|d| d > cutoff_str.as_str())
    });
    summarize(&items, cutoff)
}

/// Pure aggregation over fetched items, split out for testability.
pub fn summarize(items: &[Value], cutoff: NaiveDate) -> CollaborationMetrics {
    let cutoff_str = cutoff.format("%Y-%m-%d").to_string();
    let mut issues: Vec<&Value> = Vec::new();
    let mut prs: Vec<&Value> = Vec::new();

    for item in items {
        let date = match created_date(item) {
            Some(date) => date,
            None => continue,
        };
        if date > cutoff_str.as_str() {
            continue;
        }
        if item.get("pull_request").is_some() {
            prs.push(item);
        } else {
            issues.push(item);
        }
    }

    CollaborationMetrics {
        issue_count: issues.len(),
        pr_count: prs.len(),
        issue_participants_mean: comments_mean(&issues),
        pr_participants_mean: comments_mean(&prs),
    }
}

/// Date prefix of an item's creation timestamp. ISO timestamps compare
/// lexicographically on this prefix.
fn created_date(item: &Value) -> Option<&str> {
    let created = item.get("created_at").and_then(Value::as_str)?;
    if created.len() < 10 {
        return None;
    }
    Some(&created[..10])
}

fn comments_mean(items: &[&Value]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let total: u64 = items
        .iter()
        .filter_map(|item| item.get("comments").and_then(Value::as_u64))
        .sum();
    (total as f64 / items.len() as f64 * 100.0).round() / 100.0
}

impl CollaborationMetrics {
    pub fn fields(&self) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "issue_count".to_string(),
            FieldValue::Int(self.issue_count as i64),
        );
        fields.insert("pr_count".to_string(), FieldValue::Int(self.pr_count as i64));
        fields.insert(
            "issue_participants_mean".to_string(),
            FieldValue::Float(self.issue_participants_mean),
        );
        fields.insert(
            "pr_participants_mean".to_string(),
            FieldValue::Float(self.pr_participants_mean),
        );
        fields
    }
}
