//! Community-smell indicator booleans.
//!
//! Heuristic thresholds over the social metrics, matching the study's
//! published table. `org_silo_proxy` is a proxy: the full organizational-silo
//! indicator needs collaboration-network centrality, which the commit log
//! alone cannot provide.

use crate::metrics::collaboration::CollaborationMetrics;
use crate::metrics::social::SocialMetrics;
use crate::metrics::FieldValue;
use std::collections::BTreeMap;

const LONE_WOLF_CONCENTRATION: f64 = 0.9;
const ORG_SILO_CONCENTRATION: f64 = 0.7;
const ORG_SILO_MIN_AUTHORS: usize = 5;

pub fn indicators(
    social: &SocialMetrics,
    collaboration: &CollaborationMetrics,
) -> BTreeMap<String, FieldValue> {
    let concentration = social.contributor_concentration;

    let lone_wolf = concentration.is_some_and(|c| c > LONE_WOLF_CONCENTRATION);
    let radio_silence = collaboration.issue_count == 0 && collaboration.pr_count == 0;
    let org_silo_proxy = social.author_count >= ORG_SILO_MIN_AUTHORS
        && concentration.is_some_and(|c| c > ORG_SILO_CONCENTRATION);

    let mut fields = BTreeMap::new();
    fields.insert("lone_wolf".to_string(), FieldValue::Bool(lone_wolf));
    fields.insert("radio_silence".to_string(), FieldValue::Bool(radio_silence));
    fields.insert(
        "org_silo_proxy".to_string(),
        FieldValue::Bool(org_silo_proxy),
    );
    fields
}
