//! Tabular output and checkpoint persistence.
//!
//! One row per (repository, project-year). Leading column groups are fixed
//! (identity, social metrics, indicator booleans); technical smell columns
//! are discovered dynamically as the union of keys observed across all
//! snapshots and sorted before emission. Serialization is a pure function of
//! the accumulated result set, so writing the same set twice produces
//! identical bytes.
//!
//! The orchestrator persists through the [`CheckpointSink`] trait rather
//! than touching the file system directly; tests inject an in-memory sink.

use crate::errors::Result;
use crate::metrics::Snapshot;
use log::info;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Identity and provenance columns, always first.
pub const IDENTITY_COLUMNS: &[&str] = &[
    "repo_name",
    "owner",
    "repo_slug",
    "project_year",
    "target_date",
    "origin_date",
    "snapshot_commit",
];

/// Social metric columns, in fixed presentation order.
pub const SOCIAL_COLUMNS: &[&str] = &[
    "commit_count",
    "author_count",
    "days_active",
    "contributor_concentration",
    "issue_count",
    "pr_count",
    "issue_participants_mean",
    "pr_participants_mean",
    "timezone_count",
];

/// Community-smell indicator columns.
pub const INDICATOR_COLUMNS: &[&str] = &["lone_wolf", "radio_silence", "org_silo_proxy"];

/// Column order for a result set: identity, then the social and indicator
/// columns actually observed, then all remaining (technical) keys sorted.
pub fn columns(snapshots: &[Snapshot]) -> Vec<String> {
    let observed: BTreeSet<&str> = snapshots
        .iter()
        .flat_map(|s| s.fields.keys().map(String::as_str))
        .collect();

    let mut columns: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
    for column in SOCIAL_COLUMNS.iter().chain(INDICATOR_COLUMNS) {
        if observed.contains(column) {
            columns.push(column.to_string());
        }
    }
    let known: BTreeSet<&str> = SOCIAL_COLUMNS
        .iter()
        .chain(INDICATOR_COLUMNS)
        .copied()
        .collect();
    for key in &observed {
        if !known.contains(key) {
            columns.push(key.to_string());
        }
    }
    columns
}

/// Write the full table as CSV. Absent fields become empty cells.
pub fn write_table<W: Write>(writer: W, snapshots: &[Snapshot]) -> Result<()> {
    let columns = columns(snapshots);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(&columns)?;

    for snapshot in snapshots {
        let row: Vec<String> = columns
            .iter()
            .map(|column| cell(snapshot, column))
            .collect();
        csv_writer.write_record(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn cell(snapshot: &Snapshot, column: &str) -> String {
    match column {
        "repo_name" => snapshot.name.clone(),
        "owner" => snapshot.owner.clone(),
        "repo_slug" => snapshot.slug.clone(),
        "project_year" => snapshot.year.to_string(),
        "target_date" => snapshot.target_date.format("%Y-%m-%d").to_string(),
        "origin_date" => snapshot.origin_date.format("%Y-%m-%d").to_string(),
        "snapshot_commit" => snapshot.commit.clone(),
        key => snapshot
            .fields
            .get(key)
            .map(|v| v.to_string())
            .unwrap_or_default(),
    }
}

/// Whether a persisted table is a mid-run checkpoint or the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Partial,
    Final,
}

/// Injected persistence seam for the orchestrator: snapshots are appended as
/// they are produced, and the accumulated set is flushed at checkpoint
/// boundaries and at run end.
pub trait CheckpointSink {
    fn append(&mut self, snapshot: Snapshot) -> Result<()>;
    fn flush(&mut self, stage: PersistStage) -> Result<()>;
    fn snapshots(&self) -> &[Snapshot];
}

/// File-backed sink writing timestamped CSV tables into the output
/// directory. Checkpoints carry a `_partial` suffix; the final table does
/// not.
pub struct CsvCheckpointSink {
    output_dir: PathBuf,
    run_tag: String,
    rows: Vec<Snapshot>,
}

impl CsvCheckpointSink {
    pub fn new(output_dir: &Path, run_tag: &str) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            run_tag: run_tag.to_string(),
            rows: Vec::new(),
        })
    }

    pub fn table_path(&self, stage: PersistStage) -> PathBuf {
        let suffix = match stage {
            PersistStage::Partial => "_partial",
            PersistStage::Final => "",
        };
        self.output_dir
            .join(format!("snapshots{}_{}.csv", suffix, self.run_tag))
    }
}

impl CheckpointSink for CsvCheckpointSink {
    fn append(&mut self, snapshot: Snapshot) -> Result<()> {
        self.rows.push(snapshot);
        Ok(())
    }

    fn flush(&mut self, stage: PersistStage) -> Result<()> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let path = self.table_path(stage);
        let file = std::fs::File::create(&path)?;
        write_table(file, &self.rows)?;
        info!("persisted {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    fn snapshots(&self) -> &[Snapshot] {
        &self.rows
    }
}
