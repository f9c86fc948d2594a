//! The extraction orchestrator: a sequential, resumable state machine over
//! the repository list.
//!
//! Per repository the machine runs `NotStarted → Cloned → OriginResolved →
//! PerYear(1..max) → Completed | Failed`. Every failure below configuration
//! level is absorbed at repository or snapshot granularity; the batch always
//! proceeds. Progress is persisted through the injected [`CheckpointSink`]
//! every `checkpoint_interval` repositories and always once at run end, so
//! an interruption loses at most one checkpoint interval of work.
//!
//! Processing is strictly sequential by design: every snapshot of a
//! repository mutates the one shared working tree, and serial iteration is
//! what enforces exclusive ownership.

use crate::config::{ExtractionConfig, DAYS_PER_YEAR};
use crate::errors::{ExtractError, Result};
use crate::metrics::{MetricsCollector, Snapshot};
use crate::output::{CheckpointSink, PersistStage};
use crate::repolist::RepositoryRecord;
use crate::vcs::{self, history, SnapshotResolver};
use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress of one repository through the extraction machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    NotStarted,
    Cloned,
    OriginResolved,
    PerYear(u32),
    Completed,
    Failed,
}

/// End-of-run accounting, printed and logged by the command layer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub repos_processed: usize,
    pub repos_failed: usize,
    pub snapshots: usize,
    pub api_calls: u64,
    pub interrupted: bool,
}

pub struct ExtractionOrchestrator<'a> {
    resolver: SnapshotResolver,
    collector: MetricsCollector,
    sink: &'a mut dyn CheckpointSink,
    config: &'a ExtractionConfig,
    interrupted: Arc<AtomicBool>,
    /// "Today" for the future-date cutoff; injected so tests are not tied to
    /// the wall clock.
    now: NaiveDate,
}

impl<'a> ExtractionOrchestrator<'a> {
    pub fn new(
        collector: MetricsCollector,
        sink: &'a mut dyn CheckpointSink,
        config: &'a ExtractionConfig,
        interrupted: Arc<AtomicBool>,
        now: NaiveDate,
    ) -> Self {
        Self {
            resolver: SnapshotResolver::default(),
            collector,
            sink,
            config,
            interrupted,
            now,
        }
    }

    /// Process the repository list from `start_from` (a positional resume
    /// index, not content-based deduplication) and persist the final table.
    pub fn run(
        &mut self,
        records: &[RepositoryRecord],
        start_from: usize,
    ) -> Result<RunSummary> {
        let total = records.len();
        let mut summary = RunSummary::default();
        if start_from > 0 {
            info!("resuming at index {} of {}", start_from, total);
        }

        for (index, record) in records.iter().enumerate().skip(start_from) {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!("interrupt received, stopping before {}", record.name);
                summary.interrupted = true;
                break;
            }
            info!("[{}/{}] processing {}", index + 1, total, record.name);

            match self.process_repository(record) {
                Ok(produced) => {
                    summary.repos_processed += 1;
                    summary.snapshots += produced;
                    info!("{}: {} project-years extracted", record.name, produced);
                }
                Err(e) if e.is_fatal() => {
                    self.sink.flush(PersistStage::Final)?;
                    return Err(e);
                }
                Err(e) => {
                    summary.repos_failed += 1;
                    debug!("{}: {:?}", record.name, RepoState::Failed);
                    warn!("{} failed ({}): {}", record.name, e.category(), e);
                }
            }

            if (index + 1) % self.config.checkpoint_interval == 0 {
                self.sink.flush(PersistStage::Partial)?;
            }
        }

        // Always persist at run end, interrupt included.
        self.sink.flush(PersistStage::Final)?;
        summary.api_calls = self.collector.api_calls();
        Ok(summary)
    }

    /// Drive one repository through the state machine. Returns the number of
    /// snapshots produced; an error here marks the repository failed.
    fn process_repository(&mut self, record: &RepositoryRecord) -> Result<usize> {
        let mut state = RepoState::NotStarted;
        debug!("{}: {:?}", record.name, state);

        // Any error propagated from here marks the repository Failed in the
        // run summary.
        let outcome = vcs::ensure_clone(record, self.config.clone_timeout())?;
        state = RepoState::Cloned;
        debug!("{}: {:?} ({:?})", record.name, state, outcome);

        let origin = history::origin_commit_date(&record.clone_path)?
            .ok_or_else(|| ExtractError::EmptyHistory(record.clone_path.clone()))?;
        let origin_date = origin.date_naive();
        state = RepoState::OriginResolved;
        debug!("{}: {:?}, origin {}", record.name, state, origin_date);

        let mut produced = 0;
        for year in 1..=self.config.max_years {
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
            state = RepoState::PerYear(year);
            debug!("{}: {:?}", record.name, state);

            let target = origin_date + Duration::days(DAYS_PER_YEAR * year as i64);
            if target > self.now {
                // Natural end of history, not a failure; earlier offsets
                // stay valid.
                info!(
                    "{}: year {} target {} is in the future, stopping",
                    record.name, year, target
                );
                break;
            }

            match self.extract_snapshot(record, year, origin_date, target) {
                Ok(()) => produced += 1,
                Err(e) => warn!(
                    "{} year {} skipped ({}): {}",
                    record.name,
                    year,
                    e.category(),
                    e
                ),
            }

            // Resolution walks from HEAD, so the tree must be back on the
            // default branch before the next year; a HEAD still detached at
            // this year's commit would pin every later year to it.
            if let Err(e) = self.resolver.restore_default_branch(&record.clone_path) {
                warn!("{}: default branch not restored: {}", record.name, e);
                break;
            }
        }

        // The clone must never be left mid-snapshot, even after failures.
        if let Err(e) = self.resolver.restore_default_branch(&record.clone_path) {
            warn!("{}: default branch not restored: {}", record.name, e);
        }

        state = RepoState::Completed;
        debug!("{}: {:?}", record.name, state);
        Ok(produced)
    }

    /// Resolve, check out, and collect one snapshot. The working tree is
    /// exclusively owned between the checkout here and the restore in
    /// [`Self::process_repository`].
    fn extract_snapshot(
        &mut self,
        record: &RepositoryRecord,
        year: u32,
        origin_date: NaiveDate,
        target_date: NaiveDate,
    ) -> Result<()> {
        let commit = self
            .resolver
            .resolve_commit_before(&record.clone_path, target_date)?
            .ok_or_else(|| ExtractError::NoQualifyingCommit {
                path: record.clone_path.clone(),
                date: target_date.format("%Y-%m-%d").to_string(),
            })?;

        self.resolver.checkout(&record.clone_path, &commit)?;
        let fields = self.collector.collect(record, year, target_date, true);

        self.sink.append(Snapshot {
            name: record.name.clone(),
            owner: record.owner.clone(),
            slug: record.slug.clone(),
            year,
            target_date,
            origin_date,
            commit: commit.chars().take(12).collect(),
            fields,
        })?;
        Ok(())
    }
}
