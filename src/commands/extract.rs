//! The `extract` command: wire CLI options into the orchestrator.
//!
//! All configuration validation happens here, before any repository is
//! touched; a bad jar path or unreadable list aborts the run with a fatal
//! error. Everything after that point is the orchestrator's absorb-and-log
//! regime.

use crate::config::ExtractionConfig;
use crate::errors::{ExtractError, Result};
use crate::extract::{ExtractionOrchestrator, RunSummary};
use crate::github::RateLimitedClient;
use crate::metrics::{smells::SmellDetector, MetricsCollector};
use crate::output::CsvCheckpointSink;
use crate::repolist;
use chrono::Local;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct ExtractOptions {
    pub repos_csv: PathBuf,
    pub output_dir: PathBuf,
    pub urls_file: Option<PathBuf>,
    pub owner_map: Option<PathBuf>,
    pub token: Option<String>,
    pub detector_jar: Option<PathBuf>,
    pub max_years: u32,
    pub start_from: usize,
    pub config: Option<PathBuf>,
    pub dry_run: bool,
    pub skip_smells: bool,
}

pub fn run(options: ExtractOptions) -> Result<RunSummary> {
    let mut config = match &options.config {
        Some(path) => ExtractionConfig::from_file(path)?,
        None => ExtractionConfig::default(),
    };
    config.max_years = options.max_years;

    let clone_root = options.output_dir.join("repos");
    let results_root = options.output_dir.join("results");
    std::fs::create_dir_all(&clone_root)?;
    std::fs::create_dir_all(&results_root)?;

    let records = repolist::load_repositories(
        &options.repos_csv,
        options.urls_file.as_deref(),
        options.owner_map.as_deref(),
        &clone_root,
    )?;
    if records.is_empty() {
        return Err(ExtractError::Config(
            "repository list resolved to zero entries".to_string(),
        ));
    }
    if options.start_from >= records.len() {
        return Err(ExtractError::Config(format!(
            "start index {} is past the end of the list ({} entries)",
            options.start_from,
            records.len()
        )));
    }

    let client = build_client(&options, &config)?;
    let detector = build_detector(&options, &config)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| ExtractError::Config(format!("cannot install interrupt handler: {}", e)))?;

    let run_tag = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let mut sink = CsvCheckpointSink::new(&options.output_dir, &run_tag)?;

    let collector = MetricsCollector::new(client, detector, results_root, &config);
    let now = Local::now().date_naive();
    let mut orchestrator =
        ExtractionOrchestrator::new(collector, &mut sink, &config, interrupted, now);

    let summary = orchestrator.run(&records, options.start_from)?;

    info!(
        "run complete: {} processed, {} failed, {} snapshots, {} API calls",
        summary.repos_processed, summary.repos_failed, summary.snapshots, summary.api_calls
    );
    if summary.interrupted {
        warn!("run was interrupted; resume with --start-from");
    }
    Ok(summary)
}

fn build_client(
    options: &ExtractOptions,
    config: &ExtractionConfig,
) -> Result<Option<RateLimitedClient>> {
    if options.dry_run {
        info!("dry run: collaboration metrics disabled");
        return Ok(None);
    }
    match &options.token {
        Some(token) => Ok(Some(RateLimitedClient::new(
            Some(token.clone()),
            config,
        )?)),
        None => {
            warn!("no API token given; collaboration metrics will be absent");
            Ok(None)
        }
    }
}

fn build_detector(
    options: &ExtractOptions,
    config: &ExtractionConfig,
) -> Result<Option<SmellDetector>> {
    if options.dry_run || options.skip_smells {
        info!("technical pass disabled");
        return Ok(None);
    }
    match &options.detector_jar {
        Some(jar) => Ok(Some(SmellDetector::new(
            jar.clone(),
            config.detector_timeout(),
        )?)),
        None => {
            warn!("no detector jar given; technical metrics will be absent");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &std::path::Path) -> ExtractOptions {
        ExtractOptions {
            repos_csv: dir.join("repos.csv"),
            output_dir: dir.join("out"),
            urls_file: None,
            owner_map: None,
            token: None,
            detector_jar: None,
            max_years: 5,
            start_from: 0,
            config: None,
            dry_run: true,
            skip_smells: false,
        }
    }

    #[test]
    fn missing_list_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(options(dir.path())).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn start_index_past_end_is_fatal() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("repos.csv")).unwrap();
        writeln!(file, "repo_name,github_url").unwrap();
        writeln!(file, "widgets,https://github.com/acme/widgets").unwrap();

        let mut options = options(dir.path());
        options.start_from = 5;
        let err = run(options).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn dry_run_builds_neither_client_nor_detector() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.token = Some("ghp_test".to_string());
        opts.detector_jar = Some(dir.path().join("missing.jar"));
        let config = ExtractionConfig::default();

        assert!(build_client(&opts, &config).unwrap().is_none());
        // Dry run wins even over a jar path that would not validate.
        assert!(build_detector(&opts, &config).unwrap().is_none());
    }

    #[test]
    fn missing_jar_outside_dry_run_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.dry_run = false;
        opts.detector_jar = Some(dir.path().join("missing.jar"));
        let config = ExtractionConfig::default();

        let err = build_detector(&opts, &config).unwrap_err();
        assert!(err.is_fatal());
    }
}
