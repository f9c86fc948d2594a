//! External static-analysis tool invocation and report parsing.
//!
//! The detector is a Java jar run as a subprocess against the working tree
//! of a checked-out snapshot. It writes delimited report files into an
//! output directory; each row categorizes one detected smell. The run
//! carries a hard wall-clock timeout: on expiry the subprocess is killed and
//! the snapshot simply has no technical fields, leaving the social fields
//! intact.

use crate::errors::{ExtractError, Result};
use crate::metrics::FieldValue;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const DESIGN_REPORT: &str = "designCodeSmells.csv";
const DESIGN_COLUMN: &str = "Design Smell";
const IMPL_REPORT: &str = "implementationCodeSmells.csv";
const IMPL_COLUMN: &str = "Implementation Smell";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct SmellDetector {
    java: PathBuf,
    jar: PathBuf,
    timeout: Duration,
}

impl SmellDetector {
    /// Locate the Java runtime and validate the jar path. Both are
    /// configuration-level requirements: failures here abort before any
    /// repository is processed.
    pub fn new(jar: PathBuf, timeout: Duration) -> Result<Self> {
        if !jar.is_file() {
            return Err(ExtractError::Config(format!(
                "detector jar not found: {}",
                jar.display()
            )));
        }
        let java = which::which("java").map_err(|e| {
            ExtractError::Config(format!("java runtime not found on PATH: {}", e))
        })?;
        Ok(Self { java, jar, timeout })
    }

    /// Run the detector against `source` and aggregate per-category counts.
    ///
    /// Soft on every failure mode: a timeout, a spawn error, or a nonzero
    /// exit yields whatever reports were written (possibly none), never an
    /// error. An empty map means the snapshot's technical fields are absent.
    pub fn run(&self, source: &Path, out_dir: &Path) -> BTreeMap<String, FieldValue> {
        if let Err(e) = std::fs::create_dir_all(out_dir) {
            warn!("cannot create detector output dir {}: {}", out_dir.display(), e);
            return BTreeMap::new();
        }

        let mut command = Command::new(&self.java);
        command
            .arg("-jar")
            .arg(&self.jar)
            .arg("-i")
            .arg(source)
            .arg("-o")
            .arg(out_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match command.spawn() {
            Ok(child) => match wait_with_deadline(child, self.timeout) {
                Some(status) if !status.success() => {
                    warn!(
                        "detector exited with {} for {}",
                        status,
                        source.display()
                    );
                }
                Some(_) => {}
                None => {
                    warn!(
                        "detector timed out after {:?} for {}",
                        self.timeout,
                        source.display()
                    );
                    return BTreeMap::new();
                }
            },
            Err(e) => {
                warn!("failed to spawn detector for {}: {}", source.display(), e);
                return BTreeMap::new();
            }
        }

        parse_reports(out_dir)
    }
}

/// Poll the child until it exits or the deadline passes. On expiry the child
/// is killed and reaped; returns `None` for a timeout.
fn wait_with_deadline(mut child: Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                warn!("error waiting for detector: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }
}

/// Aggregate both report files into one flat mapping. Category names become
/// column keys prefixed by report kind, plus rollup totals.
pub fn parse_reports(out_dir: &Path) -> BTreeMap<String, FieldValue> {
    let design = parse_report(&out_dir.join(DESIGN_REPORT), DESIGN_COLUMN);
    let implementation = parse_report(&out_dir.join(IMPL_REPORT), IMPL_COLUMN);

    if design.is_none() && implementation.is_none() {
        return BTreeMap::new();
    }
    let design = design.unwrap_or_default();
    let implementation = implementation.unwrap_or_default();

    let mut fields = BTreeMap::new();
    let design_total: i64 = design.values().sum();
    let impl_total: i64 = implementation.values().sum();

    for (category, count) in design {
        fields.insert(format!("design_{}", category), FieldValue::Int(count));
    }
    for (category, count) in implementation {
        fields.insert(format!("impl_{}", category), FieldValue::Int(count));
    }
    fields.insert(
        "total_design_smells".to_string(),
        FieldValue::Int(design_total),
    );
    fields.insert("total_impl_smells".to_string(), FieldValue::Int(impl_total));
    fields.insert(
        "total_code_smells".to_string(),
        FieldValue::Int(design_total + impl_total),
    );
    fields
}

/// Count rows per category in one report file. `None` when the file is
/// absent or unreadable.
fn parse_report(path: &Path, column: &str) -> Option<BTreeMap<String, i64>> {
    if !path.is_file() {
        return None;
    }
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            debug!("unreadable detector report {}: {}", path.display(), e);
            return None;
        }
    };
    let column_idx = reader
        .headers()
        .ok()?
        .iter()
        .position(|h| h.trim() == column)?;

    let mut counts = BTreeMap::new();
    for record in reader.records().flatten() {
        let category = record
            .get(column_idx)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("Unknown");
        *counts.entry(sanitize_key(category)).or_insert(0) += 1;
    }
    Some(counts)
}

fn sanitize_key(category: &str) -> String {
    category.replace(' ', "_")
}
