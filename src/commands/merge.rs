//! The `merge` command: join a social metrics table with a technical
//! metrics table into one dataset.
//!
//! Rows are matched on the (repo_name, project_year) key. Conflicting
//! columns are resolved by group ownership: the social input is
//! authoritative for identity, social, and indicator columns, the technical
//! input for everything else. Rows present in only one input are kept with
//! the other side's cells left empty.

use crate::errors::{ExtractError, Result};
use crate::output::{IDENTITY_COLUMNS, INDICATOR_COLUMNS, SOCIAL_COLUMNS};
use log::info;
use std::collections::HashMap;
use std::path::Path;

const KEY_COLUMNS: [&str; 2] = ["repo_name", "project_year"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub rows: usize,
    pub matched: usize,
    pub social_only: usize,
    pub technical_only: usize,
}

struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ExtractError::Config(format!(
                "input table not found: {}",
                path.display()
            )));
        }
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        for key in KEY_COLUMNS {
            if !headers.iter().any(|h| h == key) {
                return Err(ExtractError::Config(format!(
                    "{} has no {} column",
                    path.display(),
                    key
                )));
            }
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(String::from).collect());
        }
        Ok(Self { headers, rows })
    }

    fn cell<'a>(&'a self, row: &'a [String], column: &str) -> Option<&'a str> {
        let idx = self.headers.iter().position(|h| h == column)?;
        row.get(idx).map(String::as_str)
    }

    fn key(&self, row: &[String]) -> Option<(String, String)> {
        let name = self.cell(row, "repo_name")?;
        let year = self.cell(row, "project_year")?;
        Some((name.to_string(), year.to_string()))
    }
}

pub fn run(social_path: &Path, technical_path: &Path, output: &Path) -> Result<MergeSummary> {
    let social = Table::read(social_path)?;
    let technical = Table::read(technical_path)?;

    let columns = merged_columns(&social.headers, &technical.headers);

    // First matching technical row per key; later duplicates are ignored.
    let mut technical_by_key: HashMap<(String, String), usize> = HashMap::new();
    for (idx, row) in technical.rows.iter().enumerate() {
        if let Some(key) = technical.key(row) {
            technical_by_key.entry(key).or_insert(idx);
        }
    }

    let mut summary = MergeSummary {
        rows: 0,
        matched: 0,
        social_only: 0,
        technical_only: 0,
    };
    let mut merged: Vec<Vec<String>> = Vec::new();

    for row in &social.rows {
        let technical_row = social
            .key(row)
            .and_then(|key| technical_by_key.remove(&key))
            .map(|idx| technical.rows[idx].as_slice());
        match technical_row {
            Some(_) => summary.matched += 1,
            None => summary.social_only += 1,
        }
        merged.push(merge_row(
            &columns,
            Some((&social, row)),
            technical_row.map(|r| (&technical, r)),
        ));
    }

    // Unmatched technical rows keep their data, social cells stay empty.
    let mut leftover: Vec<usize> = technical_by_key.into_values().collect();
    leftover.sort_unstable();
    for idx in leftover {
        summary.technical_only += 1;
        merged.push(merge_row(
            &columns,
            None,
            Some((&technical, &technical.rows[idx])),
        ));
    }
    summary.rows = merged.len();

    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(&columns)?;
    for row in &merged {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!(
        "merged {} rows ({} matched, {} social-only, {} technical-only) into {}",
        summary.rows,
        summary.matched,
        summary.social_only,
        summary.technical_only,
        output.display()
    );
    Ok(summary)
}

/// Output column order: identity columns present in either input, then the
/// social input's remaining columns in its order, then the technical input's
/// columns not already placed, in its order.
fn merged_columns(social: &[String], technical: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = IDENTITY_COLUMNS
        .iter()
        .copied()
        .filter(|c| social.iter().any(|h| h == c) || technical.iter().any(|h| h == c))
        .map(String::from)
        .collect();
    for header in social.iter().chain(technical) {
        if !columns.iter().any(|c| c == header) {
            columns.push(header.clone());
        }
    }
    columns
}

fn socially_owned(column: &str) -> bool {
    IDENTITY_COLUMNS.contains(&column)
        || SOCIAL_COLUMNS.contains(&column)
        || INDICATOR_COLUMNS.contains(&column)
}

fn merge_row(
    columns: &[String],
    social: Option<(&Table, &[String])>,
    technical: Option<(&Table, &[String])>,
) -> Vec<String> {
    columns
        .iter()
        .map(|column| {
            let from_social = social.and_then(|(t, r)| t.cell(r, column));
            let from_technical = technical.and_then(|(t, r)| t.cell(r, column));
            let value = if socially_owned(column) {
                from_social.or(from_technical)
            } else {
                from_technical.or(from_social)
            };
            value.unwrap_or_default().to_string()
        })
        .collect()
}
