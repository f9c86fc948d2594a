//! Repository list loading and remote URL resolution.
//!
//! The input list is a CSV with a `repo_name` column and an optional
//! `github_url` column. Entries whose listed URL is a search link can be
//! resolved through two side inputs: a plain-text file of resolved URLs (one
//! per line) matched by trailing path segment, and a JSON owner map from
//! repository name to owning account. Entries that still lack an owner/slug
//! pair after resolution are dropped from the run with a warning.

use crate::errors::{ExtractError, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One repository to extract, with its remote coordinates resolved.
/// Read-only once the list is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub name: String,
    pub url: String,
    pub owner: String,
    pub slug: String,
    pub clone_path: PathBuf,
}

/// Load the repository list and resolve remote URLs.
///
/// `clone_root` is the directory under which each repository's local clone
/// lives (one subdirectory per repository name).
pub fn load_repositories(
    repos_csv: &Path,
    urls_file: Option<&Path>,
    owner_map: Option<&Path>,
    clone_root: &Path,
) -> Result<Vec<RepositoryRecord>> {
    let rows = read_list(repos_csv)?;
    let url_map = urls_file.map(read_url_map).transpose()?.unwrap_or_default();
    let owners = owner_map.map(read_owner_map).transpose()?.unwrap_or_default();

    let total = rows.len();
    let records: Vec<RepositoryRecord> = rows
        .into_iter()
        .filter_map(|(name, listed_url)| {
            match resolve(&name, listed_url.as_deref(), &url_map, &owners) {
                Some((url, owner, slug)) => Some(RepositoryRecord {
                    clone_path: clone_root.join(&name),
                    name,
                    url,
                    owner,
                    slug,
                }),
                None => {
                    warn!("dropping {}: no resolvable remote URL", name);
                    None
                }
            }
        })
        .collect();

    info!(
        "repository list: {}/{} entries with a resolvable URL",
        records.len(),
        total
    );
    Ok(records)
}

fn read_list(path: &Path) -> Result<Vec<(String, Option<String>)>> {
    if !path.is_file() {
        return Err(ExtractError::Config(format!(
            "repository list not found: {}",
            path.display()
        )));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let name_idx = headers
        .iter()
        .position(|h| h == "repo_name")
        .ok_or_else(|| {
            ExtractError::Config(format!(
                "repository list {} has no repo_name column",
                path.display()
            ))
        })?;
    let url_idx = headers.iter().position(|h| h == "github_url");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = record.get(name_idx).unwrap_or("").trim().to_string();
        if name.is_empty() {
            continue;
        }
        let url = url_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from);
        rows.push((name, url));
    }
    Ok(rows)
}

/// Parse the resolved-URLs side file into a map keyed by the lowercased
/// trailing path segment of each URL.
fn read_url_map(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    let mut map = HashMap::new();
    for line in content.lines() {
        let url = line.trim().trim_end_matches('/');
        if url.is_empty() || !url.contains("github.com/") {
            continue;
        }
        if let Some(slug) = url.rsplit('/').next() {
            map.insert(slug.to_lowercase(), url.to_string());
        }
    }
    Ok(map)
}

fn read_owner_map(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| ExtractError::Config(format!("invalid owner map {}: {}", path.display(), e)))
}

/// Pick the best remote URL for one entry and split it into owner/slug.
///
/// Priority: side-file URL matched by name, then owner-map construction when
/// the listed URL is a search link, then the listed URL as-is.
fn resolve(
    name: &str,
    listed_url: Option<&str>,
    url_map: &HashMap<String, String>,
    owners: &HashMap<String, String>,
) -> Option<(String, String, String)> {
    let resolved = if let Some(url) = url_map.get(&name.to_lowercase()) {
        url.clone()
    } else if let Some(owner) = owners.get(name) {
        match listed_url {
            Some(url) if !url.contains("search?q=") => url.to_string(),
            _ => format!("https://github.com/{}/{}", owner, name),
        }
    } else {
        listed_url?.to_string()
    };

    let (owner, slug) = split_owner_slug(&resolved)?;
    Some((resolved, owner, slug))
}

/// Extract `(owner, slug)` from a github.com URL. Search links never qualify.
fn split_owner_slug(url: &str) -> Option<(String, String)> {
    if url.contains("search?q=") {
        return None;
    }
    let tail = url.split("github.com/").nth(1)?;
    let mut parts = tail.trim_end_matches('/').split('/');
    let owner = parts.next()?.to_string();
    let slug = parts.next()?.trim_end_matches(".git").to_string();
    if owner.is_empty() || slug.is_empty() {
        return None;
    }
    Some((owner, slug))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn split_owner_slug_handles_plain_urls() {
        assert_eq!(
            split_owner_slug("https://github.com/acme/widgets"),
            Some(("acme".into(), "widgets".into()))
        );
        assert_eq!(
            split_owner_slug("https://github.com/acme/widgets.git/"),
            Some(("acme".into(), "widgets".into()))
        );
    }

    #[test]
    fn split_owner_slug_rejects_search_links() {
        assert_eq!(
            split_owner_slug("https://github.com/search?q=widgets"),
            None
        );
        assert_eq!(split_owner_slug("https://github.com/acme"), None);
    }

    #[test]
    fn resolve_prefers_side_file_url() {
        let mut url_map = HashMap::new();
        url_map.insert(
            "widgets".to_string(),
            "https://github.com/acme/widgets".to_string(),
        );
        let resolved = resolve(
            "Widgets",
            Some("https://github.com/search?q=widgets"),
            &url_map,
            &HashMap::new(),
        );
        assert_eq!(
            resolved,
            Some((
                "https://github.com/acme/widgets".into(),
                "acme".into(),
                "widgets".into()
            ))
        );
    }

    #[test]
    fn resolve_builds_url_from_owner_map_for_search_links() {
        let mut owners = HashMap::new();
        owners.insert("widgets".to_string(), "acme".to_string());
        let resolved = resolve(
            "widgets",
            Some("https://github.com/search?q=widgets"),
            &HashMap::new(),
            &owners,
        );
        assert_eq!(
            resolved,
            Some((
                "https://github.com/acme/widgets".into(),
                "acme".into(),
                "widgets".into()
            ))
        );
    }

    #[test]
    fn resolve_drops_unresolvable_entries() {
        assert_eq!(
            resolve(
                "widgets",
                Some("https://github.com/search?q=widgets"),
                &HashMap::new(),
                &HashMap::new(),
            ),
            None
        );
        assert_eq!(resolve("widgets", None, &HashMap::new(), &HashMap::new()), None);
    }

    #[test]
    fn load_repositories_reads_csv_and_sets_clone_paths() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("repos.csv");
        let mut file = std::fs::File::create(&csv_path).unwrap();
        writeln!(file, "repo_name,github_url").unwrap();
        writeln!(file, "widgets,https://github.com/acme/widgets").unwrap();
        writeln!(file, "unresolved,https://github.com/search?q=unresolved").unwrap();

        let records =
            load_repositories(&csv_path, None, None, &dir.path().join("repos")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "widgets");
        assert_eq!(records[0].owner, "acme");
        assert_eq!(records[0].clone_path, dir.path().join("repos/widgets"));
    }

    #[test]
    fn load_repositories_missing_file_is_config_error() {
        let err = load_repositories(
            Path::new("/nonexistent/repos.csv"),
            None,
            None,
            Path::new("/tmp"),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
