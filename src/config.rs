//! Runtime configuration for the extraction pipeline.
//!
//! All limits live here with serde defaults so a partial TOML file (or none
//! at all) yields a working configuration:
//!
//! ```toml
//! max_years = 5
//! checkpoint_interval = 10
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 2000
//! ```

use crate::errors::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Days in one project-year offset. A target date is
/// `origin + year * DAYS_PER_YEAR` days.
pub const DAYS_PER_YEAR: i64 = 365;

/// Top-level configuration, loadable from TOML with CLI overrides applied
/// afterwards by the command layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum project-year offset to attempt per repository (default: 5).
    #[serde(default = "default_max_years")]
    pub max_years: u32,

    /// Persist a partial table every N processed repositories (default: 10).
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Remaining-call threshold below which the client waits for the
    /// rate-limit window to reset (default: 50).
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: u32,

    /// Extra seconds waited past the reported reset deadline (default: 5).
    #[serde(default = "default_reset_margin_secs")]
    pub reset_margin_secs: u64,

    /// Page size requested from the remote API (default: 100).
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Hard cap on pages fetched per listing, bounding cost on unusually
    /// active repositories (default: 20).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Wall-clock limit on clone/fetch network transfer (default: 120s).
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,

    /// Wall-clock limit on one detector subprocess run (default: 300s).
    #[serde(default = "default_detector_timeout_secs")]
    pub detector_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_years: default_max_years(),
            checkpoint_interval: default_checkpoint_interval(),
            low_water_mark: default_low_water_mark(),
            reset_margin_secs: default_reset_margin_secs(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            clone_timeout_secs: default_clone_timeout_secs(),
            detector_timeout_secs: default_detector_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Load from a TOML file. Absent keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ExtractError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }

    pub fn reset_margin(&self) -> Duration {
        Duration::from_secs(self.reset_margin_secs)
    }
}

/// Retry policy for transient remote failures.
///
/// Delays grow exponentially from `base_delay_ms` with multiplicative jitter;
/// a server-supplied reset hint overrides the computed delay, capped at
/// `max_delay_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay before the first retry in milliseconds (default: 2000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on any single wait, hinted or computed (default: 120s).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Jitter factor: delays vary by up to +/- this fraction (default: 0.1).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Exponential delay for a retry attempt (1-indexed), before jitter.
    ///
    /// Attempt 1 waits `base_delay_ms`, attempt 2 twice that, and so on,
    /// capped at `max_delay_secs`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw_ms = (self.base_delay_ms as f64) * 2.0_f64.powi(exp as i32);
        let capped = raw_ms.min((self.max_delay_secs * 1000) as f64);
        Duration::from_millis(capped as u64)
    }

    /// Clamp a server-supplied wait hint to the configured ceiling.
    pub fn cap_hint(&self, hint: Duration) -> Duration {
        hint.min(Duration::from_secs(self.max_delay_secs))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

fn default_max_years() -> u32 {
    5
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_low_water_mark() -> u32 {
    50
}

fn default_reset_margin_secs() -> u64 {
    5
}

fn default_per_page() -> usize {
    100
}

fn default_max_pages() -> usize {
    20
}

fn default_clone_timeout_secs() -> u64 {
    120
}

fn default_detector_timeout_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_secs() -> u64 {
    120
}

fn default_jitter_factor() -> f64 {
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ExtractionConfig::default();
        assert_eq!(config.max_years, 5);
        assert_eq!(config.checkpoint_interval, 10);
        assert_eq!(config.low_water_mark, 50);
        assert_eq!(config.per_page, 100);
        assert_eq!(config.max_pages, 20);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ExtractionConfig = toml::from_str("max_years = 3").unwrap();
        assert_eq!(config.max_years, 3);
        assert_eq!(config.checkpoint_interval, 10);
        assert_eq!(config.retry.base_delay_ms, 2000);
    }

    #[test]
    fn retry_delay_grows_exponentially() {
        let retry = RetryConfig {
            base_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_capped_at_ceiling() {
        let retry = RetryConfig {
            base_delay_ms: 60_000,
            max_delay_secs: 90,
            ..Default::default()
        };
        assert_eq!(retry.delay_for_attempt(8), Duration::from_secs(90));
    }

    #[test]
    fn hint_capped_at_ceiling() {
        let retry = RetryConfig {
            max_delay_secs: 120,
            ..Default::default()
        };
        assert_eq!(
            retry.cap_hint(Duration::from_secs(3600)),
            Duration::from_secs(120)
        );
        assert_eq!(
            retry.cap_hint(Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let retry = RetryConfig::default();
        assert!(retry.should_retry(1));
        assert!(retry.should_retry(2));
        assert!(!retry.should_retry(3));
    }
}
