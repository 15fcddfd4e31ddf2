//! Run configuration.
//!
//! Every knob that changes pipeline behavior lives here and is passed into the
//! components at construction time. Values come from `AppConfig::default()`,
//! an optional TOML file, and finally CLI overrides applied in `main`.

use crate::error::{EnrichError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default Web of Science portal front-end
pub const DEFAULT_PORTAL_URL: &str = "https://webofscience.clarivate.cn";

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub enrich: EnrichConfig,
    pub portal: PortalConfig,
    pub harvest: HarvestConfig,
}

/// Knobs of the enrichment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Extra attempts after the first one fails
    pub max_retries: u32,
    /// Backoff unit in seconds; attempt `i` waits `base * 2^i`
    pub base_delay_secs: f64,
    /// Per-row jitter interval in seconds
    pub jitter: JitterRange,
    /// Batch pauses; sorted descending by threshold before use
    pub batch_pauses: Vec<BatchPause>,
    /// Minimum title similarity accepted by the matcher
    pub match_threshold: f64,
    /// Save the checkpoint every this many processed rows
    pub save_interval: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 1.0,
            jitter: JitterRange::default(),
            batch_pauses: vec![
                BatchPause { threshold: 100, delay_secs: 60 },
                BatchPause { threshold: 50, delay_secs: 10 },
                BatchPause { threshold: 5, delay_secs: 5 },
            ],
            match_threshold: 0.8,
            save_interval: 5,
        }
    }
}

impl EnrichConfig {
    /// Backoff unit; out-of-range values saturate (`validate` rejects them).
    pub fn base_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.base_delay_secs).unwrap_or(Duration::MAX)
    }

    /// Check value ranges that would otherwise panic or silently misbehave.
    pub fn validate(&self) -> Result<()> {
        if Duration::try_from_secs_f64(self.base_delay_secs).is_err() {
            return Err(EnrichError::Config(format!(
                "base_delay_secs must be a non-negative number of seconds in range, got {}",
                self.base_delay_secs
            )));
        }
        self.jitter.validate()?;
        if let Some(pause) = self.batch_pauses.iter().find(|p| p.threshold == 0) {
            return Err(EnrichError::Config(format!(
                "batch pause threshold must be > 0 (delay {}s)",
                pause.delay_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(EnrichError::Config(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.save_interval == 0 {
            return Err(EnrichError::Config("save_interval must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Uniform jitter interval applied before every lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for JitterRange {
    fn default() -> Self {
        Self {
            min_secs: 1.0,
            max_secs: 3.0,
        }
    }
}

impl JitterRange {
    fn validate(&self) -> Result<()> {
        let representable = Duration::try_from_secs_f64(self.min_secs).is_ok()
            && Duration::try_from_secs_f64(self.max_secs).is_ok();
        if !representable || self.min_secs > self.max_secs {
            return Err(EnrichError::Config(format!(
                "invalid jitter interval [{}, {}]",
                self.min_secs, self.max_secs
            )));
        }
        Ok(())
    }
}

/// Pause of `delay_secs` whenever the processed count is a multiple of `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPause {
    pub threshold: u64,
    pub delay_secs: u64,
}

/// Portal (detail source) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the rendered portal front-end
    pub base_url: String,
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PORTAL_URL.to_string(),
            proxy: None,
            timeout_secs: 30,
        }
    }
}

/// Baseline harvest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Google Scholar base URL or mirror
    pub base_url: String,
    /// Proxy URL
    pub proxy: Option<String>,
    /// Result pages to fetch (1-indexed)
    pub pages: Vec<u32>,
    /// Lowercase substrings that drop a harvested title
    pub marker_keywords: Vec<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SCHOLAR_URL.to_string(),
            proxy: None,
            pages: (1..=5).collect(),
            marker_keywords: vec![
                "supporting information".to_string(),
                "supplementary".to_string(),
                "comment".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EnrichError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.enrich.validate()?;
        if self.portal.timeout_secs == 0 {
            return Err(EnrichError::Config("portal.timeout_secs must be > 0".to_string()));
        }
        if self.harvest.pages.iter().any(|p| *p == 0) {
            return Err(EnrichError::Config("harvest pages are 1-indexed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enrich.max_retries, 2);
        assert_eq!(config.enrich.save_interval, 5);
        assert_eq!(config.enrich.batch_pauses.len(), 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "[enrich]\nmax_retries = 4\n\n[[enrich.batch_pauses]]\nthreshold = 10\ndelay_secs = 2\n\n[portal]\nproxy = \"http://127.0.0.1:7890\""
        )?;

        let config = AppConfig::load(Some(&file.path().to_path_buf()))?;
        assert_eq!(config.enrich.max_retries, 4);
        assert_eq!(config.enrich.match_threshold, 0.8);
        assert_eq!(
            config.enrich.batch_pauses,
            vec![BatchPause { threshold: 10, delay_secs: 2 }]
        );
        assert_eq!(config.portal.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.portal.base_url, DEFAULT_PORTAL_URL);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = EnrichConfig::default();
        config.match_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = EnrichConfig::default();
        config.jitter = JitterRange { min_secs: 3.0, max_secs: 1.0 };
        assert!(config.validate().is_err());

        let mut config = EnrichConfig::default();
        config.batch_pauses.push(BatchPause { threshold: 0, delay_secs: 1 });
        assert!(config.validate().is_err());

        let mut config = EnrichConfig::default();
        config.save_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unrepresentable_delays() {
        let mut config = EnrichConfig::default();
        config.base_delay_secs = 1e30;
        assert!(matches!(config.validate(), Err(EnrichError::Config(_))));
        assert_eq!(config.base_delay(), Duration::MAX);

        let mut config = EnrichConfig::default();
        config.base_delay_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = EnrichConfig::default();
        config.jitter = JitterRange { min_secs: 1.0, max_secs: 1e30 };
        assert!(config.validate().is_err());

        let mut config = EnrichConfig::default();
        config.jitter = JitterRange { min_secs: f64::NAN, max_secs: 3.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let missing = PathBuf::from("/nonexistent/rustwos.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(EnrichError::Config(_))
        ));
    }
}
