//! Scraper configuration.
//!
//! Settings come from three layers, later ones winning:
//! built-in defaults, an optional YAML file, then CLI flags / environment
//! variables (applied in `main`). [`ScraperConfig::validate`] must pass before
//! a scraper is built; an invalid value is a programming or deployment error
//! and is reported immediately instead of being folded into per-URL failures.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Desktop Chrome user agent; many news sites serve stripped pages to bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for the URL gate and the concurrent scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Maximum URLs accepted in one request.
    pub max_urls: usize,
    /// Maximum fetches in flight at once.
    pub max_concurrency: usize,
    /// Per-URL fetch timeout in seconds.
    pub request_timeout_secs: u64,
    /// Optional deadline for a whole batch in seconds.
    pub batch_timeout_secs: Option<u64>,
    /// Timeout for DNS lookups made by the URL gate.
    pub dns_timeout_secs: u64,
    /// Cap on extracted content, in characters.
    pub max_content_chars: usize,
    /// Cap on the derived summary, in characters.
    pub max_summary_chars: usize,
    /// Sentences shorter than this are not used for summaries.
    pub min_sentence_chars: usize,
    /// Cap on a downloaded response body, in bytes.
    pub max_body_bytes: usize,
    /// Maximum redirect hops the HTTP transport follows.
    pub max_redirects: usize,
    pub user_agent: String,
    /// Resolve hostnames during validation. Disable only for offline checks.
    pub resolve_dns: bool,
    /// Chromium binary for the browser transport; auto-detected when unset.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_urls: 20,
            max_concurrency: 10,
            request_timeout_secs: 30,
            batch_timeout_secs: None,
            dns_timeout_secs: 5,
            max_content_chars: 5000,
            max_summary_chars: 500,
            min_sentence_chars: 20,
            max_body_bytes: 5 * 1024 * 1024,
            max_redirects: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            resolve_dns: true,
            chrome_executable: None,
        }
    }
}

impl ScraperConfig {
    /// Load configuration from a YAML file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid YAML for this struct.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScraperConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), "Loaded scraper configuration");
        Ok(config)
    }

    /// Check every bound that the scraper relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64, u64); 8] = [
            ("max_urls", 1, self.max_urls as u64),
            ("max_concurrency", 1, self.max_concurrency as u64),
            ("request_timeout_secs", 1, self.request_timeout_secs),
            ("dns_timeout_secs", 1, self.dns_timeout_secs),
            ("max_content_chars", 1, self.max_content_chars as u64),
            ("max_summary_chars", 1, self.max_summary_chars as u64),
            ("max_body_bytes", 1024, self.max_body_bytes as u64),
            (
                "batch_timeout_secs",
                1,
                self.batch_timeout_secs.unwrap_or(1),
            ),
        ];
        for (field, min, value) in checks {
            if value < min {
                return Err(ConfigError::OutOfRange { field, min, value });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScraperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_urls, 20);
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_content_chars, 5000);
        assert_eq!(config.max_summary_chars, 500);
        assert!(config.batch_timeout().is_none());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = ScraperConfig {
            max_concurrency: 0,
            ..ScraperConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "max_concurrency",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_batch_timeout_rejected() {
        let config = ScraperConfig {
            batch_timeout_secs: Some(0),
            ..ScraperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency: 4\nrequest_timeout_secs: 12").unwrap();

        let config = ScraperConfig::load(file.path()).unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.request_timeout_secs, 12);
        assert_eq!(config.max_urls, 20);
        assert!(config.resolve_dns);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScraperConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency: [not, a, number]").unwrap();
        let err = ScraperConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
