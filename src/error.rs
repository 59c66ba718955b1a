//! Error types for configuration, requests, fetching, extraction and output.
//!
//! Per-URL errors ([`FetchError`], [`ExtractError`]) never escape a batch: the
//! scraper folds them into [`ScrapeFailure`](crate::models::ScrapeFailure)
//! records. [`ConfigError`] is the one kind that is meant to stop the program.

use std::error::Error as _;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid scraper configuration. Stops the program before any scraping.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be at least {min}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A caller-supplied URL list that violates the request bounds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("at least one URL is required")]
    Empty,

    #[error("at most {max} URLs are allowed per request, got {got}")]
    TooMany { max: usize, got: usize },
}

/// Failure while retrieving a page from a transport.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("response body exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Whether the failure should be reported as a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }

    /// Classify a `reqwest` failure. `timeout` is the client's configured
    /// request timeout, which `reqwest` does not carry on the error.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            // Include the source chain so blocked-resolver errors stay visible.
            let mut msg = err.to_string();
            let mut source = err.source();
            while let Some(inner) = source {
                msg.push_str(": ");
                msg.push_str(&inner.to_string());
                source = inner.source();
            }
            FetchError::Transport(msg)
        }
    }
}

/// A page was fetched but held nothing worth keeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("page contained no extractable text")]
    Empty,
}

/// Failure while reading a news feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed URL rejected: {0}")]
    Rejected(String),

    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to parse feed: {0}")]
    Parse(#[from] quick_xml::de::DeError),
}

/// Failure while persisting or reading scrape sessions.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed session file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
