//! Data models for scrape requests, per-URL outcomes and URL verdicts.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ScrapeRequest`]: a bounded, caller-supplied list of URLs
//! - [`ScrapeResult`]: cleaned article text and summary for one URL
//! - [`ScrapeFailure`]: why one URL produced no result
//! - [`ScrapeResponse`]: the aggregated, same-cardinality answer to a request
//! - [`UrlValidationVerdict`] and [`BlockReason`]: the URL gate's decision
//!
//! Everything here serializes with kebab-case enum tags so the JSON written to
//! disk or stdout is stable for downstream consumers.

use crate::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Title used when a page has no `<h1>`, `<title>` or `og:title`.
pub const NO_TITLE: &str = "No title found";

/// A bounded list of URLs to scrape in one batch.
///
/// Duplicates are allowed; each occurrence gets its own outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    urls: Vec<String>,
}

impl ScrapeRequest {
    /// Build a request holding between 1 and `max_urls` URLs.
    pub fn new(urls: Vec<String>, max_urls: usize) -> Result<Self, RequestError> {
        if urls.is_empty() {
            return Err(RequestError::Empty);
        }
        if urls.len() > max_urls {
            return Err(RequestError::TooMany {
                max: max_urls,
                got: urls.len(),
            });
        }
        Ok(Self { urls })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Always false; construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Extracted content for a single URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// The URL as supplied by the caller, not the redirect target.
    pub url: String,
    /// Hostname of `url`.
    pub domain: String,
    /// Best-effort page title, or [`NO_TITLE`].
    pub title: String,
    /// Cleaned main-body text, bounded by the configured character limit.
    pub content: String,
    /// First sentences of `content`, bounded by the configured character limit.
    pub summary: String,
    pub scraped_at: DateTime<Utc>,
}

/// Terminal failure kinds for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The URL gate refused it; no request was sent.
    ValidationRejected,
    /// The fetch exceeded its time budget.
    Timeout,
    /// Connection, DNS or HTTP status failure.
    FetchError,
    /// The page arrived but yielded no usable text.
    ParseError,
}

impl FailureReason {
    /// Failures a caller may reasonably try again.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureReason::Timeout | FailureReason::FetchError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::ValidationRejected => "validation-rejected",
            FailureReason::Timeout => "timeout",
            FailureReason::FetchError => "fetch-error",
            FailureReason::ParseError => "parse-error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a URL produced no [`ScrapeResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeFailure {
    pub url: String,
    pub reason: FailureReason,
    /// Set when `reason` is `validation-rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<BlockReason>,
    /// Underlying error text, kept for logs and display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ScrapeFailure {
    pub fn new(url: impl Into<String>, reason: FailureReason, detail: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            reason,
            block_reason: None,
            detail: Some(detail.to_string()),
        }
    }

    pub fn rejected(url: impl Into<String>, block: BlockReason) -> Self {
        Self {
            url: url.into(),
            reason: FailureReason::ValidationRejected,
            block_reason: Some(block),
            detail: Some(block.describe().to_string()),
        }
    }
}

/// Outcome of scraping one URL.
pub type ScrapeOutcome = Result<ScrapeResult, ScrapeFailure>;

/// Source URL of an outcome, whichever way it went.
pub fn outcome_url(outcome: &ScrapeOutcome) -> &str {
    match outcome {
        Ok(result) => &result.url,
        Err(failure) => &failure.url,
    }
}

/// Aggregated answer for a request: every input URL appears exactly once,
/// in `results` or in `failures`, each list in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub results: Vec<ScrapeResult>,
    pub failures: Vec<ScrapeFailure>,
}

impl ScrapeResponse {
    pub fn total(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

impl FromIterator<ScrapeOutcome> for ScrapeResponse {
    fn from_iter<I: IntoIterator<Item = ScrapeOutcome>>(iter: I) -> Self {
        let mut response = ScrapeResponse::default();
        for outcome in iter {
            match outcome {
                Ok(result) => response.results.push(result),
                Err(failure) => response.failures.push(failure),
            }
        }
        response
    }
}

/// Why the URL gate refused a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    PrivateIp,
    MetadataEndpoint,
    DisallowedScheme,
    UnresolvableHost,
    Loopback,
}

impl BlockReason {
    pub fn describe(self) -> &'static str {
        match self {
            BlockReason::PrivateIp => "host is in a private or non-routable network",
            BlockReason::MetadataEndpoint => "host is a link-local or cloud metadata endpoint",
            BlockReason::DisallowedScheme => "URL is malformed or its scheme is not http/https",
            BlockReason::UnresolvableHost => "host could not be resolved",
            BlockReason::Loopback => "host is a loopback address",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Decision of the URL gate. `reason` is set exactly when `allowed` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlValidationVerdict {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
}

impl UrlValidationVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: BlockReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

impl From<Result<(), BlockReason>> for UrlValidationVerdict {
    fn from(res: Result<(), BlockReason>) -> Self {
        match res {
            Ok(()) => Self::allow(),
            Err(reason) => Self::deny(reason),
        }
    }
}
