//! Concurrent content scraper.
//!
//! [`ContentScraper`] takes a bounded list of URLs and returns one outcome
//! per URL, in input order. Each URL walks the same path:
//!
//! ```text
//! pending → validating → (rejected | fetching) → (fetch_failed | fetched)
//!         → extracting → (extract_failed | done)
//! ```
//!
//! Every URL is checked by the [`UrlSafetyValidator`] before a request is
//! sent. Failures are folded into [`ScrapeFailure`] records at the URL
//! boundary, so one bad URL never disturbs the rest of the batch. Fetches
//! run concurrently up to `max_concurrency`, all sharing a single transport
//! session that is opened before the batch and closed after it.
//!
//! Nothing here retries; see [`crate::retry`] for the caller-side policy.

use crate::config::ScraperConfig;
use crate::error::{ConfigError, FetchError};
use crate::models::{
    FailureReason, ScrapeFailure, ScrapeOutcome, ScrapeRequest, ScrapeResponse, ScrapeResult,
};
use crate::safety::{UrlSafetyValidator, check_lexical};
use crate::scrapers::extract::{ContentExtractor, LargestBlockExtractor};
use crate::scrapers::transport::{FetchSession, FetchedPage, Transport};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::pin::pin;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Per-URL progress, used as the `state` field in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrlState {
    Validating,
    Rejected,
    Fetching,
    FetchFailed,
    Fetched,
    Extracting,
    ExtractFailed,
    Done,
}

impl fmt::Display for UrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UrlState::Validating => "validating",
            UrlState::Rejected => "rejected",
            UrlState::Fetching => "fetching",
            UrlState::FetchFailed => "fetch_failed",
            UrlState::Fetched => "fetched",
            UrlState::Extracting => "extracting",
            UrlState::ExtractFailed => "extract_failed",
            UrlState::Done => "done",
        })
    }
}

/// Detail recorded for URLs still pending when the batch deadline passes.
pub const BATCH_DEADLINE_DETAIL: &str = "batch deadline exceeded";

/// Fetches and extracts readable content from a bounded set of URLs.
pub struct ContentScraper<T: Transport> {
    config: ScraperConfig,
    validator: UrlSafetyValidator,
    extractor: Box<dyn ContentExtractor>,
    transport: T,
}

impl<T: Transport> ContentScraper<T> {
    /// Build a scraper with the default [`LargestBlockExtractor`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] when a limit in `config` is
    /// unusable, e.g. a concurrency of zero.
    pub fn new(
        config: ScraperConfig,
        validator: UrlSafetyValidator,
        transport: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let extractor = Box::new(LargestBlockExtractor::new(&config));
        Ok(Self {
            config,
            validator,
            extractor,
            transport,
        })
    }

    /// Swap the extraction strategy.
    pub fn with_extractor(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Scrape a validated request and split the outcomes.
    pub async fn scrape(&self, request: &ScrapeRequest) -> ScrapeResponse {
        self.scrape_many(request.urls()).await.into_iter().collect()
    }

    /// Scrape a single URL in its own session.
    ///
    /// Rejected URLs never open a session.
    #[instrument(level = "info", skip(self))]
    pub async fn scrape_one(&self, url: &str) -> ScrapeOutcome {
        let parsed = self.validate(url).await?;
        let session = match self.transport.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, transport = self.transport.name(), "Failed to open session");
                return Err(ScrapeFailure::new(url, FailureReason::FetchError, e));
            }
        };
        let outcome = self.fetch_and_extract(&session, url, &parsed).await;
        session.close().await;
        outcome
    }

    /// Scrape every URL concurrently and return one outcome per input URL,
    /// in input order.
    ///
    /// One session is opened for the whole batch and closed once every URL
    /// has an outcome. If the caller drops this future early, the session is
    /// dropped with it and releases its resources.
    #[instrument(level = "info", skip_all, fields(count = urls.len(), transport = self.transport.name()))]
    pub async fn scrape_many(&self, urls: &[String]) -> Vec<ScrapeOutcome> {
        if urls.is_empty() {
            return Vec::new();
        }
        let session = self.transport.open().await;
        if let Err(e) = &session {
            warn!(error = %e, "Failed to open session; every allowed URL will fail");
        }
        let deadline = self.config.batch_timeout().map(|d| Instant::now() + d);

        let mut slots: Vec<Option<ScrapeOutcome>> = vec![None; urls.len()];
        {
            let session = session.as_ref();
            let mut outcomes = pin!(
                stream::iter(urls.iter().enumerate())
                    .map(|(index, url)| async move { (index, self.scrape_in(session, url).await) })
                    .buffer_unordered(self.config.max_concurrency)
            );
            loop {
                let next = match deadline {
                    Some(at) => match tokio::time::timeout_at(at, outcomes.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            warn!("Batch deadline passed; abandoning pending URLs");
                            break;
                        }
                    },
                    None => outcomes.next().await,
                };
                match next {
                    Some((index, outcome)) => slots[index] = Some(outcome),
                    None => break,
                }
            }
        }
        if let Ok(session) = session {
            session.close().await;
        }

        let outcomes: Vec<ScrapeOutcome> = slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    Err(ScrapeFailure::new(
                        url.as_str(),
                        FailureReason::Timeout,
                        BATCH_DEADLINE_DETAIL,
                    ))
                })
            })
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            succeeded,
            failed = outcomes.len() - succeeded,
            "Finished scrape batch"
        );
        outcomes
    }

    /// One URL inside a batch. The session may have failed to open.
    async fn scrape_in(
        &self,
        session: Result<&T::Session, &FetchError>,
        url: &str,
    ) -> ScrapeOutcome {
        let parsed = self.validate(url).await?;
        match session {
            Ok(session) => self.fetch_and_extract(session, url, &parsed).await,
            Err(e) => Err(ScrapeFailure::new(url, FailureReason::FetchError, e)),
        }
    }

    async fn validate(&self, url: &str) -> Result<url::Url, ScrapeFailure> {
        debug!(%url, state = %UrlState::Validating);
        self.validator.check(url).await.map_err(|block| {
            info!(%url, state = %UrlState::Rejected, reason = ?block, "URL rejected");
            ScrapeFailure::rejected(url, block)
        })
    }

    async fn fetch_and_extract(
        &self,
        session: &T::Session,
        url: &str,
        parsed: &url::Url,
    ) -> ScrapeOutcome {
        debug!(%url, state = %UrlState::Fetching);
        let timeout = self.config.request_timeout();
        let fetched = match tokio::time::timeout(timeout, session.fetch(parsed)).await {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                let reason = if e.is_timeout() {
                    FailureReason::Timeout
                } else {
                    FailureReason::FetchError
                };
                warn!(%url, state = %UrlState::FetchFailed, error = %e, "Fetch failed");
                return Err(ScrapeFailure::new(url, reason, e));
            }
        };
        self.check_final_url(url, parsed, &page)?;
        debug!(%url, state = %UrlState::Fetched, status = page.status, bytes = page.html.len());

        debug!(%url, state = %UrlState::Extracting);
        let extracted = self.extractor.extract(&page.html).map_err(|e| {
            warn!(%url, state = %UrlState::ExtractFailed, error = %e, "Extraction failed");
            ScrapeFailure::new(url, FailureReason::ParseError, e)
        })?;

        info!(%url, state = %UrlState::Done, chars = extracted.content.chars().count(), "Scraped page");
        Ok(ScrapeResult {
            url: url.to_string(),
            domain: parsed.host_str().unwrap_or_default().to_string(),
            title: extracted.title,
            content: extracted.content,
            summary: extracted.summary,
            scraped_at: Utc::now(),
        })
    }

    /// A transport that followed redirects must not have landed somewhere
    /// the gate would refuse.
    fn check_final_url(
        &self,
        url: &str,
        parsed: &url::Url,
        page: &FetchedPage,
    ) -> Result<(), ScrapeFailure> {
        if &page.final_url == parsed {
            return Ok(());
        }
        check_lexical(page.final_url.as_str())
            .map(|_| ())
            .map_err(|block| {
                warn!(%url, final_url = %page.final_url, reason = ?block, "Redirected to a blocked URL");
                ScrapeFailure::rejected(url, block)
            })
    }
}
