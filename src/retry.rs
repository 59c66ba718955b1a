//! Caller-side retry policy layered on top of batch scraping.
//!
//! The scraper itself never retries. Callers hand a finished batch to
//! [`retry_failed`], which re-runs the retryable failures in rounds. Each
//! round is one [`ContentScraper::scrape_many`] call, so it opens a single
//! transport session no matter how many URLs it carries. Rounds back off
//! exponentially with jitter:
//!
//! ```text
//! delay = min(base_delay * 2^(round-1), max_delay) + random_jitter(0..=jitter)
//! ```
//!
//! Only `timeout` and `fetch-error` failures are retried. A rejected URL
//! stays rejected and a page with no text will not grow any on a second
//! visit.

use crate::models::{ScrapeOutcome, outcome_url};
use crate::scrapers::content::ContentScraper;
use crate::scrapers::transport::Transport;
use rand::{Rng, rng};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{error, info, instrument, warn};

/// Bounded retry settings. The default performs no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra delay per round.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Backoff before retry round `attempt` (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rng().random_range(0..=jitter_ms))
    }
}

/// Scrape one URL, retrying transient failures per `policy`.
#[instrument(level = "info", skip(scraper, policy))]
pub async fn scrape_with_retry<T: Transport>(
    scraper: &ContentScraper<T>,
    url: &str,
    policy: &RetryPolicy,
) -> ScrapeOutcome {
    let mut outcomes = [scraper.scrape_one(url).await];
    retry_rounds(scraper, &mut outcomes, policy).await;
    let [outcome] = outcomes;
    outcome
}

/// Retry the retryable failures of a finished batch.
///
/// Successful and non-retryable outcomes pass through untouched; order and
/// length are preserved. Every round is a single batch on one session.
#[instrument(level = "info", skip_all, fields(count = outcomes.len()))]
pub async fn retry_failed<T: Transport>(
    scraper: &ContentScraper<T>,
    mut outcomes: Vec<ScrapeOutcome>,
    policy: &RetryPolicy,
) -> Vec<ScrapeOutcome> {
    let retryable = outcomes.iter().filter(|o| is_retryable(o)).count();
    if policy.max_retries == 0 || retryable == 0 {
        return outcomes;
    }
    info!(retryable, max_retries = policy.max_retries, "Retrying failed URLs");
    retry_rounds(scraper, &mut outcomes, policy).await;
    outcomes
}

fn is_retryable(outcome: &ScrapeOutcome) -> bool {
    matches!(outcome, Err(f) if f.reason.is_retryable())
}

/// Re-scrape retryable entries of `outcomes` in place, one batch per round,
/// until none are left or the policy runs out.
async fn retry_rounds<T: Transport>(
    scraper: &ContentScraper<T>,
    outcomes: &mut [ScrapeOutcome],
    policy: &RetryPolicy,
) {
    if policy.max_retries == 0 {
        return;
    }
    let total_t0 = Instant::now();

    for round in 1..=policy.max_retries {
        let pending: Vec<usize> = (0..outcomes.len())
            .filter(|&i| is_retryable(&outcomes[i]))
            .collect();
        if pending.is_empty() {
            return;
        }

        let delay = policy.delay_for(round);
        for failure in pending.iter().filter_map(|&i| outcomes[i].as_ref().err()) {
            warn!(
                url = %failure.url,
                attempt = round,
                max = policy.max_retries,
                ?delay,
                reason = %failure.reason,
                detail = failure.detail.as_deref().unwrap_or_default(),
                "Scrape attempt failed; backing off"
            );
        }
        sleep(delay).await;

        let urls: Vec<String> = pending
            .iter()
            .map(|&i| outcome_url(&outcomes[i]).to_string())
            .collect();
        let retried = scraper.scrape_many(&urls).await;
        for (i, outcome) in pending.into_iter().zip(retried) {
            if let Ok(result) = &outcome {
                info!(url = %result.url, attempt = round, "Scrape succeeded on retry");
            }
            outcomes[i] = outcome;
        }
    }

    for failure in outcomes.iter().filter(|o| is_retryable(o)).filter_map(|o| o.as_ref().err()) {
        error!(
            url = %failure.url,
            max = policy.max_retries,
            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
            reason = %failure.reason,
            "Scrape exhausted retries"
        );
    }
}
