//! # Province News Scraper
//!
//! Fetches readable article text from a bounded list of news URLs without
//! letting those URLs reach private networks.
//!
//! ## Features
//!
//! - SSRF-hardened URL gate: scheme allowlist, loopback/private/link-local
//!   and cloud metadata blocking, DNS checks at validation and connect time
//! - Concurrent scraping with a fixed ceiling, one outcome per input URL
//! - Title, main-content and summary extraction from HTML
//! - Optional headless Chromium backend for JavaScript-rendered pages
//! - URL discovery from Google News or any RSS feed
//! - JSON session files and Markdown digests
//!
//! ## Usage
//!
//! ```sh
//! province_news_scraper --query Saskatchewan -j ./json -m ./markdown
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: positional URLs plus optional feed items
//! 2. **Scraping**: validate, fetch and extract every URL concurrently
//! 3. **Retry**: optionally retry transient failures with backoff
//! 4. **Output**: JSON response on stdout, plus optional session files

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use province_news_scraper::cli::Cli;
use province_news_scraper::config::ScraperConfig;
use province_news_scraper::feed;
use province_news_scraper::models::{ScrapeRequest, ScrapeResponse};
use province_news_scraper::outputs::{ScrapeSession, json, markdown};
use province_news_scraper::retry::{RetryPolicy, retry_failed};
use province_news_scraper::safety::UrlSafetyValidator;
use province_news_scraper::scrapers::content::ContentScraper;
use province_news_scraper::scrapers::transport::{HttpTransport, Transport};
use province_news_scraper::utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    // stdout carries the JSON response, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("province_news_scraper starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = match &args.config {
        Some(path) => ScraperConfig::load(path)?,
        None => ScraperConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;

    // Early check: output dirs must be writable before we spend time scraping
    for dir in [&args.json_output_dir, &args.markdown_output_dir].into_iter().flatten() {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable (fix perms or choose a different path)");
            return Err(e);
        }
    }

    if let Some(dir) = args.json_output_dir.as_deref().filter(|_| args.list_sessions || args.latest) {
        return print_saved_sessions(&args, dir).await;
    }

    let validator = UrlSafetyValidator::new(&config);
    let urls = gather_urls(&args, &config, &validator).await?;
    let request = ScrapeRequest::new(urls, config.max_urls)?;
    info!(count = request.len(), "Scraping URLs");

    let policy = RetryPolicy::new(args.retries);
    let response = if args.browser {
        scrape_with_browser(&config, validator, &request, &policy).await?
    } else {
        let transport = HttpTransport::new(&config, validator.resolver());
        let scraper = ContentScraper::new(config.clone(), validator, transport)?;
        run(&scraper, &request, &policy).await
    };

    for result in &response.results {
        debug!(url = %result.url, title = %truncate_for_log(&result.title, 80), "Scraped");
    }
    for failure in &response.failures {
        warn!(url = %failure.url, reason = %failure.reason, "URL failed");
    }
    println!("{}", serde_json::to_string_pretty(&response)?);

    let session = ScrapeSession::new(args.region(), response);
    if let Some(dir) = &args.json_output_dir {
        json::write_session(dir, &session).await?;
        if let Some(days) = args.prune_days {
            json::prune_sessions(dir, days).await?;
        }
    }
    if let Some(dir) = &args.markdown_output_dir {
        markdown::write_markdown(dir, &session).await?;
    }

    info!(
        results = session.result_count,
        failures = session.failure_count,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "province_news_scraper finished"
    );
    Ok(())
}

/// Answer `--list-sessions` / `--latest` from the JSON output dir.
async fn print_saved_sessions(args: &Cli, dir: &str) -> Result<(), Box<dyn Error>> {
    if args.list_sessions {
        let region = args.region.as_deref().or(args.query.as_deref());
        let sessions = json::list_sessions(dir, region).await?;
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    match json::latest_session(dir, args.region()).await? {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => warn!(region = args.region(), "No saved sessions for region"),
    }
    Ok(())
}

/// Positional URLs followed by feed items from `--query` and `--feed-url`.
#[instrument(level = "info", skip_all)]
async fn gather_urls(
    args: &Cli,
    config: &ScraperConfig,
    validator: &UrlSafetyValidator,
) -> Result<Vec<String>, Box<dyn Error>> {
    let mut urls = args.urls.clone();
    let feeds = args
        .query
        .as_deref()
        .map(feed::google_news_search_url)
        .into_iter()
        .chain(args.feed_url.clone());
    for feed_url in feeds {
        let items = feed::fetch_feed(&feed_url, args.limit, validator, config).await?;
        info!(%feed_url, count = items.len(), "Collected feed items");
        for item in &items {
            debug!(
                title = %truncate_for_log(&item.title, 80),
                source = %item.source_name,
                published = ?item.published,
                link = %item.link,
                "Feed item"
            );
        }
        urls.extend(items.into_iter().map(|item| item.link));
    }
    Ok(urls)
}

/// Scrape the request and retry transient failures per `policy`.
async fn run<T: Transport>(
    scraper: &ContentScraper<T>,
    request: &ScrapeRequest,
    policy: &RetryPolicy,
) -> ScrapeResponse {
    if policy.max_retries == 0 {
        return scraper.scrape(request).await;
    }
    let outcomes = scraper.scrape_many(request.urls()).await;
    retry_failed(scraper, outcomes, policy)
        .await
        .into_iter()
        .collect()
}

#[cfg(feature = "browser")]
async fn scrape_with_browser(
    config: &ScraperConfig,
    validator: UrlSafetyValidator,
    request: &ScrapeRequest,
    policy: &RetryPolicy,
) -> Result<ScrapeResponse, Box<dyn Error>> {
    let transport = province_news_scraper::scrapers::browser::BrowserTransport::new(config);
    let scraper = ContentScraper::new(config.clone(), validator, transport)?;
    Ok(run(&scraper, request, policy).await)
}

#[cfg(not(feature = "browser"))]
async fn scrape_with_browser(
    _config: &ScraperConfig,
    _validator: UrlSafetyValidator,
    _request: &ScrapeRequest,
    _policy: &RetryPolicy,
) -> Result<ScrapeResponse, Box<dyn Error>> {
    error!("--browser requested but this binary was built without the `browser` feature");
    Err("rebuild with `--features browser` to use the headless browser backend".into())
}
