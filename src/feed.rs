//! News feed discovery.
//!
//! Supplies candidate article URLs plus light metadata from an RSS 2.0 feed,
//! typically a Google News search scoped to Canada. Feed items are only
//! candidates: scraping them still goes through a bounded
//! [`ScrapeRequest`](crate::models::ScrapeRequest) and the URL gate.

use crate::config::ScraperConfig;
use crate::error::FeedError;
use crate::safety::UrlSafetyValidator;
use crate::scrapers::transport::{FetchSession, HttpTransport, Transport};
use crate::utils::collapse_whitespace;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

const GOOGLE_NEWS_SEARCH: &str = "https://news.google.com/rss/search";
const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_SOURCE: &str = "Unknown Source";

/// One candidate article from a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// `None` when the feed gives no parseable RFC 2822 date.
    pub published: Option<DateTime<Utc>>,
    pub source_name: String,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    source: Option<Source>,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Source {
    #[serde(rename = "$text")]
    name: Option<String>,
}

/// Google News RSS search for `query`, in Canadian English.
///
/// # Examples
///
/// ```ignore
/// let url = google_news_search_url("Nova Scotia wildfire");
/// assert_eq!(
///     url,
///     "https://news.google.com/rss/search?q=Nova%20Scotia%20wildfire&hl=en-CA&gl=CA&ceid=CA:en"
/// );
/// ```
pub fn google_news_search_url(query: &str) -> String {
    format!(
        "{GOOGLE_NEWS_SEARCH}?q={}&hl=en-CA&gl=CA&ceid=CA:en",
        urlencoding::encode(query.trim())
    )
}

/// Parse an RSS 2.0 document into feed items.
///
/// Items without a link are dropped, as are repeated links (first wins).
///
/// # Errors
///
/// Returns [`FeedError::Parse`] when the document is not RSS.
pub fn parse_rss(xml: &str) -> Result<Vec<FeedItem>, FeedError> {
    let rss: Rss = quick_xml::de::from_str(xml)?;
    let items = rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let link = item.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
            let title = item
                .title
                .map(|t| collapse_whitespace(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
            let published = item.pub_date.as_deref().and_then(|raw| {
                DateTime::parse_from_rfc2822(raw.trim())
                    .map(|dt| dt.with_timezone(&Utc))
                    .inspect_err(|e| warn!(%raw, error = %e, "Unparseable pubDate"))
                    .ok()
            });
            let source_name = item
                .source
                .and_then(|s| s.name)
                .or(item.author)
                .map(|s| collapse_whitespace(&s))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
            Some(FeedItem {
                title,
                link,
                published,
                source_name,
            })
        })
        .unique_by(|item| item.link.clone())
        .collect();
    Ok(items)
}

/// Fetch a feed through the URL gate and return at most `limit` items.
///
/// The feed is downloaded with the same hardened HTTP client the scraper
/// uses, so the feed host gets the same connect-time address checks.
///
/// # Errors
///
/// - [`FeedError::Rejected`] if the feed URL fails validation
/// - [`FeedError::Fetch`] on network or HTTP status failures
/// - [`FeedError::Parse`] if the body is not RSS
#[instrument(level = "info", skip(validator, config))]
pub async fn fetch_feed(
    feed_url: &str,
    limit: usize,
    validator: &UrlSafetyValidator,
    config: &ScraperConfig,
) -> Result<Vec<FeedItem>, FeedError> {
    let url = validator
        .check(feed_url)
        .await
        .map_err(|reason| FeedError::Rejected(reason.to_string()))?;

    let session = HttpTransport::new(config, validator.resolver()).open().await?;
    let page = session.fetch(&url).await;
    session.close().await;
    let page = page?;

    let mut items = parse_rss(&page.html)?;
    let available = items.len();
    items.truncate(limit);
    info!(available, kept = items.len(), "Fetched feed");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::StaticResolver;
    use std::sync::Arc;

    const GOOGLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <generator>NFE/5.0</generator>
    <title>"Manitoba" - Google News</title>
    <link>https://news.google.com/search?q=Manitoba</link>
    <item>
      <title>Winnipeg transit expands night service - CBC News</title>
      <link>https://news.google.com/rss/articles/abc?oc=5</link>
      <guid isPermaLink="false">abc</guid>
      <pubDate>Tue, 14 Oct 2025 13:05:00 GMT</pubDate>
      <description>&lt;a href="x"&gt;Winnipeg transit&lt;/a&gt;</description>
      <source url="https://www.cbc.ca">CBC News</source>
    </item>
    <item>
      <title>No link here</title>
      <pubDate>Tue, 14 Oct 2025 12:00:00 GMT</pubDate>
    </item>
    <lastBuildDate>Tue, 14 Oct 2025 14:00:00 GMT</lastBuildDate>
    <item>
      <title>Harvest wraps up early</title>
      <link> https://example.ca/harvest </link>
      <pubDate>sometime last week</pubDate>
    </item>
    <item>
      <title>Winnipeg transit expands night service (duplicate)</title>
      <link>https://news.google.com/rss/articles/abc?oc=5</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_google_news_feed() {
        let items = parse_rss(GOOGLE_FEED).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "Winnipeg transit expands night service - CBC News");
        assert_eq!(first.link, "https://news.google.com/rss/articles/abc?oc=5");
        assert_eq!(first.source_name, "CBC News");
        assert_eq!(
            first.published.unwrap().to_rfc3339(),
            "2025-10-14T13:05:00+00:00"
        );

        let second = &items[1];
        assert_eq!(second.link, "https://example.ca/harvest");
        assert_eq!(second.source_name, UNKNOWN_SOURCE);
        assert!(second.published.is_none());
    }

    #[test]
    fn test_empty_channel() {
        let xml = "<rss><channel><title>Empty</title></channel></rss>";
        assert!(parse_rss(xml).unwrap().is_empty());
    }

    #[test]
    fn test_not_rss_is_parse_error() {
        assert!(matches!(parse_rss("<html><body>nope</body></html>"), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_google_news_search_url() {
        assert_eq!(
            google_news_search_url(" British Columbia & Yukon "),
            "https://news.google.com/rss/search?q=British%20Columbia%20%26%20Yukon&hl=en-CA&gl=CA&ceid=CA:en"
        );
    }

    #[tokio::test]
    async fn test_fetch_feed_rejects_internal_url() {
        let config = ScraperConfig::default();
        let validator =
            UrlSafetyValidator::with_resolver(&config, Arc::new(StaticResolver::public()));
        let err = fetch_feed("http://localhost:8080/feed.xml", 10, &validator, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Rejected(_)));
    }
}
