//! Command-line interface definitions for the province news scraper.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Scraper limits can also come from the environment or a YAML config file;
//! flags win over both.

use crate::config::ScraperConfig;
use clap::Parser;

/// Command-line arguments for the province news scraper.
///
/// URLs come from the positional arguments, a Google News search
/// (`--query`) or any RSS feed (`--feed-url`); they are combined in that
/// order.
///
/// # Examples
///
/// ```sh
/// # Scrape two articles and print the JSON response
/// province_news_scraper https://example.ca/a https://example.ca/b
///
/// # Top Manitoba stories from Google News, saved as JSON and Markdown
/// province_news_scraper --query Manitoba --limit 10 -j ./json -m ./markdown
///
/// # JavaScript-heavy sites through headless Chromium, with retries
/// province_news_scraper --browser --retries 2 https://example.ca/app-article
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Article URLs to scrape
    pub urls: Vec<String>,

    /// Google News search query; results are added to the URL list
    #[arg(long)]
    pub query: Option<String>,

    /// RSS feed whose item links are added to the URL list
    #[arg(long)]
    pub feed_url: Option<String>,

    /// Maximum number of items taken from each feed
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Region label for saved sessions (defaults to the query)
    #[arg(long)]
    pub region: Option<String>,

    /// Output directory for session JSON files
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Output directory for Markdown digests
    #[arg(short, long)]
    pub markdown_output_dir: Option<String>,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "SCRAPER_CONFIG")]
    pub config: Option<String>,

    /// Maximum concurrent fetches per batch
    #[arg(long, env = "MAX_CONCURRENT_SCRAPES")]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, env = "SCRAPE_TIMEOUT")]
    pub timeout_secs: Option<u64>,

    /// Retries for URLs that timed out or failed to fetch
    #[arg(long, default_value_t = 0)]
    pub retries: usize,

    /// Render pages in headless Chromium (requires the `browser` feature)
    #[arg(long)]
    pub browser: bool,

    /// Delete saved sessions older than this many days
    #[arg(long)]
    pub prune_days: Option<u32>,

    /// List saved sessions under the JSON output dir and exit
    #[arg(long, requires = "json_output_dir")]
    pub list_sessions: bool,

    /// Print the latest saved session for the region and exit
    #[arg(long, requires = "json_output_dir", conflicts_with = "list_sessions")]
    pub latest: bool,
}

impl Cli {
    /// Apply flag and environment overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut ScraperConfig) {
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout_secs {
            config.request_timeout_secs = timeout;
        }
    }

    /// Label used to group saved sessions.
    pub fn region(&self) -> &str {
        self.region
            .as_deref()
            .or(self.query.as_deref())
            .unwrap_or(crate::outputs::DEFAULT_REGION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "province_news_scraper",
            "https://example.ca/a",
            "https://example.ca/b",
            "--json-output-dir",
            "./json",
            "--retries",
            "2",
        ]);

        assert_eq!(cli.urls, ["https://example.ca/a", "https://example.ca/b"]);
        assert_eq!(cli.json_output_dir.as_deref(), Some("./json"));
        assert_eq!(cli.markdown_output_dir, None);
        assert_eq!(cli.retries, 2);
        assert_eq!(cli.limit, 10);
        assert!(!cli.browser);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "province_news_scraper",
            "-j",
            "/tmp/json",
            "-m",
            "/tmp/markdown",
            "-c",
            "/etc/scraper.yaml",
            "--query",
            "Nova Scotia",
        ]);

        assert_eq!(cli.json_output_dir.as_deref(), Some("/tmp/json"));
        assert_eq!(cli.markdown_output_dir.as_deref(), Some("/tmp/markdown"));
        assert_eq!(cli.config.as_deref(), Some("/etc/scraper.yaml"));
        assert_eq!(cli.region(), "Nova Scotia");
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "province_news_scraper",
            "--concurrency",
            "4",
            "--timeout-secs",
            "12",
            "--region",
            "Yukon",
            "--query",
            "Whitehorse",
        ]);
        let mut config = ScraperConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.request_timeout_secs, 12);
        assert_eq!(cli.region(), "Yukon");
    }

    #[test]
    fn test_session_queries_need_json_dir() {
        assert!(Cli::try_parse_from(["province_news_scraper", "--list-sessions"]).is_err());
        let cli = Cli::try_parse_from([
            "province_news_scraper",
            "--latest",
            "--region",
            "Manitoba",
            "-j",
            "./json",
        ])
        .unwrap();
        assert!(cli.latest);
        assert_eq!(cli.region(), "Manitoba");
    }
}
