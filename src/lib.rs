//! Library half of the province news scraper.
//!
//! The binary in `main.rs` is a thin CLI over these modules:
//!
//! - [`safety`]: the SSRF gate every URL passes before it is fetched
//! - [`scrapers`]: fetch backends, HTML extraction and the concurrent scraper
//! - [`retry`]: caller-side retries for transient failures
//! - [`feed`]: URL discovery from Google News and RSS feeds
//! - [`outputs`]: JSON sessions and Markdown digests

pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod outputs;
pub mod retry;
pub mod safety;
pub mod scrapers;
pub mod utils;
