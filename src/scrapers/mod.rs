//! Fetching and extracting article content from caller-supplied URLs.
//!
//! The module is split along the seams that change independently:
//!
//! | Module | Role |
//! |--------|------|
//! | [`content`] | Batch orchestration: validation, bounded concurrency, per-URL failures |
//! | [`extract`] | HTML → title, main text and summary |
//! | [`transport`] | Fetch backends and their batch-scoped sessions |
//! | `browser` | Headless Chromium backend (feature `browser`) |
//!
//! Scraping follows the same pattern for every URL:
//! - The URL passes the SSRF gate in [`crate::safety`] or is never fetched
//! - Concurrent fetching with `futures::stream` up to a fixed ceiling
//! - Graceful error handling (each failure becomes a record, not a panic)

pub mod content;
pub mod extract;
pub mod transport;

#[cfg(feature = "browser")]
pub mod browser;
