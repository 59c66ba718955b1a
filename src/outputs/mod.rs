//! Local persistence of scrape sessions as JSON and Markdown.
//!
//! A *session* is one CLI run: the region it was gathered for, when it ran
//! and the full [`ScrapeResponse`].
//!
//! # Submodules
//!
//! - [`json`]: Writes, lists, loads and prunes session files
//! - [`markdown`]: Renders a session as a readable digest
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! ├── manitoba/
//! │   ├── manitoba_20251014_130501.json
//! │   └── manitoba_20251015_070000.json
//! └── nova-scotia/
//!     └── nova-scotia_20251015_071500.json
//!
//! markdown_output_dir/
//! └── manitoba_20251015_070000.md
//! ```

pub mod json;
pub mod markdown;

use crate::models::ScrapeResponse;
use crate::utils::slugify;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Region used when a run is not tied to a province.
pub const DEFAULT_REGION: &str = "general";

/// One persisted scrape run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeSession {
    /// `{region-slug}_{YYYYmmdd_HHMMSS}`; also the file stem.
    pub session_id: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub result_count: usize,
    pub failure_count: usize,
    pub response: ScrapeResponse,
}

impl ScrapeSession {
    pub fn new(region: &str, response: ScrapeResponse) -> Self {
        Self::at(region, response, Utc::now())
    }

    pub fn at(region: &str, response: ScrapeResponse, created_at: DateTime<Utc>) -> Self {
        let region = match region.trim() {
            "" => DEFAULT_REGION.to_string(),
            r => r.to_string(),
        };
        Self {
            session_id: format!(
                "{}_{}",
                region_slug(&region),
                created_at.format("%Y%m%d_%H%M%S")
            ),
            region,
            created_at,
            result_count: response.results.len(),
            failure_count: response.failures.len(),
            response,
        }
    }
}

/// Listing entry for a stored session, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub result_count: usize,
    pub failure_count: usize,
    pub path: PathBuf,
}

/// Directory name for a region.
pub(crate) fn region_slug(region: &str) -> String {
    match slugify(region) {
        s if s.is_empty() => DEFAULT_REGION.to_string(),
        s => s,
    }
}
