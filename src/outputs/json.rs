//! JSON session storage.
//!
//! Sessions are written one file per run, grouped by region:
//! ```text
//! json_output_dir/
//! └── manitoba/
//!     ├── manitoba_20251014_130501.json
//!     └── manitoba_20251015_070000.json
//! ```
//!
//! Listing and pruning read `created_at` from the files themselves rather
//! than file-system timestamps, so copied or restored directories keep
//! their history. Unreadable files are logged and skipped.

use super::{ScrapeSession, SessionSummary, region_slug};
use crate::error::StorageError;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Write a [`ScrapeSession`] as pretty-printed JSON.
///
/// # Arguments
///
/// * `json_output_dir` - Base directory for session files
/// * `session` - The session to persist
///
/// # Returns
///
/// The path of the written file: `{json_output_dir}/{region-slug}/{session_id}.json`
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, session_id = %session.session_id))]
pub async fn write_session(
    json_output_dir: &str,
    session: &ScrapeSession,
) -> Result<PathBuf, StorageError> {
    let region_dir = Path::new(json_output_dir).join(region_slug(&session.region));
    info!(dir = %region_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&region_dir).await {
        error!(dir = %region_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(StorageError::io(region_dir, e));
    }

    let path = region_dir.join(format!("{}.json", session.session_id));
    let json = serde_json::to_string_pretty(session).map_err(|source| StorageError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json)
        .await
        .map_err(|e| StorageError::io(&path, e))?;
    info!(path = %path.display(), results = session.result_count, failures = session.failure_count, "Wrote session JSON");
    Ok(path)
}

/// Read one session file.
pub async fn read_session(path: &Path) -> Result<ScrapeSession, StorageError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Stored sessions, newest first, optionally for one region only.
///
/// A missing output directory is an empty listing, not an error.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, region = region.unwrap_or("*")))]
pub async fn list_sessions(
    json_output_dir: &str,
    region: Option<&str>,
) -> Result<Vec<SessionSummary>, StorageError> {
    let base = Path::new(json_output_dir);
    let region_dirs: Vec<PathBuf> = match region {
        Some(region) => vec![base.join(region_slug(region))],
        None => subdirectories(base).await?,
    };

    let mut sessions = Vec::new();
    for dir in region_dirs {
        for path in json_files(&dir).await? {
            match read_session(&path).await {
                Ok(session) => sessions.push(SessionSummary {
                    session_id: session.session_id,
                    region: session.region,
                    created_at: session.created_at,
                    result_count: session.result_count,
                    failure_count: session.failure_count,
                    path,
                }),
                Err(e) => warn!(error = %e, "Skipping unreadable session file"),
            }
        }
    }
    sessions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.session_id.cmp(&a.session_id))
    });
    info!(count = sessions.len(), "Listed sessions");
    Ok(sessions)
}

/// Most recent session for `region`, if any.
pub async fn latest_session(
    json_output_dir: &str,
    region: &str,
) -> Result<Option<ScrapeSession>, StorageError> {
    match list_sessions(json_output_dir, Some(region)).await?.first() {
        Some(summary) => read_session(&summary.path).await.map(Some),
        None => Ok(None),
    }
}

/// Delete sessions created more than `keep_days` days ago.
///
/// # Returns
///
/// The number of files removed.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir, keep_days))]
pub async fn prune_sessions(json_output_dir: &str, keep_days: u32) -> Result<usize, StorageError> {
    let cutoff = Utc::now() - Duration::days(i64::from(keep_days));
    let mut removed = 0;
    for session in list_sessions(json_output_dir, None).await? {
        if session.created_at >= cutoff {
            continue;
        }
        fs::remove_file(&session.path)
            .await
            .map_err(|e| StorageError::io(&session.path, e))?;
        info!(path = %session.path.display(), "Deleted old session");
        removed += 1;
    }
    info!(removed, "Pruned sessions");
    Ok(removed)
}

async fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(StorageError::io(dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if is_dir {
            out.push(entry.path());
        }
    }
    Ok(out)
}

async fn json_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(StorageError::io(dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockReason, ScrapeFailure, ScrapeResponse, ScrapeResult};
    use chrono::{DateTime, TimeZone};

    fn response() -> ScrapeResponse {
        ScrapeResponse {
            results: vec![ScrapeResult {
                url: "https://example.ca/story".into(),
                domain: "example.ca".into(),
                title: "Story".into(),
                content: "Body text.".into(),
                summary: String::new(),
                scraped_at: Utc::now(),
            }],
            failures: vec![ScrapeFailure::rejected(
                "http://10.1.2.3/",
                BlockReason::PrivateIp,
            )],
        }
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, day, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_write_then_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();

        let older = ScrapeSession::at("Manitoba", response(), at(1));
        let newer = ScrapeSession::at("Manitoba", response(), at(2));
        let path = write_session(dir, &older).await.unwrap();
        write_session(dir, &newer).await.unwrap();

        assert!(path.ends_with("manitoba/manitoba_20251001_080000.json"));
        let latest = latest_session(dir, "Manitoba").await.unwrap().unwrap();
        assert_eq!(latest, newer);
        assert_eq!(latest.failure_count, 1);
    }

    #[tokio::test]
    async fn test_latest_for_unknown_region_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        assert!(latest_session(dir, "Yukon").await.unwrap().is_none());
        assert!(list_sessions("/nonexistent/session/dir", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorts_newest_first_and_skips_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        write_session(dir, &ScrapeSession::at("Alberta", response(), at(3))).await.unwrap();
        write_session(dir, &ScrapeSession::at("Quebec", response(), at(5))).await.unwrap();
        write_session(dir, &ScrapeSession::at("Alberta", response(), at(4))).await.unwrap();
        std::fs::write(tmp.path().join("alberta/broken.json"), "{ not json").unwrap();
        std::fs::write(tmp.path().join("alberta/notes.txt"), "ignored").unwrap();

        let all = list_sessions(dir, None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "quebec_20251005_080000",
                "alberta_20251004_080000",
                "alberta_20251003_080000"
            ]
        );

        let alberta = list_sessions(dir, Some("Alberta")).await.unwrap();
        assert_eq!(alberta.len(), 2);
        assert!(alberta.iter().all(|s| s.region == "Alberta"));
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_sessions() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let old = ScrapeSession::at("Ontario", response(), Utc::now() - Duration::days(45));
        let recent = ScrapeSession::at("Ontario", response(), Utc::now() - Duration::days(2));
        let old_path = write_session(dir, &old).await.unwrap();
        let recent_path = write_session(dir, &recent).await.unwrap();

        let removed = prune_sessions(dir, 30).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!old_path.exists());
        assert!(recent_path.exists());
    }
}
