//! Markdown digest of a scrape session.
//!
//! The digest lists every scraped article (title, source domain, summary,
//! link) followed by the URLs that failed and why. It is meant for reading,
//! not for parsing back; the JSON session is the source of truth.

use super::ScrapeSession;
use crate::error::StorageError;
use crate::utils::truncate_chars;
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Longest excerpt shown when an article has no summary.
const EXCERPT_CHARS: usize = 280;

/// Render `session` as Markdown.
pub fn session_to_markdown(session: &ScrapeSession) -> String {
    let mut md = String::new();
    // Writing into a String cannot fail.
    let _ = render(&mut md, session);
    md
}

fn render(md: &mut String, session: &ScrapeSession) -> fmt::Result {
    writeln!(md, "# {} news digest\n", session.region)?;
    writeln!(
        md,
        "_Session `{}` gathered {} UTC: {} article(s), {} failure(s)._\n",
        session.session_id,
        session.created_at.format("%Y-%m-%d %H:%M"),
        session.result_count,
        session.failure_count
    )?;

    for result in &session.response.results {
        writeln!(md, "## {}\n", result.title)?;
        writeln!(md, "<small>`{}`</small>\n", result.domain)?;
        if result.summary.is_empty() {
            let excerpt = truncate_chars(&result.content.replace('\n', " "), EXCERPT_CHARS);
            writeln!(md, "{excerpt}\n")?;
        } else {
            writeln!(md, "{}\n", result.summary)?;
        }
        writeln!(md, "[Read the full article]({})\n", result.url)?;
    }

    if !session.response.failures.is_empty() {
        writeln!(md, "## Failed URLs\n")?;
        for failure in &session.response.failures {
            match &failure.detail {
                Some(detail) => writeln!(md, "- `{}`: **{}** ({detail})", failure.url, failure.reason)?,
                None => writeln!(md, "- `{}`: **{}**", failure.url, failure.reason)?,
            }
        }
    }
    Ok(())
}

/// Write the digest to `{markdown_output_dir}/{session_id}.md`.
#[instrument(level = "info", skip_all, fields(%markdown_output_dir, session_id = %session.session_id))]
pub async fn write_markdown(
    markdown_output_dir: &str,
    session: &ScrapeSession,
) -> Result<PathBuf, StorageError> {
    let dir = Path::new(markdown_output_dir);
    fs::create_dir_all(dir)
        .await
        .map_err(|e| StorageError::io(dir, e))?;
    let path = dir.join(format!("{}.md", session.session_id));
    fs::write(&path, session_to_markdown(session))
        .await
        .map_err(|e| StorageError::io(&path, e))?;
    info!(path = %path.display(), "Wrote Markdown digest");
    Ok(path)
}
