//! Headless Chromium transport for JavaScript-rendered pages.
//!
//! Enabled with the `browser` feature. A session is one browser process;
//! each fetch opens a tab, waits for the main document response, reads the
//! rendered DOM and closes the tab again. A non-2xx document response is a
//! fetch error, just as with the HTTP transport.
//!
//! Chromium resolves hostnames itself and follows redirects internally, so
//! only the page's final URL can be re-checked (the scraper does that for
//! every transport). The connect-time address check of
//! [`HttpTransport`](super::transport::HttpTransport) has no equivalent here.

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::scrapers::transport::{FetchSession, FetchedPage, Transport};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use url::Url;

const OUTER_HTML: &str = "document.documentElement.outerHTML";

pub struct BrowserTransport {
    chrome_executable: Option<PathBuf>,
    user_agent: String,
}

impl BrowserTransport {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            chrome_executable: config.chrome_executable.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Transport for BrowserTransport {
    type Session = BrowserSession;

    #[instrument(level = "info", skip_all)]
    async fn open(&self) -> Result<BrowserSession, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| FetchError::Transport(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Transport(format!("failed to launch browser: {e}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler event error");
                }
            }
        });
        debug!("Launched headless browser");
        Ok(BrowserSession { browser, handler })
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

/// A running browser process and its CDP event loop.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl FetchSession for BrowserSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let page = self
            .browser
            .new_page(url.as_str())
            .await
            .map_err(|e| FetchError::Transport(format!("navigation failed: {e}")))?;
        let tab = OpenTab(Some(page.clone()));

        let request = page
            .wait_for_navigation_response()
            .await
            .map_err(|e| FetchError::Transport(format!("navigation failed: {e}")))?;
        let status = document_status(
            request
                .as_ref()
                .and_then(|req| req.response.as_ref())
                .map(|resp| resp.status),
            url,
        )?;

        let html = page
            .evaluate(OUTER_HTML)
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read DOM: {e}")))?
            .into_value::<String>()
            .map_err(|e| FetchError::Transport(format!("unreadable DOM: {e}")))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());
        tab.close().await;

        Ok(FetchedPage {
            final_url,
            status,
            html,
        })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Failed to reap browser process");
        }
        debug!("Closed headless browser");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // The browser process is killed by its own Drop.
        self.handler.abort();
    }
}

/// A browser tab that is closed even when its fetch is abandoned, e.g. by
/// the scraper's per-fetch timeout.
struct OpenTab(Option<Page>);

impl OpenTab {
    async fn close(mut self) {
        if let Some(page) = self.0.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "Failed to close browser tab");
            }
        }
    }
}

impl Drop for OpenTab {
    fn drop(&mut self) {
        let Some(page) = self.0.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!(error = %e, "Failed to close abandoned browser tab");
                }
            });
        }
    }
}

/// Status of the main document response; anything outside 2xx is an error.
fn document_status(status: Option<i64>, url: &Url) -> Result<u16, FetchError> {
    let Some(status) = status else {
        return Err(FetchError::Transport(format!("no document response for {url}")));
    };
    let status = u16::try_from(status)
        .map_err(|_| FetchError::Transport(format!("invalid HTTP status {status} from {url}")))?;
    if !(200..300).contains(&status) {
        return Err(FetchError::Status {
            status,
            url: url.to_string(),
        });
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.ca/story").unwrap()
    }

    #[test]
    fn test_document_status_accepts_2xx() {
        assert_eq!(document_status(Some(200), &url()).unwrap(), 200);
        assert_eq!(document_status(Some(204), &url()).unwrap(), 204);
    }

    #[test]
    fn test_error_pages_are_fetch_errors() {
        for code in [301, 404, 500, 503] {
            match document_status(Some(code), &url()) {
                Err(FetchError::Status { status, url: failed }) => {
                    assert_eq!(i64::from(status), code);
                    assert_eq!(failed, "https://example.ca/story");
                }
                other => panic!("expected status error for {code}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_or_bogus_response_is_transport_error() {
        assert!(matches!(
            document_status(None, &url()),
            Err(FetchError::Transport(_))
        ));
        assert!(matches!(
            document_status(Some(-1), &url()),
            Err(FetchError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_tab_guard_drops_quietly() {
        drop(OpenTab(None));
        OpenTab(None).close().await;
    }
}
