//! Fetch backends.
//!
//! A [`Transport`] hands out one [`FetchSession`] per batch. The session is
//! the expensive, shared resource (an HTTP connection pool, a browser
//! process); the scraper opens it before a batch and closes it afterwards.
//! Sessions must also release everything on `Drop`, because a caller may
//! abandon a batch mid-flight.

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::safety::{HostResolver, blocked_ip_reason, check_lexical};
use encoding_rs::{Encoding, UTF_8};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::CONTENT_TYPE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Raw page handed from a transport to the extractor.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Where the page was actually served from, after redirects.
    pub final_url: Url,
    pub status: u16,
    pub html: String,
}

/// A batch-scoped connection to the fetch backend.
#[allow(async_fn_in_trait)]
pub trait FetchSession {
    /// Retrieve one page. Non-2xx responses are errors.
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;

    /// Release the session's resources.
    async fn close(self);
}

/// Factory for batch-scoped sessions.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Session: FetchSession;

    async fn open(&self) -> Result<Self::Session, FetchError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Plain HTTP(S) transport on `reqwest`.
///
/// Each session owns its own client and connection pool. The client
/// resolves hostnames through [`GuardedResolver`] and re-checks every
/// redirect hop, so a host that passed validation cannot be swapped for an
/// internal address between the check and the connection. Environment
/// proxies are ignored: a proxy would resolve the target itself and bypass
/// the guarded resolver.
pub struct HttpTransport {
    resolver: Arc<dyn HostResolver>,
    dns_timeout: Duration,
    request_timeout: Duration,
    user_agent: String,
    max_redirects: usize,
    max_body_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &ScraperConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            resolver,
            dns_timeout: config.dns_timeout(),
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
        }
    }

    fn redirect_policy(&self) -> reqwest::redirect::Policy {
        let max_redirects = self.max_redirects;
        reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                let msg = format!("stopped after {max_redirects} redirects");
                return attempt.error(msg);
            }
            let verdict = check_lexical(attempt.url().as_str());
            match verdict {
                Ok(_) => attempt.follow(),
                Err(reason) => {
                    let msg = format!("redirect to {} blocked: {reason}", attempt.url());
                    warn!(%msg, "Refusing redirect");
                    attempt.error(msg)
                }
            }
        })
    }
}

impl Transport for HttpTransport {
    type Session = HttpSession;

    #[instrument(level = "debug", skip_all)]
    async fn open(&self) -> Result<HttpSession, FetchError> {
        let resolver = GuardedResolver {
            inner: Arc::clone(&self.resolver),
            timeout: self.dns_timeout,
        };
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.request_timeout)
            .connect_timeout(self.request_timeout.min(Duration::from_secs(10)))
            .redirect(self.redirect_policy())
            .dns_resolver(Arc::new(resolver))
            .no_proxy()
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;
        debug!("Opened HTTP session");
        Ok(HttpSession {
            client,
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// One batch's HTTP client.
pub struct HttpSession {
    client: reqwest::Client,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl FetchSession for HttpSession {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.request_timeout))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            html: decode_body(&body, content_type.as_deref()),
        })
    }

    async fn close(self) {
        debug!("Closed HTTP session");
    }
}

/// Decode `body` using the charset named in `content_type`, falling back to
/// UTF-8. A byte-order mark wins over both.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// DNS resolver for the HTTP client that refuses blocked answers.
///
/// This is the connect-time half of the URL gate: the address the socket
/// will actually use is checked, not just the one seen during validation.
struct GuardedResolver {
    inner: Arc<dyn HostResolver>,
    timeout: Duration,
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(
            Arc::clone(&self.inner),
            name.as_str().to_owned(),
            self.timeout,
        ))
    }
}

async fn resolve_public(
    resolver: Arc<dyn HostResolver>,
    host: String,
    timeout: Duration,
) -> Result<Addrs, BoxError> {
    let ips = match tokio::time::timeout(timeout, resolver.lookup(&host, 0)).await {
        Ok(res) => res?,
        Err(_) => return Err(format!("DNS lookup for {host} timed out").into()),
    };
    if ips.is_empty() {
        return Err(format!("no addresses for {host}").into());
    }
    if let Some((ip, reason)) = ips
        .iter()
        .find_map(|ip| blocked_ip_reason(*ip).map(|reason| (*ip, reason)))
    {
        warn!(%host, %ip, reason = ?reason, "Blocked address at connect time");
        return Err(format!("{host} resolved to blocked address {ip}: {reason}").into());
    }
    // Port is replaced by the client.
    let addrs: Vec<SocketAddr> = ips.into_iter().map(|ip| SocketAddr::new(ip, 0)).collect();
    Ok(Box::new(addrs.into_iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::StaticResolver;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_guarded_resolver_allows_public_answers() {
        let resolver: Arc<dyn HostResolver> = Arc::new(StaticResolver::public());
        let addrs = resolve_public(resolver, "example.com".into(), Duration::from_secs(1))
            .await
            .unwrap();
        let addrs: Vec<SocketAddr> = addrs.collect();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].ip(), IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[tokio::test]
    async fn test_guarded_resolver_refuses_rebound_answer() {
        let resolver: Arc<dyn HostResolver> = Arc::new(StaticResolver::public().with_host(
            "rebind.example",
            &[IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254))],
        ));
        let err = match resolve_public(resolver, "rebind.example".into(), Duration::from_secs(1)).await {
            Ok(_) => panic!("metadata address must not be returned"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("169.254.169.254"));
    }

    #[tokio::test]
    async fn test_guarded_resolver_unknown_host() {
        let resolver: Arc<dyn HostResolver> = Arc::new(StaticResolver::default());
        assert!(
            resolve_public(resolver, "nowhere.example".into(), Duration::from_secs(1))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_http_transport_opens_session() {
        let config = ScraperConfig::default();
        let transport = HttpTransport::new(&config, Arc::new(StaticResolver::public()));
        let session = transport.open().await.expect("client should build");
        assert_eq!(transport.name(), "http");
        session.close().await;
    }

    #[test]
    fn test_body_decoded_with_declared_charset() {
        // "Québec – café" in windows-1252
        let body = b"Qu\xe9bec \x96 caf\xe9";
        assert_eq!(
            decode_body(body, Some("text/html; charset=windows-1252")),
            "Québec – café"
        );
        assert_eq!(
            decode_body(body, Some("text/html; Charset=\"ISO-8859-1\"")),
            "Québec – café"
        );
    }

    #[test]
    fn test_body_defaults_to_utf8() {
        let body = "Montréal".as_bytes();
        assert_eq!(decode_body(body, None), "Montréal");
        assert_eq!(decode_body(body, Some("text/html")), "Montréal");
        assert_eq!(decode_body(body, Some("text/html; charset=bogus-label")), "Montréal");
    }

    #[test]
    fn test_charset_label_parsing() {
        assert_eq!(charset_label("text/html; charset=utf-8"), Some("utf-8"));
        assert_eq!(charset_label("text/html;foo=bar; CHARSET = \"koi8-r\""), Some("koi8-r"));
        assert_eq!(charset_label("text/html"), None);
        assert_eq!(charset_label("charset=utf-8"), None);
    }

    #[tokio::test]
    async fn test_timeout_reports_configured_duration() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = ScraperConfig {
            request_timeout_secs: 1,
            ..ScraperConfig::default()
        };
        let transport = HttpTransport::new(&config, Arc::new(StaticResolver::public()));
        let session = transport.open().await.unwrap();
        let url = Url::parse(&format!("http://{addr}/slow")).unwrap();

        match session.fetch(&url).await {
            Err(FetchError::Timeout(after)) => assert_eq!(after, Duration::from_secs(1)),
            other => panic!("expected timeout, got {other:?}"),
        }
        session.close().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_environment_proxy_is_ignored() {
        let proxy = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_url = format!("http://{}", proxy.local_addr().unwrap());
        // SAFETY: no other test in this crate reads or writes HTTP_PROXY.
        unsafe { std::env::set_var("HTTP_PROXY", &proxy_url) };

        let resolver = StaticResolver::public()
            .with_host("rebind.example", &[IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))]);
        let transport = HttpTransport::new(&ScraperConfig::default(), Arc::new(resolver));
        let opened = transport.open().await;
        unsafe { std::env::remove_var("HTTP_PROXY") };
        let session = opened.unwrap();

        let url = Url::parse("http://rebind.example/").unwrap();
        match session.fetch(&url).await {
            Err(FetchError::Transport(msg)) => assert!(msg.contains("blocked address"), "{msg}"),
            other => panic!("expected the guarded resolver to refuse, got {other:?}"),
        }
        let contacted = tokio::time::timeout(Duration::from_millis(200), proxy.accept()).await;
        assert!(contacted.is_err(), "request went through the environment proxy");
        session.close().await;
    }
}
