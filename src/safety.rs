//! SSRF gate for every URL the service is asked to fetch.
//!
//! The validator runs before any network call for a page. It rejects
//! non-HTTP(S) schemes, embedded credentials, loopback/private/link-local
//! addresses, cloud metadata endpoints and local-only hostnames, then (unless
//! disabled) resolves the hostname and rejects it if *any* returned address
//! falls in a blocked range.
//!
//! # Layers
//!
//! | Check | Function | I/O |
//! |-------|----------|-----|
//! | Parse, scheme, credentials, literal IP, hostname | [`check_lexical`] | none |
//! | Single address classification | [`blocked_ip_reason`] | none |
//! | DNS answer classification | [`UrlSafetyValidator::check`] | DNS, bounded by a timeout |
//!
//! The same [`blocked_ip_reason`] is reused by the HTTP transport at connect
//! time, which closes the window between validation and connection that a
//! DNS-rebinding attacker would otherwise use.

use crate::config::ScraperConfig;
use crate::models::{BlockReason, UrlValidationVerdict};
use futures::future::BoxFuture;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

const METADATA_V4: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);
// AWS IMDS over IPv6
const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

const LOOPBACK_HOSTS: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
];
const METADATA_HOSTS: &[&str] = &["metadata.google.internal", "metadata", "instance-data"];
const PRIVATE_SUFFIXES: &[&str] = &[".local", ".internal", ".intranet"];

/// Resolves hostnames to addresses for the URL gate.
///
/// Returns a boxed future so the validator can hold any resolver behind an
/// `Arc<dyn HostResolver>`.
pub trait HostResolver: Send + Sync {
    fn lookup<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>>;
}

/// The operating system resolver, via tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn lookup<'a>(&'a self, host: &'a str, port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host, port)).await?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        })
    }
}

/// Classify a single address. `None` means the address may be contacted.
pub fn blocked_ip_reason(ip: IpAddr) -> Option<BlockReason> {
    match ip {
        IpAddr::V4(v4) => blocked_ipv4_reason(v4),
        IpAddr::V6(v6) => blocked_ipv6_reason(v6),
    }
}

fn blocked_ipv4_reason(ip: Ipv4Addr) -> Option<BlockReason> {
    let octets = ip.octets();
    if ip == METADATA_V4 || ip.is_link_local() {
        Some(BlockReason::MetadataEndpoint)
    } else if ip.is_loopback() || ip.is_unspecified() {
        Some(BlockReason::Loopback)
    } else if ip.is_private()
        || ip.is_multicast()
        || ip.is_broadcast()
        // 0.0.0.0/8, 100.64.0.0/10 (carrier-grade NAT), 240.0.0.0/4
        || octets[0] == 0
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        || octets[0] >= 240
    {
        Some(BlockReason::PrivateIp)
    } else {
        None
    }
}

fn blocked_ipv6_reason(ip: Ipv6Addr) -> Option<BlockReason> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Some(BlockReason::Loopback);
    }
    if let Some(v4) = embedded_ipv4(ip) {
        return blocked_ipv4_reason(v4);
    }
    let first = ip.segments()[0];
    if ip == METADATA_V6 || (first & 0xffc0) == 0xfe80 {
        Some(BlockReason::MetadataEndpoint)
    } else if (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfec0 || ip.is_multicast() {
        // unique-local, deprecated site-local, multicast
        Some(BlockReason::PrivateIp)
    } else {
        None
    }
}

/// IPv4 address carried inside a mapped (`::ffff:a.b.c.d`), compatible
/// (`::a.b.c.d`) or NAT64 (`64:ff9b::a.b.c.d`) IPv6 address.
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let seg = ip.segments();
    let tail = Ipv4Addr::new(
        (seg[6] >> 8) as u8,
        seg[6] as u8,
        (seg[7] >> 8) as u8,
        seg[7] as u8,
    );
    let compatible = seg[..6].iter().all(|s| *s == 0);
    let nat64 = seg[0] == 0x0064 && seg[1] == 0xff9b && seg[2..6].iter().all(|s| *s == 0);
    (compatible || nat64).then_some(tail)
}

fn blocked_hostname_reason(host: &str) -> Option<BlockReason> {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if LOOPBACK_HOSTS.contains(&host.as_str()) || host.ends_with(".localhost") {
        Some(BlockReason::Loopback)
    } else if METADATA_HOSTS.contains(&host.as_str()) {
        Some(BlockReason::MetadataEndpoint)
    } else if PRIVATE_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
        Some(BlockReason::PrivateIp)
    } else {
        None
    }
}

/// Every check that needs no network access.
///
/// Malformed input is reported as [`BlockReason::DisallowedScheme`]; this
/// function never panics on attacker-supplied strings.
pub fn check_lexical(raw: &str) -> Result<Url, BlockReason> {
    let url = Url::parse(raw.trim()).map_err(|_| BlockReason::DisallowedScheme)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BlockReason::DisallowedScheme);
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(BlockReason::DisallowedScheme);
    }
    let blocked = match url.host() {
        None => Some(BlockReason::DisallowedScheme),
        Some(Host::Ipv4(ip)) => blocked_ipv4_reason(ip),
        Some(Host::Ipv6(ip)) => blocked_ipv6_reason(ip),
        Some(Host::Domain(name)) => blocked_hostname_reason(name),
    };
    match blocked {
        Some(reason) => Err(reason),
        None => Ok(url),
    }
}

/// Decides whether a URL is safe to fetch from a server-side context.
#[derive(Clone)]
pub struct UrlSafetyValidator {
    resolver: Arc<dyn HostResolver>,
    resolve_dns: bool,
    dns_timeout: Duration,
}

impl fmt::Debug for UrlSafetyValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSafetyValidator")
            .field("resolve_dns", &self.resolve_dns)
            .field("dns_timeout", &self.dns_timeout)
            .finish()
    }
}

impl UrlSafetyValidator {
    /// Validator backed by the system resolver.
    pub fn new(config: &ScraperConfig) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    pub fn with_resolver(config: &ScraperConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            resolver,
            resolve_dns: config.resolve_dns,
            dns_timeout: config.dns_timeout(),
        }
    }

    pub fn resolver(&self) -> Arc<dyn HostResolver> {
        Arc::clone(&self.resolver)
    }

    /// Verdict form of [`check`](Self::check).
    pub async fn validate(&self, url: &str) -> UrlValidationVerdict {
        self.check(url).await.map(|_| ()).into()
    }

    /// Validate `raw` and hand back the parsed URL when it is allowed.
    #[instrument(level = "debug", skip(self))]
    pub async fn check(&self, raw: &str) -> Result<Url, BlockReason> {
        let url = check_lexical(raw).inspect_err(|reason| {
            warn!(url = %raw, reason = ?reason, "URL rejected before resolution");
        })?;

        if !self.resolve_dns {
            return Ok(url);
        }
        let domain = match url.host() {
            Some(Host::Domain(name)) => Some(name.to_owned()),
            _ => None,
        };
        // Literal addresses were fully classified above.
        let Some(host) = domain else {
            return Ok(url);
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let addrs = match tokio::time::timeout(self.dns_timeout, self.resolver.lookup(&host, port))
            .await
        {
            Ok(Ok(addrs)) if !addrs.is_empty() => addrs,
            Ok(Ok(_)) => {
                warn!(%host, "DNS returned no addresses");
                return Err(BlockReason::UnresolvableHost);
            }
            Ok(Err(e)) => {
                warn!(%host, error = %e, "DNS lookup failed");
                return Err(BlockReason::UnresolvableHost);
            }
            Err(_) => {
                warn!(%host, timeout = ?self.dns_timeout, "DNS lookup timed out");
                return Err(BlockReason::UnresolvableHost);
            }
        };

        if let Some((ip, reason)) = addrs
            .iter()
            .find_map(|ip| blocked_ip_reason(*ip).map(|reason| (ip, reason)))
        {
            warn!(%host, %ip, reason = ?reason, "Hostname resolves to a blocked address");
            return Err(reason);
        }
        debug!(%host, count = addrs.len(), "Hostname resolved to public addresses");
        Ok(url)
    }
}

/// Fixed host table for tests; unknown hosts resolve to `fallback` if set.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: std::collections::HashMap<String, Vec<IpAddr>>,
    fallback: Option<IpAddr>,
}

#[cfg(test)]
impl StaticResolver {
    /// Every host resolves to a public documentation-free address.
    pub fn public() -> Self {
        Self {
            hosts: Default::default(),
            fallback: Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))),
        }
    }

    pub fn with_host(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.hosts.insert(host.to_string(), addrs.to_vec());
        self
    }
}

#[cfg(test)]
impl HostResolver for StaticResolver {
    fn lookup<'a>(&'a self, host: &'a str, _port: u16) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        Box::pin(async move {
            if let Some(addrs) = self.hosts.get(host) {
                return Ok(addrs.clone());
            }
            self.fallback
                .map(|ip| vec![ip])
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
        })
    }
}
