//! Feed fetching over HTTP.
//!
//! `HttpFeedSource` downloads and parses RSS/Atom documents with SSRF
//! protection and size limits. Everything that goes wrong is reported as
//! `FetchOutcome::Failed`; callers treat that as "no news".

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use tracing::debug;

use crate::config::FetcherConfig;
use crate::feed::types::{FetchOutcome, PolledEntry};
use crate::{RelayError, Result};

/// User agent string for feed fetching.
const USER_AGENT: &str = concat!("newsrelay/", env!("CARGO_PKG_VERSION"));

/// Title used for entries that don't carry one.
const UNTITLED: &str = "(untitled)";

/// Capability to fetch a source's entries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the source, returning its entries in native order.
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Feed source backed by reqwest and feed-rs.
pub struct HttpFeedSource {
    client: Client,
    max_feed_size: u64,
    allow_private_hosts: bool,
}

impl HttpFeedSource {
    /// Create a fetcher from configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RelayError::Feed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Download and parse a feed.
    pub async fn fetch_entries(&self, url: &str) -> Result<Vec<PolledEntry>> {
        if !self.allow_private_hosts {
            validate_url(url)?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Feed(format!("failed to fetch feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RelayError::Feed(format!("HTTP error: {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(self.too_large(content_length));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::Feed(format!("failed to read response: {}", e)))?;

        if bytes.len() as u64 > self.max_feed_size {
            return Err(self.too_large(bytes.len() as u64));
        }

        parse_feed(&bytes)
    }

    fn too_large(&self, size: u64) -> RelayError {
        RelayError::Feed(format!(
            "feed too large: {} bytes (max {} bytes)",
            size, self.max_feed_size
        ))
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        match self.fetch_entries(url).await {
            Ok(entries) => {
                debug!("Fetched {} entries from {}", entries.len(), url);
                FetchOutcome::Parsed(entries)
            }
            Err(e) => FetchOutcome::Failed(e.to_string()),
        }
    }
}

/// Validate a URL for SSRF protection.
///
/// Only http/https URLs whose host is neither a private/loopback address
/// nor a local-only hostname are accepted.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| RelayError::Feed(format!("invalid URL: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(RelayError::Feed(format!(
                "unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| RelayError::Feed("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(RelayError::Feed(format!("forbidden host: {}", domain)));
            }
            return Ok(());
        }
        url::Host::Ipv4(v4) => IpAddr::V4(v4),
        url::Host::Ipv6(v6) => IpAddr::V6(v6),
    };

    if is_private_ip(&ip) {
        return Err(RelayError::Feed(format!(
            "private IP address not allowed: {}",
            ip
        )));
    }
    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    const LOCAL_SUFFIXES: [&str; 7] = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    let host = host.to_lowercase();
    host == "localhost" || LOCAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
                // Carrier-grade NAT: 100.64.0.0/10
                || (a == 100 && (64..=127).contains(&b))
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local fc00::/7, link-local fe80::/10
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}

/// Parse feed bytes into entries, keeping the document order.
///
/// Entries without a native id are left without one, so that
/// `PolledEntry::entry_id` keys them by link. The parser's own generated
/// ids hash the title too, and change when a publisher edits it.
pub(crate) fn parse_feed(bytes: &[u8]) -> Result<Vec<PolledEntry>> {
    let feed = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| RelayError::Feed(format!("failed to parse feed: {}", e)))?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry
                .title
                .map(|t| strip_html(&t.content))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string());

            PolledEntry {
                id: Some(entry.id).filter(|id| !id.trim().is_empty()),
                title,
                link: entry.links.first().map(|l| l.href.clone()),
            }
        })
        .collect();

    Ok(entries)
}

/// Strip HTML tags and decode entities, collapsing whitespace.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if let Some(name) = entity.as_mut() {
            match ch {
                ';' => {
                    push_entity(&mut text, name);
                    entity = None;
                }
                c if c.is_ascii_alphanumeric() || c == '#' => name.push(c),
                c => {
                    // Not an entity after all; keep the raw text
                    text.push('&');
                    text.push_str(name);
                    entity = None;
                    if c == '<' {
                        in_tag = true;
                    } else {
                        text.push(c);
                    }
                }
            }
            continue;
        }

        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '&' if !in_tag => entity = Some(String::new()),
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    if let Some(name) = entity {
        text.push('&');
        text.push_str(&name);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_entity(text: &mut String, name: &str) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => name
            .strip_prefix("#x")
            .or_else(|| name.strip_prefix("#X"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
            .and_then(char::from_u32),
    };

    match decoded {
        Some(c) => text.push(c),
        None => {
            text.push('&');
            text.push_str(name);
            text.push(';');
        }
    }
}
