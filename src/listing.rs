//! Listing page retrieval and entry extraction.
//!
//! The listing is an HTML page where every server is a styled `<div>` holding
//! `<div class="list">` cells:
//!
//! | Cell | Content |
//! |------|---------|
//! | 0 | Country label |
//! | 1 | One or more `<a href>` download links |
//! | 2 | (unused) |
//! | 3 | Latency, e.g. `42 ms` |
//!
//! [`parse_entries`] turns that markup into [`RawEntry`] values without
//! interpreting them; ranking happens in [`crate::ranker`].
//!
//! # Example
//!
//! ```rust
//! use ovpn_scout::listing::parse_entries;
//!
//! let html = r#"
//!   <div style="margin: 4px">
//!     <div class="list">Japan</div>
//!     <div class="list"><a href="/ovpn/jp1.ovpn">udp</a></div>
//!     <div class="list">-</div>
//!     <div class="list">42 ms</div>
//!   </div>"#;
//! let entries = parse_entries(html);
//! assert_eq!(entries[0].country, "Japan");
//! assert_eq!(entries[0].links, vec!["/ovpn/jp1.ovpn"]);
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use url::Url;

use crate::config::{Config, LogLevel};
use crate::error::{Error, Result};
use crate::plog_fmt;
use crate::ranker::{resolve_link, RawEntry};

/// Delay between listing fetches while the site or connection is down.
pub const REFETCH_INTERVAL: Duration = Duration::from_secs(1);

/// Shown when the listing cannot be reached.
pub const UNREACHABLE_NOTICE: &str = "It appears either the site was terminated or you have \
     troubles with a steady internet connection... Waiting for a fix...";

fn entry_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<div\b[^>]*\bstyle\s*=\s*["'][^"']+["'][^>]*>"#).expect("regex")
    })
}

fn list_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bclass\s*=\s*["'](?:[^"']*\s)?list(?:\s[^"']*)?["']"#).expect("regex")
    })
}

fn list_cell() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<div\b[^>]*\bclass\s*=\s*["'](?:[^"']*\s)?list(?:\s[^"']*)?["'][^>]*>(.*?)</div>"#,
        )
        .expect("regex")
    })
}

fn anchor_href() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\b[^>]*\bhref\s*=\s*["']([^"']+)["']"#).expect("regex")
    })
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("regex"))
}

/// Visible text of an HTML fragment with whitespace collapsed.
pub fn cell_text(fragment: &str) -> String {
    let text = any_tag().replace_all(fragment, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts every server entry from the listing markup.
///
/// Entries need at least the country and link cells; a missing latency cell
/// yields an empty latency, which the ranker drops.
pub fn parse_entries(html: &str) -> Vec<RawEntry> {
    // Cells may be styled too; only styled non-cell divs open an entry.
    let starts: Vec<usize> = entry_start()
        .find_iter(html)
        .filter(|m| !list_class().is_match(m.as_str()))
        .map(|m| m.start())
        .collect();
    let mut entries = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let block = &html[start..end];

        let cells: Vec<&str> = list_cell()
            .captures_iter(block)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if cells.len() < 2 {
            continue;
        }

        let links = anchor_href()
            .captures_iter(cells[1])
            .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
            .filter(|href| !href.is_empty())
            .collect();

        entries.push(RawEntry {
            country: cell_text(cells[0]),
            latency: cells.get(3).map(|c| cell_text(c)).unwrap_or_default(),
            links,
        });
    }

    entries
}

/// First `.ovpn` link of each entry, resolved, paired with its country.
pub fn country_links(entries: &[RawEntry], listing: &Url) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| {
            let href = entry.links.first()?;
            if !href.to_lowercase().ends_with(".ovpn") {
                return None;
            }
            let url = resolve_link(href, listing)?;
            Some((entry.country.clone(), url.to_string()))
        })
        .collect()
}

fn browser_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| Error::Config(format!("invalid user_agent: {}", e)))?,
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9"),
    );
    headers.insert(REFERER, HeaderValue::from_static("https://google.com/"));
    Ok(headers)
}

/// HTTP client for the listing page and configuration downloads.
///
/// Requests carry browser-like headers; some listing hosts reject obvious
/// non-browser clients.
#[derive(Debug, Clone)]
pub struct ListingClient {
    client: reqwest::Client,
    url: Url,
}

impl ListingClient {
    /// Creates a client for the listing at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] for a malformed URL, [`Error::Config`] for a
    /// User-Agent that is not a valid header value, and [`Error::Http`] if the
    /// client cannot be built.
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers(user_agent)?)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: Url::parse(url)?,
        })
    }

    /// Creates a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.listing_url,
            &config.user_agent,
            config.request_timeout(),
        )
    }

    /// Wraps an already configured HTTP client.
    pub fn from_parts(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    /// The listing URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Downloads the listing page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure or a non-success status.
    pub async fn fetch_page(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Downloads and parses the listing once.
    pub async fn fetch_entries(&self) -> Result<Vec<RawEntry>> {
        let page = self.fetch_page().await?;
        let entries = parse_entries(&page);
        plog_fmt!(LogLevel::Debug, "{} entries on {}", entries.len(), self.url);
        Ok(entries)
    }

    /// Downloads and parses the listing, retrying every second until it works.
    pub async fn fetch_entries_retrying(&self) -> Vec<RawEntry> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.fetch_entries().await {
                Ok(entries) => {
                    if attempts > 1 {
                        plog_fmt!(
                            LogLevel::Notice,
                            "Listing reachable again after {} attempts",
                            attempts
                        );
                    }
                    return entries;
                }
                Err(e) => {
                    plog_fmt!(LogLevel::Debug, "listing fetch {} failed: {}", attempts, e);
                }
            }
            tokio::time::sleep(REFETCH_INTERVAL).await;
        }
    }

    /// Downloads one configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure or a non-success status.
    pub async fn fetch_config(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
