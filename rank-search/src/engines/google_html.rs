//! Google web results scraped from HTML, the first scrape fallback.
//!
//! Google's markup shifts often, so result containers are located through
//! a prioritised selector list. Organic links are frequently wrapped in
//! `/url?q=<destination>` redirects which are unwrapped here; ad clicks,
//! cache links and Google's own pages are discarded.

use async_trait::async_trait;
use scraper::Html;

use super::scrape::{element_text, host_matches, http_url, selector, RankCollector};
use crate::config::SearchConfig;
use crate::engine::SearchProvider;
use crate::error::SearchError;
use crate::http;
use crate::types::{Provider, ProviderOutcome, RankedItem};

/// Result container selectors, most specific first.
const CONTAINER_SELECTORS: &[&str] = &["div.g", "div.Gx5Zad"];

/// Hosts whose links are never organic results.
const REJECTED_HOSTS: &[&str] = &[
    "google.com",
    "google.co.jp",
    "googleusercontent.com",
    "googleadservices.com",
    "doubleclick.net",
];

/// Google HTML search scraper.
pub struct GoogleHtmlProvider {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    language: String,
    request_delay_ms: (u64, u64),
    user_agent: Option<String>,
}

impl GoogleHtmlProvider {
    /// Build the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(config.html_timeout_seconds)?,
            endpoint: config.endpoints.google_html.clone(),
            region: config.region.clone(),
            language: config.language.clone(),
            request_delay_ms: config.request_delay_ms,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn fetch(&self, query: &str, max_results: u32) -> Result<String, String> {
        http::pace(self.request_delay_ms).await;

        let num = requested_rows(max_results).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("num", num.as_str()),
                ("hl", self.language.as_str()),
                ("gl", self.region.as_str()),
            ])
            .header("User-Agent", http::user_agent(self.user_agent.as_deref()))
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", format!("{},en;q=0.8", self.language))
            .send()
            .await
            .map_err(|e| format!("Google request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("Google HTTP error: {e}"))?;

        response
            .text()
            .await
            .map_err(|e| format!("Google response read failed: {e}"))
    }
}

#[async_trait]
impl SearchProvider for GoogleHtmlProvider {
    async fn search(&self, query: &str, max_results: u32) -> ProviderOutcome {
        tracing::trace!(query, "Google HTML search");

        let html = match self.fetch(query, max_results).await {
            Ok(html) => html,
            Err(reason) => return ProviderOutcome::failure(reason),
        };
        tracing::trace!(bytes = html.len(), "Google response received");

        match parse_google_html(&html, max_results) {
            Ok(items) => ProviderOutcome::from_items(items, None),
            Err(e) => ProviderOutcome::failure(e.to_string()),
        }
    }

    fn kind(&self) -> Provider {
        Provider::GoogleHtml
    }
}

/// `num` parameter for a search `max_results` deep. Asks for a few extra
/// rows since dedup and rejected links thin the page; Google serves 100 at most.
fn requested_rows(max_results: u32) -> u32 {
    max_results.saturating_add(10).min(100)
}

/// Unwrap a Google result href to its destination URL.
///
/// Handles `/url?q=…` and `/url?url=…` wrappers, relative or absolute.
/// Returns `None` for anything that is not an organic destination.
pub(crate) fn resolve_google_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with('/') {
        format!("https://www.google.com{href}")
    } else {
        href.to_owned()
    };
    let parsed = http_url(&absolute)?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let destination = if is_google_host(&host) && parsed.path() == "/url" {
        let target = parsed
            .query_pairs()
            .find(|(key, _)| key == "q" || key == "url")
            .map(|(_, value)| value.into_owned())?;
        http_url(&target)?
    } else {
        parsed
    };

    let dest_host = destination.host_str()?.to_ascii_lowercase();
    if is_google_host(&dest_host)
        || REJECTED_HOSTS.iter().any(|d| host_matches(&dest_host, d))
        || destination.path().starts_with("/aclk")
    {
        return None;
    }
    Some(destination.to_string())
}

/// Any `google.<tld>` host, including subdomains.
fn is_google_host(host: &str) -> bool {
    host.split('.').any(|label| label == "google")
}

/// Parse a Google HTML response into ranked items.
///
/// Tries each container selector in order and keeps the first one that
/// yields results.
pub(crate) fn parse_google_html(
    html: &str,
    max_results: u32,
) -> Result<Vec<RankedItem>, SearchError> {
    let document = Html::parse_document(html);
    let title_sel = selector("h3")?;
    let link_sel = selector("a[href]")?;

    for &css in CONTAINER_SELECTORS {
        let container_sel = selector(css)?;
        let mut collector = RankCollector::new(max_results);

        for element in document.select(&container_sel) {
            let Some(title_el) = element.select(&title_sel).next() else {
                continue;
            };
            let title = element_text(title_el);

            // Prefer the anchor that wraps the heading.
            let href = element
                .select(&link_sel)
                .find(|a| a.select(&title_sel).next().is_some())
                .or_else(|| element.select(&link_sel).next())
                .and_then(|a| a.value().attr("href"));
            let Some(url) = href.and_then(resolve_google_href) else {
                continue;
            };

            collector.push(title, url);
            if collector.is_full() {
                break;
            }
        }

        if !collector.is_empty() {
            let items = collector.into_items();
            tracing::debug!(count = items.len(), selector = css, "Google results parsed");
            return Ok(items);
        }
    }

    tracing::debug!("Google page matched no result selector");
    Ok(Vec::new())
}
