//! DuckDuckGo HTML-only endpoint, an optional last-resort scrape provider.
//!
//! Not part of the default provider order; enable it by listing
//! `duck_duck_go` in `providers`. The endpoint needs no JavaScript and
//! wraps organic links as `//duckduckgo.com/l/?uddg=<destination>`.

use async_trait::async_trait;
use scraper::Html;

use super::scrape::{element_text, host_matches, http_url, selector, RankCollector};
use crate::config::SearchConfig;
use crate::engine::SearchProvider;
use crate::error::SearchError;
use crate::http;
use crate::types::{Provider, ProviderOutcome, RankedItem};

/// Result container selectors, most specific first. Ads carry `result--ad`.
const CONTAINER_SELECTORS: &[&str] = &[
    ".result.results_links.results_links_deep:not(.result--ad)",
    ".web-result:not(.result--ad)",
];

/// DuckDuckGo HTML search scraper.
pub struct DuckDuckGoHtmlProvider {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    language: String,
    request_delay_ms: (u64, u64),
    user_agent: Option<String>,
}

impl DuckDuckGoHtmlProvider {
    /// Build the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(config.html_timeout_seconds)?,
            endpoint: config.endpoints.duckduckgo.clone(),
            region: config.region.clone(),
            language: config.language.clone(),
            request_delay_ms: config.request_delay_ms,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn fetch(&self, query: &str) -> Result<String, String> {
        http::pace(self.request_delay_ms).await;

        // kl is "<region>-<language>", e.g. jp-jp or us-en.
        let locale = format!("{}-{}", self.region, self.language);
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query), ("kl", locale.as_str())])
            .header("User-Agent", http::user_agent(self.user_agent.as_deref()))
            .header("Accept-Language", format!("{},en;q=0.8", self.language))
            .send()
            .await
            .map_err(|e| format!("DuckDuckGo request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("DuckDuckGo HTTP error: {e}"))?;

        response
            .text()
            .await
            .map_err(|e| format!("DuckDuckGo response read failed: {e}"))
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoHtmlProvider {
    async fn search(&self, query: &str, max_results: u32) -> ProviderOutcome {
        tracing::trace!(query, "DuckDuckGo search");

        let html = match self.fetch(query).await {
            Ok(html) => html,
            Err(reason) => return ProviderOutcome::failure(reason),
        };
        tracing::trace!(bytes = html.len(), "DuckDuckGo response received");

        match parse_duckduckgo_html(&html, max_results) {
            Ok(items) => ProviderOutcome::from_items(items, None),
            Err(e) => ProviderOutcome::failure(e.to_string()),
        }
    }

    fn kind(&self) -> Provider {
        Provider::DuckDuckGo
    }
}

/// Unwrap a DuckDuckGo redirect to its destination URL.
///
/// Links that stay on duckduckgo.com (ad clicks via `/y.js`, internal
/// navigation) are rejected.
pub(crate) fn resolve_duckduckgo_href(href: &str) -> Option<String> {
    let full_href = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_owned()
    };
    let parsed = http_url(&full_href)?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let destination = if host_matches(&host, "duckduckgo.com") && parsed.path().starts_with("/l/") {
        let target = parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?;
        http_url(&target)?
    } else {
        parsed
    };

    let dest_host = destination.host_str()?.to_ascii_lowercase();
    if host_matches(&dest_host, "duckduckgo.com") {
        return None;
    }
    Some(destination.to_string())
}

/// Parse a DuckDuckGo HTML response into ranked items.
pub(crate) fn parse_duckduckgo_html(
    html: &str,
    max_results: u32,
) -> Result<Vec<RankedItem>, SearchError> {
    let document = Html::parse_document(html);
    let title_sel = selector(".result__a")?;

    for &css in CONTAINER_SELECTORS {
        let container_sel = selector(css)?;
        let mut collector = RankCollector::new(max_results);

        for element in document.select(&container_sel) {
            let Some(title_el) = element.select(&title_sel).next() else {
                continue;
            };
            let Some(url) = title_el
                .value()
                .attr("href")
                .and_then(resolve_duckduckgo_href)
            else {
                continue;
            };

            collector.push(element_text(title_el), url);
            if collector.is_full() {
                break;
            }
        }

        if !collector.is_empty() {
            let items = collector.into_items();
            tracing::debug!(count = items.len(), selector = css, "DuckDuckGo results parsed");
            return Ok(items);
        }
    }

    tracing::debug!("DuckDuckGo page matched no result selector");
    Ok(Vec::new())
}
