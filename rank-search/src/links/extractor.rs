//! HTTP-backed [`LinkSource`] that scans a ranked page for affiliate links.

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use super::{AffiliateTable, LinkSource};
use crate::config::LinkConfig;
use crate::engines::scrape::{element_text, http_url, selector};
use crate::error::SearchError;
use crate::http;
use crate::types::ExtractedLink;

/// Label stored when neither anchor text nor image alt text is available.
pub const UNKNOWN_PRODUCT: &str = "(unknown product)";

/// Labels are cut to this many characters.
const MAX_LABEL_CHARS: usize = 100;

/// Fetches pages over HTTP and classifies their links against an
/// [`AffiliateTable`].
pub struct AffiliateLinkExtractor {
    client: reqwest::Client,
    table: AffiliateTable,
    request_delay_ms: (u64, u64),
    user_agent: Option<String>,
}

impl AffiliateLinkExtractor {
    /// Build an extractor from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an invalid configuration and
    /// [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &LinkConfig) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self {
            client: http::build_client(config.timeout_seconds)?,
            table: AffiliateTable::new(config.networks.clone()),
            request_delay_ms: config.request_delay_ms,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn fetch(&self, page_url: &str) -> Result<String, String> {
        http::pace(self.request_delay_ms).await;

        let response = self
            .client
            .get(page_url)
            .header("User-Agent", http::user_agent(self.user_agent.as_deref()))
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| format!("page request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("page HTTP error: {e}"))?;

        response
            .text()
            .await
            .map_err(|e| format!("page read failed: {e}"))
    }
}

#[async_trait]
impl LinkSource for AffiliateLinkExtractor {
    async fn extract(&self, page_url: &str) -> Vec<ExtractedLink> {
        if http_url(page_url).is_none() {
            tracing::debug!(page_url, "skipping link extraction for non-http URL");
            return Vec::new();
        }

        match self.fetch(page_url).await {
            Ok(html) => {
                let links = parse_affiliate_links(&html, page_url, &self.table);
                tracing::debug!(page_url, count = links.len(), "affiliate links extracted");
                links
            }
            Err(reason) => {
                tracing::warn!(page_url, error = %reason, "link extraction failed");
                Vec::new()
            }
        }
    }
}

/// Label for one anchor: trimmed text, else the alt text of an image inside
/// it, else [`UNKNOWN_PRODUCT`]. Always at most 100 characters.
fn anchor_label(anchor: scraper::ElementRef<'_>, img_sel: &scraper::Selector) -> String {
    let text = element_text(anchor);
    let label = if !text.is_empty() {
        text
    } else {
        anchor
            .select(img_sel)
            .filter_map(|img| img.value().attr("alt"))
            .map(str::trim)
            .find(|alt| !alt.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| UNKNOWN_PRODUCT.to_owned())
    };
    label.chars().take(MAX_LABEL_CHARS).collect()
}

/// Scan `html` for anchors whose resolved URL matches the affiliate table.
///
/// Relative hrefs are resolved against `page_url`. Links are deduplicated
/// by exact URL and returned in document order.
pub fn parse_affiliate_links(html: &str, page_url: &str, table: &AffiliateTable) -> Vec<ExtractedLink> {
    let (Ok(anchor_sel), Ok(img_sel)) = (selector("a[href]"), selector("img[alt]")) else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let resolved = match &base {
            Some(base) => base.join(href),
            None => Url::parse(href),
        };
        let Ok(resolved) = resolved else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let link_url = resolved.to_string();
        let Some(asp_name) = table.classify(&link_url) else {
            continue;
        };
        if !seen.insert(link_url.clone()) {
            continue;
        }

        links.push(ExtractedLink {
            asp_name: asp_name.to_owned(),
            product_name: anchor_label(anchor, &img_sel),
            link_url,
        });
    }

    links
}
