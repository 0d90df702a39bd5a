//! Bing web results scraped from HTML, the second scrape fallback.
//!
//! Bing often wraps organic links in a click-tracking redirect of the form
//! `https://www.bing.com/ck/a?...&u=a1<base64url destination>`. The
//! destination is decoded here so stored URLs point at the ranked page.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use scraper::Html;

use super::scrape::{element_text, host_matches, http_url, selector, RankCollector};
use crate::config::SearchConfig;
use crate::engine::SearchProvider;
use crate::error::SearchError;
use crate::http;
use crate::types::{Provider, ProviderOutcome, RankedItem};

/// Result container selectors, most specific first.
const CONTAINER_SELECTORS: &[&str] = &["li.b_algo", "#b_results > li"];

/// Hosts whose links are never organic results.
const REJECTED_HOSTS: &[&str] = &["bing.com", "bing.net", "bingj.com", "microsofttranslator.com"];

/// Bing HTML search scraper.
pub struct BingHtmlProvider {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    language: String,
    request_delay_ms: (u64, u64),
    user_agent: Option<String>,
}

impl BingHtmlProvider {
    /// Build the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(config.html_timeout_seconds)?,
            endpoint: config.endpoints.bing.clone(),
            region: config.region.clone(),
            language: config.language.clone(),
            request_delay_ms: config.request_delay_ms,
            user_agent: config.user_agent.clone(),
        })
    }

    async fn fetch(&self, query: &str, max_results: u32) -> Result<String, String> {
        http::pace(self.request_delay_ms).await;

        let count = max_results.clamp(10, 50).to_string();
        let market = format!("{}-{}", self.language, self.region.to_ascii_uppercase());
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("setlang", self.language.as_str()),
                ("cc", self.region.as_str()),
                ("mkt", market.as_str()),
            ])
            .header("User-Agent", http::user_agent(self.user_agent.as_deref()))
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", format!("{},en;q=0.8", self.language))
            .send()
            .await
            .map_err(|e| format!("Bing request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("Bing HTTP error: {e}"))?;

        response
            .text()
            .await
            .map_err(|e| format!("Bing response read failed: {e}"))
    }
}

#[async_trait]
impl SearchProvider for BingHtmlProvider {
    async fn search(&self, query: &str, max_results: u32) -> ProviderOutcome {
        tracing::trace!(query, "Bing search");

        let html = match self.fetch(query, max_results).await {
            Ok(html) => html,
            Err(reason) => return ProviderOutcome::failure(reason),
        };
        tracing::trace!(bytes = html.len(), "Bing response received");

        match parse_bing_html(&html, max_results) {
            Ok(items) => ProviderOutcome::from_items(items, None),
            Err(e) => ProviderOutcome::failure(e.to_string()),
        }
    }

    fn kind(&self) -> Provider {
        Provider::Bing
    }
}

/// Decode the `u=a1<base64url>` parameter of a Bing click-tracking link.
fn decode_bing_redirect(encoded: &str) -> Option<String> {
    let payload = encoded.strip_prefix("a1")?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

/// Unwrap a Bing result href to its destination URL.
///
/// Returns `None` for Bing's own pages and anything that is not http(s).
pub(crate) fn resolve_bing_href(href: &str) -> Option<String> {
    let parsed = http_url(href)?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let destination = if host_matches(&host, "bing.com") && parsed.path().starts_with("/ck/a") {
        let encoded = parsed
            .query_pairs()
            .find(|(key, _)| key == "u")
            .map(|(_, value)| value.into_owned())?;
        http_url(&decode_bing_redirect(&encoded)?)?
    } else {
        parsed
    };

    let dest_host = destination.host_str()?.to_ascii_lowercase();
    if REJECTED_HOSTS.iter().any(|d| host_matches(&dest_host, d)) {
        return None;
    }
    Some(destination.to_string())
}

/// Parse a Bing HTML response into ranked items.
pub(crate) fn parse_bing_html(html: &str, max_results: u32) -> Result<Vec<RankedItem>, SearchError> {
    let document = Html::parse_document(html);
    let title_sel = selector("h2")?;
    let link_sel = selector("a[href]")?;

    for &css in CONTAINER_SELECTORS {
        let container_sel = selector(css)?;
        let mut collector = RankCollector::new(max_results);

        for element in document.select(&container_sel) {
            let Some(title_el) = element.select(&title_sel).next() else {
                continue;
            };
            let Some(anchor) = title_el.select(&link_sel).next() else {
                continue;
            };
            let Some(url) = anchor.value().attr("href").and_then(resolve_bing_href) else {
                continue;
            };

            collector.push(element_text(title_el), url);
            if collector.is_full() {
                break;
            }
        }

        if !collector.is_empty() {
            let items = collector.into_items();
            tracing::debug!(count = items.len(), selector = css, "Bing results parsed");
            return Ok(items);
        }
    }

    tracing::debug!("Bing page matched no result selector");
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(url: &str) -> String {
        format!("a1{}", URL_SAFE_NO_PAD.encode(url))
    }

    fn mock_html() -> String {
        format!(
            r#"<!DOCTYPE html>
<html><body>
<ol id="b_results">
<li class="b_algo">
  <h2><a href="https://www.rust-lang.org/" h="ID=SERP">Rust Programming Language</a></h2>
  <div class="b_caption"><p>Reliable and efficient software.</p></div>
</li>
<li class="b_algo">
  <h2><a href="https://www.bing.com/ck/a?!&amp;&amp;p=abc&amp;u={}&amp;ntb=1">Widgets review</a></h2>
</li>
<li class="b_algo">
  <h2><a href="https://www.bing.com/images/search?q=widgets">Images</a></h2>
</li>
<li class="b_algo">
  <h2><a href="https://doc.rust-lang.org/book/">The Book</a></h2>
</li>
</ol>
</body></html>"#,
            encode("https://review.example.jp/widgets?id=7")
        )
    }

    #[test]
    fn parse_mock_html_returns_results() {
        let items = parse_bing_html(&mock_html(), 10).expect("parse");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Rust Programming Language");
        assert_eq!(items[0].url, "https://www.rust-lang.org/");
        assert_eq!(items[1].url, "https://review.example.jp/widgets?id=7");
        assert_eq!(items[1].rank, 2);
        assert_eq!(items[2].url, "https://doc.rust-lang.org/book/");
        assert_eq!(items[2].rank, 3);
    }

    #[test]
    fn parse_respects_max_results() {
        let items = parse_bing_html(&mock_html(), 2).expect("parse");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn parse_falls_back_to_generic_list_items() {
        let html = r#"<ol id="b_results">
<li class="b_ans"><h2><a href="https://answers.example/">Answer card</a></h2></li>
</ol>"#;
        let items = parse_bing_html(html, 10).expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://answers.example/");
    }

    #[test]
    fn parse_empty_html_returns_empty() {
        let items = parse_bing_html("<html><body></body></html>", 10).expect("parse");
        assert!(items.is_empty());
    }

    #[test]
    fn decode_rejects_unknown_prefix() {
        assert_eq!(decode_bing_redirect("zzaHR0cHM6Ly9lLmNvbS8"), None);
        assert_eq!(
            decode_bing_redirect(&encode("https://e.com/")),
            Some("https://e.com/".to_owned())
        );
    }

    #[test]
    fn resolve_rejects_bing_hosts() {
        assert_eq!(resolve_bing_href("https://www.bing.com/search?q=x"), None);
        assert_eq!(resolve_bing_href("https://th.bing.com/th?id=1"), None);
        assert_eq!(resolve_bing_href("javascript:void(0)"), None);
    }

    #[test]
    fn kind_is_bing() {
        let provider = BingHtmlProvider::new(&SearchConfig::default()).expect("build");
        assert_eq!(provider.kind(), Provider::Bing);
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BingHtmlProvider>();
    }
}
