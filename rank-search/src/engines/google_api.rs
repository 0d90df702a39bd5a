//! Google Custom Search JSON API, the primary structured provider.
//!
//! Results arrive in pages of ten addressed by a 1-based `start` offset.
//! The offset is a request parameter, not a rank: ranks are assigned by
//! a running counter across pages so they stay contiguous even when the
//! API skips or repeats slots.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchConfig;
use crate::engine::SearchProvider;
use crate::error::SearchError;
use crate::http;
use crate::types::{Provider, ProviderOutcome, RankedItem};

/// Items requested per API call.
pub const PAGE_SIZE: u32 = 10;

/// The API refuses `start` values past this (100 results in total).
const MAX_START: u32 = 91;

/// Custom Search JSON API client.
pub struct GoogleApiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    cx: Option<String>,
    region: String,
    language: String,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
    #[serde(rename = "searchInformation")]
    search_information: Option<SearchInformation>,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
struct SearchInformation {
    /// Decimal string, e.g. `"1230000"`.
    #[serde(rename = "totalResults")]
    total_results: Option<String>,
}

impl ApiResponse {
    fn hit_count(&self) -> Option<u64> {
        self.search_information
            .as_ref()
            .and_then(|info| info.total_results.as_deref())
            .and_then(|raw| raw.trim().parse().ok())
    }
}

impl GoogleApiProvider {
    /// Build the provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: http::build_client(config.api_timeout_seconds)?,
            endpoint: format!(
                "{}/customsearch/v1",
                config.endpoints.google_api.trim_end_matches('/')
            ),
            api_key: config.google_api_key.clone(),
            cx: config.google_cx.clone(),
            region: config.region.clone(),
            language: config.language.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    async fn fetch_page(
        &self,
        key: &str,
        cx: &str,
        query: &str,
        start: u32,
    ) -> Result<ApiResponse, String> {
        let num = PAGE_SIZE.to_string();
        let start_param = start.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", key),
                ("cx", cx),
                ("q", query),
                ("num", num.as_str()),
                ("start", start_param.as_str()),
                ("gl", self.region.as_str()),
                ("hl", self.language.as_str()),
            ])
            .header("User-Agent", http::user_agent(self.user_agent.as_deref()))
            .send()
            .await
            .map_err(|e| format!("Google API request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Google API HTTP status {status}"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Google API response read failed: {e}"))?;
        parse_api_page(&body).map_err(|e| e.to_string())
    }
}

/// Parse one API response body.
fn parse_api_page(body: &str) -> Result<ApiResponse, SearchError> {
    serde_json::from_str(body)
        .map_err(|e| SearchError::Parse(format!("Google API response: {e}")))
}

#[async_trait]
impl SearchProvider for GoogleApiProvider {
    async fn search(&self, query: &str, max_results: u32) -> ProviderOutcome {
        let (Some(key), Some(cx)) = (self.api_key.as_deref(), self.cx.as_deref()) else {
            return ProviderOutcome::failure("Google API key or engine id not configured");
        };
        tracing::trace!(query, max_results, "Google API search");

        let mut items: Vec<RankedItem> = Vec::new();
        let mut hit_count = None;
        let mut counter: u32 = 0;
        let mut start: u32 = 1;

        'pages: loop {
            let page = match self.fetch_page(key, cx, query, start).await {
                Ok(page) => page,
                Err(reason) if items.is_empty() => return ProviderOutcome::failure(reason),
                Err(reason) => {
                    tracing::warn!(start, error = %reason, "Google API page failed, keeping earlier pages");
                    break;
                }
            };

            if start == 1 {
                hit_count = page.hit_count();
            }

            let received = page.items.len();
            for item in page.items {
                if item.link.is_empty() {
                    continue;
                }
                counter += 1;
                if counter > max_results {
                    break 'pages;
                }
                items.push(RankedItem {
                    rank: counter,
                    title: item.title.trim().to_owned(),
                    url: item.link,
                });
            }

            if counter >= max_results || received < PAGE_SIZE as usize {
                break;
            }
            start += PAGE_SIZE;
            if start > MAX_START {
                break;
            }
        }

        tracing::debug!(count = items.len(), ?hit_count, "Google API results collected");
        ProviderOutcome::from_items(items, hit_count)
    }

    fn kind(&self) -> Provider {
        Provider::GoogleApi
    }
}
