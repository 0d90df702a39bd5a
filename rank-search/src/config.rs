//! Search and link-extraction configuration with sensible defaults.
//!
//! [`SearchConfig`] controls which providers are queried and in what order,
//! timeouts, pacing, and endpoint locations. [`LinkConfig`] carries the
//! affiliate-network table and page-fetch behaviour for the link extractor.
//! Nothing here is process-global: every provider and extractor receives its
//! configuration at construction time.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::Provider;

/// Configuration for the search providers and the fallback strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Provider priority order. The strategy advances to the next provider
    /// only when the current one returns nothing or fails.
    pub providers: Vec<Provider>,
    /// Google Custom Search API key. Without it the API provider fails fast.
    pub google_api_key: Option<String>,
    /// Google Programmable Search Engine id (`cx`).
    pub google_cx: Option<String>,
    /// Region code sent to providers that support it (`gl`).
    pub region: String,
    /// Interface language sent to providers that support it (`hl`).
    pub language: String,
    /// Timeout for the structured API, in seconds.
    pub api_timeout_seconds: u64,
    /// Timeout for HTML search requests, in seconds.
    pub html_timeout_seconds: u64,
    /// Random pre-request delay range in milliseconds `(min, max)` for
    /// HTML scrape providers.
    pub request_delay_ms: (u64, u64),
    /// Custom User-Agent string. If `None`, rotates through a built-in list
    /// of realistic browser User-Agents.
    pub user_agent: Option<String>,
    /// Endpoint locations; overridable for tests and proxies.
    pub endpoints: Endpoints,
}

/// Base URLs of every provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Base URL of the Custom Search JSON API (path `/customsearch/v1` is appended).
    pub google_api: String,
    /// Google HTML search URL.
    pub google_html: String,
    /// Bing HTML search URL.
    pub bing: String,
    /// DuckDuckGo HTML-only search URL.
    pub duckduckgo: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            google_api: "https://www.googleapis.com".into(),
            google_html: "https://www.google.com/search".into(),
            bing: "https://www.bing.com/search".into(),
            duckduckgo: "https://html.duckduckgo.com/html/".into(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: vec![Provider::GoogleApi, Provider::GoogleHtml, Provider::Bing],
            google_api_key: None,
            google_cx: None,
            region: "jp".into(),
            language: "ja".into(),
            api_timeout_seconds: 30,
            html_timeout_seconds: 30,
            request_delay_ms: (1_000, 3_000),
            user_agent: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.providers.is_empty() {
            return Err(SearchError::Config(
                "at least one provider must be enabled".into(),
            ));
        }
        if self.api_timeout_seconds == 0 || self.html_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout seconds must be greater than 0".into(),
            ));
        }
        if self.request_delay_ms.0 > self.request_delay_ms.1 {
            return Err(SearchError::Config(
                "request_delay_ms min must be <= max".into(),
            ));
        }
        Ok(())
    }
}

/// One row of the affiliate-network table: a URL fragment and the network's
/// display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateNetwork {
    /// Substring matched against the link URL.
    pub fragment: String,
    /// Display name stored as `asp_name`.
    pub name: String,
}

impl AffiliateNetwork {
    fn new(fragment: &str, name: &str) -> Self {
        Self {
            fragment: fragment.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Configuration for the affiliate link extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Ordered affiliate table; the first matching entry labels the link.
    /// Extending support means appending entries.
    pub networks: Vec<AffiliateNetwork>,
    /// Page fetch timeout in seconds.
    pub timeout_seconds: u64,
    /// Random delay range in milliseconds `(min, max)` before each page fetch.
    pub request_delay_ms: (u64, u64),
    /// Custom User-Agent string; rotates when `None`.
    pub user_agent: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            networks: default_networks(),
            timeout_seconds: 15,
            request_delay_ms: (500, 1_500),
            user_agent: None,
        }
    }
}

impl LinkConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "link timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.request_delay_ms.0 > self.request_delay_ms.1 {
            return Err(SearchError::Config(
                "link request_delay_ms min must be <= max".into(),
            ));
        }
        if self.networks.iter().any(|n| n.fragment.is_empty()) {
            return Err(SearchError::Config(
                "affiliate network fragments must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Built-in affiliate networks, checked in this order.
pub fn default_networks() -> Vec<AffiliateNetwork> {
    vec![
        AffiliateNetwork::new("px.a8.net", "A8.net"),
        AffiliateNetwork::new("af.moshimo.com", "もしもアフィリエイト"),
        AffiliateNetwork::new("valuecommerce.com", "バリューコマース"),
        AffiliateNetwork::new("accesstrade.net", "アクセストレード"),
        AffiliateNetwork::new("afi-b.com", "afb"),
        AffiliateNetwork::new("felmat.net", "felmat"),
        AffiliateNetwork::new("j-a-net.jp", "JANet"),
        AffiliateNetwork::new("link-ag.net", "Link-A"),
        AffiliateNetwork::new("rentracks.jp", "レントラックス"),
        AffiliateNetwork::new("hb.afl.rakuten.co.jp", "楽天アフィリエイト"),
        AffiliateNetwork::new("amzn.to", "Amazonアソシエイト"),
        AffiliateNetwork::new("amazon.co.jp", "Amazonアソシエイト"),
    ]
}
