//! Core types for ranked search results and provider identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single organic result at a 1-based rank position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    /// 1-based position assigned by the provider client, never the
    /// provider's own pagination offset.
    pub rank: u32,
    /// Title of the ranked page.
    pub title: String,
    /// Destination URL with any search-engine redirect wrapper removed.
    pub url: String,
}

/// One provider's answer to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Ranked items in order, ranks contiguous from 1.
    pub items: Vec<RankedItem>,
    /// Total hit estimate reported by the provider, if it reports one.
    pub hit_count: Option<u64>,
}

/// Tagged result of a single provider query.
///
/// Providers never return `Err`: transport errors, non-2xx statuses and
/// markup mismatches all become [`ProviderOutcome::Failure`], so the
/// fallback chain is a plain match on this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// At least one ranked item was found.
    Found(SearchPage),
    /// The provider answered but had nothing usable.
    Empty,
    /// The provider could not be queried.
    Failure {
        /// Human-readable cause, for logs only.
        reason: String,
    },
}

impl ProviderOutcome {
    /// Build an outcome from parsed items, collapsing an empty list to `Empty`.
    pub fn from_items(items: Vec<RankedItem>, hit_count: Option<u64>) -> Self {
        if items.is_empty() {
            Self::Empty
        } else {
            Self::Found(SearchPage { items, hit_count })
        }
    }

    /// Shorthand for a failure with the given reason.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }
}

/// The final answer of the search strategy for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Ranked items from the first provider that found anything.
    pub items: Vec<RankedItem>,
    /// Hit estimate, only ever set by the primary API provider.
    pub hit_count: Option<u64>,
    /// Which provider produced `items`; `None` when nothing was found.
    pub provider: Option<Provider>,
}

impl SearchOutcome {
    /// The canonical "no results" outcome.
    pub fn not_found() -> Self {
        Self {
            items: Vec::new(),
            hit_count: None,
            provider: None,
        }
    }

    /// Returns `true` when no provider found any result.
    pub fn is_not_found(&self) -> bool {
        self.items.is_empty()
    }
}

/// Supported search providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Custom Search JSON API: structured, paginated, reports hit counts.
    GoogleApi,
    /// Google web results scraped from HTML.
    GoogleHtml,
    /// Bing web results scraped from HTML.
    Bing,
    /// DuckDuckGo HTML-only endpoint.
    DuckDuckGo,
}

impl Provider {
    /// Returns the human-readable name of this provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GoogleApi => "Google API",
            Self::GoogleHtml => "Google",
            Self::Bing => "Bing",
            Self::DuckDuckGo => "DuckDuckGo",
        }
    }

    /// Whether this provider's hit counts may update keyword search volume.
    pub fn reports_hit_count(&self) -> bool {
        matches!(self, Self::GoogleApi)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An affiliate link found on a ranked page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// Display name of the affiliate network that matched.
    pub asp_name: String,
    /// Absolute link URL as found on the page.
    pub link_url: String,
    /// Label derived from anchor text or image alt text.
    pub product_name: String,
}
