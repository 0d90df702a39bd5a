//! Helpers shared by the HTML scrape providers.

use std::collections::HashSet;

use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::SearchError;
use crate::types::RankedItem;
use crate::url_normalize::normalize_url;

/// Compile a CSS selector, mapping failures to [`SearchError::Parse`].
pub(crate) fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("invalid selector {css}: {e:?}")))
}

/// Collected text of an element with whitespace collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse `raw` as an absolute http(s) URL.
pub(crate) fn http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Returns `true` when `host` is `domain` or a subdomain of it.
pub(crate) fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Accumulates ranked items from one result page.
///
/// Deduplicates by normalised URL, assigns contiguous ranks from 1, and
/// stops accepting items at the configured maximum.
pub(crate) struct RankCollector {
    seen: HashSet<String>,
    items: Vec<RankedItem>,
    max: usize,
}

impl RankCollector {
    pub(crate) fn new(max_results: u32) -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
            max: max_results as usize,
        }
    }

    /// Add one candidate. Duplicates are ignored.
    pub(crate) fn push(&mut self, title: String, url: String) {
        if self.is_full() || title.is_empty() {
            return;
        }
        if !self.seen.insert(normalize_url(&url)) {
            return;
        }
        let rank = self.items.len() as u32 + 1;
        self.items.push(RankedItem { rank, title, url });
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.max
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn into_items(self) -> Vec<RankedItem> {
        self.items
    }
}
