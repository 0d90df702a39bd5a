//! Affiliate link extraction from ranked pages.
//!
//! A [`LinkSource`] fetches one page and reports every outbound link that
//! belongs to a known affiliate network. Extraction is single hop: links
//! found on the page are classified, never followed.

mod extractor;
mod table;

use async_trait::async_trait;

use crate::types::ExtractedLink;

pub use extractor::{parse_affiliate_links, AffiliateLinkExtractor, UNKNOWN_PRODUCT};
pub use table::AffiliateTable;

/// Something that can list the affiliate links on a page.
///
/// Implementations never fail: an unreachable or unparseable page yields
/// an empty list.
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Fetch `page_url` and return its affiliate links, deduplicated by URL.
    async fn extract(&self, page_url: &str) -> Vec<ExtractedLink>;
}
