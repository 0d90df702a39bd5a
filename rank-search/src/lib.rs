//! # rank-search
//!
//! Search-side building blocks for rankwatch: ranked organic results for a
//! keyword, and the affiliate links on each ranked page.
//!
//! ## Design
//!
//! - A structured search API is the primary provider; Google and Bing HTML
//!   scrapes are fallbacks, tried strictly in order ([`SearchStrategy`])
//! - Providers report a tagged [`ProviderOutcome`] instead of errors, so the
//!   fallback chain is a plain match
//! - Ranks are always assigned by the client, contiguous from 1
//! - User-Agent rotation and per-request jitter for the scrape providers and
//!   page fetches
//! - Affiliate links are classified against a configurable, ordered
//!   [`AffiliateTable`](links::AffiliateTable)
//!
//! ## Security
//!
//! - Search queries are logged only at trace level
//! - API keys live in configuration and are never logged

pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod http;
pub mod links;
pub mod strategy;
pub mod types;
pub mod url_normalize;

pub use config::{AffiliateNetwork, LinkConfig, SearchConfig};
pub use engine::SearchProvider;
pub use error::{Result, SearchError};
pub use links::{AffiliateLinkExtractor, AffiliateTable, LinkSource};
pub use strategy::SearchStrategy;
pub use types::{ExtractedLink, Provider, ProviderOutcome, RankedItem, SearchOutcome, SearchPage};

/// Resolve one keyword with the configured provider chain.
///
/// Convenience wrapper that builds a [`SearchStrategy`] from `config` and
/// runs it once. Long-lived callers should build the strategy once and
/// reuse it.
///
/// # Errors
///
/// Returns [`SearchError::Config`] if `config` is invalid. Provider
/// failures are not errors; a keyword no provider can answer resolves to
/// [`SearchOutcome::not_found`].
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> rank_search::Result<()> {
/// let config = rank_search::SearchConfig::default();
/// let outcome = rank_search::resolve("blue widgets", 10, &config).await?;
/// for item in &outcome.items {
///     println!("{}. {} {}", item.rank, item.title, item.url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn resolve(keyword: &str, max_rank: u32, config: &SearchConfig) -> Result<SearchOutcome> {
    let strategy = SearchStrategy::from_config(config)?;
    Ok(strategy.resolve(keyword, max_rank).await)
}
