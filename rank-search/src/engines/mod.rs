//! Search provider implementations.
//!
//! [`google_api`] talks to a structured JSON API; the remaining modules
//! scrape a search engine's HTML results page and share the helpers in
//! `scrape`. Every struct here implements [`crate::engine::SearchProvider`].

pub mod bing;
pub mod duckduckgo;
pub mod google_api;
pub mod google_html;
pub(crate) mod scrape;

pub use bing::BingHtmlProvider;
pub use duckduckgo::DuckDuckGoHtmlProvider;
pub use google_api::GoogleApiProvider;
pub use google_html::GoogleHtmlProvider;
