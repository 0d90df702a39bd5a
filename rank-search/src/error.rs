//! Error types for the rank-search crate.
//!
//! These errors only surface while building providers and extractors
//! (bad configuration, HTTP client construction). Once a provider is
//! running, every failure is reported as a
//! [`ProviderOutcome::Failure`](crate::types::ProviderOutcome) value instead.

/// Errors that can occur while configuring search providers.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// An HTTP client could not be constructed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A CSS selector or response body could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience type alias for rank-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
