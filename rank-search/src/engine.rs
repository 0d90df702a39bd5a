//! Trait definition for pluggable search providers.
//!
//! Each provider (structured API or HTML scrape) implements
//! [`SearchProvider`] so the strategy can hold an ordered list of
//! `Arc<dyn SearchProvider>` and walk it as a fallback chain.

use async_trait::async_trait;

use crate::types::{Provider, ProviderOutcome};

/// A pluggable search provider.
///
/// Implementors handle their own URL construction, request headers,
/// pacing and response parsing. They must never panic or return an
/// error for provider-side problems: transport errors, non-2xx statuses,
/// timeouts and markup mismatches are reported as
/// [`ProviderOutcome::Failure`], and a result page with nothing usable as
/// [`ProviderOutcome::Empty`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Query the provider for up to `max_results` ranked items.
    ///
    /// Returned ranks are contiguous from 1.
    async fn search(&self, query: &str, max_results: u32) -> ProviderOutcome;

    /// Returns which [`Provider`] this implementation represents.
    fn kind(&self) -> Provider;
}
