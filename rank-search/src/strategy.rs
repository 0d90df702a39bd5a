//! Ordered provider fallback for one keyword.
//!
//! [`SearchStrategy`] walks its providers strictly in order, one at a
//! time. The first provider that finds anything wins; `Empty` and
//! `Failure` both advance to the next provider. When the whole chain is
//! exhausted the keyword is reported as not found, which is an ordinary
//! outcome rather than an error.

use std::sync::Arc;

use crate::config::SearchConfig;
use crate::engine::SearchProvider;
use crate::engines::{BingHtmlProvider, DuckDuckGoHtmlProvider, GoogleApiProvider, GoogleHtmlProvider};
use crate::error::SearchError;
use crate::types::{Provider, ProviderOutcome, SearchOutcome};

/// Fixed-order fallback chain over search providers.
#[derive(Clone)]
pub struct SearchStrategy {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl SearchStrategy {
    /// Build a strategy over an explicit provider list, tried in order.
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    /// Build the configured provider chain.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for an invalid configuration and
    /// [`SearchError::Http`] if an HTTP client cannot be built.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::with_capacity(config.providers.len());
        for kind in &config.providers {
            let provider: Arc<dyn SearchProvider> = match kind {
                Provider::GoogleApi => Arc::new(GoogleApiProvider::new(config)?),
                Provider::GoogleHtml => Arc::new(GoogleHtmlProvider::new(config)?),
                Provider::Bing => Arc::new(BingHtmlProvider::new(config)?),
                Provider::DuckDuckGo => Arc::new(DuckDuckGoHtmlProvider::new(config)?),
            };
            providers.push(provider);
        }
        Ok(Self::new(providers))
    }

    /// Provider kinds in the order they are tried.
    pub fn order(&self) -> Vec<Provider> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Resolve `keyword` to at most `max_rank` ranked items.
    ///
    /// Never fails: a chain where every provider is empty or failing
    /// yields [`SearchOutcome::not_found`].
    pub async fn resolve(&self, keyword: &str, max_rank: u32) -> SearchOutcome {
        if max_rank == 0 {
            return SearchOutcome::not_found();
        }

        for provider in &self.providers {
            let kind = provider.kind();
            match provider.search(keyword, max_rank).await {
                ProviderOutcome::Found(page) => {
                    let mut items = page.items;
                    items.retain(|item| item.rank >= 1 && item.rank <= max_rank);
                    if items.is_empty() {
                        tracing::debug!(provider = %kind, "provider ranks all outside bound, trying next");
                        continue;
                    }
                    tracing::debug!(provider = %kind, count = items.len(), "provider found results");
                    let hit_count = if kind.reports_hit_count() {
                        page.hit_count
                    } else {
                        None
                    };
                    return SearchOutcome {
                        items,
                        hit_count,
                        provider: Some(kind),
                    };
                }
                ProviderOutcome::Empty => {
                    tracing::debug!(provider = %kind, "provider returned no results, trying next");
                }
                ProviderOutcome::Failure { reason } => {
                    tracing::warn!(provider = %kind, error = %reason, "provider failed, trying next");
                }
            }
        }

        tracing::info!(providers = self.providers.len(), "no provider found results");
        SearchOutcome::not_found()
    }
}

impl std::fmt::Debug for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchStrategy")
            .field("providers", &self.order())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RankedItem, SearchPage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted provider that counts how often it is called.
    struct Scripted {
        kind: Provider,
        outcome: ProviderOutcome,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(kind: Provider, outcome: ProviderOutcome) -> Arc<Self> {
            Arc::new(Self {
                kind,
                outcome,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for Scripted {
        async fn search(&self, _query: &str, _max_results: u32) -> ProviderOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }

        fn kind(&self) -> Provider {
            self.kind
        }
    }

    fn chain(providers: Vec<Arc<Scripted>>) -> SearchStrategy {
        SearchStrategy::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn SearchProvider>)
                .collect(),
        )
    }

    fn items(n: u32) -> Vec<RankedItem> {
        (1..=n)
            .map(|rank| RankedItem {
                rank,
                title: format!("Result {rank}"),
                url: format!("https://site{rank}.example/"),
            })
            .collect()
    }

    fn found(n: u32, hit_count: Option<u64>) -> ProviderOutcome {
        ProviderOutcome::Found(SearchPage {
            items: items(n),
            hit_count,
        })
    }

    #[tokio::test]
    async fn first_found_provider_wins() {
        let api = Scripted::new(Provider::GoogleApi, found(3, Some(500)));
        let html = Scripted::new(Provider::GoogleHtml, found(5, None));
        let strategy = chain(vec![api.clone(), html.clone()]);

        let outcome = strategy.resolve("widgets", 10).await;
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.hit_count, Some(500));
        assert_eq!(outcome.provider, Some(Provider::GoogleApi));
        assert_eq!(api.calls(), 1);
        assert_eq!(html.calls(), 0);
    }

    #[tokio::test]
    async fn failure_then_empty_then_found_uses_last_provider() {
        let api = Scripted::new(Provider::GoogleApi, ProviderOutcome::failure("quota exceeded"));
        let html = Scripted::new(Provider::GoogleHtml, ProviderOutcome::Empty);
        let bing = Scripted::new(Provider::Bing, found(4, Some(99)));
        let strategy = chain(vec![api.clone(), html.clone(), bing.clone()]);

        let outcome = strategy.resolve("blue widgets", 10).await;
        assert_eq!(outcome.provider, Some(Provider::Bing));
        let ranks: Vec<u32> = outcome.items.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        // Scraped hit counts never update search volume.
        assert_eq!(outcome.hit_count, None);
        assert_eq!((api.calls(), html.calls(), bing.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn exhausted_chain_is_not_found() {
        let strategy = chain(vec![
            Scripted::new(Provider::GoogleApi, ProviderOutcome::Empty),
            Scripted::new(Provider::GoogleHtml, ProviderOutcome::failure("captcha")),
            Scripted::new(Provider::Bing, ProviderOutcome::Empty),
        ]);
        let outcome = strategy.resolve("nothing", 10).await;
        assert!(outcome.is_not_found());
        assert_eq!(outcome, SearchOutcome::not_found());
    }

    #[tokio::test]
    async fn results_truncated_to_max_rank() {
        let strategy = chain(vec![Scripted::new(Provider::GoogleHtml, found(8, None))]);
        let outcome = strategy.resolve("widgets", 5).await;
        assert_eq!(outcome.items.len(), 5);
        assert!(outcome.items.iter().all(|i| i.rank <= 5));
    }

    #[tokio::test]
    async fn zero_max_rank_queries_nothing() {
        let api = Scripted::new(Provider::GoogleApi, found(3, None));
        let strategy = chain(vec![api.clone()]);
        assert!(strategy.resolve("widgets", 0).await.is_not_found());
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn empty_chain_is_not_found() {
        let strategy = SearchStrategy::new(Vec::new());
        assert!(strategy.resolve("widgets", 10).await.is_not_found());
    }

    #[test]
    fn from_config_preserves_order() {
        let config = SearchConfig {
            providers: vec![Provider::Bing, Provider::GoogleApi],
            ..SearchConfig::default()
        };
        let strategy = SearchStrategy::from_config(&config).expect("build");
        assert_eq!(strategy.order(), vec![Provider::Bing, Provider::GoogleApi]);
    }

    #[test]
    fn from_config_rejects_empty_chain() {
        let config = SearchConfig {
            providers: Vec::new(),
            ..SearchConfig::default()
        };
        assert!(SearchStrategy::from_config(&config).is_err());
    }

    #[test]
    fn strategy_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchStrategy>();
    }
}
