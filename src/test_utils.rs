//! Shared test utilities used across multiple test modules.
//!
//! Consolidates the store fixture and the fake provider and link source
//! used by `pipeline::orchestrator::tests` and `tasks::runner::tests`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rank_search::{ExtractedLink, LinkSource, Provider, ProviderOutcome, RankedItem, SearchProvider};

use crate::store::RankStore;

/// Open a fresh file-backed store in a temp directory. Keep the `TempDir`
/// alive for as long as the store is used.
pub fn test_store() -> (tempfile::TempDir, Arc<RankStore>) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let store = RankStore::open(&dir.path().join("rankwatch.db")).expect("open RankStore");
    (dir, Arc::new(store))
}

pub fn item(rank: u32, url: &str) -> RankedItem {
    RankedItem {
        rank,
        title: format!("Result {rank}"),
        url: url.to_owned(),
    }
}

/// Provider that always answers with the same outcome and records the
/// depth it was asked for.
pub struct FixedProvider {
    kind: Provider,
    outcome: ProviderOutcome,
    calls: AtomicU32,
    last_max: Mutex<Option<u32>>,
}

impl FixedProvider {
    pub fn new(kind: Provider, outcome: ProviderOutcome) -> Self {
        Self {
            kind,
            outcome,
            calls: AtomicU32::new(0),
            last_max: Mutex::new(None),
        }
    }

    pub fn found(kind: Provider, items: Vec<RankedItem>, hit_count: Option<u64>) -> Self {
        Self::new(kind, ProviderOutcome::from_items(items, hit_count))
    }

    pub fn empty(kind: Provider) -> Self {
        Self::new(kind, ProviderOutcome::Empty)
    }

    pub fn failing(kind: Provider) -> Self {
        Self::new(kind, ProviderOutcome::failure("HTTP 503"))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_max_results(&self) -> Option<u32> {
        *self.last_max.lock().expect("lock")
    }
}

#[async_trait]
impl SearchProvider for FixedProvider {
    async fn search(&self, _query: &str, max_results: u32) -> ProviderOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_max.lock().expect("lock") = Some(max_results);
        match &self.outcome {
            ProviderOutcome::Found(page) => {
                let mut page = page.clone();
                page.items.truncate(max_results as usize);
                ProviderOutcome::Found(page)
            }
            other => other.clone(),
        }
    }

    fn kind(&self) -> Provider {
        self.kind
    }
}

/// Link source serving canned links per page URL.
#[derive(Default)]
pub struct FakeLinks {
    pages: HashMap<String, Vec<ExtractedLink>>,
    panic_on: Option<String>,
    panics_left: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeLinks {
    /// One A8.net link on `page_url`, nothing elsewhere.
    pub fn with_a8_on(page_url: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(
            page_url.to_owned(),
            vec![ExtractedLink {
                asp_name: "A8.net".into(),
                link_url: "https://px.a8.net/svt/ejp?a8mat=1".into(),
                product_name: "Widget Pro".into(),
            }],
        );
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Panics whenever asked for `page_url`.
    pub fn panicking_on(page_url: &str) -> Self {
        Self::panicking_times(page_url, usize::MAX)
    }

    /// Panics on the first `times` requests for `page_url`, then serves it
    /// like any other page.
    pub fn panicking_times(page_url: &str, times: usize) -> Self {
        Self {
            panic_on: Some(page_url.to_owned()),
            panics_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkSource for FakeLinks {
    async fn extract(&self, page_url: &str) -> Vec<ExtractedLink> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let should_panic = self.panic_on.as_deref() == Some(page_url)
            && self
                .panics_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if should_panic {
            panic!("link source blew up on {page_url}");
        }
        self.pages.get(page_url).cloned().unwrap_or_default()
    }
}
