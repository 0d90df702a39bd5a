//! Run orchestration: the run state machine and per-keyword result recording.

use std::sync::Arc;

use rank_search::url_normalize::{display_host, domain_key};
use rank_search::{AffiliateLinkExtractor, LinkSource, SearchOutcome, SearchStrategy};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{RankError, Result};
use crate::store::{
    CompletionCheck, Keyword, NewResult, RankStore, Run, RunScope, SearchResultRow, StoreError,
};

/// Drives one run through `pending → running → {completed, failed}`.
///
/// Cheap to share: the task layer holds it behind an `Arc` and calls it
/// from many keyword units at once.
pub struct RunOrchestrator {
    store: Arc<RankStore>,
    strategy: SearchStrategy,
    links: Arc<dyn LinkSource>,
}

impl RunOrchestrator {
    pub fn new(store: Arc<RankStore>, strategy: SearchStrategy, links: Arc<dyn LinkSource>) -> Self {
        Self {
            store,
            strategy,
            links,
        }
    }

    /// Build the configured provider chain and link extractor around `store`.
    pub fn from_config(store: Arc<RankStore>, config: &TrackerConfig) -> Result<Self> {
        let strategy = SearchStrategy::from_config(&config.search)?;
        let links = AffiliateLinkExtractor::new(&config.links)?;
        Ok(Self::new(store, strategy, Arc::new(links)))
    }

    pub fn store(&self) -> &Arc<RankStore> {
        &self.store
    }

    /// Create a pending run and freeze the keywords it tracks.
    pub fn create_run(&self, scope: RunScope, max_rank: u32) -> Result<Run> {
        let run = self.store.create_run(scope, max_rank)?;
        info!(
            run_id = run.id,
            scope = scope.kind_str(),
            max_rank,
            "run created"
        );
        Ok(run)
    }

    /// Move the run to `running` if it is still pending. Only the unit that
    /// performs the transition gets `true`; the others proceed regardless.
    pub fn start_keyword_unit(&self, run_id: i64) -> Result<bool> {
        let won = self.store.try_start_run(run_id)?;
        if won {
            info!(run_id, "run started");
        }
        Ok(won)
    }

    /// Ranks to search for `keyword` in `run`: the deeper of the two bounds.
    pub fn search_depth(run: &Run, keyword: &Keyword) -> u32 {
        run.max_rank.max(keyword.max_rank)
    }

    /// One keyword unit: search, record, then check completion.
    pub async fn process_keyword(&self, run_id: i64, keyword_id: i64) -> Result<CompletionCheck> {
        let run = self.store.get_run(run_id)?;
        ensure_open(&run)?;
        self.start_keyword_unit(run_id)?;

        let keyword = self.store.get_keyword(keyword_id)?;
        let depth = Self::search_depth(&run, &keyword);
        debug!(run_id, keyword = %keyword.text, depth, "searching keyword");

        let outcome = self.strategy.resolve(&keyword.text, depth).await;
        self.record_outcome(run_id, keyword_id, &outcome).await?;
        self.check_completion(run_id)
    }

    /// Persist a strategy outcome for one keyword of a run.
    ///
    /// Affiliate links are fetched first for every row ranked within
    /// `run.max_rank`; rows, media sites and links are then written in one
    /// store transaction. Recording again for the same keyword replaces the
    /// previous rows. Refused once the run is terminal.
    pub async fn record_outcome(
        &self,
        run_id: i64,
        keyword_id: i64,
        outcome: &SearchOutcome,
    ) -> Result<Vec<SearchResultRow>> {
        let run = self.store.get_run(run_id)?;
        ensure_open(&run)?;

        let mut rows = Vec::with_capacity(outcome.items.len());
        for item in &outcome.items {
            let (Some(domain), Some(site_name)) = (domain_key(&item.url), display_host(&item.url))
            else {
                warn!(run_id, url = %item.url, "dropping result without a host");
                continue;
            };
            let links = if item.rank <= run.max_rank {
                self.links.extract(&item.url).await
            } else {
                Vec::new()
            };
            rows.push(NewResult {
                rank: item.rank,
                page_url: item.url.clone(),
                title: item.title.clone(),
                domain,
                site_name,
                links: Some(links),
            });
        }
        if rows.is_empty() {
            rows.push(NewResult::not_found());
        }

        let stored = self
            .store
            .replace_results(run_id, keyword_id, &rows)
            .map_err(|e| match e {
                StoreError::RunTerminal { run_id, status } => {
                    RankError::InvalidState(format!("run {run_id} is {status}"))
                }
                other => other.into(),
            })?;

        if let Some(hits) = outcome.hit_count {
            let volume = i64::try_from(hits).unwrap_or(i64::MAX);
            self.store.update_search_volume(keyword_id, volume)?;
        }

        info!(
            run_id,
            keyword_id,
            rows = stored.len(),
            provider = outcome.provider.map(|p| p.name()).unwrap_or("none"),
            "keyword recorded"
        );
        Ok(stored)
    }

    /// Complete the run once every tracked keyword has a result row.
    pub fn check_completion(&self, run_id: i64) -> Result<CompletionCheck> {
        let check = self.store.check_completion(run_id)?;
        match check {
            CompletionCheck::Completed => info!(run_id, "run completed"),
            CompletionCheck::Pending { done, total } => {
                debug!(run_id, done, total, "run still pending keywords")
            }
            CompletionCheck::AlreadyTerminal(_) => {}
        }
        Ok(check)
    }

    /// Mark the run failed. Returns `false` when it was already terminal.
    pub fn fail_run(&self, run_id: i64, reason: &str) -> Result<bool> {
        let failed = self.store.fail_run(run_id, reason)?;
        if failed {
            warn!(run_id, reason, "run failed");
        }
        Ok(failed)
    }
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

fn ensure_open(run: &Run) -> Result<()> {
    if run.status.is_terminal() {
        return Err(RankError::InvalidState(format!(
            "run {} is {}",
            run.id, run.status
        )));
    }
    Ok(())
}
