//! Keyword unit scheduling for one run.
//!
//! Every tracked keyword becomes an independent tokio task on a `JoinSet`,
//! bounded by a semaphore. Units retry through [`RetryPolicy`], panics
//! included; a unit that still fails is recorded as a keyword failure and
//! then either degrades to a not-found row (project runs) or fails the run
//! (single-keyword runs).

use std::sync::Arc;

use rank_search::SearchOutcome;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::retry::{RetryError, RetryPolicy, retry};
use crate::config::TaskConfig;
use crate::error::{RankError, Result};
use crate::pipeline::RunOrchestrator;
use crate::store::RunStatus;

/// How one keyword unit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Results (or a not-found row) were recorded.
    Recorded,
    /// Retries ran out; a not-found row was written in their place.
    Degraded { error: String },
    /// Retries ran out and nothing could be written, or the run was failed.
    Failed { error: String },
    /// Cancelled, or the run was already terminal. Nothing was written.
    Skipped,
}

/// Summary of one [`TaskRunner::execute`] call.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    /// Run status after every unit has finished.
    pub status: RunStatus,
    /// Per keyword id, in tracked order.
    pub units: Vec<(i64, UnitOutcome)>,
}

impl RunReport {
    pub fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|(_, o)| pred(o)).count()
    }

    pub fn recorded(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Recorded))
    }

    pub fn degraded(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Degraded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Skipped))
    }
}

/// Schedules keyword units for runs.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    orchestrator: Arc<RunOrchestrator>,
    retry: RetryPolicy,
    concurrency: usize,
    cancel: CancellationToken,
}

impl TaskRunner {
    pub fn new(orchestrator: Arc<RunOrchestrator>, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            orchestrator,
            retry,
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(orchestrator: Arc<RunOrchestrator>, config: &TaskConfig) -> Self {
        Self::new(
            orchestrator,
            RetryPolicy::from_config(config),
            config.concurrency,
        )
    }

    /// Use `cancel` instead of the runner's own token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops units which have not started their network work yet.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one unit per tracked keyword of `run_id` and wait for all of them.
    ///
    /// # Errors
    ///
    /// Fails up front when the run does not exist or is already terminal.
    /// Unit failures never surface here; they are in the report.
    pub async fn execute(&self, run_id: i64) -> Result<RunReport> {
        let store = Arc::clone(self.orchestrator.store());
        let run = store.get_run(run_id)?;
        if run.status.is_terminal() {
            return Err(RankError::InvalidState(format!(
                "run {run_id} is already {}",
                run.status
            )));
        }
        let keywords = store.run_keywords(run_id)?;
        let single_keyword = run.scope.is_single_keyword();
        info!(
            run_id,
            keywords = keywords.len(),
            concurrency = self.concurrency,
            "executing run"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut units = JoinSet::new();

        for keyword in &keywords {
            let keyword_id = keyword.id;
            let label = format!("run {run_id} keyword {:?}", keyword.text);
            let orchestrator = Arc::clone(&self.orchestrator);
            let retry = self.retry;
            let cancel = self.cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            units.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (keyword_id, UnitOutcome::Skipped);
                };

                let result =
                    run_unit(Arc::clone(&orchestrator), retry, cancel, run_id, keyword_id, label)
                        .await;
                let outcome = match result {
                    Ok(()) => UnitOutcome::Recorded,
                    Err(err) => {
                        let attempts = err.attempts();
                        match err {
                            RetryError::Cancelled { .. } => UnitOutcome::Skipped,
                            RetryError::Permanent { error, .. } => {
                                info!(run_id, keyword_id, attempts, error = %error, "unit skipped");
                                UnitOutcome::Skipped
                            }
                            RetryError::Exhausted { last, .. } => {
                                terminal_failure(
                                    &orchestrator,
                                    run_id,
                                    keyword_id,
                                    single_keyword,
                                    attempts,
                                    &last.to_string(),
                                )
                                .await
                            }
                        }
                    }
                };
                (keyword_id, outcome)
            });
        }

        let mut finished = Vec::with_capacity(keywords.len());
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(pair) => finished.push(pair),
                Err(e) => error!(run_id, error = %e, "keyword unit supervisor failed"),
            }
        }

        // Report in tracked order regardless of finish order.
        let mut report_units = Vec::with_capacity(keywords.len());
        for keyword in &keywords {
            let outcome = finished
                .iter()
                .position(|(id, _)| *id == keyword.id)
                .map(|i| finished.swap_remove(i).1)
                .unwrap_or(UnitOutcome::Failed {
                    error: "unit did not report".into(),
                });
            report_units.push((keyword.id, outcome));
        }

        let status = store.get_run(run_id)?.status;
        let report = RunReport {
            run_id,
            status,
            units: report_units,
        };
        info!(
            run_id,
            status = %report.status,
            recorded = report.recorded(),
            degraded = report.degraded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "run execution finished"
        );
        Ok(report)
    }
}

/// Cancellation check, then search and record with retries.
///
/// Every attempt runs in its own task, so a panic fails that attempt only
/// and is retried like any other error.
async fn run_unit(
    orchestrator: Arc<RunOrchestrator>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    run_id: i64,
    keyword_id: i64,
    label: String,
) -> std::result::Result<(), RetryError> {
    retry(&policy, &cancel, &label, |_attempt| {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move {
            if cancel.is_cancelled() {
                return Err(RankError::Cancelled);
            }
            let attempt =
                tokio::spawn(async move { orchestrator.process_keyword(run_id, keyword_id).await });
            match attempt.await {
                Ok(result) => result.map(|_| ()),
                Err(join_err) => Err(attempt_error(join_err)),
            }
        }
    })
    .await
    .map_err(|e| match e {
        RetryError::Permanent {
            attempts,
            error: RankError::Cancelled,
        } => RetryError::Cancelled { attempts },
        other => other,
    })
}

/// Panics become retryable errors; an aborted attempt means the runtime is
/// shutting down.
fn attempt_error(join_err: JoinError) -> RankError {
    match join_err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            RankError::Panicked(message)
        }
        Err(_) => RankError::Cancelled,
    }
}

/// Record the failure, then keep the run moving.
async fn terminal_failure(
    orchestrator: &RunOrchestrator,
    run_id: i64,
    keyword_id: i64,
    single_keyword: bool,
    attempts: u32,
    reason: &str,
) -> UnitOutcome {
    warn!(run_id, keyword_id, attempts, reason, "keyword unit gave up");
    if let Err(e) = orchestrator
        .store()
        .record_keyword_failure(run_id, keyword_id, attempts, reason)
    {
        error!(run_id, keyword_id, error = %e, "could not record keyword failure");
    }

    if single_keyword {
        return match orchestrator.fail_run(run_id, reason) {
            Ok(_) => UnitOutcome::Failed {
                error: reason.to_owned(),
            },
            Err(e) => UnitOutcome::Failed {
                error: format!("{reason}; marking run failed also failed: {e}"),
            },
        };
    }

    let degraded = async {
        orchestrator
            .record_outcome(run_id, keyword_id, &SearchOutcome::not_found())
            .await?;
        orchestrator.check_completion(run_id)
    };
    match degraded.await {
        Ok(_) => UnitOutcome::Degraded {
            error: reason.to_owned(),
        },
        Err(e) => {
            error!(run_id, keyword_id, error = %e, "could not write not-found row");
            UnitOutcome::Failed {
                error: format!("{reason}; {e}"),
            }
        }
    }
}
