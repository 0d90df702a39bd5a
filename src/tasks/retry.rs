//! Retry policy for keyword units.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::TaskConfig;
use crate::error::RankError;

/// How often, and how patiently, a failing keyword unit is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one. Never below 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Double the delay after every further failure.
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(60),
            exponential: false,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.retry_delay_secs),
            exponential: config.exponential,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
            exponential: false,
        }
    }

    /// Delay after the `failed_attempt`-th attempt (1-based) has failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        if !self.exponential || failed_attempt <= 1 {
            return self.delay;
        }
        let factor = 1u32
            .checked_shl(failed_attempt - 1)
            .unwrap_or(u32::MAX);
        self.delay.saturating_mul(factor)
    }
}

/// Why [`retry`] gave up.
#[derive(Debug)]
pub enum RetryError {
    /// Every attempt failed; carries the attempt count and the last error.
    Exhausted { attempts: u32, last: RankError },
    /// The error cannot be fixed by trying again.
    Permanent { attempts: u32, error: RankError },
    /// The token fired while waiting for the next attempt.
    Cancelled { attempts: u32 },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Permanent { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Errors that say something about the run, not about this attempt.
fn is_permanent(error: &RankError) -> bool {
    matches!(error, RankError::InvalidState(_) | RankError::Cancelled)
}

/// Run `op` until it succeeds, the policy is exhausted, or `cancel` fires
/// during a backoff wait.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RankError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if is_permanent(&error) {
            return Err(RetryError::Permanent {
                attempts: attempt,
                error,
            });
        }
        if attempt >= policy.max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(
            unit = label,
            attempt,
            max_attempts = policy.max_attempts,
            delay_secs = delay.as_secs(),
            error = %error,
            "attempt failed, retrying"
        );
        tokio::select! {
            () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
