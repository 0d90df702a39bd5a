//! Shared HTTP plumbing: client construction, User-Agent rotation, and
//! request pacing.
//!
//! Each provider and the link extractor owns its own [`reqwest::Client`]
//! built here, so timeouts and User-Agent policy come from configuration
//! rather than process-wide state.

use crate::error::SearchError;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

/// Realistic browser User-Agent strings, rotated per request.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Build a [`reqwest::Client`] with the given timeout.
///
/// The client has a cookie store (for consent pages), brotli/gzip
/// decompression and a bounded redirect policy. The User-Agent is set per
/// request via [`user_agent`] so rotation works with a long-lived client.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(timeout_seconds: u64) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_secs(timeout_seconds))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Resolve the User-Agent for one request: the custom one when configured,
/// otherwise a random pick from the rotation list.
pub fn user_agent(custom: Option<&str>) -> String {
    match custom {
        Some(ua) => ua.to_owned(),
        None => random_user_agent().to_owned(),
    }
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        // SAFETY: USER_AGENTS is a non-empty const array, choose only returns None on empty slices
        .unwrap_or(USER_AGENTS[0])
}

/// Pick a random delay inside `(min_ms, max_ms)`.
pub fn jitter(range_ms: (u64, u64)) -> Duration {
    let (min, max) = range_ms;
    if max <= min {
        return Duration::from_millis(min);
    }
    let ms = rand::thread_rng().gen_range(min..=max);
    Duration::from_millis(ms)
}

/// Sleep for a jittered delay. Each caller draws its own delay so
/// concurrent fetches do not fire in lockstep.
pub async fn pace(range_ms: (u64, u64)) {
    let delay = jitter(range_ms);
    if !delay.is_zero() {
        tracing::trace!(delay_ms = delay.as_millis() as u64, "pacing request");
        tokio::time::sleep(delay).await;
    }
}
