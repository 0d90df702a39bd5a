//! Task execution layer: one retried unit per tracked keyword.

pub mod retry;
pub mod runner;

pub use retry::{RetryError, RetryPolicy};
pub use runner::{RunReport, TaskRunner, UnitOutcome};
