//! rankwatch: search-engine rank tracking with affiliate link extraction.
//!
//! A run tracks every keyword of a project (or a single keyword). Each
//! keyword is resolved through a fallback chain of search providers, the
//! ranked pages are scanned for affiliate links, and everything is stored
//! idempotently in SQLite. The run completes once every tracked keyword
//! has at least one result row.
//!
//! # Architecture
//!
//! - **rank-search** (workspace crate): providers, search strategy, link
//!   extractor, URL normalisation
//! - **store**: SQLite persistence via `rusqlite`
//! - **pipeline**: run state machine and result recording
//! - **tasks**: concurrent keyword units with retries and cancellation

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::TrackerConfig;
pub use error::{RankError, Result};
pub use pipeline::RunOrchestrator;
pub use store::{RankStore, RunScope, RunStatus, StoreError};
pub use tasks::{RetryPolicy, RunReport, TaskRunner, UnitOutcome};
