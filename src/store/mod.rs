//! Persistent rank store.
//!
//! Sub-modules:
//! - `types`: entities, run status enums and reserved values.
//! - `schema`: SQLite DDL definitions.
//! - `sqlite`: SQLite-backed `RankStore`.

pub(crate) mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::{RankStore, StoreError};
pub use types::{
    AffiliateLink, CompletionCheck, Keyword, KeywordFailure, MediaSite, NewResult, Project, Run,
    RunScope, RunStatus, SearchResultRow, NOT_FOUND_DOMAIN, NOT_FOUND_RANK, NOT_FOUND_TITLE,
};
