//! Entities persisted by the rank store, plus run state enums.

use rank_search::ExtractedLink;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Schema / reserved values
// ---------------------------------------------------------------------------

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Rank of the placeholder row written when no provider found anything.
pub const NOT_FOUND_RANK: u32 = 0;
/// Title of the placeholder row.
pub const NOT_FOUND_TITLE: &str = "not found";
/// Reserved media-site domain the placeholder row points at. `.invalid`
/// can never be a real host.
pub const NOT_FOUND_DOMAIN: &str = "not-found.invalid";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle of a run: `pending → running → {completed, failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run tracks: every keyword of a project, or one keyword.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunScope {
    Project(i64),
    Keyword(i64),
}

impl RunScope {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Keyword(_) => "keyword",
        }
    }

    pub fn is_single_keyword(&self) -> bool {
        matches!(self, Self::Keyword(_))
    }
}

/// Result of a completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCheck {
    /// This call moved the run to `completed`. Returned at most once per run.
    Completed,
    /// The run was already `completed` or `failed`.
    AlreadyTerminal(RunStatus),
    /// Some tracked keywords have no result row yet.
    Pending { done: u32, total: u32 },
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub id: i64,
    pub project_id: i64,
    pub text: String,
    /// Monthly hit estimate, only ever written from the primary provider.
    pub search_volume: Option<i64>,
    /// How deep this keyword wants to be searched.
    pub max_rank: u32,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Run {
    pub id: i64,
    pub project_id: i64,
    pub scope: RunScope,
    pub status: RunStatus,
    pub max_rank: u32,
    pub executed_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    /// Reason recorded by `fail_run`.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaSite {
    pub id: i64,
    /// Storage key: lowercase host without a leading `www.`.
    pub domain: String,
    /// Host as first seen, `www.` kept.
    pub name: String,
}

/// One ranked row of a run for a keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResultRow {
    pub id: i64,
    pub run_id: i64,
    pub keyword_id: i64,
    pub media_site_id: i64,
    pub rank: u32,
    pub page_url: String,
    pub title: String,
}

impl SearchResultRow {
    pub fn is_not_found(&self) -> bool {
        self.rank == NOT_FOUND_RANK
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffiliateLink {
    pub id: i64,
    pub search_result_id: i64,
    pub link_url: String,
    pub asp_name: String,
    pub product_name: String,
}

/// Durable record of a keyword unit that exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordFailure {
    pub id: i64,
    pub run_id: i64,
    pub keyword_id: i64,
    pub attempts: u32,
    pub error: String,
    pub failed_at: i64,
}

/// A result row to write, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResult {
    pub rank: u32,
    pub page_url: String,
    pub title: String,
    /// Media-site storage key.
    pub domain: String,
    /// Display name used when the media site is first created.
    pub site_name: String,
    /// Affiliate links to store for this row. `None` leaves any existing
    /// links untouched; `Some` replaces them.
    pub links: Option<Vec<ExtractedLink>>,
}

impl NewResult {
    /// The placeholder row for a keyword no provider could answer.
    pub fn not_found() -> Self {
        Self {
            rank: NOT_FOUND_RANK,
            page_url: String::new(),
            title: NOT_FOUND_TITLE.to_owned(),
            domain: NOT_FOUND_DOMAIN.to_owned(),
            site_name: NOT_FOUND_DOMAIN.to_owned(),
            links: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn str_to_status(s: &str) -> RunStatus {
    match s {
        "pending" => RunStatus::Pending,
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        _ => RunStatus::Failed, // unknown values never resume work
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for s in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(str_to_status(s.as_str()), s);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn not_found_row_uses_reserved_values() {
        let row = NewResult::not_found();
        assert_eq!(row.rank, 0);
        assert_eq!(row.page_url, "");
        assert_eq!(row.title, "not found");
        assert_eq!(row.domain, "not-found.invalid");
    }

    #[test]
    fn scope_kind_strings() {
        assert_eq!(RunScope::Project(1).kind_str(), "project");
        assert_eq!(RunScope::Keyword(1).kind_str(), "keyword");
        assert!(RunScope::Keyword(9).is_single_keyword());
    }
}
