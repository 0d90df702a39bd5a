//! Error types for the rank tracking pipeline.

use crate::store::StoreError;

/// Top-level error type for rank tracking.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    /// Rank store (SQLite) error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Search provider or link extractor construction error.
    #[error("search error: {0}")]
    Search(#[from] rank_search::SearchError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run or keyword is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The unit was cancelled before doing any work.
    #[error("cancelled")]
    Cancelled,

    /// A keyword unit attempt panicked; carries the panic message.
    #[error("keyword unit panicked: {0}")]
    Panicked(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RankError>;
