//! Permission error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermError {
    #[error("rank `{0}` cannot be its own parent")]
    SelfParent(String),

    #[error("making `{parent}` the parent of `{rank}` would create a cycle")]
    ParentCycle { rank: String, parent: String },

    #[error("unknown rank `{0}`")]
    UnknownRank(String),

    #[error("rank `{0}` already exists")]
    RankExists(String),

    #[error("invalid rank id `{0}`")]
    InvalidRankId(String),

    #[error("the wildcard rank cannot be deleted")]
    WildcardRank,

    #[error("invalid permission node `{0}`")]
    InvalidNode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
