//! Claim error types.

use thiserror::Error;
use uuid::Uuid;

use crate::claim::ClaimChunk;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("chunk {chunk} is already claimed by {owner}")]
    AlreadyClaimed { chunk: ClaimChunk, owner: Uuid },

    #[error("claim limit reached ({limit} chunks)")]
    LimitReached { limit: usize },

    #[error("you do not own any claim")]
    NoClaim,

    #[error("chunk {0} is not part of your claim")]
    NotOwner(ClaimChunk),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
