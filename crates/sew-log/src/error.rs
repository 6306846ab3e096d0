//! Event log error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown event kind `{0}` in store")]
    UnknownKind(String),

    #[error("event log writer is not running")]
    Closed,
}
