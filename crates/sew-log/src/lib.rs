//! Block-event logging.
//!
//! Hosts call [`EventLogger::record`] from their event hooks; a dedicated
//! writer thread batches the events into a [`LogStore`] (SQLite by default)
//! and serves purge and lookup requests in queue order.

pub mod config;
pub mod error;
pub mod event;
pub mod logger;
pub mod store;

pub use config::EventLogConfig;
pub use error::LogError;
pub use event::{unix_timestamp, BlockPos, EventKind, LogEvent};
pub use logger::EventLogger;
pub use store::{LogStore, SqliteStore};
