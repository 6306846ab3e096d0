//! `[event_log]` configuration section.

use serde::Deserialize;

use crate::event::EventKind;

#[derive(Debug, Clone, Deserialize)]
pub struct EventLogConfig {
    /// Master switch. When off nothing is queued.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_true")]
    pub log_block_breaking: bool,
    #[serde(default = "default_true")]
    pub log_block_placing: bool,
    #[serde(default = "default_true")]
    pub log_explosions: bool,
    /// Events per insert transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pending events are written once they are this old, even if the batch is not full.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Rows older than this are purged. 0 keeps everything.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_database() -> String {
    "events.db".into()
}

fn default_batch_size() -> usize {
    128
}

fn default_flush_interval_ms() -> u64 {
    500
}

fn default_retention_days() -> u64 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            database: default_database(),
            log_block_breaking: true,
            log_block_placing: true,
            log_explosions: true,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl EventLogConfig {
    /// Whether events of `kind` should be queued at all.
    pub fn logs(&self, kind: EventKind) -> bool {
        self.enabled
            && match kind {
                EventKind::BlockBreak => self.log_block_breaking,
                EventKind::BlockPlace => self.log_block_placing,
                EventKind::BlockExplode => self.log_explosions,
            }
    }

    /// Retention window in seconds, `None` when rows are kept forever.
    ///
    /// Windows too large to represent saturate at `i64::MAX`, which keeps every row.
    pub fn retention_secs(&self) -> Option<i64> {
        if self.retention_days == 0 {
            return None;
        }
        Some(
            i64::try_from(self.retention_days)
                .unwrap_or(i64::MAX)
                .saturating_mul(86_400),
        )
    }
}
