//! Relational storage for logged events.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::LogError;
use crate::event::{BlockPos, EventKind, LogEvent};

/// Backing store the writer thread drains into. Only the writer touches it.
pub trait LogStore: Send {
    /// Insert `events` as one batch.
    fn insert_batch(&mut self, events: &[LogEvent]) -> Result<(), LogError>;

    /// Delete rows with `time < cutoff`. Returns the number removed.
    fn purge_before(&mut self, cutoff: i64) -> Result<usize, LogError>;

    /// History of one block, newest first.
    fn lookup(&mut self, world: &str, pos: BlockPos, limit: usize)
        -> Result<Vec<LogEvent>, LogError>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS block_events (
        id    INTEGER PRIMARY KEY AUTOINCREMENT,
        time  INTEGER NOT NULL,
        kind  TEXT    NOT NULL,
        actor TEXT    NOT NULL,
        world TEXT    NOT NULL,
        x     INTEGER NOT NULL,
        y     INTEGER NOT NULL,
        z     INTEGER NOT NULL,
        block TEXT    NOT NULL
    );
    CREATE INDEX IF NOT EXISTS block_events_pos ON block_events (world, x, y, z);
    CREATE INDEX IF NOT EXISTS block_events_time ON block_events (time);
";

const INSERT: &str = "INSERT INTO block_events (time, kind, actor, world, x, y, z, block)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const LOOKUP: &str = "SELECT time, kind, actor, block FROM block_events
    WHERE world = ?1 AND x = ?2 AND y = ?3 AND z = ?4
    ORDER BY time DESC, id DESC
    LIMIT ?5";

/// SQLite-backed [`LogStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();
        let store = Self::init(Connection::open(path)?)?;
        info!("Opened event log database {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, LogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LogError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize, LogError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM block_events", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl LogStore for SqliteStore {
    fn insert_batch(&mut self, events: &[LogEvent]) -> Result<(), LogError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(INSERT)?;
            for event in events {
                stmt.execute(params![
                    event.time,
                    event.kind.as_str(),
                    event.actor,
                    event.world,
                    event.pos.x,
                    event.pos.y,
                    event.pos.z,
                    event.block,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn purge_before(&mut self, cutoff: i64) -> Result<usize, LogError> {
        Ok(self
            .conn
            .execute("DELETE FROM block_events WHERE time < ?1", params![cutoff])?)
    }

    fn lookup(
        &mut self,
        world: &str,
        pos: BlockPos,
        limit: usize,
    ) -> Result<Vec<LogEvent>, LogError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare_cached(LOOKUP)?;
        let rows = stmt.query_map(params![world, pos.x, pos.y, pos.z, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (time, kind, actor, block) = row?;
            let kind = kind
                .parse::<EventKind>()
                .map_err(|()| LogError::UnknownKind(kind.clone()))?;
            events.push(LogEvent {
                time,
                kind,
                actor,
                world: world.to_string(),
                pos,
                block,
            });
        }
        Ok(events)
    }
}
