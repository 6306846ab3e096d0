//! The queue in front of the store and the thread that drains it.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use crate::config::EventLogConfig;
use crate::error::LogError;
use crate::event::{unix_timestamp, BlockPos, LogEvent};
use crate::store::{LogStore, SqliteStore};

enum Command {
    Event(LogEvent),
    Purge {
        cutoff: i64,
        reply: Sender<Result<usize, LogError>>,
    },
    Lookup {
        world: String,
        pos: BlockPos,
        limit: usize,
        reply: Sender<Result<Vec<LogEvent>, LogError>>,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// Producer side of the event log.
///
/// Events are filtered by the config toggles, then queued without blocking
/// the caller. Everything queued before [`shutdown`](Self::shutdown) is
/// written before the writer exits.
pub struct EventLogger {
    config: EventLogConfig,
    tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventLogger {
    /// Open the configured SQLite database and start the writer.
    pub fn open(config: EventLogConfig) -> Result<Self, LogError> {
        let store = SqliteStore::open(&config.database)?;
        Self::spawn(config, Box::new(store))
    }

    /// Start the writer thread over any store.
    pub fn spawn(config: EventLogConfig, store: Box<dyn LogStore>) -> Result<Self, LogError> {
        let (tx, rx) = channel::unbounded();
        let writer = Writer {
            store,
            pending: Vec::new(),
            batch_size: config.batch_size.max(1),
            max_age: Duration::from_millis(config.flush_interval_ms.max(1)),
            last_flush: Instant::now(),
        };
        let worker = thread::Builder::new()
            .name("sew-event-log".into())
            .spawn(move || writer.run(rx))?;
        Ok(Self {
            config,
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    /// Queue `event`. Returns `false` if its kind is disabled or the writer
    /// has stopped.
    pub fn record(&self, event: LogEvent) -> bool {
        if !self.config.logs(event.kind) {
            return false;
        }
        self.tx.send(Command::Event(event)).is_ok()
    }

    /// Delete rows with `time < cutoff`, after writing everything queued so far.
    pub fn purge_before(&self, cutoff: i64) -> Result<usize, LogError> {
        let (reply, rx) = channel::bounded(1);
        self.send(Command::Purge { cutoff, reply })?;
        rx.recv().map_err(|_| LogError::Closed)?
    }

    /// Apply the retention window. Returns 0 when retention is disabled.
    pub fn purge_expired(&self) -> Result<usize, LogError> {
        match self.config.retention_secs() {
            Some(window) => self.purge_before(unix_timestamp().saturating_sub(window)),
            None => Ok(0),
        }
    }

    /// History of one block, newest first.
    pub fn lookup(
        &self,
        world: &str,
        pos: BlockPos,
        limit: usize,
    ) -> Result<Vec<LogEvent>, LogError> {
        let (reply, rx) = channel::bounded(1);
        self.send(Command::Lookup {
            world: world.to_string(),
            pos,
            limit,
            reply,
        })?;
        rx.recv().map_err(|_| LogError::Closed)?
    }

    /// Block until everything queued so far has been handed to the store.
    pub fn flush(&self) -> Result<(), LogError> {
        let (reply, rx) = channel::bounded(1);
        self.send(Command::Flush(reply))?;
        rx.recv().map_err(|_| LogError::Closed)
    }

    /// Stop the writer after it drains the queue. Safe to call more than once.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = self.tx.send(Command::Shutdown);
        if worker.join().is_err() {
            error!("Event log writer panicked");
        }
    }

    fn send(&self, command: Command) -> Result<(), LogError> {
        self.tx.send(command).map_err(|_| LogError::Closed)
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Writer thread ───────────────────────────────────────────────────────────

struct Writer {
    store: Box<dyn LogStore>,
    pending: Vec<LogEvent>,
    batch_size: usize,
    /// Longest an event may sit in `pending`.
    max_age: Duration,
    last_flush: Instant,
}

impl Writer {
    fn run(mut self, rx: Receiver<Command>) {
        debug!("Event log writer started");
        loop {
            match rx.recv_timeout(self.max_age) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => self.flush(),
            }
        }

        // Anything queued before the stop request still gets written.
        for command in rx.try_iter() {
            self.handle(command);
        }
        self.flush();
        info!("Event log writer stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Event(event) => {
                self.pending.push(event);
                if self.pending.len() >= self.batch_size
                    || self.last_flush.elapsed() >= self.max_age
                {
                    self.flush();
                }
            }
            Command::Purge { cutoff, reply } => {
                self.flush();
                let result = self.store.purge_before(cutoff);
                match &result {
                    Ok(n) => info!("Purged {n} logged events older than {cutoff}"),
                    Err(e) => error!("Failed to purge logged events: {e}"),
                }
                let _ = reply.send(result);
            }
            Command::Lookup {
                world,
                pos,
                limit,
                reply,
            } => {
                self.flush();
                let _ = reply.send(self.store.lookup(&world, pos, limit));
            }
            Command::Flush(reply) => {
                self.flush();
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn flush(&mut self) {
        self.last_flush = Instant::now();
        if self.pending.is_empty() {
            return;
        }
        match self.store.insert_batch(&self.pending) {
            Ok(()) => trace!("Wrote {} logged events", self.pending.len()),
            Err(e) => error!("Dropping {} logged events: {e}", self.pending.len()),
        }
        self.pending.clear();
    }
}
