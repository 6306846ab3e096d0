//! Loggable world events.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Category of a logged event. Each one can be switched off in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BlockBreak,
    BlockPlace,
    BlockExplode,
}

impl EventKind {
    /// Value stored in the `kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::BlockBreak => "break",
            EventKind::BlockPlace => "place",
            EventKind::BlockExplode => "explode",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "break" => Ok(EventKind::BlockBreak),
            "place" => Ok(EventKind::BlockPlace),
            "explode" => Ok(EventKind::BlockExplode),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// "`actor` did `kind` to `block` at `pos` in `world`", at unix time `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub time: i64,
    pub kind: EventKind,
    pub actor: String,
    pub world: String,
    pub pos: BlockPos,
    pub block: String,
}

impl LogEvent {
    /// An event stamped with the current time.
    pub fn now(
        kind: EventKind,
        actor: impl Into<String>,
        world: impl Into<String>,
        pos: BlockPos,
        block: impl Into<String>,
    ) -> Self {
        Self {
            time: unix_timestamp(),
            kind,
            actor: actor.into(),
            world: world.into(),
            pos,
            block: block.into(),
        }
    }
}

/// Seconds since the unix epoch.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
