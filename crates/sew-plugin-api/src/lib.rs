//! Plugin API: the contract between a host game server and Sew.
//!
//! The host feeds world events in through [`Plugin::on_event`] and exposes
//! its world state through [`ServerApi`]. Nothing here depends on the other
//! Sew crates.

use uuid::Uuid;

// ─── Types ───────────────────────────────────────────────────────────────────

/// An online player, as seen by plugins.
#[derive(Debug, Clone)]
pub struct PluginPlayer {
    pub name: String,
    pub uuid: Uuid,
    /// World the player is currently in.
    pub world: String,
    pub position: (f64, f64, f64),
}

impl PluginPlayer {
    /// Block coordinates the player is standing in.
    pub fn block_pos(&self) -> PluginBlockPos {
        PluginBlockPos {
            x: self.position.0.floor() as i32,
            y: self.position.1.floor() as i32,
            z: self.position.2.floor() as i32,
        }
    }
}

/// Block position, decoupled from any host coordinate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginBlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl PluginBlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Log level for plugin logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// Result of dispatching an event to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    /// Continue normal handling.
    Continue,
    /// Event was cancelled by this plugin.
    Cancelled,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// All events a host reports to plugins.
#[derive(Debug, Clone)]
pub enum PluginEvent {
    PlayerJoin {
        player: PluginPlayer,
    },
    PlayerQuit {
        player: PluginPlayer,
    },

    /// A player is about to break `block`.
    BlockBreak {
        player: PluginPlayer,
        world: String,
        position: PluginBlockPos,
        block: String,
    },
    /// A player is about to place `block`.
    BlockPlace {
        player: PluginPlayer,
        world: String,
        position: PluginBlockPos,
        block: String,
    },
    /// A player right-clicked `block` (doors, buttons, chests...).
    BlockInteract {
        player: PluginPlayer,
        world: String,
        position: PluginBlockPos,
        block: String,
    },
    /// An explosion destroyed `blocks`. `source` names the entity (e.g. `creeper`).
    Explosion {
        source: String,
        world: String,
        blocks: Vec<(PluginBlockPos, String)>,
    },

    ServerStarted,
    ServerStopping,
}

impl PluginEvent {
    /// Whether this event type can be cancelled by a plugin.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            PluginEvent::BlockBreak { .. }
                | PluginEvent::BlockPlace { .. }
                | PluginEvent::BlockInteract { .. }
        )
    }
}

// ─── Plugin trait ────────────────────────────────────────────────────────────

/// Metadata about a plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

/// Implemented by every plugin the host loads.
pub trait Plugin: Send {
    /// Return plugin metadata.
    fn info(&self) -> PluginInfo;

    /// Called when the plugin is loaded. Use `api` to register commands, schedule tasks.
    fn on_enable(&mut self, api: &mut dyn ServerApi);

    /// Called when the plugin is unloaded.
    fn on_disable(&mut self) {}

    /// Called for every dispatched event. Return `Cancelled` to cancel cancellable events.
    fn on_event(&mut self, event: &PluginEvent, api: &mut dyn ServerApi) -> EventResult {
        let _ = (event, api);
        EventResult::Continue
    }

    /// Called when a scheduled task fires.
    fn on_task(&mut self, task_id: u32, api: &mut dyn ServerApi) {
        let _ = (task_id, api);
    }

    /// Called when a plugin-registered command is executed. Return a response message.
    fn on_command(
        &mut self,
        command: &str,
        args: &[String],
        sender: &str,
        api: &mut dyn ServerApi,
    ) -> Option<String> {
        let _ = (command, args, sender, api);
        None
    }
}

// ─── Server API ──────────────────────────────────────────────────────────────

/// Read/write access to host state, passed to plugins during callbacks.
///
/// Read methods return data immediately. Write methods are deferred (applied
/// after the plugin callback returns).
pub trait ServerApi {
    // --- Players ---
    fn online_players(&self) -> Vec<PluginPlayer>;
    fn get_player(&self, name: &str) -> Option<PluginPlayer>;
    fn send_message(&mut self, player_name: &str, message: &str);
    fn broadcast_message(&mut self, message: &str);

    // --- World ---
    fn get_block(&self, world: &str, pos: PluginBlockPos) -> Option<String>;
    fn set_block(&mut self, world: &str, pos: PluginBlockPos, block: &str);

    // --- Server ---
    fn get_tick(&self) -> u64;
    fn log(&self, level: LogLevel, message: &str);

    // --- Scheduler ---
    fn schedule_repeating(
        &mut self,
        plugin_name: &str,
        delay_ticks: u64,
        interval_ticks: u64,
        task_id: u32,
    );
    fn cancel_task(&mut self, plugin_name: &str, task_id: u32);

    // --- Commands ---
    fn register_command(&mut self, name: &str, description: &str, plugin_name: &str);
}

// ─── Tests ───────────────────────────────────────────────────────────────────
