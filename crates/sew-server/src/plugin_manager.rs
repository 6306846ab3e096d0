//! Plugin manager: enables plugins and dispatches events, tasks and commands to them.

use std::collections::HashMap;

use sew_plugin_api::{
    EventResult, LogLevel, Plugin, PluginBlockPos, PluginEvent, PluginPlayer, ServerApi,
};
use tracing::{debug, error, info, warn};

// ─── Types ───────────────────────────────────────────────────────────────────

/// A scheduled task owned by a plugin.
#[derive(Debug)]
pub struct ScheduledTask {
    pub plugin_name: String,
    pub task_id: u32,
    pub remaining_ticks: u64,
    /// Ticks between runs.
    pub interval: u64,
}

/// Host state plugins read from during a callback.
#[derive(Default)]
pub struct ServerSnapshot {
    pub players: Vec<PluginPlayer>,
    /// Known blocks keyed by world and position. Missing entries read as unknown.
    pub blocks: HashMap<(String, PluginBlockPos), String>,
    pub current_tick: u64,
}

/// Deferred side-effect requested by a plugin during a callback.
#[derive(Debug)]
pub enum PendingAction {
    SendMessage {
        player_name: String,
        message: String,
    },
    BroadcastMessage {
        message: String,
    },
    SetBlock {
        world: String,
        position: PluginBlockPos,
        block: String,
    },
    RegisterCommand {
        name: String,
        description: String,
        plugin_name: String,
    },
    ScheduleTask {
        task: ScheduledTask,
    },
    CancelTask {
        plugin_name: String,
        task_id: u32,
    },
}

// ─── ServerApiImpl ───────────────────────────────────────────────────────────

/// Implements `ServerApi` using a snapshot for reads and accumulating PendingActions for writes.
pub(crate) struct ServerApiImpl<'a> {
    snapshot: &'a ServerSnapshot,
    actions: Vec<PendingAction>,
}

impl<'a> ServerApiImpl<'a> {
    pub(crate) fn new(snapshot: &'a ServerSnapshot) -> Self {
        Self {
            snapshot,
            actions: Vec::new(),
        }
    }

    pub(crate) fn take_actions(self) -> Vec<PendingAction> {
        self.actions
    }
}

impl ServerApi for ServerApiImpl<'_> {
    fn online_players(&self) -> Vec<PluginPlayer> {
        self.snapshot.players.clone()
    }

    fn get_player(&self, name: &str) -> Option<PluginPlayer> {
        self.snapshot
            .players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn send_message(&mut self, player_name: &str, message: &str) {
        self.actions.push(PendingAction::SendMessage {
            player_name: player_name.to_string(),
            message: message.to_string(),
        });
    }

    fn broadcast_message(&mut self, message: &str) {
        self.actions.push(PendingAction::BroadcastMessage {
            message: message.to_string(),
        });
    }

    fn get_block(&self, world: &str, pos: PluginBlockPos) -> Option<String> {
        self.snapshot
            .blocks
            .get(&(world.to_string(), pos))
            .cloned()
    }

    fn set_block(&mut self, world: &str, pos: PluginBlockPos, block: &str) {
        self.actions.push(PendingAction::SetBlock {
            world: world.to_string(),
            position: pos,
            block: block.to_string(),
        });
    }

    fn get_tick(&self) -> u64 {
        self.snapshot.current_tick
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => info!("[plugin] {message}"),
            LogLevel::Warn => warn!("[plugin] {message}"),
            LogLevel::Error => error!("[plugin] {message}"),
            LogLevel::Debug => debug!("[plugin] {message}"),
        }
    }

    fn schedule_repeating(
        &mut self,
        plugin_name: &str,
        delay_ticks: u64,
        interval_ticks: u64,
        task_id: u32,
    ) {
        self.actions.push(PendingAction::ScheduleTask {
            task: ScheduledTask {
                plugin_name: plugin_name.to_string(),
                task_id,
                remaining_ticks: delay_ticks,
                interval: interval_ticks.max(1),
            },
        });
    }

    fn cancel_task(&mut self, plugin_name: &str, task_id: u32) {
        self.actions.push(PendingAction::CancelTask {
            plugin_name: plugin_name.to_string(),
            task_id,
        });
    }

    fn register_command(&mut self, name: &str, description: &str, plugin_name: &str) {
        self.actions.push(PendingAction::RegisterCommand {
            name: name.to_string(),
            description: description.to_string(),
            plugin_name: plugin_name.to_string(),
        });
    }
}

// ─── PluginManager ───────────────────────────────────────────────────────────

/// Manages all loaded plugins, their scheduled tasks, and command registrations.
pub struct PluginManager {
    plugins: Vec<Box<dyn Plugin>>,
    tasks: Vec<ScheduledTask>,
    /// Commands registered by plugins: command_name → (plugin_name, description).
    pub plugin_commands: HashMap<String, (String, String)>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            tasks: Vec::new(),
            plugin_commands: HashMap::new(),
        }
    }

    /// Register a plugin (call before enable_all).
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        let info = plugin.info();
        info!("Registered plugin: {} v{}", info.name, info.version);
        self.plugins.push(plugin);
    }

    /// Enable all registered plugins. Returns the actions the host must apply.
    pub fn enable_all(&mut self, snapshot: &ServerSnapshot) -> Vec<PendingAction> {
        let mut all_actions = Vec::new();
        for plugin in &mut self.plugins {
            let mut api = ServerApiImpl::new(snapshot);
            plugin.on_enable(&mut api);
            all_actions.extend(api.take_actions());
        }
        self.apply_internal_actions(all_actions)
    }

    /// Disable all registered plugins and drop their tasks.
    pub fn disable_all(&mut self) {
        for plugin in &mut self.plugins {
            info!("Disabling plugin: {}", plugin.info().name);
            plugin.on_disable();
        }
        self.tasks.clear();
    }

    /// Dispatch an event to all plugins. Returns the combined result and the
    /// actions the host must apply.
    pub fn dispatch(
        &mut self,
        event: &PluginEvent,
        snapshot: &ServerSnapshot,
    ) -> (EventResult, Vec<PendingAction>) {
        let cancellable = event.is_cancellable();
        let mut all_actions = Vec::new();
        let mut final_result = EventResult::Continue;

        for plugin in &mut self.plugins {
            let mut api = ServerApiImpl::new(snapshot);
            let result = plugin.on_event(event, &mut api);
            all_actions.extend(api.take_actions());

            if cancellable && result == EventResult::Cancelled {
                final_result = EventResult::Cancelled;
                break; // Stop propagation
            }
        }

        (final_result, self.apply_internal_actions(all_actions))
    }

    /// Tick the scheduler. Returns actions from fired tasks.
    pub fn tick_scheduler(&mut self, snapshot: &ServerSnapshot) -> Vec<PendingAction> {
        let mut all_actions = Vec::new();
        let mut fired: Vec<(String, u32)> = Vec::new();

        for task in &mut self.tasks {
            if task.remaining_ticks > 0 {
                task.remaining_ticks -= 1;
            }
            if task.remaining_ticks == 0 {
                fired.push((task.plugin_name.clone(), task.task_id));
                task.remaining_ticks = task.interval;
            }
        }

        for (plugin_name, task_id) in fired {
            if let Some(plugin) = self
                .plugins
                .iter_mut()
                .find(|p| p.info().name == plugin_name)
            {
                let mut api = ServerApiImpl::new(snapshot);
                plugin.on_task(task_id, &mut api);
                all_actions.extend(api.take_actions());
            }
        }

        self.apply_internal_actions(all_actions)
    }

    /// Handle a plugin-registered command. Returns (response_message, pending_actions).
    pub fn handle_command(
        &mut self,
        command: &str,
        args: &[String],
        sender: &str,
        snapshot: &ServerSnapshot,
    ) -> (Option<String>, Vec<PendingAction>) {
        let plugin_name = match self.plugin_commands.get(command) {
            Some((name, _)) => name.clone(),
            None => return (None, Vec::new()),
        };

        if let Some(plugin) = self
            .plugins
            .iter_mut()
            .find(|p| p.info().name == plugin_name)
        {
            let mut api = ServerApiImpl::new(snapshot);
            let response = plugin.on_command(command, args, sender, &mut api);
            let actions = api.take_actions();
            (response, self.apply_internal_actions(actions))
        } else {
            (None, Vec::new())
        }
    }

    /// Apply scheduler and command-table actions here and hand the rest back.
    fn apply_internal_actions(&mut self, actions: Vec<PendingAction>) -> Vec<PendingAction> {
        let mut external = Vec::new();
        for action in actions {
            match action {
                PendingAction::RegisterCommand {
                    name,
                    description,
                    plugin_name,
                } => {
                    debug!("Plugin {plugin_name} registered /{name}");
                    self.plugin_commands.insert(name, (plugin_name, description));
                }
                PendingAction::ScheduleTask { task } => {
                    self.tasks.push(task);
                }
                PendingAction::CancelTask {
                    plugin_name,
                    task_id,
                } => {
                    self.tasks
                        .retain(|t| !(t.plugin_name == plugin_name && t.task_id == task_id));
                }
                other => external.push(other),
            }
        }
        external
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
