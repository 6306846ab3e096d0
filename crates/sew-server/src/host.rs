//! Console host: owns the plugin manager and the world state plugins read.

use sew_plugin_api::{EventResult, Plugin, PluginEvent};
use tracing::{debug, info, warn};

use crate::commands::CONSOLE;
use crate::plugin_manager::{PendingAction, PluginManager, ServerSnapshot};

pub struct Host {
    pub manager: PluginManager,
    pub state: ServerSnapshot,
}

impl Host {
    pub fn new() -> Self {
        Self {
            manager: PluginManager::new(),
            state: ServerSnapshot::default(),
        }
    }

    /// Register and enable `plugin`, then announce the start.
    pub fn start(&mut self, plugin: Box<dyn Plugin>) {
        self.manager.register(plugin);
        let actions = self.manager.enable_all(&self.state);
        self.apply(actions);
        self.dispatch(&PluginEvent::ServerStarted);
    }

    pub fn dispatch(&mut self, event: &PluginEvent) -> EventResult {
        let (result, actions) = self.manager.dispatch(event, &self.state);
        self.apply(actions);
        result
    }

    pub fn tick(&mut self) {
        self.state.current_tick += 1;
        let actions = self.manager.tick_scheduler(&self.state);
        self.apply(actions);
    }

    /// [`tick`](Self::tick) from a multi-threaded runtime worker. Plugin tasks
    /// write files and purge the event log, so the worker's other tasks are
    /// moved off this thread first.
    pub fn tick_blocking(&mut self) {
        tokio::task::block_in_place(|| self.tick())
    }

    /// [`console`](Self::console) from a multi-threaded runtime worker.
    pub fn console_blocking(&mut self, line: &str) -> Vec<String> {
        tokio::task::block_in_place(|| self.console(line))
    }

    /// Run one console line. Returns the lines to print.
    pub fn console(&mut self, line: &str) -> Vec<String> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Vec::new();
        };
        if command == "help" {
            let mut lines: Vec<String> = self
                .manager
                .plugin_commands
                .iter()
                .map(|(name, (_, description))| format!("{name}: {description}"))
                .collect();
            lines.sort();
            lines.push("stop: Save everything and exit".into());
            return lines;
        }

        let args: Vec<String> = parts.map(String::from).collect();
        let (response, actions) = self
            .manager
            .handle_command(command, &args, CONSOLE, &self.state);
        self.apply(actions);
        match response {
            Some(text) => text.lines().map(String::from).collect(),
            None => vec![format!("Unknown command: {command}. Type `help`.")],
        }
    }

    /// Announce the stop and disable every plugin.
    pub fn shutdown(&mut self) {
        self.dispatch(&PluginEvent::ServerStopping);
        self.manager.disable_all();
    }

    fn apply(&mut self, actions: Vec<PendingAction>) {
        for action in actions {
            match action {
                PendingAction::SendMessage {
                    player_name,
                    message,
                } => info!("[to {player_name}] {message}"),
                PendingAction::BroadcastMessage { message } => info!("[broadcast] {message}"),
                PendingAction::SetBlock {
                    world,
                    position,
                    block,
                } => {
                    debug!("Set {world} {position:?} to {block}");
                    self.state.blocks.insert((world, position), block);
                }
                other => warn!("Unhandled plugin action: {other:?}"),
            }
        }
    }
}
