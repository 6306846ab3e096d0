//! The Sew plugin: ranks, land claims and block history wired to host events.

use sew_claims::{ClaimAction, ClaimChunk, ClaimRegistry};
use sew_log::{BlockPos, EventKind, EventLogger, LogEvent};
use sew_perms::PermissionResolver;
use sew_plugin_api::{
    EventResult, Plugin, PluginBlockPos, PluginEvent, PluginInfo, PluginPlayer, ServerApi,
};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::config::SewConfig;

pub const PLUGIN_NAME: &str = "Sew";

/// Task id of the retention cleanup.
pub const CLEANUP_TASK: u32 = 1;

const TICKS_PER_SECOND: u64 = 20;

/// Permission nodes checked by the plugin.
pub mod nodes {
    pub const BUILD: &str = "world.build";
    pub const INTERACT: &str = "world.interact";
    pub const CLAIM: &str = "claims.claim";
    pub const CLAIM_BYPASS: &str = "claims.bypass";
    pub const MANAGE_RANKS: &str = "sew.rank";
    pub const MANAGE_LOG: &str = "sew.log";
}

pub struct SewPlugin {
    pub(crate) perms: PermissionResolver,
    pub(crate) claims: ClaimRegistry,
    /// `None` when event logging is switched off.
    pub(crate) logger: Option<EventLogger>,
}

impl SewPlugin {
    pub fn new(
        perms: PermissionResolver,
        claims: ClaimRegistry,
        logger: Option<EventLogger>,
    ) -> Self {
        Self {
            perms,
            claims,
            logger,
        }
    }

    /// Open the rank file, claim file and event database named in `config`.
    pub fn from_config(config: &SewConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let perms = PermissionResolver::open(&config.permissions.ranks_file);
        let claims = ClaimRegistry::load(
            &config.claims.file,
            config.claims.max_chunks_per_player,
        )?;
        let logger = if config.event_log.enabled {
            Some(EventLogger::open(config.event_log.clone())?)
        } else {
            info!("Event logging is disabled");
            None
        };
        Ok(Self::new(perms, claims, logger))
    }

    /// Node check followed by the claim check. Tells the player why on denial.
    fn may_act(
        &self,
        player: &PluginPlayer,
        world: &str,
        pos: PluginBlockPos,
        node: &str,
        action: ClaimAction,
        api: &mut dyn ServerApi,
    ) -> bool {
        if !self.perms.has_permission(player.uuid, node) {
            api.send_message(&player.name, "You do not have permission to do that.");
            return false;
        }
        let chunk = ClaimChunk::from_block(world, pos.x, pos.z);
        let bypass = self.perms.has_permission(player.uuid, nodes::CLAIM_BYPASS);
        if !self.claims.can(player.uuid, &chunk, action, bypass) {
            debug!("{} denied {action} in {chunk}", player.name);
            api.send_message(&player.name, "This land is claimed.");
            return false;
        }
        true
    }

    fn record(&self, kind: EventKind, actor: &str, world: &str, pos: PluginBlockPos, block: &str) {
        if let Some(logger) = &self.logger {
            logger.record(LogEvent::now(
                kind,
                actor,
                world,
                BlockPos::new(pos.x, pos.y, pos.z),
                block,
            ));
        }
    }

    fn guard_block_change(
        &self,
        player: &PluginPlayer,
        world: &str,
        pos: PluginBlockPos,
        block: &str,
        kind: EventKind,
        api: &mut dyn ServerApi,
    ) -> EventResult {
        let action = match kind {
            EventKind::BlockPlace => ClaimAction::Build,
            _ => ClaimAction::Break,
        };
        if !self.may_act(player, world, pos, nodes::BUILD, action, api) {
            return EventResult::Cancelled;
        }
        self.record(kind, &player.name, world, pos, block);
        EventResult::Continue
    }

    fn run_cleanup(&self) {
        let Some(logger) = &self.logger else {
            return;
        };
        match logger.purge_expired() {
            Ok(0) => debug!("Event log cleanup: nothing expired"),
            Ok(n) => info!("Event log cleanup removed {n} rows"),
            Err(e) => warn!("Event log cleanup failed: {e}"),
        }
    }
}

/// Blocks that hold items and need the `containers` claim action.
pub fn is_container(block: &str) -> bool {
    let id = block.strip_prefix("minecraft:").unwrap_or(block);
    matches!(
        id,
        "chest"
            | "trapped_chest"
            | "barrel"
            | "furnace"
            | "blast_furnace"
            | "smoker"
            | "hopper"
            | "dropper"
            | "dispenser"
            | "brewing_stand"
            | "ender_chest"
    ) || id.ends_with("shulker_box")
}

impl Plugin for SewPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: PLUGIN_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Ranks, land claims and block history".into(),
            author: "Sew".into(),
        }
    }

    fn on_enable(&mut self, api: &mut dyn ServerApi) {
        for (name, description) in commands::COMMANDS {
            api.register_command(name, description, PLUGIN_NAME);
        }

        if let Some(logger) = &self.logger {
            let config = logger.config();
            if config.retention_secs().is_some() && config.cleanup_interval_secs > 0 {
                let interval = config.cleanup_interval_secs.saturating_mul(TICKS_PER_SECOND);
                api.schedule_repeating(PLUGIN_NAME, TICKS_PER_SECOND, interval, CLEANUP_TASK);
            }
        }
        info!(
            "Sew enabled: {} ranks, {} claimed chunks",
            self.perms.rank_ids().len(),
            self.claims.claimed_chunks()
        );
    }

    fn on_disable(&mut self) {
        if let Err(e) = self.claims.save() {
            error!("Failed to save claims: {e}");
        }
        if let Some(logger) = &self.logger {
            logger.shutdown();
        }
    }

    fn on_event(&mut self, event: &PluginEvent, api: &mut dyn ServerApi) -> EventResult {
        match event {
            PluginEvent::BlockBreak {
                player,
                world,
                position,
                block,
            } => self.guard_block_change(player, world, *position, block, EventKind::BlockBreak, api),
            PluginEvent::BlockPlace {
                player,
                world,
                position,
                block,
            } => self.guard_block_change(player, world, *position, block, EventKind::BlockPlace, api),
            PluginEvent::BlockInteract {
                player,
                world,
                position,
                block,
            } => {
                let action = if is_container(block) {
                    ClaimAction::Containers
                } else {
                    ClaimAction::Interact
                };
                if self.may_act(player, world, *position, nodes::INTERACT, action, api) {
                    EventResult::Continue
                } else {
                    EventResult::Cancelled
                }
            }
            PluginEvent::Explosion {
                source,
                world,
                blocks,
            } => {
                for (pos, block) in blocks {
                    self.record(EventKind::BlockExplode, source, world, *pos, block);
                }
                EventResult::Continue
            }
            PluginEvent::PlayerJoin { player } => {
                let label = self.perms.display_of(player.uuid);
                info!(
                    "{} joined as {}",
                    player.name,
                    label.as_deref().unwrap_or("a guest")
                );
                EventResult::Continue
            }
            PluginEvent::ServerStopping => {
                if let Some(Err(e)) = self.logger.as_ref().map(EventLogger::flush) {
                    warn!("Failed to flush the event log: {e}");
                }
                EventResult::Continue
            }
            PluginEvent::PlayerQuit { .. } | PluginEvent::ServerStarted => EventResult::Continue,
        }
    }

    fn on_task(&mut self, task_id: u32, _api: &mut dyn ServerApi) {
        if task_id == CLEANUP_TASK {
            self.run_cleanup();
        }
    }

    fn on_command(
        &mut self,
        command: &str,
        args: &[String],
        sender: &str,
        api: &mut dyn ServerApi,
    ) -> Option<String> {
        commands::execute(self, command, args, sender, api)
    }
}
