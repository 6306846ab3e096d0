//! Chat and console commands.

use sew_claims::{ClaimAction, ClaimChunk};
use sew_log::{unix_timestamp, BlockPos, EventKind, LogEvent};
use sew_perms::Decision;
use sew_plugin_api::{PluginBlockPos, PluginPlayer, ServerApi};
use tracing::{info, warn};
use uuid::Uuid;

use crate::sew_plugin::{nodes, SewPlugin};

/// Sender name used for commands typed into the server console.
pub const CONSOLE: &str = "CONSOLE";

/// Every command the plugin registers, with its description.
pub const COMMANDS: &[(&str, &str)] = &[
    ("rank", "Manage ranks and who holds them"),
    ("perm", "Grant, revoke or check permission nodes"),
    ("claim", "Claim the chunk you are standing in"),
    ("unclaim", "Release claimed land"),
    ("trust", "Let a player act inside your claim"),
    ("untrust", "Take a player's access to your claim away"),
    ("log", "Look up, roll back or purge block history"),
];

const DEFAULT_LOOKUP_LIMIT: usize = 10;

type Reply = Result<String, String>;

enum Source {
    Console,
    Player(PluginPlayer),
}

impl Source {
    fn holds(&self, plugin: &SewPlugin, node: &str) -> bool {
        match self {
            Source::Console => true,
            Source::Player(player) => plugin.perms.has_permission(player.uuid, node),
        }
    }

    fn require(&self, plugin: &SewPlugin, node: &str) -> Result<(), String> {
        if self.holds(plugin, node) {
            Ok(())
        } else {
            Err("You do not have permission to use this command.".into())
        }
    }

    fn player(&self) -> Result<&PluginPlayer, String> {
        match self {
            Source::Console => Err("Only players can use this command.".into()),
            Source::Player(player) => Ok(player),
        }
    }
}

pub(crate) fn execute(
    plugin: &SewPlugin,
    command: &str,
    args: &[String],
    sender: &str,
    api: &mut dyn ServerApi,
) -> Option<String> {
    let source = if sender == CONSOLE {
        Source::Console
    } else {
        match api.get_player(sender) {
            Some(player) => Source::Player(player),
            None => return Some(format!("Unknown sender {sender}.")),
        }
    };
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let reply = match command {
        "rank" => rank(plugin, &source, &args, api),
        "perm" => perm(plugin, &source, &args, api),
        "claim" => claim(plugin, &source, &args),
        "unclaim" => unclaim(plugin, &source, &args),
        "trust" => trust(plugin, &source, &args, api),
        "untrust" => untrust(plugin, &source, &args, api),
        "log" => log(plugin, &source, &args, api),
        _ => return None,
    };
    Some(reply.unwrap_or_else(|e| e))
}

/// A UUID literal, or the name of an online player.
fn target(arg: &str, api: &dyn ServerApi) -> Result<Uuid, String> {
    if let Ok(uuid) = arg.parse::<Uuid>() {
        return Ok(uuid);
    }
    api.get_player(arg)
        .map(|p| p.uuid)
        .ok_or_else(|| format!("Player {arg} is not online."))
}

// ─── rank / perm ─────────────────────────────────────────────────────────────

const RANK_USAGE: &str = "Usage: rank <list|info|create|delete|parent|assign|unassign|of|reload> ...";

fn rank(plugin: &SewPlugin, source: &Source, args: &[&str], api: &dyn ServerApi) -> Reply {
    source.require(plugin, nodes::MANAGE_RANKS)?;
    let perms = &plugin.perms;
    let fail = |e: sew_perms::PermError| e.to_string();

    match args {
        ["list"] => {
            let lines: Vec<String> = perms
                .rank_ids()
                .into_iter()
                .filter_map(|id| perms.rank(&id).map(|rank| (id, rank)))
                .map(|(id, rank)| match rank.display {
                    Some(display) => format!("{id} ({display}) <- {}", rank.parent),
                    None => format!("{id} <- {}", rank.parent),
                })
                .collect();
            Ok(lines.join("\n"))
        }
        ["info", id] => {
            let rank = perms.rank(id).ok_or_else(|| format!("Unknown rank {id}."))?;
            let nodes: Vec<&str> = rank.permissions.iter().map(String::as_str).collect();
            Ok(format!(
                "{id}: display {}, parent {}, nodes [{}]",
                rank.display.as_deref().unwrap_or("-"),
                rank.parent,
                nodes.join(", ")
            ))
        }
        ["create", id, display @ ..] => {
            let display = (!display.is_empty()).then(|| display.join(" "));
            perms.create_rank(id, display).map_err(fail)?;
            Ok(format!("Created rank {id}."))
        }
        ["delete", id] => {
            perms.delete_rank(id).map_err(fail)?;
            Ok(format!("Deleted rank {id}."))
        }
        ["parent", id, parent] => {
            perms.set_parent(id, parent).map_err(fail)?;
            Ok(format!("{id} now inherits from {parent}."))
        }
        ["assign", who, id] => {
            let uuid = target(who, api)?;
            if perms.assign(uuid, id).map_err(fail)? {
                Ok(format!("{who} now holds {id}."))
            } else {
                Ok(format!("{who} already holds {id}."))
            }
        }
        ["unassign", who, id] => {
            let uuid = target(who, api)?;
            if perms.unassign(uuid, id).map_err(fail)? {
                Ok(format!("{who} no longer holds {id}."))
            } else {
                Ok(format!("{who} does not hold {id}."))
            }
        }
        ["of", who] => {
            let uuid = target(who, api)?;
            Ok(format!("{who}: {}", perms.ranks_of(uuid).join(", ")))
        }
        ["reload"] => {
            let count = perms.reload().map_err(fail)?;
            info!("Ranks reloaded ({count} ranks)");
            Ok(format!("Reloaded {count} ranks."))
        }
        _ => Err(RANK_USAGE.into()),
    }
}

const PERM_USAGE: &str = "Usage: perm <grant|revoke|unset> <rank> <node> | perm check <player> <node>";

fn perm(plugin: &SewPlugin, source: &Source, args: &[&str], api: &dyn ServerApi) -> Reply {
    source.require(plugin, nodes::MANAGE_RANKS)?;
    let perms = &plugin.perms;
    let fail = |e: sew_perms::PermError| e.to_string();

    match args {
        ["grant", id, node] => {
            perms.set_node(id, node, Decision::Grant).map_err(fail)?;
            Ok(format!("{id} grants {node}."))
        }
        ["revoke", id, node] => {
            perms.set_node(id, node, Decision::Revoke).map_err(fail)?;
            Ok(format!("{id} revokes {node}."))
        }
        ["unset", id, node] => {
            if perms.unset_node(id, node).map_err(fail)? {
                Ok(format!("Removed {node} from {id}."))
            } else {
                Ok(format!("{id} has no decision for {node}."))
            }
        }
        ["check", who, node] => {
            let uuid = target(who, api)?;
            let verdict = if perms.has_permission(uuid, node) {
                "has"
            } else {
                "lacks"
            };
            Ok(format!("{who} {verdict} {node}."))
        }
        _ => Err(PERM_USAGE.into()),
    }
}

// ─── claims ──────────────────────────────────────────────────────────────────

fn chunk_of(player: &PluginPlayer) -> ClaimChunk {
    let pos = player.block_pos();
    ClaimChunk::from_block(player.world.as_str(), pos.x, pos.z)
}

fn save_claims(plugin: &SewPlugin) {
    if let Err(e) = plugin.claims.save() {
        warn!("Failed to save claims: {e}");
    }
}

/// Split a trailing `here` off `args`: the edit then targets one chunk.
fn scope<'a>(args: &'a [&'a str], player: &PluginPlayer) -> (&'a [&'a str], Option<ClaimChunk>) {
    match args.split_last() {
        Some((&"here", rest)) => (rest, Some(chunk_of(player))),
        _ => (args, None),
    }
}

fn parse_actions(args: &[&str]) -> Result<Vec<ClaimAction>, String> {
    if args.is_empty() {
        return Ok(ClaimAction::ALL.to_vec());
    }
    args.iter().map(|a| a.parse::<ClaimAction>()).collect()
}

const CLAIM_USAGE: &str = "Usage: claim [info|list|public <actions...|none> [here]]";

fn claim(plugin: &SewPlugin, source: &Source, args: &[&str]) -> Reply {
    source.require(plugin, nodes::CLAIM)?;
    let player = source.player()?;
    let claims = &plugin.claims;
    let fail = |e: sew_claims::ClaimError| e.to_string();

    match args {
        [] => {
            let chunk = chunk_of(player);
            claims.claim(player.uuid, chunk.clone()).map_err(fail)?;
            save_claims(plugin);
            Ok(format!("Claimed {chunk}."))
        }
        ["info"] => {
            let chunk = chunk_of(player);
            Ok(match claims.owner_at(&chunk) {
                Some(owner) if owner == player.uuid => format!("You own {chunk}."),
                Some(owner) => format!("{chunk} is claimed by {owner}."),
                None => format!("{chunk} is unclaimed."),
            })
        }
        ["list"] => {
            let record = claims
                .claim_of(player.uuid)
                .ok_or_else(|| "You do not own any claim.".to_string())?;
            let chunks: Vec<String> = record.chunks.keys().map(ToString::to_string).collect();
            Ok(format!("Your claim: {}", chunks.join(", ")))
        }
        ["public", rest @ ..] => {
            let (rest, chunk) = scope(rest, player);
            let actions = match rest {
                [] => return Err(CLAIM_USAGE.into()),
                ["none"] => Vec::new(),
                _ => parse_actions(rest)?,
            };
            claims
                .set_public(player.uuid, &actions, chunk.as_ref())
                .map_err(fail)?;
            save_claims(plugin);
            Ok("Public access updated.".into())
        }
        _ => Err(CLAIM_USAGE.into()),
    }
}

fn unclaim(plugin: &SewPlugin, source: &Source, args: &[&str]) -> Reply {
    source.require(plugin, nodes::CLAIM)?;
    let player = source.player()?;
    match args {
        [] => {
            let chunk = chunk_of(player);
            plugin
                .claims
                .unclaim(player.uuid, &chunk)
                .map_err(|e| e.to_string())?;
            save_claims(plugin);
            Ok(format!("Released {chunk}."))
        }
        ["all"] => {
            let released = plugin.claims.unclaim_all(player.uuid);
            save_claims(plugin);
            Ok(format!("Released {released} chunks."))
        }
        _ => Err("Usage: unclaim [all]".into()),
    }
}

fn trust(plugin: &SewPlugin, source: &Source, args: &[&str], api: &dyn ServerApi) -> Reply {
    source.require(plugin, nodes::CLAIM)?;
    let player = source.player()?;
    let [who, rest @ ..] = args else {
        return Err("Usage: trust <player> [actions...] [here]".into());
    };
    let uuid = target(who, api)?;
    let (rest, chunk) = scope(rest, player);
    let actions = parse_actions(rest)?;
    plugin
        .claims
        .trust(player.uuid, uuid, &actions, chunk.as_ref())
        .map_err(|e| e.to_string())?;
    save_claims(plugin);
    let names: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
    Ok(format!("Trusted {who} with {}.", names.join(", ")))
}

fn untrust(plugin: &SewPlugin, source: &Source, args: &[&str], api: &dyn ServerApi) -> Reply {
    source.require(plugin, nodes::CLAIM)?;
    let player = source.player()?;
    let (args, chunk) = scope(args, player);
    let [who] = args else {
        return Err("Usage: untrust <player> [here]".into());
    };
    let uuid = target(who, api)?;
    let removed = plugin
        .claims
        .untrust(player.uuid, uuid, chunk.as_ref())
        .map_err(|e| e.to_string())?;
    if removed {
        save_claims(plugin);
        Ok(format!("{who} is no longer trusted."))
    } else {
        Ok(format!("{who} was not trusted."))
    }
}

// ─── log ─────────────────────────────────────────────────────────────────────

const LOG_USAGE: &str =
    "Usage: log <lookup|rollback> [world] <x> <y> <z> [limit] | log purge [days] | log flush";

/// `[world] x y z`, the world defaulting to the sender's. Returns the remaining args.
fn location<'a>(
    source: &Source,
    args: &'a [&'a str],
) -> Result<(String, BlockPos, &'a [&'a str]), String> {
    let (world, coords) = match (args, source) {
        ([first, _, _, _, ..], _) if first.parse::<i32>().is_err() => {
            (first.to_string(), &args[1..])
        }
        (_, Source::Player(player)) => (player.world.clone(), args),
        (_, Source::Console) => return Err("The console must name a world.".into()),
    };
    let [x, y, z, rest @ ..] = coords else {
        return Err(LOG_USAGE.into());
    };

    let mut parsed = [0i32; 3];
    for (slot, raw) in parsed.iter_mut().zip([x, y, z]) {
        *slot = raw
            .parse()
            .map_err(|_| format!("`{raw}` is not a coordinate."))?;
    }
    let [x, y, z] = parsed;
    Ok((world, BlockPos::new(x, y, z), rest))
}

fn age(time: i64) -> String {
    let secs = (unix_timestamp() - time).max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}

fn describe(event: &LogEvent) -> String {
    format!(
        "{} ago: {} {} {}",
        age(event.time),
        event.actor,
        event.kind,
        event.block
    )
}

fn log(plugin: &SewPlugin, source: &Source, args: &[&str], api: &mut dyn ServerApi) -> Reply {
    source.require(plugin, nodes::MANAGE_LOG)?;
    let logger = plugin
        .logger
        .as_ref()
        .ok_or_else(|| "Event logging is disabled.".to_string())?;
    let fail = |e: sew_log::LogError| e.to_string();

    match args {
        ["lookup", rest @ ..] => {
            let (world, pos, rest) = location(source, rest)?;
            let limit = match rest.first() {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| format!("`{raw}` is not a number."))?,
                None => DEFAULT_LOOKUP_LIMIT,
            };
            let events = logger.lookup(&world, pos, limit).map_err(fail)?;
            if events.is_empty() {
                return Ok(format!("No history at {world} {pos}."));
            }
            let lines: Vec<String> = events.iter().map(describe).collect();
            Ok(format!("History of {world} {pos}:\n{}", lines.join("\n")))
        }
        ["rollback", rest @ ..] => {
            let (world, pos, _) = location(source, rest)?;
            let Some(newest) = logger.lookup(&world, pos, 1).map_err(fail)?.pop() else {
                return Ok(format!("No history at {world} {pos}."));
            };
            let restored = match newest.kind {
                EventKind::BlockBreak | EventKind::BlockExplode => newest.block.as_str(),
                EventKind::BlockPlace => "air",
            };
            api.set_block(&world, PluginBlockPos::new(pos.x, pos.y, pos.z), restored);
            info!("Rolled back {world} {pos} to {restored} ({})", describe(&newest));
            Ok(format!("Restored {restored} at {world} {pos}."))
        }
        ["purge"] => {
            let removed = logger.purge_expired().map_err(fail)?;
            Ok(format!("Purged {removed} expired events."))
        }
        ["purge", days] => {
            let days: u64 = days
                .parse()
                .map_err(|_| format!("`{days}` is not a number of days."))?;
            let window = i64::try_from(days)
                .ok()
                .and_then(|d| d.checked_mul(86_400))
                .ok_or_else(|| format!("{days} days is too long a window."))?;
            let removed = logger
                .purge_before(unix_timestamp().saturating_sub(window))
                .map_err(fail)?;
            Ok(format!("Purged {removed} events older than {days} days."))
        }
        ["flush"] => {
            logger.flush().map_err(fail)?;
            Ok("Event log flushed.".into())
        }
        _ => Err(LOG_USAGE.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_manager::{PendingAction, ServerApiImpl};
    use crate::sew_plugin::tests::{plugin, snapshot, ALICE, BOB};
    use sew_plugin_api::{Plugin, PluginEvent};

    fn run(plugin: &mut SewPlugin, sender: &str, line: &str) -> (String, Vec<PendingAction>) {
        let snapshot = snapshot();
        let mut api = ServerApiImpl::new(&snapshot);
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap();
        let args: Vec<String> = parts.map(String::from).collect();
        let reply = plugin
            .on_command(command, &args, sender, &mut api)
            .unwrap();
        (reply, api.take_actions())
    }

    fn say(plugin: &mut SewPlugin, sender: &str, line: &str) -> String {
        run(plugin, sender, line).0
    }

    #[test]
    fn console_manages_ranks() {
        let mut plugin = plugin();
        assert_eq!(say(&mut plugin, CONSOLE, "rank create admin Server Admin"), "Created rank admin.");
        assert_eq!(
            plugin.perms.rank("admin").unwrap().display.as_deref(),
            Some("Server Admin")
        );
        say(&mut plugin, CONSOLE, "perm grant admin sew.*");
        assert_eq!(say(&mut plugin, CONSOLE, "rank assign Alice admin"), "Alice now holds admin.");
        assert_eq!(say(&mut plugin, CONSOLE, "rank of Alice"), "Alice: admin, *");
        assert!(plugin.perms.has_permission(ALICE, nodes::MANAGE_LOG));
        assert_eq!(say(&mut plugin, CONSOLE, "perm check Bob sew.log"), "Bob lacks sew.log.");

        let reply = say(&mut plugin, CONSOLE, "rank parent admin admin");
        assert!(reply.contains("cannot be its own parent"), "{reply}");
        assert!(say(&mut plugin, CONSOLE, "rank info admin").contains("+sew.*"));
    }

    #[test]
    fn rank_commands_need_the_node() {
        let mut plugin = plugin();
        let reply = say(&mut plugin, "Bob", "rank create thief");
        assert_eq!(reply, "You do not have permission to use this command.");
        assert!(plugin.perms.rank("thief").is_none());
    }

    #[test]
    fn unknown_sender_and_bad_usage() {
        let mut plugin = plugin();
        assert_eq!(say(&mut plugin, "Mallory", "claim"), "Unknown sender Mallory.");
        assert_eq!(say(&mut plugin, CONSOLE, "rank"), RANK_USAGE);
        assert_eq!(say(&mut plugin, CONSOLE, "claim"), "Only players can use this command.");
    }

    #[test]
    fn claim_trust_flow() {
        let mut plugin = plugin();
        assert_eq!(say(&mut plugin, "Alice", "claim"), "Claimed overworld[0, 0].");
        let reply = say(&mut plugin, "Bob", "claim");
        assert!(reply.contains("already claimed"), "{reply}");
        assert_eq!(say(&mut plugin, "Alice", "claim info"), "You own overworld[0, 0].");

        let chunk = ClaimChunk::new("overworld", 0, 0);
        assert!(!plugin.claims.can(BOB, &chunk, ClaimAction::Build, false));
        assert_eq!(
            say(&mut plugin, "Alice", "trust Bob build break"),
            "Trusted Bob with build, break."
        );
        assert!(plugin.claims.can(BOB, &chunk, ClaimAction::Build, false));
        assert!(!plugin.claims.can(BOB, &chunk, ClaimAction::Containers, false));

        assert_eq!(say(&mut plugin, "Alice", "untrust Bob"), "Bob is no longer trusted.");
        assert!(!plugin.claims.can(BOB, &chunk, ClaimAction::Build, false));

        say(&mut plugin, "Alice", "claim public interact");
        assert!(plugin.claims.can(BOB, &chunk, ClaimAction::Interact, false));

        assert_eq!(say(&mut plugin, "Alice", "unclaim"), "Released overworld[0, 0].");
        assert!(plugin.claims.owner_at(&chunk).is_none());
    }

    #[test]
    fn trust_rejects_unknown_actions() {
        let mut plugin = plugin();
        say(&mut plugin, "Alice", "claim");
        let reply = say(&mut plugin, "Alice", "trust Bob fly");
        assert!(reply.contains("unknown claim action"), "{reply}");
    }

    #[test]
    fn log_lookup_and_rollback() {
        let mut plugin = plugin();
        let snapshot = snapshot();
        let mut api = ServerApiImpl::new(&snapshot);
        plugin.on_event(
            &PluginEvent::BlockBreak {
                player: snapshot.players[1].clone(),
                world: "overworld".into(),
                position: PluginBlockPos::new(3, 70, -2),
                block: "diamond_ore".into(),
            },
            &mut api,
        );

        let reply = say(&mut plugin, CONSOLE, "log lookup overworld 3 70 -2");
        assert!(reply.contains("Bob break diamond_ore"), "{reply}");
        let reply = say(&mut plugin, CONSOLE, "log lookup 3 70 -2");
        assert_eq!(reply, "The console must name a world.");

        let (reply, actions) = run(&mut plugin, CONSOLE, "log rollback overworld 3 70 -2");
        assert_eq!(reply, "Restored diamond_ore at overworld 3 70 -2.");
        assert!(matches!(
            &actions[..],
            [PendingAction::SetBlock { world, position, block }]
                if world == "overworld" && *position == PluginBlockPos::new(3, 70, -2) && block == "diamond_ore"
        ));
    }

    #[test]
    fn log_needs_node_and_purges() {
        let mut plugin = plugin();
        assert_eq!(
            say(&mut plugin, "Alice", "log flush"),
            "You do not have permission to use this command."
        );
        plugin.perms.create_rank("staff", None).unwrap();
        plugin
            .perms
            .set_node("staff", nodes::MANAGE_LOG, Decision::Grant)
            .unwrap();
        plugin.perms.assign(ALICE, "staff").unwrap();

        let logger = plugin.logger.as_ref().unwrap();
        logger.record(LogEvent {
            time: unix_timestamp() - 5 * 86_400,
            ..LogEvent::now(EventKind::BlockPlace, "Alice", "overworld", BlockPos::new(0, 0, 0), "dirt")
        });
        assert_eq!(say(&mut plugin, "Alice", "log purge"), "Purged 0 expired events.");
        assert_eq!(
            say(&mut plugin, "Alice", "log purge 2"),
            "Purged 1 events older than 2 days."
        );
        // Players default to their own world.
        assert_eq!(
            say(&mut plugin, "Alice", "log lookup 0 0 0"),
            "No history at overworld 0 0 0."
        );
    }

    #[test]
    fn log_purge_rejects_bad_windows() {
        let mut plugin = plugin();
        let logger = plugin.logger.as_ref().unwrap();
        logger.record(LogEvent::now(
            EventKind::BlockPlace,
            "Alice",
            "overworld",
            BlockPos::new(0, 0, 0),
            "dirt",
        ));

        assert_eq!(
            say(&mut plugin, CONSOLE, "log purge -1"),
            "`-1` is not a number of days."
        );
        assert_eq!(
            say(&mut plugin, CONSOLE, "log purge 999999999999999"),
            "999999999999999 days is too long a window."
        );
        let logger = plugin.logger.as_ref().unwrap();
        assert_eq!(logger.lookup("overworld", BlockPos::new(0, 0, 0), 10).unwrap().len(), 1);
    }
}
