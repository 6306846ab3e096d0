//! The rank document: every rank plus each player's assignments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PermError;
use crate::rank::{Decision, Rank};

/// Identifier of the rank every player holds.
pub const WILDCARD: &str = "*";

/// Serialized form of `ranks.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankDocument {
    #[serde(default)]
    pub ranks: BTreeMap<String, Rank>,
    /// Player → assigned rank ids, highest priority first.
    #[serde(default)]
    pub players: BTreeMap<Uuid, Vec<String>>,
}

impl RankDocument {
    /// A document holding only an empty wildcard rank: denies everything.
    pub fn empty() -> Self {
        let mut doc = Self::default();
        doc.ranks.insert(WILDCARD.to_string(), Rank::default());
        doc
    }

    /// Used when no rank file exists yet.
    pub fn with_defaults() -> Self {
        let mut doc = Self::empty();
        if let Some(wildcard) = doc.ranks.get_mut(WILDCARD) {
            for node in ["world.build", "world.interact", "claims.claim"] {
                wildcard.permissions.insert(format!("+{node}"));
            }
        }
        doc
    }

    pub fn from_json(json: &str) -> Result<Self, PermError> {
        let mut doc: Self = serde_json::from_str(json)?;
        for rank in doc.ranks.values_mut() {
            rank.normalize();
        }
        doc.ranks.entry(WILDCARD.to_string()).or_default();
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, PermError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject self-parented ranks (other than the wildcard root) and cycles.
    fn validate(&self) -> Result<(), PermError> {
        for (id, rank) in &self.ranks {
            if id != WILDCARD && rank.parent == *id {
                return Err(PermError::SelfParent(id.clone()));
            }
            if self.reaches(&rank.parent, id) {
                return Err(PermError::ParentCycle {
                    rank: id.clone(),
                    parent: rank.parent.clone(),
                });
            }
        }
        Ok(())
    }

    /// Whether walking up from `start` ever reaches `target`.
    fn reaches(&self, start: &str, target: &str) -> bool {
        if start == target && start == WILDCARD {
            return false;
        }
        self.chain(start).iter().any(|(id, _)| *id == target)
    }

    /// `id` followed by its ancestors. Stops at a self-parented root, an
    /// unknown parent or a repeat.
    fn chain<'a>(&'a self, id: &'a str) -> Vec<(&'a str, &'a Rank)> {
        let mut out: Vec<(&str, &Rank)> = Vec::new();
        let mut current = id;
        while let Some(rank) = self.ranks.get(current) {
            if out.iter().any(|(seen, _)| *seen == current) {
                break;
            }
            out.push((current, rank));
            if rank.parent == current {
                break;
            }
            current = rank.parent.as_str();
        }
        out
    }

    /// Decision of rank `id` for `node`: the rank itself first, then its parents.
    pub fn chain_decision(&self, id: &str, node: &str) -> Option<Decision> {
        self.chain(id)
            .into_iter()
            .find_map(|(_, rank)| rank.decision(node))
    }

    /// Effective ranks of `player`, highest priority first. Unknown ids are
    /// skipped and the wildcard rank always comes last.
    pub fn rank_list(&self, player: Uuid) -> Vec<&str> {
        let mut list: Vec<&str> = Vec::new();
        if let Some(assigned) = self.players.get(&player) {
            for id in assigned {
                if id != WILDCARD && self.ranks.contains_key(id) && !list.contains(&id.as_str()) {
                    list.push(id);
                }
            }
        }
        if self.ranks.contains_key(WILDCARD) {
            list.push(WILDCARD);
        }
        list
    }

    /// Whether `player` holds `node`.
    ///
    /// Ranks are visited from lowest to highest priority and the last one
    /// with an opinion wins, so a higher rank's grant overrides a lower
    /// rank's revoke and the other way round.
    pub fn resolve(&self, player: Uuid, node: &str) -> bool {
        let mut verdict = None;
        for id in self.rank_list(player).into_iter().rev() {
            if let Some(decision) = self.chain_decision(id, node) {
                verdict = Some(decision);
            }
        }
        verdict.is_some_and(Decision::is_grant)
    }

    /// Display label of the highest-priority rank that has one.
    pub fn display_of(&self, player: Uuid) -> Option<&str> {
        self.rank_list(player)
            .into_iter()
            .find_map(|id| self.ranks.get(id).and_then(|r| r.display.as_deref()))
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    pub fn create_rank(&mut self, id: &str, display: Option<String>) -> Result<(), PermError> {
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(PermError::InvalidRankId(id.to_string()));
        }
        if self.ranks.contains_key(id) {
            return Err(PermError::RankExists(id.to_string()));
        }
        self.ranks.insert(id.to_string(), Rank::with_display(display));
        Ok(())
    }

    /// Remove a rank. Its children are re-parented to its own parent.
    pub fn delete_rank(&mut self, id: &str) -> Result<Rank, PermError> {
        if id == WILDCARD {
            return Err(PermError::WildcardRank);
        }
        let removed = self
            .ranks
            .remove(id)
            .ok_or_else(|| PermError::UnknownRank(id.to_string()))?;
        for rank in self.ranks.values_mut() {
            if rank.parent == id {
                rank.parent = removed.parent.clone();
            }
        }
        for assigned in self.players.values_mut() {
            assigned.retain(|r| r != id);
        }
        self.players.retain(|_, assigned| !assigned.is_empty());
        Ok(removed)
    }

    pub fn set_parent(&mut self, id: &str, parent: &str) -> Result<(), PermError> {
        if id == parent {
            return Err(PermError::SelfParent(id.to_string()));
        }
        if !self.ranks.contains_key(parent) {
            return Err(PermError::UnknownRank(parent.to_string()));
        }
        if !self.ranks.contains_key(id) {
            return Err(PermError::UnknownRank(id.to_string()));
        }
        if self.reaches(parent, id) {
            return Err(PermError::ParentCycle {
                rank: id.to_string(),
                parent: parent.to_string(),
            });
        }
        if let Some(rank) = self.ranks.get_mut(id) {
            rank.parent = parent.to_string();
        }
        Ok(())
    }

    pub fn set_node(&mut self, id: &str, node: &str, decision: Decision) -> Result<(), PermError> {
        self.ranks
            .get_mut(id)
            .ok_or_else(|| PermError::UnknownRank(id.to_string()))?
            .set(node, decision)
    }

    pub fn unset_node(&mut self, id: &str, node: &str) -> Result<bool, PermError> {
        Ok(self
            .ranks
            .get_mut(id)
            .ok_or_else(|| PermError::UnknownRank(id.to_string()))?
            .unset(node))
    }

    /// Give `player` rank `id` at the highest priority. No-op if already held.
    pub fn assign(&mut self, player: Uuid, id: &str) -> Result<bool, PermError> {
        if !self.ranks.contains_key(id) {
            return Err(PermError::UnknownRank(id.to_string()));
        }
        let assigned = self.players.entry(player).or_default();
        if assigned.iter().any(|r| r == id) {
            return Ok(false);
        }
        assigned.insert(0, id.to_string());
        Ok(true)
    }

    pub fn unassign(&mut self, player: Uuid, id: &str) -> bool {
        let Some(assigned) = self.players.get_mut(&player) else {
            return false;
        };
        let before = assigned.len();
        assigned.retain(|r| r != id);
        let removed = assigned.len() != before;
        if assigned.is_empty() {
            self.players.remove(&player);
        }
        removed
    }
}
