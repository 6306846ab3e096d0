//! A single rank and its node decisions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::document::WILDCARD;
use crate::error::PermError;

/// Outcome a rank assigns to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Grant,
    Revoke,
}

impl Decision {
    fn prefix(self) -> char {
        match self {
            Decision::Grant => '+',
            Decision::Revoke => '-',
        }
    }

    pub fn is_grant(self) -> bool {
        self == Decision::Grant
    }
}

/// A named group of node decisions with a single parent.
///
/// The identifier is the key the rank is stored under in the
/// [`RankDocument`](crate::RankDocument).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default = "default_parent")]
    pub parent: String,
    /// Nodes prefixed with `+` (grant) or `-` (revoke).
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

fn default_parent() -> String {
    WILDCARD.to_string()
}

impl Default for Rank {
    fn default() -> Self {
        Self {
            display: None,
            parent: default_parent(),
            permissions: BTreeSet::new(),
        }
    }
}

impl Rank {
    pub fn with_display(display: Option<String>) -> Self {
        Self {
            display,
            ..Self::default()
        }
    }

    /// Decision this rank alone makes for `node`, ignoring its parents.
    ///
    /// The exact node is consulted first, then `a.b.*`, `a.*` and finally `*`.
    /// A rank holding both `+x` and `-x` revokes.
    pub fn decision(&self, node: &str) -> Option<Decision> {
        candidates(node)
            .iter()
            .find_map(|candidate| self.exact_decision(candidate))
    }

    fn exact_decision(&self, node: &str) -> Option<Decision> {
        if self.permissions.contains(&format!("-{node}")) {
            Some(Decision::Revoke)
        } else if self.permissions.contains(&format!("+{node}")) {
            Some(Decision::Grant)
        } else {
            None
        }
    }

    /// Record `decision` for `node`, replacing an opposite decision.
    pub fn set(&mut self, node: &str, decision: Decision) -> Result<(), PermError> {
        validate_node(node)?;
        self.permissions.remove(&format!("+{node}"));
        self.permissions.remove(&format!("-{node}"));
        self.permissions
            .insert(format!("{}{node}", decision.prefix()));
        Ok(())
    }

    /// Drop any decision for `node`. Returns whether one existed.
    pub fn unset(&mut self, node: &str) -> bool {
        let granted = self.permissions.remove(&format!("+{node}"));
        let revoked = self.permissions.remove(&format!("-{node}"));
        granted || revoked
    }

    /// Unprefixed entries from hand-edited files count as grants.
    pub(crate) fn normalize(&mut self) {
        self.permissions = std::mem::take(&mut self.permissions)
            .into_iter()
            .map(|entry| {
                if entry.starts_with('+') || entry.starts_with('-') {
                    entry
                } else {
                    format!("+{entry}")
                }
            })
            .collect();
    }
}

/// Node lookup order: `a.b.c`, `a.b.*`, `a.*`, `*`.
fn candidates(node: &str) -> Vec<String> {
    let mut out = vec![node.to_string()];
    let mut rest = node;
    while let Some(idx) = rest.rfind('.') {
        rest = &rest[..idx];
        out.push(format!("{rest}.*"));
    }
    if node != WILDCARD {
        out.push(WILDCARD.to_string());
    }
    out
}

fn validate_node(node: &str) -> Result<(), PermError> {
    if node.is_empty()
        || node.starts_with('+')
        || node.starts_with('-')
        || node.chars().any(char::is_whitespace)
    {
        return Err(PermError::InvalidNode(node.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(nodes: &[&str]) -> Rank {
        Rank {
            permissions: nodes.iter().map(|n| n.to_string()).collect(),
            ..Rank::default()
        }
    }

    #[test]
    fn candidate_order() {
        assert_eq!(
            candidates("world.build.stone"),
            vec!["world.build.stone", "world.build.*", "world.*", "*"]
        );
        assert_eq!(candidates("*"), vec!["*"]);
    }

    #[test]
    fn exact_node_beats_wildcard_in_same_rank() {
        let r = rank(&["+*", "-world.build"]);
        assert_eq!(r.decision("world.build"), Some(Decision::Revoke));
        assert_eq!(r.decision("world.interact"), Some(Decision::Grant));
    }

    #[test]
    fn prefix_wildcard_applies_to_children() {
        let r = rank(&["-claims.*"]);
        assert_eq!(r.decision("claims.bypass"), Some(Decision::Revoke));
        assert_eq!(r.decision("world.build"), None);
    }

    #[test]
    fn conflicting_entries_revoke() {
        let r = rank(&["+chat", "-chat"]);
        assert_eq!(r.decision("chat"), Some(Decision::Revoke));
    }

    #[test]
    fn set_replaces_opposite_decision() {
        let mut r = rank(&["+world.build"]);
        r.set("world.build", Decision::Revoke).unwrap();
        assert_eq!(r.permissions.len(), 1);
        assert!(r.permissions.contains("-world.build"));
        assert!(r.unset("world.build"));
        assert!(!r.unset("world.build"));
    }

    #[test]
    fn set_rejects_bad_nodes() {
        let mut r = Rank::default();
        assert!(matches!(r.set("", Decision::Grant), Err(PermError::InvalidNode(_))));
        assert!(matches!(r.set("+a", Decision::Grant), Err(PermError::InvalidNode(_))));
        assert!(matches!(r.set("a b", Decision::Grant), Err(PermError::InvalidNode(_))));
    }

    #[test]
    fn normalize_prefixes_bare_entries() {
        let mut r = rank(&["world.build", "-chat"]);
        r.normalize();
        assert!(r.permissions.contains("+world.build"));
        assert!(r.permissions.contains("-chat"));
    }
}
