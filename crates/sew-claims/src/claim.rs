//! Claim records and permission slices.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chunk column in a named world.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimChunk {
    pub world: String,
    pub x: i32,
    pub z: i32,
}

impl ClaimChunk {
    pub fn new(world: impl Into<String>, x: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            z,
        }
    }

    /// Chunk containing block column (`block_x`, `block_z`).
    pub fn from_block(world: impl Into<String>, block_x: i32, block_z: i32) -> Self {
        Self::new(world, block_x >> 4, block_z >> 4)
    }
}

impl fmt::Display for ClaimChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {}]", self.world, self.x, self.z)
    }
}

/// Something a non-owner may be allowed to do inside a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimAction {
    Build,
    Break,
    Interact,
    Containers,
}

impl ClaimAction {
    pub const ALL: [ClaimAction; 4] = [
        ClaimAction::Build,
        ClaimAction::Break,
        ClaimAction::Interact,
        ClaimAction::Containers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimAction::Build => "build",
            ClaimAction::Break => "break",
            ClaimAction::Interact => "interact",
            ClaimAction::Containers => "containers",
        }
    }
}

impl fmt::Display for ClaimAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown claim action `{s}`"))
    }
}

/// What everyone, and each trusted player, may do in part of a claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSlice {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub public: BTreeSet<ClaimAction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trusted: BTreeMap<Uuid, BTreeSet<ClaimAction>>,
}

impl PermissionSlice {
    pub fn allows(&self, actor: Uuid, action: ClaimAction) -> bool {
        self.public.contains(&action)
            || self
                .trusted
                .get(&actor)
                .is_some_and(|actions| actions.contains(&action))
    }

    pub fn trust(&mut self, who: Uuid, actions: impl IntoIterator<Item = ClaimAction>) {
        self.trusted.entry(who).or_default().extend(actions);
    }

    /// Returns whether `who` was trusted at all.
    pub fn untrust(&mut self, who: Uuid) -> bool {
        self.trusted.remove(&who).is_some()
    }
}

/// Every chunk one player owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub owner: Uuid,
    /// Claimed chunks; `Some` slices override `default_slice` for that chunk.
    #[serde(with = "chunk_entries")]
    pub chunks: BTreeMap<ClaimChunk, Option<PermissionSlice>>,
    #[serde(default)]
    pub default_slice: PermissionSlice,
}

impl ClaimRecord {
    pub fn new(owner: Uuid) -> Self {
        Self {
            owner,
            chunks: BTreeMap::new(),
            default_slice: PermissionSlice::default(),
        }
    }

    /// Slice governing `chunk`, or `None` if the chunk is not in this claim.
    pub fn slice_for(&self, chunk: &ClaimChunk) -> Option<&PermissionSlice> {
        self.chunks
            .get(chunk)
            .map(|slice| slice.as_ref().unwrap_or(&self.default_slice))
    }

    /// Slice to edit: the chunk's own (created from the default on first
    /// edit) or the default one.
    pub(crate) fn slice_mut(&mut self, chunk: Option<&ClaimChunk>) -> Option<&mut PermissionSlice> {
        match chunk {
            None => Some(&mut self.default_slice),
            Some(chunk) => {
                let default = &self.default_slice;
                self.chunks
                    .get_mut(chunk)
                    .map(|slice| slice.get_or_insert_with(|| default.clone()))
            }
        }
    }
}

/// Chunk maps are stored as a list because JSON keys must be strings.
mod chunk_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{ClaimChunk, PermissionSlice};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        #[serde(flatten)]
        chunk: ClaimChunk,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slice: Option<PermissionSlice>,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<ClaimChunk, Option<PermissionSlice>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter().map(|(chunk, slice)| Entry {
            chunk: chunk.clone(),
            slice: slice.clone(),
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ClaimChunk, Option<PermissionSlice>>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.chunk, e.slice)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Uuid = Uuid::from_u128(1);
    const FRIEND: Uuid = Uuid::from_u128(2);

    #[test]
    fn chunk_from_negative_block() {
        assert_eq!(ClaimChunk::from_block("w", -1, 15), ClaimChunk::new("w", -1, 0));
        assert_eq!(ClaimChunk::from_block("w", -16, 16), ClaimChunk::new("w", -1, 1));
        assert_eq!(ClaimChunk::from_block("w", -17, 0), ClaimChunk::new("w", -2, 0));
    }

    #[test]
    fn action_parsing() {
        assert_eq!("Build".parse::<ClaimAction>(), Ok(ClaimAction::Build));
        assert_eq!("containers".parse::<ClaimAction>(), Ok(ClaimAction::Containers));
        assert!("fly".parse::<ClaimAction>().is_err());
    }

    #[test]
    fn slice_checks_public_then_trusted() {
        let mut slice = PermissionSlice::default();
        slice.public.insert(ClaimAction::Interact);
        slice.trust(FRIEND, [ClaimAction::Build]);
        assert!(slice.allows(OWNER, ClaimAction::Interact));
        assert!(!slice.allows(OWNER, ClaimAction::Build));
        assert!(slice.allows(FRIEND, ClaimAction::Build));
        assert!(!slice.allows(FRIEND, ClaimAction::Containers));
        assert!(slice.untrust(FRIEND));
        assert!(!slice.allows(FRIEND, ClaimAction::Build));
    }

    #[test]
    fn chunk_slice_overrides_default() {
        let home = ClaimChunk::new("w", 0, 0);
        let farm = ClaimChunk::new("w", 1, 0);
        let mut record = ClaimRecord::new(OWNER);
        record.chunks.insert(home.clone(), None);
        record.chunks.insert(farm.clone(), None);
        record.default_slice.trust(FRIEND, [ClaimAction::Interact]);

        record
            .slice_mut(Some(&farm))
            .unwrap()
            .trust(FRIEND, [ClaimAction::Break]);

        assert!(!record.slice_for(&home).unwrap().allows(FRIEND, ClaimAction::Break));
        let farm_slice = record.slice_for(&farm).unwrap();
        assert!(farm_slice.allows(FRIEND, ClaimAction::Break));
        // Copied from the default when the chunk slice was created.
        assert!(farm_slice.allows(FRIEND, ClaimAction::Interact));
        assert!(record.slice_for(&ClaimChunk::new("w", 9, 9)).is_none());
    }

    #[test]
    fn record_json_lists_chunks() {
        let mut record = ClaimRecord::new(OWNER);
        record.chunks.insert(ClaimChunk::new("overworld", 3, -2), None);
        let mut slice = PermissionSlice::default();
        slice.public.insert(ClaimAction::Containers);
        record
            .chunks
            .insert(ClaimChunk::new("overworld", 4, -2), Some(slice));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["chunks"][0]["x"], 3);
        assert!(json["chunks"][0].get("slice").is_none());
        assert_eq!(json["chunks"][1]["slice"]["public"][0], "containers");

        let back: ClaimRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
