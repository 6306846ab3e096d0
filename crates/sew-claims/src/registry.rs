//! In-memory claim cache with JSON persistence.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::claim::{ClaimAction, ClaimChunk, ClaimRecord, PermissionSlice};
use crate::error::ClaimError;

#[derive(Default)]
struct ClaimIndex {
    by_owner: HashMap<Uuid, ClaimRecord>,
    owners: HashMap<ClaimChunk, Uuid>,
}

impl ClaimIndex {
    /// Build the indexes from saved records. A chunk listed under two owners
    /// stays with the first. Repeated records for one owner are merged.
    fn from_records(records: Vec<ClaimRecord>) -> Self {
        let mut index = Self::default();
        for mut record in records {
            let owner = record.owner;
            record.chunks.retain(|chunk, _| match index.owners.get(chunk) {
                Some(previous) if *previous != owner => {
                    warn!("Chunk {chunk} claimed by both {previous} and {owner}, keeping {previous}");
                    false
                }
                _ => true,
            });
            for chunk in record.chunks.keys() {
                index.owners.insert(chunk.clone(), owner);
            }
            match index.by_owner.get_mut(&owner) {
                Some(existing) => {
                    warn!("Merging duplicate claim record for {owner}");
                    existing.chunks.extend(record.chunks);
                }
                None => {
                    index.by_owner.insert(owner, record);
                }
            }
        }
        index
    }
}

#[derive(Serialize, Deserialize)]
struct ClaimFile {
    #[serde(default)]
    claims: Vec<ClaimRecord>,
}

/// All claims, keyed by owner, with a chunk → owner index for lookups.
pub struct ClaimRegistry {
    path: Option<PathBuf>,
    max_chunks: usize,
    inner: RwLock<ClaimIndex>,
}

impl ClaimRegistry {
    /// A registry that is never written to disk.
    pub fn in_memory(max_chunks: usize) -> Self {
        Self {
            path: None,
            max_chunks,
            inner: RwLock::new(ClaimIndex::default()),
        }
    }

    /// Load claims from `path`. A missing file yields an empty registry.
    pub fn load(path: impl Into<PathBuf>, max_chunks: usize) -> Result<Self, ClaimError> {
        let path = path.into();
        let records = read_records(&path)?;
        info!("Loaded {} claims from {}", records.len(), path.display());
        Ok(Self {
            path: Some(path),
            max_chunks,
            inner: RwLock::new(ClaimIndex::from_records(records)),
        })
    }

    /// Write every claim to the backing file. No-op for in-memory registries.
    pub fn save(&self) -> Result<(), ClaimError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = {
            let inner = self.inner.read();
            let mut claims: Vec<ClaimRecord> = inner.by_owner.values().cloned().collect();
            claims.sort_by_key(|c| c.owner);
            ClaimFile { claims }
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        debug!("Saved {} claims to {}", file.claims.len(), path.display());
        Ok(())
    }

    // ─── Lookups ────────────────────────────────────────────────────────────

    pub fn owner_at(&self, chunk: &ClaimChunk) -> Option<Uuid> {
        self.inner.read().owners.get(chunk).copied()
    }

    pub fn claim_of(&self, owner: Uuid) -> Option<ClaimRecord> {
        self.inner.read().by_owner.get(&owner).cloned()
    }

    pub fn claimed_chunks(&self) -> usize {
        self.inner.read().owners.len()
    }

    /// Whether `actor` may perform `action` in `chunk`.
    ///
    /// Unclaimed chunks are open to everyone; owners and `bypass` holders may
    /// do anything. Otherwise the chunk's permission slice decides.
    pub fn can(&self, actor: Uuid, chunk: &ClaimChunk, action: ClaimAction, bypass: bool) -> bool {
        let inner = self.inner.read();
        let Some(owner) = inner.owners.get(chunk) else {
            return true;
        };
        if *owner == actor || bypass {
            return true;
        }
        inner
            .by_owner
            .get(owner)
            .and_then(|record| record.slice_for(chunk))
            .is_some_and(|slice| slice.allows(actor, action))
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    pub fn claim(&self, owner: Uuid, chunk: ClaimChunk) -> Result<(), ClaimError> {
        let mut inner = self.inner.write();
        if let Some(current) = inner.owners.get(&chunk) {
            return Err(ClaimError::AlreadyClaimed {
                chunk,
                owner: *current,
            });
        }
        let held = inner.by_owner.get(&owner).map_or(0, |r| r.chunks.len());
        if held >= self.max_chunks {
            return Err(ClaimError::LimitReached {
                limit: self.max_chunks,
            });
        }
        inner.owners.insert(chunk.clone(), owner);
        inner
            .by_owner
            .entry(owner)
            .or_insert_with(|| ClaimRecord::new(owner))
            .chunks
            .insert(chunk, None);
        Ok(())
    }

    pub fn unclaim(&self, owner: Uuid, chunk: &ClaimChunk) -> Result<(), ClaimError> {
        let mut inner = self.inner.write();
        if inner.owners.get(chunk) != Some(&owner) {
            return Err(ClaimError::NotOwner(chunk.clone()));
        }
        inner.owners.remove(chunk);
        let now_empty = match inner.by_owner.get_mut(&owner) {
            Some(record) => {
                record.chunks.remove(chunk);
                record.chunks.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.by_owner.remove(&owner);
        }
        Ok(())
    }

    /// Release every chunk `owner` holds. Returns how many were released.
    pub fn unclaim_all(&self, owner: Uuid) -> usize {
        let mut inner = self.inner.write();
        let Some(record) = inner.by_owner.remove(&owner) else {
            return 0;
        };
        for chunk in record.chunks.keys() {
            inner.owners.remove(chunk);
        }
        record.chunks.len()
    }

    /// Let `who` perform `actions`, claim-wide or in one chunk.
    pub fn trust(
        &self,
        owner: Uuid,
        who: Uuid,
        actions: &[ClaimAction],
        chunk: Option<&ClaimChunk>,
    ) -> Result<(), ClaimError> {
        self.edit_slice(owner, chunk, |slice| {
            slice.trust(who, actions.iter().copied());
            true
        })
        .map(|_| ())
    }

    /// Returns whether `who` had been trusted there.
    pub fn untrust(
        &self,
        owner: Uuid,
        who: Uuid,
        chunk: Option<&ClaimChunk>,
    ) -> Result<bool, ClaimError> {
        self.edit_slice(owner, chunk, |slice| slice.untrust(who))
    }

    /// Replace what everyone may do, claim-wide or in one chunk.
    pub fn set_public(
        &self,
        owner: Uuid,
        actions: &[ClaimAction],
        chunk: Option<&ClaimChunk>,
    ) -> Result<(), ClaimError> {
        self.edit_slice(owner, chunk, |slice| {
            slice.public = actions.iter().copied().collect();
            true
        })
        .map(|_| ())
    }

    fn edit_slice(
        &self,
        owner: Uuid,
        chunk: Option<&ClaimChunk>,
        f: impl FnOnce(&mut PermissionSlice) -> bool,
    ) -> Result<bool, ClaimError> {
        let mut inner = self.inner.write();
        let record = inner.by_owner.get_mut(&owner).ok_or(ClaimError::NoClaim)?;
        let Some(slice) = record.slice_mut(chunk) else {
            return Err(chunk.map_or(ClaimError::NoClaim, |c| ClaimError::NotOwner(c.clone())));
        };
        Ok(f(slice))
    }
}

fn read_records(path: &Path) -> Result<Vec<ClaimRecord>, ClaimError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path)?;
    let file: ClaimFile = serde_json::from_str(&contents)?;
    Ok(file.claims)
}
