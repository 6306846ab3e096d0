//! Thread-safe, lazily loaded permission lookups.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::RankDocument;
use crate::error::PermError;
use crate::rank::{Decision, Rank};

/// Where the rank document lives.
enum RankSource {
    File(PathBuf),
    Memory(RwLock<RankDocument>),
}

/// Answers "does this player hold this node?" from a cached rank document.
///
/// The document is read on first use. Resolved answers are cached per
/// player until [`clear`](Self::clear), [`reload`](Self::reload) or any
/// mutation.
pub struct PermissionResolver {
    source: RankSource,
    document: RwLock<Option<Arc<RankDocument>>>,
    resolved: RwLock<HashMap<Uuid, HashMap<String, bool>>>,
    /// Bumped on every invalidation so a lookup racing a reload never
    /// caches an answer derived from the old document.
    generation: AtomicU64,
    /// Set while the cached document is the deny-all stand-in for a file
    /// that failed to load. Mutations must never save that stand-in.
    fallback: AtomicBool,
}

impl PermissionResolver {
    /// Back the resolver with a JSON file. Nothing is read until the first lookup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_source(RankSource::File(path.into()))
    }

    /// Keep the document in memory only.
    pub fn in_memory(document: RankDocument) -> Self {
        Self::with_source(RankSource::Memory(RwLock::new(document)))
    }

    fn with_source(source: RankSource) -> Self {
        Self {
            source,
            document: RwLock::new(None),
            resolved: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            fallback: AtomicBool::new(false),
        }
    }

    // ─── Lookups ────────────────────────────────────────────────────────────

    pub fn has_permission(&self, player: Uuid, node: &str) -> bool {
        if let Some(hit) = self
            .resolved
            .read()
            .get(&player)
            .and_then(|nodes| nodes.get(node))
        {
            return *hit;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let allowed = self.document().resolve(player, node);

        let mut resolved = self.resolved.write();
        if self.generation.load(Ordering::Acquire) == generation {
            resolved
                .entry(player)
                .or_default()
                .insert(node.to_string(), allowed);
        }
        allowed
    }

    /// Effective rank ids of `player`, highest priority first.
    pub fn ranks_of(&self, player: Uuid) -> Vec<String> {
        self.document()
            .rank_list(player)
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn display_of(&self, player: Uuid) -> Option<String> {
        self.document().display_of(player).map(String::from)
    }

    pub fn rank(&self, id: &str) -> Option<Rank> {
        self.document().ranks.get(id).cloned()
    }

    pub fn rank_ids(&self) -> Vec<String> {
        self.document().ranks.keys().cloned().collect()
    }

    // ─── Cache control ──────────────────────────────────────────────────────

    /// Drop the document and every cached answer. The next lookup re-reads.
    pub fn clear(&self) {
        *self.document.write() = None;
        self.fallback.store(false, Ordering::Release);
        self.invalidate();
    }

    /// Clear, then read the document right away. Returns the number of ranks.
    ///
    /// On error the cache stays empty, so later lookups fall back to a
    /// deny-all document until the file is fixed.
    pub fn reload(&self) -> Result<usize, PermError> {
        self.clear();
        let document = self.load()?;
        let count = document.ranks.len();
        *self.document.write() = Some(Arc::new(document));
        self.invalidate();
        info!("Reloaded {count} ranks");
        Ok(count)
    }

    fn invalidate(&self) {
        let mut resolved = self.resolved.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        resolved.clear();
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    pub fn create_rank(&self, id: &str, display: Option<String>) -> Result<(), PermError> {
        self.mutate(|doc| doc.create_rank(id, display))
    }

    pub fn delete_rank(&self, id: &str) -> Result<Rank, PermError> {
        self.mutate(|doc| doc.delete_rank(id))
    }

    /// Fails with [`PermError::SelfParent`] before touching anything when `id == parent`.
    pub fn set_parent(&self, id: &str, parent: &str) -> Result<(), PermError> {
        if id == parent {
            return Err(PermError::SelfParent(id.to_string()));
        }
        self.mutate(|doc| doc.set_parent(id, parent))
    }

    pub fn set_node(&self, id: &str, node: &str, decision: Decision) -> Result<(), PermError> {
        self.mutate(|doc| doc.set_node(id, node, decision))
    }

    pub fn unset_node(&self, id: &str, node: &str) -> Result<bool, PermError> {
        self.mutate(|doc| doc.unset_node(id, node))
    }

    pub fn assign(&self, player: Uuid, id: &str) -> Result<bool, PermError> {
        self.mutate(|doc| doc.assign(player, id))
    }

    pub fn unassign(&self, player: Uuid, id: &str) -> Result<bool, PermError> {
        self.mutate(|doc| Ok(doc.unassign(player, id)))
    }

    /// Apply `f` to a copy of the document, persist it, then swap it in.
    ///
    /// While the source fails to load, the load error is returned and the
    /// source is left untouched.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut RankDocument) -> Result<T, PermError>,
    ) -> Result<T, PermError> {
        let mut slot = self.document.write();
        let mut document = match slot.as_deref() {
            Some(doc) if !self.fallback.load(Ordering::Acquire) => doc.clone(),
            _ => self.load()?,
        };
        let out = f(&mut document)?;
        self.persist(&document)?;
        *slot = Some(Arc::new(document));
        self.fallback.store(false, Ordering::Release);
        drop(slot);
        self.invalidate();
        Ok(out)
    }

    // ─── Storage ────────────────────────────────────────────────────────────

    fn document(&self) -> Arc<RankDocument> {
        if let Some(doc) = self.document.read().as_ref() {
            return Arc::clone(doc);
        }

        let mut slot = self.document.write();
        // Another thread may have loaded it while we waited.
        if let Some(doc) = slot.as_ref() {
            return Arc::clone(doc);
        }
        let document = match self.load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Failed to load ranks, denying all permissions: {e}");
                self.fallback.store(true, Ordering::Release);
                RankDocument::empty()
            }
        };
        let document = Arc::new(document);
        *slot = Some(Arc::clone(&document));
        document
    }

    fn load(&self) -> Result<RankDocument, PermError> {
        match &self.source {
            RankSource::File(path) => load_file(path),
            RankSource::Memory(doc) => Ok(doc.read().clone()),
        }
    }

    fn persist(&self, document: &RankDocument) -> Result<(), PermError> {
        match &self.source {
            RankSource::File(path) => {
                fs::write(path, document.to_json()?)?;
                debug!("Saved {} ranks to {}", document.ranks.len(), path.display());
            }
            RankSource::Memory(doc) => *doc.write() = document.clone(),
        }
        Ok(())
    }
}

fn load_file(path: &Path) -> Result<RankDocument, PermError> {
    if !path.exists() {
        info!("{} not found, using default ranks", path.display());
        return Ok(RankDocument::with_defaults());
    }
    let contents = fs::read_to_string(path)?;
    let document = RankDocument::from_json(&contents)?;
    info!(
        "Loaded {} ranks and {} players from {}",
        document.ranks.len(),
        document.players.len(),
        path.display()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    const ALICE: Uuid = Uuid::from_u128(0xA11CE);
    const BOB: Uuid = Uuid::from_u128(0xB0B);

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// A fresh directory under the system temp dir, removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let n = DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir()
                .join(format!("sew_perms_test_{}_{n}", std::process::id()));
            let _ = fs::remove_dir_all(&path);
            fs::create_dir_all(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn write_ranks(path: &Path, json: &str) {
        fs::write(path, json).unwrap();
    }

    #[test]
    fn wildcard_grant_without_assignment() {
        let mut doc = RankDocument::empty();
        doc.set_node("*", "world.interact", Decision::Grant).unwrap();
        let resolver = PermissionResolver::in_memory(doc);
        assert!(resolver.has_permission(ALICE, "world.interact"));
        assert!(!resolver.has_permission(ALICE, "world.build"));
    }

    #[test]
    fn missing_file_uses_defaults_lazily() {
        let dir = TempDir::new();
        let resolver = PermissionResolver::open(dir.0.join("ranks.json"));
        assert!(resolver.has_permission(ALICE, "world.build"));
        assert!(resolver.has_permission(ALICE, "claims.claim"));
        assert!(!resolver.has_permission(ALICE, "claims.bypass"));
        // Lookups alone never write the file.
        assert!(!dir.0.join("ranks.json").exists());
    }

    #[test]
    fn reload_forces_rederivation() {
        let dir = TempDir::new();
        let path = dir.0.join("ranks.json");
        write_ranks(&path, r#"{ "ranks": { "*": { "permissions": ["+world.build"] } } }"#);

        let resolver = PermissionResolver::open(&path);
        assert!(resolver.has_permission(ALICE, "world.build"));

        write_ranks(&path, r#"{ "ranks": { "*": { "permissions": ["-world.build"] } } }"#);
        // Still served from cache.
        assert!(resolver.has_permission(ALICE, "world.build"));

        assert_eq!(resolver.reload().unwrap(), 1);
        assert!(!resolver.has_permission(ALICE, "world.build"));
    }

    #[test]
    fn clear_drops_document_and_answers() {
        let dir = TempDir::new();
        let path = dir.0.join("ranks.json");
        write_ranks(&path, r#"{ "ranks": { "*": { "permissions": ["+chat"] } } }"#);
        let resolver = PermissionResolver::open(&path);
        assert!(resolver.has_permission(BOB, "chat"));

        write_ranks(&path, r#"{ "ranks": { "*": { "permissions": [] } } }"#);
        resolver.clear();
        assert!(!resolver.has_permission(BOB, "chat"));
    }

    #[test]
    fn broken_file_denies_and_reports() {
        let dir = TempDir::new();
        let path = dir.0.join("ranks.json");
        write_ranks(&path, "{ not json");
        let resolver = PermissionResolver::open(&path);
        assert!(!resolver.has_permission(ALICE, "world.build"));
        assert!(matches!(resolver.reload(), Err(PermError::Json(_))));
    }

    #[test]
    fn broken_file_is_never_overwritten() {
        let dir = TempDir::new();
        let path = dir.0.join("ranks.json");
        let broken = r#"{ "ranks": { "admin": { "permissions": ["+*"] }, "*": { "permissions": [] }, } }"#;
        write_ranks(&path, broken);

        let resolver = PermissionResolver::open(&path);
        assert!(!resolver.has_permission(ALICE, "world.build"));
        assert!(matches!(
            resolver.create_rank("vip", None),
            Err(PermError::Json(_))
        ));
        assert!(resolver.assign(ALICE, "admin").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), broken);

        // Once the file is fixed, mutations build on its contents.
        write_ranks(&path, r#"{ "ranks": { "admin": { "permissions": ["+*"] }, "*": { "permissions": [] } } }"#);
        resolver.create_rank("vip", None).unwrap();
        let saved = fs::read_to_string(&path).unwrap();
        assert!(saved.contains("admin") && saved.contains("vip"));
    }

    #[test]
    fn self_parent_fails_fast() {
        let resolver = PermissionResolver::in_memory(RankDocument::with_defaults());
        resolver.create_rank("mod", None).unwrap();
        assert!(matches!(
            resolver.set_parent("mod", "mod"),
            Err(PermError::SelfParent(_))
        ));
        assert_eq!(resolver.rank("mod").unwrap().parent, "*");
    }

    #[test]
    fn revoke_beats_inherited_grant() {
        let resolver = PermissionResolver::in_memory(RankDocument::with_defaults());
        resolver.create_rank("builder", None).unwrap();
        resolver.create_rank("probation", None).unwrap();
        resolver
            .set_node("builder", "world.build", Decision::Grant)
            .unwrap();
        resolver.set_parent("probation", "builder").unwrap();
        resolver.assign(ALICE, "probation").unwrap();
        assert!(resolver.has_permission(ALICE, "world.build"));

        resolver
            .set_node("probation", "world.build", Decision::Revoke)
            .unwrap();
        assert!(!resolver.has_permission(ALICE, "world.build"));
    }

    #[test]
    fn mutations_invalidate_cached_answers() {
        let resolver = PermissionResolver::in_memory(RankDocument::with_defaults());
        resolver.create_rank("admin", Some("[Admin]".into())).unwrap();
        resolver.set_node("admin", "*", Decision::Grant).unwrap();
        assert!(!resolver.has_permission(BOB, "claims.bypass"));

        resolver.assign(BOB, "admin").unwrap();
        assert!(resolver.has_permission(BOB, "claims.bypass"));
        assert_eq!(resolver.ranks_of(BOB), vec!["admin", "*"]);
        assert_eq!(resolver.display_of(BOB).as_deref(), Some("[Admin]"));

        resolver.unassign(BOB, "admin").unwrap();
        assert!(!resolver.has_permission(BOB, "claims.bypass"));
    }

    #[test]
    fn mutations_persist_to_file() {
        let dir = TempDir::new();
        let path = dir.0.join("ranks.json");
        let resolver = PermissionResolver::open(&path);
        resolver.create_rank("vip", Some("[VIP]".into())).unwrap();
        resolver.assign(ALICE, "vip").unwrap();

        let reopened = PermissionResolver::open(&path);
        assert_eq!(reopened.ranks_of(ALICE), vec!["vip", "*"]);
        // Defaults were carried into the saved file.
        assert!(reopened.has_permission(ALICE, "world.build"));
    }

    #[test]
    fn failed_mutation_changes_nothing() {
        let resolver = PermissionResolver::in_memory(RankDocument::with_defaults());
        assert!(resolver.assign(ALICE, "ghost").is_err());
        assert!(resolver.delete_rank("*").is_err());
        assert_eq!(resolver.rank_ids(), vec!["*"]);
    }

    #[test]
    fn concurrent_readers_agree() {
        let resolver = Arc::new(PermissionResolver::in_memory(
            RankDocument::with_defaults(),
        ));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = Arc::clone(&resolver);
                thread::spawn(move || {
                    let player = Uuid::from_u128(i);
                    (0..100).all(|_| {
                        resolver.has_permission(player, "world.build")
                            && !resolver.has_permission(player, "claims.bypass")
                    })
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
