//! The object database: the top-level façade (§2, §4.6-§4.10) composing the loose backend,
//! the multi-pack aggregate, the caches and allocation arena, ingestion and repack into a
//! single `Store` rooted at a repository's git directory.
#![forbid(unsafe_code)]

pub mod error;
pub mod ingest;
pub mod loose;
pub mod pack;

pub use error::Error;

use git_features::fs::{Filesystem, StdBackend};
use git_hash::ObjectId;
use git_object::{Kind, Object};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

pub type Result<T> = std::result::Result<T, Error>;

/// A content-addressed object store: a loose backend, every pack found under
/// `objects/pack/` at open time, the five caches of §4.10, and the allocation arena of
/// §4.8, all rooted at one repository git directory (the parent of `objects/` and `tmp/`).
pub struct Store {
    git_dir: PathBuf,
    objects_root: PathBuf,
    loose: loose::Store,
    engine: pack::engine::Engine,
    caches: pack::cache::Caches,
    arena: pack::cache::arena::Arena,
}

impl Store {
    /// Open the object database rooted at `git_dir`, creating `objects/`, `objects/pack/`
    /// and `tmp/` if they do not exist yet, and registering every `(pack, index)` pair
    /// already present under `objects/pack/`.
    pub fn at(git_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_dir = git_dir.into();
        let objects_root = git_dir.join("objects");
        let backend = StdBackend::default();
        backend
            .create_dir_all(&objects_root.join("pack"))
            .map_err(|err| Error::FsIo("create objects/pack", objects_root.join("pack"), err))?;
        backend
            .create_dir_all(&objects_root.join("info"))
            .map_err(|err| Error::FsIo("create objects/info", objects_root.join("info"), err))?;
        backend
            .create_dir_all(&git_dir.join("tmp"))
            .map_err(|err| Error::FsIo("create tmp dir", git_dir.join("tmp"), err))?;

        let store = Store {
            git_dir,
            loose: loose::Store::at(&objects_root),
            objects_root,
            engine: pack::engine::Engine::default(),
            caches: pack::cache::Caches::default(),
            arena: pack::cache::arena::Arena::default(),
        };
        store.load_packs()?;
        Ok(store)
    }

    /// Open and register every `pack-*.idx`/`pack-*.pack` pair found under `objects/pack/`.
    /// A pack whose index fails to open or cross-check is skipped and logged rather than
    /// failing the whole open, matching §4.3's "a pack without a valid index MUST NOT be
    /// consulted for reads" rather than treating it as a hard error at startup.
    fn load_packs(&self) -> Result<()> {
        let pack_dir = self.objects_root.join("pack");
        let backend = StdBackend::default();
        for entry in backend
            .dir_contents(&pack_dir)
            .map_err(|err| Error::FsIo("list objects/pack", pack_dir.clone(), err))?
        {
            if entry.extension().map(|ext| ext == "idx").unwrap_or(false) {
                let pack_path = entry.with_extension("pack");
                if !pack_path.is_file() {
                    continue;
                }
                match pack::bundle::Bundle::at(&pack_path, &entry) {
                    Ok(bundle) => self.engine.register(bundle),
                    Err(err) => log::warn!("skipping pack at {}: {}", pack_path.display(), err),
                }
            }
        }
        Ok(())
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// `true` if `id` is present in any registered pack or in the loose store.
    pub fn mem(&self, id: &ObjectId) -> bool {
        self.engine.mem(id) || self.loose.mem(id)
    }

    /// Every object digest known to the store, de-duplicated across every pack and the
    /// loose backend.
    pub fn list(&self) -> Result<Vec<ObjectId>> {
        let mut out = self.engine.list();
        out.extend(self.loose.list()?);
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// The inflated size of `id`, routing pack first then loose (§2's control flow),
    /// without reconstructing the object's body when a pack entry is a base kind (§4.2) or
    /// fully inflating a loose object's body (§4.1).
    pub fn size(&self, id: &ObjectId) -> Result<u64> {
        if let Some(size) = self.engine.size(id)? {
            return Ok(size);
        }
        self.loose.size(id).map_err(Error::from)
    }

    /// The kind of `id`, without necessarily reading its whole body twice: this is a thin
    /// wrapper over [`Self::read_inflated`] since neither backend exposes kind-only lookup
    /// cheaper than a full read once a delta chain is involved.
    pub fn kind(&self, id: &ObjectId) -> Result<Kind> {
        self.read_inflated(id).map(|(kind, _)| kind)
    }

    /// Fully reconstruct and decode `id` into its typed [`Object`] (§6's `read`).
    pub fn read(&self, id: &ObjectId) -> Result<Object> {
        let (kind, data) = self.read_inflated(id)?;
        Object::from_bytes(kind, &data).map_err(Error::from)
    }

    /// Fully reconstruct `id`'s inflated payload, trying the `values` cache, then every
    /// registered pack (pack first, per §2), then the loose store, populating the cache on
    /// the way out (§4.10's cache-transparency property: warm and cold reads agree).
    pub fn read_inflated(&self, id: &ObjectId) -> Result<(Kind, Vec<u8>)> {
        if let Some((kind, data)) = self.caches.values.get(id) {
            return Ok((kind, (*data).clone()));
        }

        let resolve_loose = |missing: &ObjectId| -> Option<(Kind, Arc<Vec<u8>>)> {
            self.loose.read_inflated(missing).ok().map(|(kind, data)| (kind, Arc::new(data)))
        };

        if let Some((kind, data)) = self.engine.read(id, &self.caches, &self.arena, &resolve_loose)? {
            self.caches.values.insert(*id, kind, Arc::new(data.clone()));
            return Ok((kind, data));
        }

        let (kind, data) = self.loose.read_inflated(id)?;
        self.caches.values.insert(*id, kind, Arc::new(data.clone()));
        Ok((kind, data))
    }

    /// Serialize and write `object` to the loose store (§6's `write`); idempotent, per
    /// §3's invariant, since two calls with an equal object always produce the same digest.
    pub fn write(&self, object: &Object) -> Result<(ObjectId, u32)> {
        self.loose.write(object).map_err(Error::from)
    }

    /// Write pre-encoded `bytes` of kind `kind` to the loose store without requiring the
    /// caller to build a typed [`Object`] first — the path a delta base write or a thin
    /// network payload takes.
    pub fn write_inflated(&self, kind: Kind, bytes: &[u8]) -> Result<(ObjectId, u32)> {
        self.loose.write_inflated(kind, bytes).map_err(Error::from)
    }

    /// Every object currently in the store, fully decoded. Proportional to store size;
    /// intended for small repositories, tests, or tooling, not hot paths.
    pub fn contents(&self) -> Result<Vec<(ObjectId, Object)>> {
        self.list()?.into_iter().map(|id| self.read(&id).map(|object| (id, object))).collect()
    }

    /// Walk every object reachable from `root`, visiting each exactly once, folding `f`
    /// over an accumulated state. A tag is followed to its target; a commit to its tree and
    /// parents; a tree to its entries; a blob has no further reachable objects. Used by
    /// callers (e.g. a push implementation) that need "everything reachable from this ref"
    /// without re-deriving that traversal themselves.
    pub fn fold<S>(&self, root: &ObjectId, start: S, mut f: impl FnMut(S, &ObjectId, &Object) -> Result<S>) -> Result<S> {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![*root];
        let mut state = start;
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let object = self.read(&id)?;
            match &object {
                Object::Commit(commit) => {
                    stack.push(commit.tree);
                    stack.extend(commit.parents.iter().copied());
                }
                Object::Tag(tag) => stack.push(tag.target),
                Object::Tree(tree) => stack.extend(tree.entries().iter().map(|entry| entry.oid)),
                Object::Blob(_) => {}
            }
            state = f(state, &id, &object)?;
        }
        Ok(state)
    }

    /// Like [`Self::fold`], for callers that only need a side effect per visited object.
    pub fn iter(&self, root: &ObjectId, mut f: impl FnMut(&ObjectId, &Object) -> Result<()>) -> Result<()> {
        self.fold(root, (), |(), id, object| f(id, object))
    }

    /// Stream an incoming pack to a temp file, validate and index it, publish it into
    /// `objects/pack/`, and register it with the engine (§4.7). Objects already present via
    /// the loose store or another registered pack are available to resolve `ref-delta`
    /// bases a thin pack leaves dangling.
    pub fn ingest_pack(&self, reader: impl std::io::Read, stall_limit: usize) -> Result<(ObjectId, u32)> {
        let resolve_external = |id: &ObjectId| -> Option<(Kind, Arc<Vec<u8>>)> {
            self.read_inflated(id).ok().map(|(kind, data)| (kind, Arc::new(data)))
        };
        let (digest, count) = ingest::from_stream(&self.git_dir, reader, stall_limit, &resolve_external)?;
        let bundle = ingest::open_published(&self.git_dir, &digest)?;
        self.engine.register(bundle);
        self.caches.clear();
        Ok((digest, count))
    }

    /// Collapse every object currently reachable (loose or packed) into a single new pack
    /// (§4.5), the only form of repack this core performs (full garbage collection is a
    /// Non-goal). On success every previously registered pack and every loose object now
    /// covered by the new pack is deleted, so the new pack becomes the sole, superseding
    /// source of truth (§3's write-once-but-supersedable lifecycle).
    pub fn repack(&self, window: usize, depth_cap: usize) -> Result<(ObjectId, u32)> {
        let ids = self.list()?;
        let mut objects = Vec::with_capacity(ids.len());
        for id in &ids {
            let (kind, data) = self.read_inflated(id)?;
            objects.push(pack::data::output::ObjectToPack { kind, data });
        }
        let (pack_bytes, outcome) = pack::data::output::make(&objects, window, depth_cap);

        // Validate the freshly produced bytes the same way an incoming pack is first-passed,
        // catching a planner defect before it is ever published (§4.4).
        pack::data::input::run(&pack_bytes)?;

        let index_bytes = pack::index::write::build(
            outcome
                .entries
                .iter()
                .map(|entry| pack::index::write::Entry {
                    id: entry.id,
                    offset: entry.offset,
                    crc32: entry.crc32,
                })
                .collect(),
            outcome.pack_digest,
        );

        let backend = StdBackend::default();
        let tmp_dir = self.git_dir.join("tmp");
        backend.create_dir_all(&tmp_dir).map_err(|err| Error::FsIo("create tmp dir", tmp_dir.clone(), err))?;
        let tmp_pack = tmp_dir.join(format!("repack-{:x}.pack", rand::random::<u64>()));
        let tmp_index = tmp_dir.join(format!("repack-{:x}.idx", rand::random::<u64>()));
        std::fs::write(&tmp_pack, &pack_bytes).map_err(|err| Error::FsIo("write temp pack", tmp_pack.clone(), err))?;
        std::fs::write(&tmp_index, &index_bytes).map_err(|err| Error::FsIo("write temp index", tmp_index.clone(), err))?;

        let pack_dir = self.objects_root.join("pack");
        backend.create_dir_all(&pack_dir).map_err(|err| Error::FsIo("create objects/pack", pack_dir.clone(), err))?;
        let digest_hex = outcome.pack_digest.to_hex();
        let pack_path = pack_dir.join(format!("pack-{}.pack", digest_hex));
        let index_path = pack_dir.join(format!("pack-{}.idx", digest_hex));

        // Index published before the pack, same ordering as ingestion, so a concurrent
        // reader never observes a pack file without a matching index.
        backend.rename(&tmp_index, &index_path).map_err(|err| Error::FsIo("publish index", index_path.clone(), err))?;
        backend.rename(&tmp_pack, &pack_path).map_err(|err| Error::FsIo("publish pack", pack_path.clone(), err))?;

        let previous = self.engine.snapshot_paths();
        let bundle = pack::bundle::Bundle::at(&pack_path, &index_path)?;
        let new_digest = bundle.pack.digest;
        self.engine.register(bundle);

        for (digest, old_pack_path, old_index_path) in previous {
            if digest == new_digest {
                continue;
            }
            self.engine.unregister(&digest);
            let _ = std::fs::remove_file(&old_pack_path);
            let _ = std::fs::remove_file(&old_index_path);
        }
        for id in &ids {
            if self.loose.mem(id) {
                self.loose.remove(id)?;
            }
        }
        self.caches.clear();

        log::info!("repacked {} objects into pack-{}", outcome.entries.len(), digest_hex);
        Ok((new_digest, outcome.entries.len() as u32))
    }

    /// Drop every entry from every cache (§4.10's `clear_caches`), without touching disk.
    pub fn clear_caches(&self) {
        self.caches.clear();
    }

    /// §4.10's `reset`: drop every cache, unregister every pack, and truncate `objects/`
    /// back to an empty, freshly laid-out directory. References are the caller's (the
    /// top-level façade's) responsibility, since this store has no notion of `refs/`.
    pub fn reset(&self) -> Result<()> {
        self.caches.clear();
        self.engine.clear();
        if self.objects_root.is_dir() {
            std::fs::remove_dir_all(&self.objects_root).map_err(|err| Error::FsIo("truncate objects dir", self.objects_root.clone(), err))?;
        }
        let backend = StdBackend::default();
        backend
            .create_dir_all(&self.objects_root.join("pack"))
            .map_err(|err| Error::FsIo("create objects/pack", self.objects_root.join("pack"), err))?;
        backend
            .create_dir_all(&self.objects_root.join("info"))
            .map_err(|err| Error::FsIo("create objects/info", self.objects_root.join("info"), err))?;
        Ok(())
    }
}
