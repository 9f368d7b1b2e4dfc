//! The multi-pack aggregate (§4.6): routes lookups across every registered `(pack, index)`
//! bundle and owns their transactional registration, newest pack first so a repack's
//! superseding pack shadows the one it replaces until the old one is physically removed.
use super::{bundle::Bundle, cache};
use crate::Error;
use git_hash::ObjectId;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    sync::RwLock,
};

struct Registered {
    digest: ObjectId,
    bundle: Bundle,
}

/// Aggregates every pack currently known to the store. Registration is append-only from the
/// caller's perspective; a repack registers its new pack and then asks the store to drop the
/// superseded ones once every live object has been confirmed reachable through the new pack.
#[derive(Default)]
pub struct Engine {
    packs: RwLock<Vec<Registered>>,
}

impl Engine {
    pub fn register(&self, bundle: Bundle) {
        let digest = bundle.pack.digest;
        let mut packs = self.packs.write().unwrap();
        packs.retain(|r| r.digest != digest);
        packs.insert(0, Registered { digest, bundle });
    }

    pub fn unregister(&self, digest: &ObjectId) {
        self.packs.write().unwrap().retain(|r| &r.digest != digest);
    }

    /// Drop every registered pack, without touching anything on disk. Used by `reset`
    /// (§4.10), which truncates `objects/` itself immediately afterwards.
    pub fn clear(&self) {
        self.packs.write().unwrap().clear();
    }

    /// Every registered pack's digest alongside its pack and index file paths, used by
    /// repack (§4.5/§3) to find the files a superseding pack makes obsolete.
    pub fn snapshot_paths(&self) -> Vec<(ObjectId, PathBuf, PathBuf)> {
        self.packs
            .read()
            .unwrap()
            .iter()
            .map(|r| (r.digest, r.bundle.pack.path.clone(), r.bundle.index.path.clone()))
            .collect()
    }

    pub fn is_registered(&self, digest: &ObjectId) -> bool {
        self.packs.read().unwrap().iter().any(|r| &r.digest == digest)
    }

    pub fn mem(&self, id: &ObjectId) -> bool {
        self.packs.read().unwrap().iter().any(|r| r.bundle.lookup(id).is_some())
    }

    /// Every object digest reachable through any registered pack; callers fold this
    /// together with the loose store's own listing for the façade's `list()`.
    pub fn list(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        for registered in self.packs.read().unwrap().iter() {
            out.extend(registered.bundle.index.iter().map(|(id, _, _)| id));
        }
        out
    }

    pub fn size(&self, id: &ObjectId) -> Result<Option<u64>, Error> {
        for registered in self.packs.read().unwrap().iter() {
            if let Some((_, offset)) = registered.bundle.lookup(id) {
                return Ok(Some(registered.bundle.size_at(offset)?));
            }
        }
        Ok(None)
    }

    /// Read and fully reconstruct `id` from whichever registered pack contains it.
    /// `resolve_loose` is consulted for `ref-delta` bases absent from every open pack, as
    /// is common for thin packs straight off the wire.
    pub fn read(
        &self,
        id: &ObjectId,
        caches: &cache::Caches,
        arena: &cache::arena::Arena,
        resolve_loose: &dyn Fn(&ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)>,
    ) -> Result<Option<(git_object::Kind, Vec<u8>)>, Error> {
        let packs = self.packs.read().unwrap();
        for registered in packs.iter() {
            if let Some((_, offset)) = registered.bundle.lookup(id) {
                // A ref-delta base missing from this pack is looked for in the loose store
                // first, then in every other open pack's own (non-chaining) resolution.
                let resolve_across_packs = |missing: &ObjectId| -> Option<(git_object::Kind, Arc<Vec<u8>>)> {
                    if let Some(hit) = resolve_loose(missing) {
                        return Some(hit);
                    }
                    for other in packs.iter() {
                        if let Some((_, other_offset)) = other.bundle.lookup(missing) {
                            if let Ok((kind, data)) = other.bundle.reconstruct(other_offset, caches, arena, &resolve_loose) {
                                return Some((kind, Arc::new(data)));
                            }
                        }
                    }
                    log::warn!(
                        "ref-delta base {} for object {} not found in the loose store or any other open pack",
                        missing,
                        id
                    );
                    None
                };
                let (kind, data) = registered.bundle.reconstruct(offset, caches, arena, &resolve_across_packs)?;
                return Ok(Some((kind, data)));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{data, index};
    use std::io::Write;

    fn zlib(payload: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn write_single_blob_bundle(dir: &Path, name: &str, payload: &[u8]) -> (Bundle, ObjectId) {
        let mut pack = Vec::new();
        pack.extend_from_slice(&data::parse::write_header(1));
        data::Header::Blob.write_to(payload.len() as u64, &mut pack).unwrap();
        pack.extend(zlib(payload));
        let pack_digest = git_hash::hash(&pack);
        pack.extend_from_slice(pack_digest.as_bytes());

        let id = git_object::compute_hash(git_object::Kind::Blob, payload);
        let index_bytes = index::write::build(
            vec![index::write::Entry { id, offset: 12, crc32: 0 }],
            pack_digest,
        );

        let pack_path = dir.join(format!("{}.pack", name));
        let index_path = dir.join(format!("{}.idx", name));
        std::fs::write(&pack_path, &pack).unwrap();
        std::fs::write(&index_path, &index_bytes).unwrap();
        (Bundle::at(&pack_path, &index_path).unwrap(), id)
    }

    #[test]
    fn reads_route_to_the_pack_that_contains_the_object() {
        let dir = tempfile::tempdir().unwrap();
        let (bundle_a, id_a) = write_single_blob_bundle(dir.path(), "a", b"first object");
        let (bundle_b, id_b) = write_single_blob_bundle(dir.path(), "b", b"second object");

        let engine = Engine::default();
        engine.register(bundle_a);
        engine.register(bundle_b);

        let caches = cache::Caches::default();
        let arena = cache::arena::Arena::default();
        let no_loose = |_: &ObjectId| None;

        let (kind, data) = engine.read(&id_a, &caches, &arena, &no_loose).unwrap().unwrap();
        assert_eq!(kind, git_object::Kind::Blob);
        assert_eq!(data, b"first object");

        let (_, data) = engine.read(&id_b, &caches, &arena, &no_loose).unwrap().unwrap();
        assert_eq!(data, b"second object");

        assert!(engine.mem(&id_a));
        assert_eq!(engine.list().len(), 2);
        assert!(engine.read(&git_hash::hash(b"absent"), &caches, &arena, &no_loose).unwrap().is_none());
    }
}
