//! The five process-local LRUs interposed across the pack engine (§4.10): `objects`
//! (intermediate delta bases), `values` (fully decoded top-level objects), `packs` (open
//! pack handles), `indexes` (open index handles) and `revindexes` ((pack,offset)→digest).
//! Every entry is weighted 1 regardless of payload size, a known simplification (see
//! DESIGN.md); capacities default to 5 and are independently overridable.
pub mod arena;

use git_hash::ObjectId;
use lru::LruCache;
use std::{collections::BTreeMap, sync::Arc, sync::Mutex};

pub const DEFAULT_CAPACITY: usize = 5;

/// Memoizes intermediate (non-top-level) objects produced while walking a delta chain,
/// keyed by `(pack digest, base offset)` per §4.3's memoization note. Lookups are
/// best-effort: a miss just means the chain is walked again.
pub struct ObjectCache(Mutex<LruCache<(ObjectId, u64), (git_object::Kind, Arc<Vec<u8>>)>>);

impl ObjectCache {
    pub fn new(capacity: usize) -> Self {
        ObjectCache(Mutex::new(LruCache::new(capacity.max(1))))
    }

    pub fn get(&self, pack: ObjectId, offset: u64) -> Option<(git_object::Kind, Arc<Vec<u8>>)> {
        self.0.lock().unwrap().get(&(pack, offset)).cloned()
    }

    pub fn insert(&self, pack: ObjectId, offset: u64, kind: git_object::Kind, data: Arc<Vec<u8>>) {
        self.0.lock().unwrap().put((pack, offset), (kind, data));
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Caches fully decoded, top-level objects by their own digest, independent of which pack
/// (or the loose store) produced them.
pub struct ValueCache(Mutex<LruCache<ObjectId, (git_object::Kind, Arc<Vec<u8>>)>>);

impl ValueCache {
    pub fn new(capacity: usize) -> Self {
        ValueCache(Mutex::new(LruCache::new(capacity.max(1))))
    }

    pub fn get(&self, id: &ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)> {
        self.0.lock().unwrap().get(id).cloned()
    }

    pub fn insert(&self, id: ObjectId, kind: git_object::Kind, data: Arc<Vec<u8>>) {
        self.0.lock().unwrap().put(id, (kind, data));
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Keeps recently-used pack and index handles mapped in, keyed by pack digest, so repeated
/// reads against the same pack don't re-open and re-mmap its files.
pub struct HandleCache<T> {
    inner: Mutex<LruCache<ObjectId, Arc<T>>>,
}

impl<T> HandleCache<T> {
    pub fn new(capacity: usize) -> Self {
        HandleCache {
            inner: Mutex::new(LruCache::new(capacity.max(1))),
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<Arc<T>> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn insert(&self, id: ObjectId, value: Arc<T>) {
        self.inner.lock().unwrap().put(id, value);
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

impl<T> Default for HandleCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A pack's `(offset → digest)` mapping, the inverse of its index's `(digest → offset)`
/// table. Built lazily by walking the whole index once, then cached per pack digest since
/// rebuilding it is proportional to the pack's object count.
pub struct ReverseIndex(BTreeMap<u64, ObjectId>);

impl ReverseIndex {
    pub fn build(index: &super::index::File) -> Self {
        ReverseIndex(index.iter().map(|(id, offset, _crc32)| (offset, id)).collect())
    }

    pub fn digest_at(&self, offset: u64) -> Option<ObjectId> {
        self.0.get(&offset).copied()
    }
}

/// Bundles all five caches with a shared capacity policy; owned by the top-level façade.
pub struct Caches {
    pub objects: ObjectCache,
    pub values: ValueCache,
    pub packs: HandleCache<super::data::File>,
    pub indexes: HandleCache<super::index::File>,
    pub revindexes: HandleCache<ReverseIndex>,
}

impl Caches {
    pub fn new(capacity: usize) -> Self {
        Caches {
            objects: ObjectCache::new(capacity),
            values: ValueCache::new(capacity),
            packs: HandleCache::new(capacity),
            indexes: HandleCache::new(capacity),
            revindexes: HandleCache::new(capacity),
        }
    }

    /// Drop every cached entry, forcing subsequent reads to re-derive everything from disk.
    pub fn clear(&self) {
        self.objects.clear();
        self.values.clear();
        self.packs.clear();
        self.indexes.clear();
        self.revindexes.clear();
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_cache_evicts_least_recently_used() {
        let cache = ValueCache::new(2);
        let a = git_hash::hash(b"a");
        let b = git_hash::hash(b"b");
        let c = git_hash::hash(b"c");
        cache.insert(a, git_object::Kind::Blob, Arc::new(b"a".to_vec()));
        cache.insert(b, git_object::Kind::Blob, Arc::new(b"b".to_vec()));
        cache.insert(c, git_object::Kind::Blob, Arc::new(b"c".to_vec()));
        assert!(cache.get(&a).is_none(), "a should have been evicted for c");
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn clear_empties_every_cache() {
        let caches = Caches::new(5);
        caches.values.insert(git_hash::hash(b"x"), git_object::Kind::Blob, Arc::new(b"x".to_vec()));
        caches.clear();
        assert!(caches.values.get(&git_hash::hash(b"x")).is_none());
    }
}
