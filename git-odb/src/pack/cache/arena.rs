//! The allocation arena: per-pack pools of reusable inflation buffers (§4.8), plus a
//! single global pool for the "Unrecorded" case used during ingestion before a pack is
//! known by digest.
use git_hash::ObjectId;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Default number of buffers a pack's pool keeps around once they are returned.
pub const DEFAULT_POOL_SIZE: usize = 4;

struct Pool {
    free: Mutex<Vec<Vec<u8>>>,
    cap: usize,
}

impl Pool {
    fn new(cap: usize) -> Self {
        Pool {
            free: Mutex::new(Vec::new()),
            cap,
        }
    }

    fn acquire(self: &Arc<Self>, length: usize) -> Handle {
        let mut buf = {
            let mut free = self.free.lock().unwrap();
            free.pop()
        }
        .unwrap_or_default();
        // Buffer length never shrinks, even across different requested sizes.
        if buf.len() < length {
            buf.resize(length, 0);
        }
        Handle {
            pool: Some(self.clone()),
            buf: Some(buf),
        }
    }

    fn release(&self, buf: Vec<u8>) {
        let mut free = self.free.lock().unwrap();
        if free.len() < self.cap {
            free.push(buf);
        }
    }
}

/// A checked-out scratch buffer; returns itself to its pool when dropped.
pub struct Handle {
    pool: Option<Arc<Pool>>,
    buf: Option<Vec<u8>>,
}

impl std::ops::Deref for Handle {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer present until drop")
    }
}

impl std::ops::DerefMut for Handle {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer present until drop")
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let (Some(pool), Some(buf)) = (self.pool.take(), self.buf.take()) {
            pool.release(buf);
        }
    }
}

/// Per-pack buffer pools, created lazily the first time a given pack is touched.
pub struct Arena {
    pools: Mutex<HashMap<ObjectId, Arc<Pool>>>,
    /// The single global pool used before a pack's digest is known, e.g. while a first
    /// pass is still streaming an incoming pack during ingestion.
    unrecorded: Arc<Pool>,
    pool_size: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl Arena {
    pub fn new(pool_size: usize) -> Self {
        Arena {
            pools: Mutex::new(HashMap::new()),
            unrecorded: Arc::new(Pool::new(pool_size)),
            pool_size,
        }
    }

    /// Acquire a buffer of at least `length` bytes for `pack`. Buffers are pooled per pack
    /// digest so concurrent readers of the same pack reuse allocations.
    pub fn acquire(&self, pack: ObjectId, length: usize) -> Handle {
        let pool = {
            let mut pools = self.pools.lock().unwrap();
            pools
                .entry(pack)
                .or_insert_with(|| Arc::new(Pool::new(self.pool_size)))
                .clone()
        };
        pool.acquire(length)
    }

    /// Acquire a buffer for the "Unrecorded" case (the pack's digest is not yet known).
    /// All callers share one pool and, transitively, one mutex for its duration.
    pub fn acquire_unrecorded(&self, length: usize) -> Handle {
        self.unrecorded.acquire(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_reused_and_never_shrink() {
        let arena = Arena::new(2);
        let pack = git_hash::hash(b"pack");
        {
            let mut h = arena.acquire(pack, 10);
            assert_eq!(h.len(), 10);
            h[0] = 7;
        }
        let h2 = arena.acquire(pack, 4);
        assert_eq!(h2.len(), 10, "buffer length must not shrink below a previous request");
    }

    #[test]
    fn pools_are_kept_separate_per_pack() {
        let arena = Arena::new(4);
        let a = git_hash::hash(b"a");
        let b = git_hash::hash(b"b");
        let ha = arena.acquire(a, 100);
        let hb = arena.acquire(b, 5);
        assert_eq!(ha.len(), 100);
        assert_eq!(hb.len(), 5);
    }
}
