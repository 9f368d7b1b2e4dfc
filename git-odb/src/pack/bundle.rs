//! Pairs a pack file with its index and resolves entries end to end: header parse, inflate,
//! and (for delta entries) recursive base reconstruction across `ofs-delta` and `ref-delta`
//! chains (§4.2/§4.3).
use super::{cache, data, delta, index};
use crate::Error;
use git_hash::ObjectId;
use std::{path::Path, sync::Arc};

/// Chains longer than this are treated as corrupt rather than walked forever; real packs
/// never approach it, so this is a backstop against cyclic or adversarial input, not a
/// meaningful planning parameter (compare the encoder's caller-supplied depth budget `D`).
const MAX_DELTA_DEPTH: usize = 1000;

/// A pack and its index, opened together and cross-checked once at load time.
pub struct Bundle {
    pub pack: data::File,
    pub index: index::File,
}

/// Looks up a ref-delta base that isn't present in the current pack: first the loose store,
/// then any other open pack. Returning `None` surfaces as [`Error::MissingBase`], which is
/// not fatal to the caller.
pub trait ResolveBase {
    fn resolve(&self, id: &ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)>;
}

impl<F> ResolveBase for F
where
    F: Fn(&ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)>,
{
    fn resolve(&self, id: &ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)> {
        self(id)
    }
}

impl Bundle {
    /// Open `index_path` first (cheap, small file) and use its recorded pack digest both to
    /// open `pack_path` and to verify the pack's own trailing digest once mapped.
    pub fn at(pack_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<Self, Error> {
        let index = index::File::at(index_path)?;
        let pack = data::File::at(pack_path, index.pack_digest())?;
        let data = pack.data();
        if data.len() < ObjectId::LEN {
            return Err(Error::PackDecode("pack file is too short to contain a trailing digest"));
        }
        let trailer = ObjectId::from_bytes(&data[data.len() - ObjectId::LEN..])?;
        if trailer != index.pack_digest() {
            return Err(Error::PackDecode("pack trailing digest does not match the digest recorded in its index"));
        }
        Ok(Bundle { pack, index })
    }

    pub fn lookup(&self, id: &ObjectId) -> Option<(u32, u64)> {
        self.index.lookup(id)
    }

    /// This pack's offset→digest mapping (§3's "Reverse index"), built by walking the
    /// index once and cached per pack digest in `caches.revindexes` so repeated
    /// reconstructions don't re-walk it.
    fn reverse_index(&self, caches: &cache::Caches) -> Arc<cache::ReverseIndex> {
        if let Some(hit) = caches.revindexes.get(&self.pack.digest) {
            return hit;
        }
        let built = Arc::new(cache::ReverseIndex::build(&self.index));
        caches.revindexes.insert(self.pack.digest, built.clone());
        built
    }

    /// The reconstructed size of the object at `offset`, without reconstructing it: for a
    /// base kind this is the header's own inflated length, for a delta entry it is the
    /// result-size recorded in the *outermost* delta's header, which is always the final
    /// object's true size regardless of how deep the chain runs underneath it.
    pub fn size_at(&self, offset: u64) -> Result<u64, Error> {
        let data = self.pack.data();
        let (header, inflated_size, _header_size) = data::Header::from_bytes_at(data, offset as usize)?;
        match header {
            data::Header::Commit | data::Header::Tree | data::Header::Blob | data::Header::Tag => Ok(inflated_size),
            data::Header::OfsDelta { .. } | data::Header::RefDelta { .. } => {
                // `inflated_size` here is the size of the delta *instruction stream*, whose
                // own header carries the real result size as its second varint; peeking at
                // just those bytes avoids inflating the whole thing.
                let mut buf = Vec::new();
                data::decode::entry_at_into(data, offset as usize, &mut buf)?;
                let (_base_size, pos) = read_size(&buf)?;
                let (result_size, _) = read_size(&buf[pos..])?;
                Ok(result_size)
            }
        }
    }

    /// Fully reconstruct the object at `offset`, following its delta chain if any.
    /// `resolve_base` is consulted only for `ref-delta` bases this pack's own index cannot
    /// locate; `caches.objects` memoizes intermediate bases keyed by `(pack digest, offset)`.
    pub fn reconstruct(
        &self,
        offset: u64,
        caches: &cache::Caches,
        arena: &cache::arena::Arena,
        resolve_base: &dyn ResolveBase,
    ) -> Result<(git_object::Kind, Vec<u8>), Error> {
        let (kind, data) = self.reconstruct_inner(offset, caches, arena, resolve_base, 0)?;
        Ok((kind, data.as_ref().clone()))
    }

    fn reconstruct_inner(
        &self,
        offset: u64,
        caches: &cache::Caches,
        arena: &cache::arena::Arena,
        resolve_base: &dyn ResolveBase,
        depth: usize,
    ) -> Result<(git_object::Kind, Arc<Vec<u8>>), Error> {
        if depth > MAX_DELTA_DEPTH {
            return Err(Error::DeltaCycle);
        }
        if let Some(hit) = caches.objects.get(self.pack.digest, offset) {
            return Ok(hit);
        }

        let pack_bytes = self.pack.data();
        let mut scratch = arena.acquire(self.pack.digest, 0);
        let (header, _entry_len) = data::decode::entry_at_into(pack_bytes, offset as usize, &mut scratch)?;

        let result = match header {
            data::Header::Commit | data::Header::Tree | data::Header::Blob | data::Header::Tag => {
                let kind = header.to_kind().expect("base kinds always map to an object kind");
                (kind, Arc::new(scratch.clone()))
            }
            data::Header::OfsDelta { base_distance } => {
                let base_offset = offset
                    .checked_sub(base_distance)
                    .ok_or(Error::DeltaOutOfRange)?;
                let (base_kind, base_data) =
                    self.reconstruct_inner(base_offset, caches, arena, resolve_base, depth + 1)?;
                let applied = delta::apply(&base_data, &scratch)?;
                (base_kind, Arc::new(applied))
            }
            data::Header::RefDelta { base_id } => {
                let (base_kind, base_data) = if let Some((_, base_offset)) = self.index.lookup(&base_id) {
                    self.reconstruct_inner(base_offset, caches, arena, resolve_base, depth + 1)?
                } else {
                    resolve_base.resolve(&base_id).map(|(k, d)| (k, d)).ok_or(Error::MissingBase(base_id))?
                };
                let applied = delta::apply(&base_data, &scratch)?;
                (base_kind, Arc::new(applied))
            }
        };

        caches.objects.insert(self.pack.digest, offset, result.0, result.1.clone());
        // Every entry this chain walks through is a real object with its own digest, not
        // just the one the caller originally asked for; populate the digest-keyed `values`
        // cache too via the reverse index, so a later `ref-delta` elsewhere or a direct
        // lookup of this intermediate object is a cache hit instead of a second pack walk.
        if let Some(digest) = self.reverse_index(caches).digest_at(offset) {
            caches.values.insert(digest, result.0, result.1.clone());
        }
        Ok(result)
    }
}

fn read_size(data: &[u8]) -> Result<(u64, usize), Error> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, byte) in data.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(Error::PackDecode("delta header size varint was truncated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zlib(payload: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    /// Builds a standalone pack+index pair with a base blob and an `ofs-delta` entry on top
    /// of it, exercising chain reconstruction end to end.
    fn build_pack_with_one_delta() -> (Vec<u8>, Vec<u8>, ObjectId /* base object id */, ObjectId /* delta object id */) {
        let base_payload = b"the quick brown fox jumps over the lazy dog";
        let target_payload = b"the quick brown fox leaps over the lazy dog and then some";

        let mut pack = Vec::new();
        pack.extend_from_slice(&data::parse::write_header(2));

        let base_offset = pack.len() as u64;
        data::Header::Blob.write_to(base_payload.len() as u64, &mut pack).unwrap();
        pack.extend(zlib(base_payload));

        let delta_offset = pack.len() as u64;
        let delta_bytes = delta::diff(base_payload, target_payload);
        data::Header::OfsDelta {
            base_distance: delta_offset - base_offset,
        }
        .write_to(delta_bytes.len() as u64, &mut pack)
        .unwrap();
        pack.extend(zlib(&delta_bytes));

        let pack_digest = git_hash::hash(&pack);
        pack.extend_from_slice(pack_digest.as_bytes());

        let base_id = git_object::compute_hash(git_object::Kind::Blob, base_payload);
        let target_id = git_object::compute_hash(git_object::Kind::Blob, target_payload);

        let index_bytes = index::write::build(
            vec![
                index::write::Entry {
                    id: base_id,
                    offset: base_offset,
                    crc32: 0,
                },
                index::write::Entry {
                    id: target_id,
                    offset: delta_offset,
                    crc32: 0,
                },
            ],
            pack_digest,
        );

        (pack, index_bytes, base_id, target_id)
    }

    #[test]
    fn reconstructs_an_ofs_delta_chain() {
        let (pack_bytes, index_bytes, base_id, target_id) = build_pack_with_one_delta();
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("p.pack");
        let index_path = dir.path().join("p.idx");
        std::fs::write(&pack_path, &pack_bytes).unwrap();
        std::fs::write(&index_path, &index_bytes).unwrap();

        let bundle = Bundle::at(&pack_path, &index_path).unwrap();
        let caches = cache::Caches::default();
        let arena = cache::arena::Arena::default();
        let no_external = |_: &ObjectId| None;

        let (_, base_offset) = bundle.lookup(&base_id).unwrap();
        let (base_kind, base_data) = bundle.reconstruct(base_offset, &caches, &arena, &no_external).unwrap();
        assert_eq!(base_kind, git_object::Kind::Blob);
        assert_eq!(base_data, b"the quick brown fox jumps over the lazy dog");

        let (_, target_offset) = bundle.lookup(&target_id).unwrap();
        let (target_kind, target_data) = bundle.reconstruct(target_offset, &caches, &arena, &no_external).unwrap();
        assert_eq!(target_kind, git_object::Kind::Blob);
        assert_eq!(target_data, b"the quick brown fox leaps over the lazy dog and then some");

        assert_eq!(bundle.size_at(target_offset).unwrap(), target_data.len() as u64);
    }

    #[test]
    fn rejects_a_pack_whose_trailer_does_not_match_its_index() {
        let (mut pack_bytes, index_bytes, ..) = build_pack_with_one_delta();
        let last = pack_bytes.len() - 1;
        pack_bytes[last] ^= 0xff;
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("p.pack");
        let index_path = dir.path().join("p.idx");
        std::fs::write(&pack_path, &pack_bytes).unwrap();
        std::fs::write(&index_path, &index_bytes).unwrap();
        assert!(Bundle::at(&pack_path, &index_path).is_err());
    }

    /// Builds a pack with a base blob and a depth-3 `ofs-delta` chain on top of it
    /// (base -> d1 -> d2 -> d3), each hop tweaking the previous payload slightly.
    fn build_pack_with_depth_three_chain() -> (Vec<u8>, Vec<u8>, ObjectId) {
        let payloads: Vec<Vec<u8>> = vec![
            b"the quick brown fox jumps over the lazy dog, over and over again".to_vec(),
            b"the quick brown fox leaps over the lazy dog, over and over again".to_vec(),
            b"the quick brown fox leaps over the sleepy dog, over and over again".to_vec(),
            b"the quick brown fox leaps over the sleepy dog, over and over again and again".to_vec(),
        ];

        let mut pack = Vec::new();
        pack.extend_from_slice(&data::parse::write_header(payloads.len() as u32));

        let base_offset = pack.len() as u64;
        data::Header::Blob.write_to(payloads[0].len() as u64, &mut pack).unwrap();
        pack.extend(zlib(&payloads[0]));

        let mut prev_offset = base_offset;
        let mut prev_payload = payloads[0].clone();
        let mut last_offset = base_offset;
        for payload in &payloads[1..] {
            let offset = pack.len() as u64;
            let delta_bytes = delta::diff(&prev_payload, payload);
            data::Header::OfsDelta {
                base_distance: offset - prev_offset,
            }
            .write_to(delta_bytes.len() as u64, &mut pack)
            .unwrap();
            pack.extend(zlib(&delta_bytes));
            prev_offset = offset;
            prev_payload = payload.clone();
            last_offset = offset;
        }

        let pack_digest = git_hash::hash(&pack);
        pack.extend_from_slice(pack_digest.as_bytes());

        let target_id = git_object::compute_hash(git_object::Kind::Blob, &payloads[payloads.len() - 1]);
        let index_bytes = index::write::build(
            vec![index::write::Entry {
                id: target_id,
                offset: last_offset,
                crc32: 0,
            }],
            pack_digest,
        );

        (pack, index_bytes, target_id)
    }

    #[test]
    fn concurrent_reads_of_a_cold_depth_three_chain_agree_and_share_a_bounded_pool() {
        let (pack_bytes, index_bytes, target_id) = build_pack_with_depth_three_chain();
        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("p.pack");
        let index_path = dir.path().join("p.idx");
        std::fs::write(&pack_path, &pack_bytes).unwrap();
        std::fs::write(&index_path, &index_bytes).unwrap();

        let bundle = Arc::new(Bundle::at(&pack_path, &index_path).unwrap());
        let caches = Arc::new(cache::Caches::default());
        // Pool cap = 2, matching the scenario's test configuration: two concurrent readers
        // of the same pack should never need more than two scratch buffers at once.
        let arena = Arc::new(cache::arena::Arena::new(2));
        let no_external = |_: &ObjectId| None;

        let (_, offset) = bundle.lookup(&target_id).unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let bundle = bundle.clone();
            let caches = caches.clone();
            let arena = arena.clone();
            handles.push(std::thread::spawn(move || bundle.reconstruct(offset, &caches, &arena, &no_external).unwrap()));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0].1, results[1].1);
        assert_eq!(results[0].0, git_object::Kind::Blob);
        assert_eq!(
            results[0].1,
            b"the quick brown fox leaps over the sleepy dog, over and over again and again"
        );
    }
}
