//! Pack encoder + delta planner (§4.5): turns an ordered sequence of objects into pack
//! format bytes, delta-compressing against recently seen same-kind objects within a sliding
//! window and depth budget.
use super::{parse, Header};
use git_features::zlib::stream::deflate::Deflate;
use git_hash::ObjectId;
use std::collections::HashMap;

/// One object to be packed, already rendered to its canonical payload bytes.
pub struct ObjectToPack {
    pub kind: git_object::Kind,
    pub data: Vec<u8>,
}

/// Where one packed object ended up, produced once the whole stream has been written.
pub struct Entry {
    pub id: ObjectId,
    pub crc32: u32,
    pub offset: u64,
}

/// The full result of [`make`]: the pack bytes (header, every entry, trailing digest) plus
/// the per-object location map a pack index is built from.
pub struct Outcome {
    pub pack_digest: ObjectId,
    pub entries: Vec<Entry>,
}

struct Candidate {
    insertion_index: usize,
    offset: u64,
    depth: usize,
    data: Vec<u8>,
}

/// Pack `objects` in the order given, considering up to `window` recently seen objects of
/// the same kind as delta bases, never chaining deeper than `depth_cap`. Ties are broken by
/// smallest base size, then lowest insertion index, matching the order candidates are
/// considered in (most recent last, so the scan below naturally visits them oldest-first).
pub fn make(objects: &[ObjectToPack], window: usize, depth_cap: usize) -> (Vec<u8>, Outcome) {
    let mut pack = Vec::new();
    pack.extend_from_slice(&parse::write_header(objects.len() as u32));

    let mut recent: HashMap<git_object::Kind, Vec<Candidate>> = HashMap::new();
    let mut entries = Vec::with_capacity(objects.len());

    for (index, object) in objects.iter().enumerate() {
        let offset = pack.len() as u64;
        let id = git_object::compute_hash(object.kind, &object.data);

        let mut best: Option<(usize, usize)> = None; // (candidate position in `bucket`, delta len)
        if let Some(bucket) = recent.get(&object.kind) {
            for (pos, candidate) in bucket.iter().enumerate() {
                if candidate.depth >= depth_cap {
                    continue;
                }
                let delta = super::super::delta::diff(&candidate.data, &object.data);
                let better = match best {
                    None => true,
                    Some((best_pos, best_len)) => {
                        delta.len() < best_len
                            || (delta.len() == best_len && bucket[best_pos].data.len() > candidate.data.len())
                            || (delta.len() == best_len
                                && bucket[best_pos].data.len() == candidate.data.len()
                                && bucket[best_pos].insertion_index > candidate.insertion_index)
                    }
                };
                if better {
                    best = Some((pos, delta.len()));
                }
            }
        }

        let (header, body, depth) = match best {
            Some((pos, _)) => {
                let candidate = &recent.get(&object.kind).unwrap()[pos];
                let delta = super::super::delta::diff(&candidate.data, &object.data);
                let base_distance = offset - candidate.offset;
                (Header::OfsDelta { base_distance }, delta, candidate.depth + 1)
            }
            None => (Header::from_kind(object.kind), object.data.clone(), 0),
        };

        header.write_to(body.len() as u64, &mut pack).expect("writing to a Vec never fails");
        let compressed = deflate_all(&body);
        pack.extend_from_slice(&compressed);

        let crc32 = crc32fast::hash(&pack[offset as usize..]);
        entries.push(Entry { id, crc32, offset });

        recent.entry(object.kind).or_default().push(Candidate {
            insertion_index: index,
            offset,
            depth,
            data: object.data.clone(),
        });
        if let Some(bucket) = recent.get_mut(&object.kind) {
            if bucket.len() > window {
                bucket.remove(0);
            }
        }
    }

    let pack_digest = git_hash::hash(&pack);
    pack.extend_from_slice(pack_digest.as_bytes());

    (pack, Outcome { pack_digest, entries })
}

fn deflate_all(data: &[u8]) -> Vec<u8> {
    let mut deflate = Deflate::new(6);
    let mut out = vec![0u8; data.len() + data.len() / 2 + 64];
    let n = deflate.once(data, &mut out).expect("in-memory deflate never fails");
    out.truncate(n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{bundle::Bundle, cache, index};

    #[test]
    fn packs_similar_objects_as_deltas_and_round_trips_through_a_bundle() {
        let objects = vec![
            ObjectToPack {
                kind: git_object::Kind::Blob,
                data: b"the quick brown fox jumps over the lazy dog, over and over".to_vec(),
            },
            ObjectToPack {
                kind: git_object::Kind::Blob,
                data: b"the quick brown fox leaps over the lazy dog, over and over and over".to_vec(),
            },
        ];
        let (pack_bytes, outcome) = make(&objects, 10, 50);

        let index_bytes = index::write::build(
            outcome
                .entries
                .iter()
                .map(|e| index::write::Entry {
                    id: e.id,
                    offset: e.offset,
                    crc32: e.crc32,
                })
                .collect(),
            outcome.pack_digest,
        );

        let dir = tempfile::tempdir().unwrap();
        let pack_path = dir.path().join("p.pack");
        let index_path = dir.path().join("p.idx");
        std::fs::write(&pack_path, &pack_bytes).unwrap();
        std::fs::write(&index_path, &index_bytes).unwrap();

        let bundle = Bundle::at(&pack_path, &index_path).unwrap();
        let caches = cache::Caches::default();
        let arena = cache::arena::Arena::default();
        let no_external = |_: &ObjectId| None;

        for (object, entry) in objects.iter().zip(outcome.entries.iter()) {
            let (_, offset) = bundle.lookup(&entry.id).unwrap();
            let (kind, data) = bundle.reconstruct(offset, &caches, &arena, &no_external).unwrap();
            assert_eq!(kind, object.kind);
            assert_eq!(data, object.data);
        }
    }
}
