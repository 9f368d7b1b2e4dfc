//! Builds a v2 pack index from a set of (digest, offset, crc32) entries, as produced by
//! the first-pass streamer ([`crate::pack::data::input`]) or by the pack encoder.
use git_hash::ObjectId;

const MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: ObjectId,
    pub offset: u64,
    pub crc32: u32,
}

/// Encode `entries` (sorted into digest order internally) and `pack_digest` into the bytes
/// of a standalone `.idx` file, including its own trailing digest.
pub fn build(mut entries: Vec<Entry>, pack_digest: ObjectId) -> Vec<u8> {
    entries.sort_by(|a, b| a.id.as_bytes().cmp(b.id.as_bytes()));

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&2u32.to_be_bytes());

    let mut fanout = [0u32; 256];
    for entry in &entries {
        fanout[entry.id.as_bytes()[0] as usize] += 1;
    }
    let mut running = 0u32;
    for bucket in fanout.iter_mut() {
        running += *bucket;
        *bucket = running;
    }
    for bucket in &fanout {
        out.extend_from_slice(&bucket.to_be_bytes());
    }

    for entry in &entries {
        out.extend_from_slice(entry.id.as_bytes());
    }
    for entry in &entries {
        out.extend_from_slice(&entry.crc32.to_be_bytes());
    }

    let mut spill = Vec::new();
    for entry in &entries {
        if entry.offset > u32::MAX as u64 {
            let spill_index = spill.len() as u32;
            spill.push(entry.offset);
            out.extend_from_slice(&(0x8000_0000 | spill_index).to_be_bytes());
        } else {
            out.extend_from_slice(&(entry.offset as u32).to_be_bytes());
        }
    }
    for offset in &spill {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    out.extend_from_slice(pack_digest.as_bytes());
    let index_digest = git_hash::hash(&out);
    out.extend_from_slice(index_digest.as_bytes());
    out
}
