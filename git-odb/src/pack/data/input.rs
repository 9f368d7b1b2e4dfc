//! Pack info / first-pass (§4.4): a single pass over a pack's bytes that records, per entry,
//! its offset, header (kind or delta parent) and inflated size, and the trailing pack
//! digest — without ever materializing an object body. Used by ingestion (§4.7) to build an
//! index without a second read of the stream, and by the write path to validate a pack it
//! just produced.
use super::{parse, Header, Kind};
use crate::Error;
use git_features::zlib::stream::inflate::Inflate;
use git_hash::ObjectId;

/// Chains longer than this during first-pass validation are rejected outright; see
/// [`super::super::bundle`] for the same backstop applied during actual reconstruction.
const MAX_DELTA_DEPTH: usize = 1000;

/// What first-pass learns about one entry, without inflating its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub offset: u64,
    pub header: Header,
    pub inflated_size: u64,
    /// `header_size + compressed_size`, i.e. this entry's total footprint in the pack.
    pub entry_len: usize,
    /// crc32 of the raw (still-compressed) entry bytes, the same checksum a pack index
    /// stores per object.
    pub crc32: u32,
}

/// The outcome of a complete first pass.
pub struct Pass {
    pub kind: Kind,
    pub infos: Vec<Info>,
    pub pack_digest: ObjectId,
}

/// Stream `data` (a complete, in-memory pack, typically a freshly-mmapped temp file) once,
/// recording an [`Info`] per entry and validating that the declared object count, every
/// entry header, and the trailing digest are all structurally sound.
///
/// `ofs-delta` chains are validated as acyclic by construction (each hop strictly decreases
/// the offset); chains deeper than [`MAX_DELTA_DEPTH`] are rejected as a likely cycle.
/// `ref-delta` bases are recorded but not resolved here — resolving them requires the
/// digests first-pass deliberately avoids computing.
pub fn run(data: &[u8]) -> Result<Pass, Error> {
    if data.len() < 12 {
        return Err(super::Error::TruncatedHeader.into());
    }
    let mut header_bytes = [0u8; 12];
    header_bytes.copy_from_slice(&data[..12]);
    let (kind, count) = parse::header(&header_bytes)?;

    let mut infos = Vec::with_capacity(count as usize);
    let mut offset = 12u64;
    let mut scratch = vec![0u8; 64 * 1024];

    for _ in 0..count {
        let (header, inflated_size, header_size) = Header::from_bytes_at(data, offset as usize)?;
        let compressed_start = offset as usize + header_size;
        let crc32_start = offset as usize;

        let mut inflate = Inflate::new();
        let mut remaining_in = &data[compressed_start..];
        loop {
            let outcome = inflate
                .step(remaining_in, &mut scratch)
                .map_err(|_| Error::from(super::Error::TruncatedHeader))?;
            remaining_in = &remaining_in[outcome.consumed_in..];
            if outcome.is_done || (outcome.consumed_in == 0 && outcome.produced_out == 0) {
                break;
            }
        }
        let compressed_size = inflate.total_in() as usize;
        let entry_len = header_size + compressed_size;
        let crc32 = crc32fast::hash(&data[crc32_start..crc32_start + entry_len]);

        if let Header::OfsDelta { base_distance } = header {
            if base_distance == 0 || base_distance > offset {
                return Err(super::Error::TruncatedHeader.into());
            }
            validate_chain_depth(data, offset - base_distance)?;
        }

        infos.push(Info {
            offset,
            header,
            inflated_size,
            entry_len,
            crc32,
        });
        offset += entry_len as u64;
    }

    if data.len() < offset as usize + ObjectId::LEN {
        return Err(super::Error::TruncatedHeader.into());
    }
    let pack_digest = ObjectId::from_bytes(&data[offset as usize..offset as usize + ObjectId::LEN]).expect("fixed size");

    Ok(Pass { kind, infos, pack_digest })
}

/// Walk an `ofs-delta` base chain starting at `start_offset`, purely via headers (no
/// inflate), failing if it runs deeper than [`MAX_DELTA_DEPTH`] hops. Exceeding the cap is
/// reported as `Error::PackDecode`, the same variant spec'd for any other delta-graph cycle,
/// since an `ofs-delta` chain this deep is indistinguishable from one that cycles.
fn validate_chain_depth(data: &[u8], start_offset: u64) -> Result<(), Error> {
    let mut offset = start_offset;
    for _ in 0..MAX_DELTA_DEPTH {
        let (header, _inflated_size, _header_size) = Header::from_bytes_at(data, offset as usize)?;
        match header {
            Header::OfsDelta { base_distance } => {
                if base_distance == 0 || base_distance > offset {
                    return Err(super::Error::TruncatedHeader.into());
                }
                offset -= base_distance;
            }
            _ => return Ok(()),
        }
    }
    Err(Error::PackDecode("ofs-delta chain exceeded the maximum depth, a cycle is likely"))
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

    #[test]
    fn records_offsets_kinds_and_sizes_for_every_entry() {
        let mut pack = Vec::new();
        pack.extend_from_slice(&parse::write_header(2));

        let a_offset = pack.len() as u64;
        Header::Blob.write_to(5, &mut pack).unwrap();
        pack.extend(zlib(b"hello"));

        let b_offset = pack.len() as u64;
        Header::Tree.write_to(0, &mut pack).unwrap();
        pack.extend(zlib(b""));

        let digest = git_hash::hash(&pack);
        pack.extend_from_slice(digest.as_bytes());

        let pass = run(&pack).unwrap();
        assert_eq!(pass.infos.len(), 2);
        assert_eq!(pass.infos[0].offset, a_offset);
        assert_eq!(pass.infos[0].header, Header::Blob);
        assert_eq!(pass.infos[0].inflated_size, 5);
        assert_eq!(pass.infos[1].offset, b_offset);
        assert_eq!(pass.infos[1].header, Header::Tree);
        assert_eq!(pass.pack_digest, digest);
    }

    #[test]
    fn rejects_an_ofs_delta_pointing_past_the_start_of_the_pack() {
        let mut pack = Vec::new();
        pack.extend_from_slice(&parse::write_header(1));
        Header::OfsDelta { base_distance: 1000 }.write_to(10, &mut pack).unwrap();
        pack.extend(zlib(b"whatever"));
        let digest = git_hash::hash(&pack);
        pack.extend_from_slice(digest.as_bytes());

        assert!(run(&pack).is_err());
    }

    #[test]
    fn rejects_an_ofs_delta_chain_deeper_than_the_depth_cap_as_pack_decode() {
        // Each entry points at the one directly before it, so a chain this long can only be
        // a pathological (or cyclic) pack, never a legitimate one.
        let mut pack = Vec::new();
        let entry_count = super::MAX_DELTA_DEPTH + 2;
        pack.extend_from_slice(&parse::write_header(entry_count as u32));

        let mut offsets = Vec::with_capacity(entry_count);
        let first_offset = pack.len() as u64;
        offsets.push(first_offset);
        Header::Blob.write_to(5, &mut pack).unwrap();
        pack.extend(zlib(b"hello"));

        for _ in 1..entry_count {
            let this_offset = pack.len() as u64;
            let base_distance = this_offset - offsets.last().copied().unwrap();
            Header::OfsDelta { base_distance }.write_to(4, &mut pack).unwrap();
            pack.extend(zlib(b"xxxx"));
            offsets.push(this_offset);
        }

        let digest = git_hash::hash(&pack);
        pack.extend_from_slice(digest.as_bytes());

        assert!(
            matches!(run(&pack), Err(Error::PackDecode(_))),
            "an ofs-delta chain past the depth cap must be reported as Error::PackDecode"
        );
    }
}
