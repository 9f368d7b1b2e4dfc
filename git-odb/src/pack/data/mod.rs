//! The pack wire format: the file header, the per-entry header encoding, and the raw,
//! memory-mapped pack file itself.
pub mod decode;
pub mod input;
pub mod iter;
pub mod output;

use git_features::fs::{Filesystem, Mapper, Region, StdBackend};
use git_object::Kind as ObjectKind;
use quick_error::quick_error;
use std::{io, path::PathBuf};

/// The only pack format version this engine understands.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Kind {
    V2,
}

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            display("failed to read a pack header")
            from()
            source(err)
        }
        InvalidMagic(found: [u8; 4]) {
            display("pack file does not start with the 'PACK' magic, found {:?}", found)
        }
        UnsupportedVersion(found: u32) {
            display("only pack version 2 is supported, found {}", found)
        }
        TruncatedHeader {
            display("the pack or entry header was truncated")
        }
        InvalidEntryKind(found: u8) {
            display("pack entry header used an unknown type tag {}", found)
        }
    }
}

pub mod parse {
    use super::{Error, Kind};

    /// Parse the fixed 12-byte pack file header: `"PACK" || u32 version || u32 count`.
    pub fn header(data: &[u8; 12]) -> Result<(Kind, u32), Error> {
        if &data[..4] != b"PACK" {
            let mut found = [0u8; 4];
            found.copy_from_slice(&data[..4]);
            return Err(Error::InvalidMagic(found));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != 2 {
            return Err(Error::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        Ok((Kind::V2, count))
    }

    /// Encode the fixed 12-byte pack file header.
    pub fn write_header(count: u32) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..4].copy_from_slice(b"PACK");
        out[4..8].copy_from_slice(&2u32.to_be_bytes());
        out[8..12].copy_from_slice(&count.to_be_bytes());
        out
    }
}

/// One entry's decoded header: its kind plus, for deltas, the information needed to find
/// their base. `inflated_size` is always the size of *this* entry's own inflated bytes —
/// for a delta that is the size of the delta instruction stream, not the reconstructed object.
#[derive(PartialEq, Eq, Debug, Hash, Ord, PartialOrd, Clone, Copy)]
pub enum Header {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta { base_distance: u64 },
    RefDelta { base_id: git_hash::ObjectId },
}

impl Header {
    /// The object kind this header decodes to once any delta chain is resolved, if the
    /// header is for a non-delta entry.
    pub fn to_kind(self) -> Option<ObjectKind> {
        Some(match self {
            Header::Commit => ObjectKind::Commit,
            Header::Tree => ObjectKind::Tree,
            Header::Blob => ObjectKind::Blob,
            Header::Tag => ObjectKind::Tag,
            Header::OfsDelta { .. } | Header::RefDelta { .. } => return None,
        })
    }

    fn kind_tag(self) -> u8 {
        match self {
            Header::Commit => 1,
            Header::Tree => 2,
            Header::Blob => 3,
            Header::Tag => 4,
            Header::OfsDelta { .. } => 6,
            Header::RefDelta { .. } => 7,
        }
    }

    pub fn from_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Commit => Header::Commit,
            ObjectKind::Tree => Header::Tree,
            ObjectKind::Blob => Header::Blob,
            ObjectKind::Tag => Header::Tag,
        }
    }

    /// Parse a pack entry header starting at `pack_offset` out of a `Read` stream,
    /// returning `(header, inflated_size, bytes consumed by the header encoding)`.
    pub fn from_read(mut read: impl io::Read, _pack_offset: u64) -> Result<(Header, u64, usize), Error> {
        let mut consumed = 0usize;
        let mut byte = [0u8; 1];
        read.read_exact(&mut byte)?;
        consumed += 1;
        let mut c = byte[0];
        let kind_tag = (c >> 4) & 0b111;
        let mut size: u64 = (c & 0b1111) as u64;
        let mut shift = 4;
        while c & 0b1000_0000 != 0 {
            read.read_exact(&mut byte)?;
            consumed += 1;
            c = byte[0];
            size |= ((c & 0x7f) as u64) << shift;
            shift += 7;
        }

        let header = match kind_tag {
            1 => Header::Commit,
            2 => Header::Tree,
            3 => Header::Blob,
            4 => Header::Tag,
            6 => {
                let (base_distance, n) = read_offset_delta_distance(&mut read)?;
                consumed += n;
                Header::OfsDelta { base_distance }
            }
            7 => {
                let mut id = [0u8; git_hash::ObjectId::LEN];
                read.read_exact(&mut id)?;
                consumed += id.len();
                Header::RefDelta {
                    base_id: git_hash::ObjectId::from_bytes(&id).expect("fixed-size slice"),
                }
            }
            other => return Err(Error::InvalidEntryKind(other)),
        };
        Ok((header, size, consumed))
    }

    /// Parse a pack entry header out of an in-memory buffer at `offset`, the mmap-backed
    /// counterpart of [`Header::from_read`] used by the index-based decoder.
    pub fn from_bytes_at(data: &[u8], offset: usize) -> Result<(Header, u64, usize), Error> {
        let mut cursor = io::Cursor::new(&data[offset..]);
        Header::from_read(&mut cursor, offset as u64)
    }

    /// Encode this header (and, for non-delta kinds, `inflated_size`) the way the pack
    /// format requires, writing to `out`.
    pub fn write_to(self, inflated_size: u64, mut out: impl io::Write) -> io::Result<()> {
        let mut size = inflated_size;
        let mut first = (self.kind_tag() << 4) | (size & 0b1111) as u8;
        size >>= 4;
        if size != 0 {
            first |= 0b1000_0000;
        }
        out.write_all(&[first])?;
        while size != 0 {
            let mut byte = (size & 0x7f) as u8;
            size >>= 7;
            if size != 0 {
                byte |= 0x80;
            }
            out.write_all(&[byte])?;
        }
        match self {
            Header::OfsDelta { base_distance } => write_offset_delta_distance(base_distance, out),
            Header::RefDelta { base_id } => out.write_all(base_id.as_bytes()),
            _ => Ok(()),
        }
    }
}

/// `ofs-delta` encodes the (always positive) distance back to its base with a variant of
/// base-128 where continuation bytes are offset by one to avoid redundant encodings.
fn read_offset_delta_distance(mut read: impl io::Read) -> Result<(u64, usize), Error> {
    let mut byte = [0u8; 1];
    read.read_exact(&mut byte)?;
    let mut consumed = 1;
    let mut c = byte[0];
    let mut value = (c & 0x7f) as u64;
    while c & 0x80 != 0 {
        read.read_exact(&mut byte)?;
        consumed += 1;
        c = byte[0];
        value = ((value + 1) << 7) | (c & 0x7f) as u64;
    }
    Ok((value, consumed))
}

fn write_offset_delta_distance(value: u64, mut out: impl io::Write) -> io::Result<()> {
    // Build the big-endian base-128 digit sequence, then undo the "+1 per continuation"
    // bias on the way back out, matching `read_offset_delta_distance`'s accumulation.
    let mut digits = Vec::new();
    let mut v = value;
    digits.push((v & 0x7f) as u8);
    v >>= 7;
    while v != 0 {
        v -= 1;
        digits.push((v & 0x7f) as u8 | 0x80);
        v >>= 7;
    }
    digits.reverse();
    out.write_all(&digits)
}

/// The raw pack file, memory-mapped lazily on first access. Holds no interpretation of
/// its contents beyond the 12-byte header; entry lookups go through [`super::index::File`].
pub struct File {
    pub path: PathBuf,
    pub digest: git_hash::ObjectId,
    num_objects: u32,
    data: Region,
}

impl File {
    /// Open and fully verify the 12-byte header of the pack at `path`; the rest of the
    /// file is mapped but not otherwise inspected until entries are requested.
    pub fn at(path: impl Into<PathBuf>, digest: git_hash::ObjectId) -> Result<Self, Error> {
        let path = path.into();
        let backend = StdBackend::default();
        let file = backend.open_r(&path)?;
        let len = file.metadata()?.len();
        let data = backend.map(&file, 0, len as usize)?;
        let mut header = [0u8; 12];
        header.copy_from_slice(&data[..12]);
        let (_, num_objects) = parse::header(&header)?;
        Ok(File {
            path,
            digest,
            num_objects,
            data,
        })
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// The full mapped byte range of the file, including header and trailer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns an iterator over the pack file itself, without making use of the pack index.
    ///
    /// Note that this iterator is costly as no pack index is used, forcing each entry to be
    /// decompressed. If an index is available, prefer looking entries up by offset instead.
    pub fn iter(&self) -> Result<iter::Iter<io::BufReader<std::fs::File>>, iter::Error> {
        let reader = io::BufReader::new(std::fs::File::open(&self.path)?);
        iter::Iter::new_from_header(reader, false)
    }
}
