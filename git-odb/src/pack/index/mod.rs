//! The sorted digest → (crc32, offset) lookup sidecar for a pack, format v2.
pub mod write;

use git_features::fs::{Filesystem, Mapper, Region, StdBackend};
use git_hash::ObjectId;
use std::{convert::TryInto, path::PathBuf};

const MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const FANOUT_ENTRIES: usize = 256;
const FANOUT_SIZE: usize = FANOUT_ENTRIES * 4;
const TRAILER_SIZE: usize = ObjectId::LEN * 2;

/// A lazily-opened, memory-mapped pack index (v2).
pub struct File {
    pub path: PathBuf,
    data: Region,
    num_objects: u32,
}

impl File {
    /// Open `path`, verifying the magic/version and that the digest count implied by the
    /// final fan-out bucket matches the file's actual size.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let backend = StdBackend::default();
        let file = backend.open_r(&path).map_err(Error::Io)?;
        let len = file.metadata().map_err(Error::Io)?.len();
        let data = backend.map(&file, 0, len as usize).map_err(Error::Io)?;

        if data.len() < 8 + FANOUT_SIZE + TRAILER_SIZE {
            return Err(Error::Truncated);
        }
        if data[..4] != MAGIC {
            return Err(Error::InvalidMagic);
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != 2 {
            return Err(Error::UnsupportedVersion(version));
        }
        let num_objects = fanout_at(&data, FANOUT_ENTRIES - 1);
        let expected_len = 8
            + FANOUT_SIZE
            + num_objects as usize * ObjectId::LEN // sorted oids
            + num_objects as usize * 4 // crc32
            + num_objects as usize * 4 // offsets (32-bit, with high-bit spill markers)
            + TRAILER_SIZE;
        // a 64-bit offset table may follow the 32-bit one; only a lower bound can be checked
        // without walking every offset entry for a spill marker.
        if data.len() < expected_len {
            return Err(Error::Truncated);
        }

        Ok(File { path, data, num_objects })
    }

    pub fn len(&self) -> usize {
        self.num_objects as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_objects == 0
    }

    /// The pack's own digest, stored in the trailer.
    pub fn pack_digest(&self) -> ObjectId {
        let start = self.data.len() - TRAILER_SIZE;
        ObjectId::from_bytes(&self.data[start..start + ObjectId::LEN]).expect("fixed size")
    }

    /// This index file's own digest (over everything preceding it).
    pub fn index_digest(&self) -> ObjectId {
        let start = self.data.len() - ObjectId::LEN;
        ObjectId::from_bytes(&self.data[start..start + ObjectId::LEN]).expect("fixed size")
    }

    fn oid_table_offset(&self) -> usize {
        8 + FANOUT_SIZE
    }

    fn crc32_table_offset(&self) -> usize {
        self.oid_table_offset() + self.len() * ObjectId::LEN
    }

    fn offset_table_offset(&self) -> usize {
        self.crc32_table_offset() + self.len() * 4
    }

    fn spill_table_offset(&self) -> usize {
        self.offset_table_offset() + self.len() * 4
    }

    fn oid_at(&self, index: usize) -> ObjectId {
        let start = self.oid_table_offset() + index * ObjectId::LEN;
        ObjectId::from_bytes(&self.data[start..start + ObjectId::LEN]).expect("fixed size")
    }

    fn crc32_at(&self, index: usize) -> u32 {
        let start = self.crc32_table_offset() + index * 4;
        u32::from_be_bytes(self.data[start..start + 4].try_into().expect("4 bytes"))
    }

    fn offset_at(&self, index: usize) -> u64 {
        let start = self.offset_table_offset() + index * 4;
        let raw = u32::from_be_bytes(self.data[start..start + 4].try_into().expect("4 bytes"));
        if raw & 0x8000_0000 != 0 {
            let spill_index = (raw & 0x7fff_ffff) as usize;
            let start = self.spill_table_offset() + spill_index * 8;
            u64::from_be_bytes(self.data[start..start + 8].try_into().expect("8 bytes"))
        } else {
            raw as u64
        }
    }

    /// Binary-search the sorted digest array via the fan-out table. Returns the entry's
    /// crc32 and pack-file offset if `id` is present.
    pub fn lookup(&self, id: &ObjectId) -> Option<(u32, u64)> {
        let first_byte = id.as_bytes()[0] as usize;
        let mut lo = if first_byte == 0 { 0 } else { fanout_at(&self.data, first_byte - 1) as usize };
        let mut hi = fanout_at(&self.data, first_byte) as usize;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let candidate = self.oid_at(mid);
            match candidate.as_bytes().cmp(id.as_bytes()) {
                std::cmp::Ordering::Equal => return Some((self.crc32_at(mid), self.offset_at(mid))),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    /// Iterate every entry as `(id, offset, crc32)`, in digest-sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64, u32)> + '_ {
        (0..self.len()).map(move |i| (self.oid_at(i), self.offset_at(i), self.crc32_at(i)))
    }
}

fn fanout_at(data: &[u8], bucket: usize) -> u32 {
    let start = 8 + bucket * 4;
    u32::from_be_bytes(data[start..start + 4].try_into().expect("4 bytes"))
}

use quick_error::quick_error;
use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            display("failed to read the pack index")
            from()
            source(err)
        }
        InvalidMagic {
            display("pack index does not start with the expected magic bytes")
        }
        UnsupportedVersion(found: u32) {
            display("only pack index version 2 is supported, found {}", found)
        }
        Truncated {
            display("pack index is shorter than its own fan-out table claims")
        }
    }
}
