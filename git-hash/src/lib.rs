//! Borrowed and owned git hash digests used to identify git objects, plus the
//! incremental hasher capability that produces them.
#![forbid(unsafe_code)]

use std::{convert::TryFrom, fmt, io};

mod error {
    use quick_error::quick_error;

    quick_error! {
        #[derive(Debug)]
        pub enum Error {
            InvalidHexLength(len: usize) {
                display("hex hash must be {} characters long, got {}", crate::ObjectId::HEX_LEN, len)
            }
            InvalidHex(err: hex::FromHexError) {
                display("malformed hex digits in hash")
                from()
                source(err)
            }
            InvalidByteLength(len: usize) {
                display("hash must be exactly {} bytes, got {}", crate::ObjectId::LEN, len)
            }
        }
    }
}
pub use error::Error;

/// The amount of bytes in a SHA1 digest.
pub const SIZE_OF_SHA1_DIGEST: usize = 20;

/// A fixed-width, owned content digest identifying an object by its canonical bytes.
///
/// Only SHA1 is supported currently; the type is still named generically so a future
/// algorithm addition does not change every call site.
#[derive(PartialEq, Eq, Hash, Ord, PartialOrd, Clone, Copy)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId([u8; SIZE_OF_SHA1_DIGEST]);

impl ObjectId {
    /// The amount of bytes in this kind of digest.
    pub const LEN: usize = SIZE_OF_SHA1_DIGEST;
    /// The amount of hexadecimal characters needed to represent this kind of digest.
    pub const HEX_LEN: usize = SIZE_OF_SHA1_DIGEST * 2;

    /// The all-zero digest, used as a sentinel in a few places (e.g. ref deletion).
    pub const fn null() -> Self {
        ObjectId([0u8; SIZE_OF_SHA1_DIGEST])
    }

    /// Create an id from its raw byte representation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::LEN {
            return Err(Error::InvalidByteLength(bytes.len()));
        }
        let mut buf = [0u8; SIZE_OF_SHA1_DIGEST];
        buf.copy_from_slice(bytes);
        Ok(ObjectId(buf))
    }

    /// Create an id from its lower-case hexadecimal representation.
    pub fn from_hex(hex: &[u8]) -> Result<Self, Error> {
        if hex.len() != Self::HEX_LEN {
            return Err(Error::InvalidHexLength(hex.len()));
        }
        let mut buf = [0u8; SIZE_OF_SHA1_DIGEST];
        hex::decode_to_slice(hex, &mut buf)?;
        Ok(ObjectId(buf))
    }

    /// Access the raw bytes of this id.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Render as a lower-case hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `true` if every byte is zero, the sentinel used for "does not exist yet".
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.as_bytes())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An incremental hasher producing an [`ObjectId`]; the concrete implementation of the
/// `Digest` capability described by the engine this crate backs.
///
/// Kept deliberately minimal: `update` can be called any number of times, `finalize`
/// consumes the hasher and yields the digest over everything fed to it so far.
pub struct Hasher(sha1::Sha1);

impl Default for Hasher {
    fn default() -> Self {
        Hasher(sha1::Sha1::new())
    }
}

impl Hasher {
    /// Create a new, empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes into the running digest.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finish hashing and produce the resulting id.
    pub fn finalize(self) -> ObjectId {
        ObjectId(self.0.digest().bytes())
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash an entire byte slice in one call, a convenience wrapper around [`Hasher`].
pub fn hash(data: &[u8]) -> ObjectId {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = hash(b"hello\n");
        let hex = id.to_hex();
        assert_eq!(ObjectId::from_hex(hex.as_bytes()).unwrap(), id);
    }

    #[test]
    fn null_is_all_zero() {
        assert!(ObjectId::null().is_null());
        assert!(!hash(b"x").is_null());
    }

    #[test]
    fn rejects_short_hex() {
        assert!(ObjectId::from_hex(b"abcd").is_err());
    }

    #[test]
    fn blob_header_digest_matches_known_value() {
        // "blob 6\0hello\n" -> ce013625030ba8dba906f756967f9e9ca394464a
        let mut hasher = Hasher::new();
        hasher.update(b"blob 6\0hello\n");
        let id = hasher.finalize();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }
}
