//! Per-entry decompression: given a pack's raw bytes and an offset, parse the entry header
//! and inflate its body. Does not resolve deltas — see [`crate::pack::bundle`] for that.
use super::{Error, Header};
use git_features::zlib::stream::inflate::Inflate;

/// One entry, fully inflated but not yet delta-resolved.
pub struct Entry {
    pub header: Header,
    /// `header_size + compressed_size`, the total span this entry occupies in the pack.
    pub entry_len: usize,
    /// The inflated bytes: the literal object body for base kinds, or the delta
    /// instruction stream for `OfsDelta`/`RefDelta`.
    pub data: Vec<u8>,
}

/// Parse the entry header at `offset` in `pack` and inflate its body into a freshly
/// allocated buffer sized to the header's advertised inflated length.
pub fn entry_at(pack: &[u8], offset: usize) -> Result<Entry, Error> {
    let mut buf = Vec::new();
    let (header, entry_len) = entry_at_into(pack, offset, &mut buf)?;
    Ok(Entry {
        header,
        entry_len,
        data: buf,
    })
}

/// Like [`entry_at`], but inflate into a caller-supplied buffer, growing it if necessary.
/// Returns `(header, header_size + compressed_size)`; the inflated bytes are left in `out`,
/// truncated to the exact inflated length.
pub fn entry_at_into(pack: &[u8], offset: usize, out: &mut Vec<u8>) -> Result<(Header, usize), Error> {
    let (header, inflated_size, header_size) = Header::from_bytes_at(pack, offset)?;
    let compressed_start = offset + header_size;
    out.clear();
    if out.capacity() < inflated_size as usize {
        out.reserve(inflated_size as usize - out.capacity());
    }
    out.resize(inflated_size as usize, 0);

    let mut inflate = Inflate::new();
    let compressed = &pack[compressed_start..];
    let produced = inflate
        .once(compressed, out)
        .map_err(|_| Error::TruncatedHeader)?;
    if produced != inflated_size as usize {
        // The zlib stream ran dry (ran out of compressed input, or stalled) before producing
        // the header's advertised length: a truncated or corrupted entry, not a short object.
        return Err(Error::TruncatedHeader);
    }
    out.truncate(produced);
    let compressed_size = inflate.total_in() as usize;
    Ok((header, header_size + compressed_size))
}
