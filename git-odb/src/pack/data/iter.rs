use super::{parse, Header, Kind};
use git_features::zlib::stream::InflateReader;
use quick_error::quick_error;
use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            display("An IO operation failed while streaming an entry")
            from()
            source(err)
        }
        PackParse(err: super::Error) {
            display("The pack header could not be parsed")
            from()
            source(err)
        }
    }
}

#[derive(PartialEq, Eq, Debug, Hash, Ord, PartialOrd, Clone)]
pub struct Entry {
    pub header: Header,
    /// amount of bytes used to encode the `header`. `pack_offset + header_size` is the beginning of the compressed data in the pack.
    pub header_size: u16,
    pub pack_offset: u64,
    /// amount bytes consumed while producing `decompressed`
    pub compressed: Vec<u8>,
    /// The decompressed data.
    pub decompressed: Vec<u8>,
    /// The pack's trailing digest, set only on the last entry once it has been read.
    pub trailer: Option<git_hash::ObjectId>,
}

pub struct Iter<R> {
    read: R,
    offset: u64,
    had_error: bool,
    kind: Kind,
    objects_left: u32,
    hash: Option<git_hash::ObjectId>,
    verify: bool,
}

impl<R> Iter<R>
where
    R: io::BufRead,
{
    /// Note that `read` is expected at the beginning of a valid pack file with header and trailer
    /// If `verify` is true, we will assert the SHA1 is actually correct before returning the last entry.
    /// Otherwise bit there is a chance that some kinds of bitrot or inconsistencies will not be detected.
    pub fn new_from_header(mut read: R, verify: bool) -> Result<Iter<R>, Error> {
        let mut header_data = [0u8; 12];
        read.read_exact(&mut header_data)?;

        let (kind, num_objects) = parse::header(&header_data)?;
        assert_eq!(kind, Kind::V2, "let's stop here if we see undocumented pack formats");
        Ok(Iter {
            read,
            offset: 12,
            had_error: false,
            kind,
            objects_left: num_objects,
            hash: None,
            verify,
        })
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Can only be queried once the iterator has been exhausted and `len()` returns 0
    pub fn checksum(&self) -> git_hash::ObjectId {
        self.hash.expect("iterator must be exhausted")
    }

    fn next_inner(&mut self) -> Result<Entry, Error> {
        let (header, decompressed_size, header_size) =
            Header::from_read(&mut self.read, self.offset).map_err(Error::from)?;

        let mut reader = InflateReader::new(PassThrough {
            read: &mut self.read,
            write: Vec::with_capacity((decompressed_size / 2) as usize),
        });

        let mut decompressed = Vec::with_capacity(decompressed_size as usize);
        let bytes_copied = io::copy(&mut reader, &mut decompressed)?;

        assert_eq!(
            bytes_copied, decompressed_size,
            "We should have decompressed {} bytes, but got {} instead",
            decompressed_size, bytes_copied
        );

        let pack_offset = self.offset;
        let compressed_size = reader.total_in();
        self.offset += header_size as u64 + compressed_size;
        let mut compressed = reader.into_inner().write;
        compressed.shrink_to_fit();
        assert_eq!(
            compressed_size,
            compressed.len() as u64,
            "we must track exactly the same amount of bytes as read by the decompressor"
        );

        // `verify` only gates whether a caller has asked us to insist on a trailer being
        // present; we always capture it when this was the last entry, since first-pass
        // ingestion needs the pack's own digest to name the file it is about to write.
        let trailer = if self.objects_left == 0 {
            let mut hash_bytes = [0u8; git_hash::ObjectId::LEN];
            match self.read.read_exact(&mut hash_bytes) {
                Ok(()) => {
                    let trailer = git_hash::ObjectId::from_bytes(&hash_bytes).expect("fixed size");
                    self.hash = Some(trailer);
                    Some(trailer)
                }
                Err(_) if !self.verify => None,
                Err(err) => return Err(err.into()),
            }
        } else {
            None
        };

        Ok(Entry {
            header,
            header_size: header_size as u16,
            compressed,
            pack_offset,
            decompressed,
            trailer,
        })
    }
}

impl<R> Iterator for Iter<R>
where
    R: io::BufRead,
{
    type Item = Result<Entry, Error>;

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.objects_left as usize, Some(self.objects_left as usize))
    }

    fn next(&mut self) -> Option<Self::Item> {
        if self.had_error || self.objects_left == 0 {
            return None;
        }
        self.objects_left -= 1; // even an error counts as objects
        let result = self.next_inner();
        self.had_error = result.is_err();
        Some(result)
    }
}
impl<R> std::iter::ExactSizeIterator for Iter<R> where R: io::BufRead {}

struct PassThrough<R, W> {
    read: R,
    write: W,
}

impl<R, W> io::BufRead for PassThrough<R, W>
where
    Self: io::Read,
    R: io::BufRead,
    W: io::Write,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.read.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        let buf = self
            .read
            .fill_buf()
            .expect("never fail as we called fill-buf before and this does nothing");
        self.write
            .write_all(&buf[..amt])
            .expect("a write to never fail - should be a memory buffer");
        self.read.consume(amt)
    }
}

impl<R, W> io::Read for PassThrough<R, W>
where
    R: io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read.read(buf)
    }
}

// `super::File::iter` (the memory-mapped pack's no-index traversal) is defined alongside
// `File` itself in `super`, and simply delegates to `Iter::new_from_header` above.

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_single_blob_pack(payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        Header::Blob.write_to(payload.len() as u64, &mut body).unwrap();
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        body.extend(encoder.finish().unwrap());

        let mut pack = Vec::new();
        pack.extend_from_slice(&parse::write_header(1));
        pack.extend_from_slice(&body);
        let trailer = git_hash::hash(&pack);
        pack.extend_from_slice(trailer.as_bytes());
        pack
    }

    #[test]
    fn iterates_a_single_blob_entry() {
        let pack_bytes = build_single_blob_pack(b"hello\n");
        let mut it = Iter::new_from_header(io::BufReader::new(&pack_bytes[..]), true).unwrap();
        let entry = it.next().unwrap().unwrap();
        assert_eq!(entry.header, Header::Blob);
        assert_eq!(entry.decompressed, b"hello\n");
        assert!(it.next().is_none());
        assert_eq!(it.checksum(), git_hash::hash(&pack_bytes[..pack_bytes.len() - 20]));
    }
}