//! The loose backend (§4.1): one deflate-compressed file per object, addressed by
//! `objects/<first two hex digits>/<remaining 38>`.
use crate::Error;
use git_features::{
    fs::{Filesystem, StdBackend},
    zlib::stream::{deflate::Deflate, inflate::Inflate},
};
use git_hash::ObjectId;
use git_object::{Kind, Object};
use std::path::{Path, PathBuf};

/// A loose object store rooted at a repository's `objects/` directory.
pub struct Store {
    root: PathBuf,
    backend: StdBackend,
}

impl Store {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Store {
            root: root.into(),
            backend: StdBackend::default(),
        }
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    pub fn mem(&self, id: &ObjectId) -> bool {
        self.backend.is_file(&self.path_for(id))
    }

    /// Every object digest present as a loose file, discovered by walking the two-level
    /// fan-out directory structure.
    pub fn list(&self) -> Result<Vec<ObjectId>, Error> {
        let mut out = Vec::new();
        for fanout_dir in self.backend.dir_contents(&self.root).map_err(|err| io_err("list objects/", &self.root, err))? {
            let prefix = match fanout_dir.file_name().and_then(|n| n.to_str()) {
                Some(name) if name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit()) => name.to_string(),
                _ => continue,
            };
            for file in self.backend.dir_contents(&fanout_dir).map_err(|err| io_err("list fan-out dir", &fanout_dir, err))? {
                if let Some(rest) = file.file_name().and_then(|n| n.to_str()) {
                    if let Ok(id) = ObjectId::from_hex(format!("{}{}", prefix, rest).as_bytes()) {
                        out.push(id);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Parse the `"<kind> <len>\0"` header and return `len` without inflating the payload.
    pub fn size(&self, id: &ObjectId) -> Result<u64, Error> {
        let (_kind, len, _consumed) = self.read_header(id)?;
        Ok(len)
    }

    pub fn read(&self, id: &ObjectId) -> Result<Object, Error> {
        let (kind, payload) = self.read_inflated(id)?;
        Object::from_bytes(kind, &payload).map_err(Error::from)
    }

    pub fn read_inflated(&self, id: &ObjectId) -> Result<(Kind, Vec<u8>), Error> {
        let mut buf = Vec::new();
        let kind = self.read_inflated_into(id, &mut buf)?;
        Ok((kind, buf))
    }

    /// Like [`Self::read_inflated`], but decode into a caller-supplied buffer — the path the
    /// pack decoder uses when an object is consulted as a ref-delta base.
    pub fn read_inflated_into(&self, id: &ObjectId, out: &mut Vec<u8>) -> Result<Kind, Error> {
        let path = self.path_for(id);
        let compressed = std::fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(*id)
            } else {
                io_err("read", &path, err)
            }
        })?;

        let mut inflate = Inflate::new();
        let mut inflated = Vec::with_capacity(compressed.len() * 2);
        let mut window = [0u8; 32 * 1024];
        let mut input = &compressed[..];
        loop {
            let outcome = inflate.step(input, &mut window)?;
            inflated.extend_from_slice(&window[..outcome.produced_out]);
            input = &input[outcome.consumed_in..];
            if outcome.is_done || (outcome.consumed_in == 0 && outcome.produced_out == 0) {
                break;
            }
        }

        let header_end = inflated.iter().position(|&b| b == 0).ok_or(Error::Decode("loose object is missing its header terminator"))?;
        let (kind, len) = parse_header(&inflated[..header_end])?;
        let body = &inflated[header_end + 1..];
        if body.len() as u64 != len {
            return Err(Error::Decode("loose object header length does not match its body"));
        }
        out.clear();
        out.extend_from_slice(body);
        Ok(kind)
    }

    /// Parse just the `"<kind> <len>\0"` header, reading and inflating only as many bytes
    /// off disk as it takes to find the terminating NUL — never the object's body.
    fn read_header(&self, id: &ObjectId) -> Result<(Kind, u64, usize), Error> {
        let path = self.path_for(id);
        let file = std::fs::File::open(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(*id)
            } else {
                io_err("open", &path, err)
            }
        })?;
        let mut reader = std::io::BufReader::new(file);

        let mut inflate = Inflate::new();
        let mut header_buf = Vec::new();
        let mut window = [0u8; 64];
        let mut chunk = [0u8; 64];
        use std::io::Read;
        loop {
            let read = reader.read(&mut chunk).map_err(|err| io_err("read", &path, err))?;
            if read == 0 {
                return Err(Error::Decode("loose object is missing its header terminator"));
            }
            let mut input = &chunk[..read];
            while !input.is_empty() {
                let outcome = inflate.step(input, &mut window)?;
                header_buf.extend_from_slice(&window[..outcome.produced_out]);
                input = &input[outcome.consumed_in..];
                if outcome.consumed_in == 0 && outcome.produced_out == 0 {
                    break;
                }
            }
            if header_buf.iter().any(|&b| b == 0) {
                break;
            }
        }
        let header_end = header_buf.iter().position(|&b| b == 0).expect("just checked above");
        let (kind, len) = parse_header(&header_buf[..header_end])?;
        Ok((kind, len, header_end + 1))
    }

    /// Delete the loose file for `id`, if present. Used by repack once an object is
    /// confirmed reachable through a superseding pack (§3's write-once-but-supersedable
    /// lifecycle); not exposed as a general-purpose delete since loose objects are
    /// otherwise immutable.
    pub fn remove(&self, id: &ObjectId) -> Result<(), Error> {
        let path = self.path_for(id);
        match self.backend.unlink(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err("remove", &path, err)),
        }
    }

    pub fn write(&self, object: &Object) -> Result<(ObjectId, u32), Error> {
        let payload = object.to_vec();
        self.write_inflated(object.kind(), &payload)
    }

    /// Compress `bytes` behind the `"<kind> <len>\0"` header, digest the canonical bytes,
    /// and rename the result into place atomically via a temp file.
    pub fn write_inflated(&self, kind: Kind, bytes: &[u8]) -> Result<(ObjectId, u32), Error> {
        let mut canonical = Vec::with_capacity(bytes.len() + 16);
        git_object::encode_header(kind, bytes.len(), &mut canonical).expect("writing a header to a Vec never fails");
        canonical.extend_from_slice(bytes);
        let id = git_hash::hash(&canonical);

        let mut deflate = Deflate::new(6);
        let mut compressed = vec![0u8; canonical.len() + canonical.len() / 2 + 64];
        let n = deflate.once(&canonical, &mut compressed)?;
        compressed.truncate(n);

        let dest = self.path_for(&id);
        let dir = dest.parent().expect("loose object path always has a fan-out parent");
        self.backend.create_dir_all(dir).map_err(|err| io_err("create fan-out dir", dir, err))?;

        let tmp = self.root.join("tmp").join(format!("loose-{:x}", rand::random::<u64>()));
        if let Some(tmp_dir) = tmp.parent() {
            self.backend.create_dir_all(tmp_dir).map_err(|err| io_err("create tmp dir", tmp_dir, err))?;
        }
        {
            let mut file = self.backend.open_w(&tmp).map_err(|err| io_err("create temp file", &tmp, err))?;
            use std::io::Write;
            file.write_all(&compressed).map_err(|err| io_err("write", &tmp, err))?;
        }
        self.backend.rename(&tmp, &dest).map_err(|err| io_err("rename into place", &dest, err))?;

        Ok((id, crc32fast::hash(&compressed)))
    }
}

fn parse_header(header: &[u8]) -> Result<(Kind, u64), Error> {
    let space = header.iter().position(|&b| b == b' ').ok_or(Error::Decode("loose object header is missing its length separator"))?;
    let kind = Kind::from_bytes(&header[..space]).ok_or(Error::Decode("loose object header names an unknown kind"))?;
    let len_str = std::str::from_utf8(&header[space + 1..]).map_err(|_| Error::Decode("loose object header length is not valid UTF-8"))?;
    let len = len_str.parse::<u64>().map_err(|_| Error::Decode("loose object header length is not a valid integer"))?;
    Ok((kind, len))
}

fn io_err(op: &'static str, path: &Path, err: std::io::Error) -> Error {
    Error::FsIo(op, path.to_path_buf(), err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path());
        let object = Object::Blob(b"hello\n".to_vec());
        let (id, _crc32) = store.write(&object).unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");

        assert!(store.mem(&id));
        assert_eq!(store.size(&id).unwrap(), 6);
        assert_eq!(store.read(&id).unwrap(), object);
        assert_eq!(store.list().unwrap(), vec![id]);
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path());
        let id = git_hash::hash(b"does not exist");
        assert!(matches!(store.read(&id), Err(Error::NotFound(missing)) if missing == id));
    }

    #[test]
    fn size_does_not_require_reading_the_full_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path());
        let large = vec![b'x'; 1_000_000];
        let (id, _) = store.write_inflated(Kind::Blob, &large).unwrap();
        assert_eq!(store.size(&id).unwrap(), large.len() as u64);
    }
}
