//! Ingestion (§4.7): stream an incoming pack to a temp file, run first-pass over it, derive
//! every object's digest to build an index, then atomically publish both files and register
//! the result with the engine.
use crate::{
    pack::{bundle::Bundle, data, index, input},
    Error,
};
use git_features::fs::{Filesystem, StdBackend};
use git_hash::ObjectId;
use std::{
    collections::HashMap,
    io,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Default number of consecutive `WouldBlock` reads tolerated before an incoming stream is
/// considered stalled (§4.7, an explicitly named Open Question: a fixed count is a
/// heuristic stand-in for a real timeout capability). A source that blocks rather than
/// returning `WouldBlock` just blocks the caller's thread, as any synchronous `Read` does;
/// this limit only guards non-blocking sources that report "no data yet" explicitly.
pub const DEFAULT_STALL_LIMIT: usize = 50;

/// Stream `reader` into a freshly created temp file under `repo_root/tmp/`, validate it as a
/// pack, compute every object's digest, build an index, and rename both files into
/// `repo_root/objects/pack/` atomically (index first, so a reader never sees a pack without
/// its index). On any failure the temp file is removed and nothing is published.
pub fn from_stream(
    repo_root: &Path,
    mut reader: impl Read,
    stall_limit: usize,
    resolve_external: &dyn Fn(&ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)>,
) -> Result<(ObjectId, u32), Error> {
    let backend = StdBackend::default();
    let tmp_dir = repo_root.join("tmp");
    backend.create_dir_all(&tmp_dir).map_err(|err| Error::FsIo("create tmp dir", tmp_dir.clone(), err))?;
    let tmp_path = tmp_dir.join(format!("pack-{:x}", rand::random::<u64>()));

    if let Err(err) = stream_to_file(&tmp_path, &mut reader, stall_limit) {
        let _ = backend.unlink(&tmp_path);
        return Err(err);
    }

    match finish_ingest(repo_root, &tmp_path, resolve_external) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let _ = backend.unlink(&tmp_path);
            Err(err)
        }
    }
}

fn stream_to_file(tmp_path: &Path, reader: &mut impl Read, stall_limit: usize) -> Result<(), Error> {
    let backend = StdBackend::default();
    let mut file = backend.open_w(tmp_path).map_err(|err| Error::FsIo("create temp pack file", tmp_path.to_path_buf(), err))?;
    use std::io::Write;

    let mut buf = [0u8; 64 * 1024];
    let mut consecutive_would_block = 0usize;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                consecutive_would_block = 0;
                file.write_all(&buf[..n]).map_err(|err| Error::FsIo("write temp pack file", tmp_path.to_path_buf(), err))?;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                consecutive_would_block += 1;
                if consecutive_would_block >= stall_limit {
                    log::warn!(
                        "incoming pack stream into {} made no progress after {} consecutive WouldBlock reads, abandoning it",
                        tmp_path.display(),
                        consecutive_would_block
                    );
                    return Err(Error::Stalled);
                }
                log::debug!(
                    "incoming pack stream into {} returned WouldBlock ({}/{} before giving up)",
                    tmp_path.display(),
                    consecutive_would_block,
                    stall_limit
                );
            }
            Err(err) => return Err(Error::FsIo("read incoming pack stream", tmp_path.to_path_buf(), err)),
        }
    }
}

fn finish_ingest(
    repo_root: &Path,
    tmp_path: &Path,
    resolve_external: &dyn Fn(&ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)>,
) -> Result<(ObjectId, u32), Error> {
    let backend = StdBackend::default();
    let file = backend.open_r(tmp_path).map_err(|err| Error::FsIo("reopen temp pack file", tmp_path.to_path_buf(), err))?;
    let len = file.metadata().map_err(|err| Error::FsIo("stat temp pack file", tmp_path.to_path_buf(), err))?.len();
    let mapped = backend.map(&file, 0, len as usize).map_err(|err| Error::FsIo("map temp pack file", tmp_path.to_path_buf(), err))?;

    let pass = input::run(&mapped)?;
    let entries = compute_digests(&mapped, &pass, resolve_external)?;
    let object_count = entries.len() as u32;

    let index_bytes = index::write::build(
        entries
            .iter()
            .map(|(id, offset, crc32, _data, _kind)| index::write::Entry { id: *id, offset: *offset, crc32: *crc32 })
            .collect(),
        pass.pack_digest,
    );

    let pack_dir = repo_root.join("objects").join("pack");
    backend.create_dir_all(&pack_dir).map_err(|err| Error::FsIo("create objects/pack", pack_dir.clone(), err))?;
    let digest_hex = pass.pack_digest.to_hex();
    let final_pack_path = pack_dir.join(format!("pack-{}.pack", digest_hex));
    let final_index_path = pack_dir.join(format!("pack-{}.idx", digest_hex));

    let tmp_index_path = tmp_path.with_extension("idx");
    std::fs::write(&tmp_index_path, &index_bytes).map_err(|err| Error::FsIo("write temp index file", tmp_index_path.clone(), err))?;

    // Publish the index before the pack so a concurrent reader never observes a pack file
    // without a matching index; both renames are atomic replacements on the same filesystem.
    backend
        .rename(&tmp_index_path, &final_index_path)
        .map_err(|err| Error::FsIo("publish index", final_index_path.clone(), err))?;
    backend
        .rename(tmp_path, &final_pack_path)
        .map_err(|err| Error::FsIo("publish pack", final_pack_path.clone(), err))?;

    Ok((pass.pack_digest, object_count))
}

type Entry = (ObjectId, u64, u32, Arc<Vec<u8>>, git_object::Kind);

/// Resolve every entry's full bytes (needed to compute its digest) in offset order, so an
/// `ofs-delta` base is always already resolved by the time its dependents are reached. A
/// `ref-delta` base is looked for among objects already resolved in this same pass, then via
/// `resolve_external` (loose store, other open packs).
fn compute_digests(
    pack_data: &[u8],
    pass: &input::Pass,
    resolve_external: &dyn Fn(&ObjectId) -> Option<(git_object::Kind, Arc<Vec<u8>>)>,
) -> Result<Vec<Entry>, Error> {
    let mut by_offset: HashMap<u64, (git_object::Kind, Arc<Vec<u8>>)> = HashMap::new();
    let mut by_digest: HashMap<ObjectId, (git_object::Kind, Arc<Vec<u8>>)> = HashMap::new();
    let mut out = Vec::with_capacity(pass.infos.len());

    for info in &pass.infos {
        let (kind, data) = match info.header {
            data::Header::Commit | data::Header::Tree | data::Header::Blob | data::Header::Tag => {
                let entry = data::decode::entry_at(pack_data, info.offset as usize)?;
                (entry.header.to_kind().expect("base kinds always map to an object kind"), Arc::new(entry.data))
            }
            data::Header::OfsDelta { base_distance } => {
                let base_offset = info.offset.checked_sub(base_distance).ok_or(Error::DeltaOutOfRange)?;
                let (base_kind, base_data) = by_offset.get(&base_offset).cloned().ok_or(Error::DeltaPlan(
                    "ofs-delta base was not resolved before its dependent, first-pass ordering is violated",
                ))?;
                let entry = data::decode::entry_at(pack_data, info.offset as usize)?;
                let applied = crate::pack::delta::apply(&base_data, &entry.data)?;
                (base_kind, Arc::new(applied))
            }
            data::Header::RefDelta { base_id } => {
                let (base_kind, base_data) = by_digest
                    .get(&base_id)
                    .cloned()
                    .or_else(|| resolve_external(&base_id))
                    .ok_or(Error::MissingBase(base_id))?;
                let entry = data::decode::entry_at(pack_data, info.offset as usize)?;
                let applied = crate::pack::delta::apply(&base_data, &entry.data)?;
                (base_kind, Arc::new(applied))
            }
        };

        let id = git_object::compute_hash(kind, &data);
        by_offset.insert(info.offset, (kind, data.clone()));
        by_digest.insert(id, (kind, data.clone()));
        out.push((id, info.offset, info.crc32, data, kind));
    }

    Ok(out)
}

/// Open a just-published `(pack, index)` pair by its digest, the counterpart step ingestion
/// callers run to hand the result to the engine.
pub fn open_published(repo_root: &Path, pack_digest: &ObjectId) -> Result<Bundle, Error> {
    let digest_hex = pack_digest.to_hex();
    let pack_dir = repo_root.join("objects").join("pack");
    Bundle::at(pack_dir.join(format!("pack-{}.pack", digest_hex)), pack_dir.join(format!("pack-{}.idx", digest_hex)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{data as pack_data, delta};
    use std::io::Write as _;

    fn zlib(payload: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn build_pack_with_delta_chain() -> Vec<u8> {
        let a = b"the quick brown fox jumps over the lazy dog";
        let b = b"the quick brown fox leaps over the lazy dog and keeps going";

        let mut pack = Vec::new();
        pack.extend_from_slice(&pack_data::parse::write_header(2));

        let a_offset = pack.len() as u64;
        pack_data::Header::Blob.write_to(a.len() as u64, &mut pack).unwrap();
        pack.extend(zlib(a));

        let b_offset = pack.len() as u64;
        let delta = delta::diff(a, b);
        pack_data::Header::OfsDelta { base_distance: b_offset - a_offset }.write_to(delta.len() as u64, &mut pack).unwrap();
        pack.extend(zlib(&delta));

        let digest = git_hash::hash(&pack);
        pack.extend_from_slice(digest.as_bytes());
        pack
    }

    #[test]
    fn ingests_a_pack_with_a_delta_chain_and_publishes_a_matching_index() {
        let repo = tempfile::tempdir().unwrap();
        let pack_bytes = build_pack_with_delta_chain();
        let no_external = |_: &ObjectId| None;

        let (digest, count) = from_stream(repo.path(), &pack_bytes[..], DEFAULT_STALL_LIMIT, &no_external).unwrap();
        assert_eq!(count, 2);

        let pack_dir = repo.path().join("objects").join("pack");
        assert!(pack_dir.join(format!("pack-{}.pack", digest.to_hex())).is_file());
        assert!(pack_dir.join(format!("pack-{}.idx", digest.to_hex())).is_file());
        assert!(!repo.path().join("tmp").read_dir().unwrap().any(|_| true), "temp directory should be empty after a successful ingest");

        let bundle = open_published(repo.path(), &digest).unwrap();
        let caches = crate::pack::cache::Caches::default();
        let arena = crate::pack::cache::arena::Arena::default();

        let a_id = git_object::compute_hash(git_object::Kind::Blob, b"the quick brown fox jumps over the lazy dog");
        let (_, offset) = bundle.lookup(&a_id).unwrap();
        let (_, data) = bundle.reconstruct(offset, &caches, &arena, &no_external).unwrap();
        assert_eq!(data, b"the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn a_stream_that_only_reports_would_block_is_stalled() {
        struct NeverReady;
        impl Read for NeverReady {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::WouldBlock))
            }
        }
        let repo = tempfile::tempdir().unwrap();
        let no_external = |_: &ObjectId| None;
        let result = from_stream(repo.path(), NeverReady, 3, &no_external);
        assert!(matches!(result, Err(Error::Stalled)));
        let tmp_dir = repo.path().join("tmp");
        assert!(tmp_dir.read_dir().unwrap().next().is_none(), "temp file must be cleaned up after a stall");
    }

    #[test]
    fn a_reader_that_reaches_real_eof_ingests_successfully_even_with_a_tight_stall_limit() {
        let repo = tempfile::tempdir().unwrap();
        let pack_bytes = build_pack_with_delta_chain();
        let no_external = |_: &ObjectId| None;
        let result = from_stream(repo.path(), &pack_bytes[..], 1, &no_external);
        assert!(result.is_ok(), "a plain slice reaching EOF must not be mistaken for a stalled stream");
    }
}
