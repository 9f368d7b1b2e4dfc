//! Parsing and atomic rewriting of the `packed-refs` side file (§3, §4.9): a single text
//! file enumerating `(name, digest)` pairs that shadows any reference without its own
//! per-file entry.
use crate::{Error, Result};
use bstr::ByteSlice;
use git_hash::ObjectId;
use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
};

pub const FILE_NAME: &str = "packed-refs";

/// Parse a `packed-refs` file's contents into `name -> digest`. Comment lines (`#...`) and
/// peeled-tag lines (`^<sha>`, attached to the entry immediately above) are recognized but
/// peeled targets are not retained — no operation in §4.9 needs them.
pub fn parse(contents: &[u8]) -> Result<HashMap<String, ObjectId>> {
    let mut out = HashMap::new();
    for line in contents.split(|&b| b == b'\n') {
        let line = line.trim_end_with(|c| c == '\r');
        if line.is_empty() || line[0] == b'#' || line[0] == b'^' {
            continue;
        }
        let space = line
            .iter()
            .position(|&b| b == b' ')
            .ok_or(Error::Decode("packed-refs line is missing its name separator"))?;
        let id = ObjectId::from_hex(&line[..space]).map_err(|_| Error::Decode("packed-refs line has a malformed digest"))?;
        let name = line[space + 1..]
            .to_str()
            .map_err(|_| Error::Decode("packed-refs name is not valid UTF-8"))?
            .to_string();
        out.insert(name, id);
    }
    Ok(out)
}

/// Render `entries` in sorted order, the inverse of [`parse`].
pub fn render(entries: &HashMap<String, ObjectId>) -> Vec<u8> {
    let mut names: Vec<&String> = entries.keys().collect();
    names.sort();
    let mut out = Vec::new();
    out.extend_from_slice(b"# pack-refs with: peeled fully-peeled sorted\n");
    for name in names {
        writeln!(out, "{} {}", entries[name].to_hex(), name).expect("writing to a Vec never fails");
    }
    out
}

/// Read and parse `packed-refs` at `path`; a missing file is an empty table, not an error.
pub fn read(path: &Path) -> Result<HashMap<String, ObjectId>> {
    match std::fs::read(path) {
        Ok(bytes) => parse(&bytes),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(err) => Err(Error::FsIo("read", path.to_path_buf(), err)),
    }
}

/// Rewrite `packed-refs` atomically, via a `packed-refs.lock` file written in full and then
/// renamed over the target — the same lock-file convention the format's real-world
/// implementations use, so readers never observe a torn or partially-written file (§5).
pub fn write(path: &Path, entries: &HashMap<String, ObjectId>) -> Result<()> {
    let bytes = render(entries);
    let lock_path = lock_path_for(path);
    {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|err| Error::FsIo("create packed-refs lock", lock_path.clone(), err))?;
        file.write_all(&bytes).map_err(|err| Error::FsIo("write packed-refs lock", lock_path.clone(), err))?;
    }
    std::fs::rename(&lock_path, path).map_err(|err| Error::FsIo("publish packed-refs", path.to_path_buf(), err))
}

fn lock_path_for(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}.lock", FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entries_and_skips_comments_and_peeled_lines() {
        let id = git_hash::hash(b"x");
        let contents = format!(
            "# pack-refs with: peeled fully-peeled sorted\n{} refs/heads/feature\n^{}\n",
            id.to_hex(),
            id.to_hex()
        );
        let parsed = parse(contents.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["refs/heads/feature"], id);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        let mut entries = HashMap::new();
        entries.insert("refs/heads/main".to_string(), git_hash::hash(b"a"));
        entries.insert("refs/tags/v1".to_string(), git_hash::hash(b"b"));
        write(&path, &entries).unwrap();
        assert_eq!(read(&path).unwrap(), entries);
        assert!(!lock_path_for(&path).exists());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        assert!(read(&path).unwrap().is_empty());
    }
}
