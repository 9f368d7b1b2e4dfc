//! The `Filesystem` capability: open/read/write/append/rename/list, plus a `Mapper`
//! sub-capability producing read-only memory regions of a file.
use std::{
    fs, io,
    ops::Deref,
    path::{Path, PathBuf},
};

/// Named filesystem operations the engine needs; a capability parameter so the core
/// never hard-codes `std::fs` (tests can swap in an in-memory or chroot-sandboxed impl).
pub trait Filesystem: Send + Sync {
    fn open_r(&self, path: &Path) -> io::Result<fs::File>;
    fn open_w(&self, path: &Path) -> io::Result<fs::File>;
    fn append(&self, path: &Path) -> io::Result<fs::File>;
    fn unlink(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    /// Names of the immediate children of `path`; empty (not an error) if `path` is absent.
    fn dir_contents(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// A read-only memory-mapped view of a byte range of a file.
pub struct Region(memmap2::Mmap);

impl Deref for Region {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Produces [`Region`]s for windowed, zero-copy access into large pack/index files.
pub trait Mapper: Send + Sync {
    fn map(&self, file: &fs::File, offset: u64, len: usize) -> io::Result<Region>;
}

/// The concrete, `std::fs` + `memmap2`-backed implementation of both capabilities. This is
/// the default the rest of the engine is wired against; nothing here is required by the
/// spec to be the *only* implementation, just a usable one.
#[derive(Default, Clone, Copy)]
pub struct StdBackend;

impl Filesystem for StdBackend {
    fn open_r(&self, path: &Path) -> io::Result<fs::File> {
        fs::File::open(path)
    }

    fn open_w(&self, path: &Path) -> io::Result<fs::File> {
        fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)
    }

    fn append(&self, path: &Path) -> io::Result<fs::File> {
        fs::OpenOptions::new().append(true).create(true).open(path)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn dir_contents(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }
}

impl Mapper for StdBackend {
    fn map(&self, file: &fs::File, offset: u64, len: usize) -> io::Result<Region> {
        // Safety-free: `memmap2::Mmap` is itself an unsafe construct in general (the file
        // could be truncated by another process), an inherent limitation of mmap the spec
        // accepts for packs and indices, which this engine treats as append-only/immutable.
        let mmap = unsafe { memmap2::MmapOptions::new().offset(offset).len(len).map(file)? };
        Ok(Region(mmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn write_then_map_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let backend = StdBackend::default();
        {
            let mut f = backend.open_w(&path).unwrap();
            f.write_all(b"hello world").unwrap();
        }
        let f = backend.open_r(&path).unwrap();
        let region = backend.map(&f, 6, 5).unwrap();
        assert_eq!(&*region, b"world");
    }

    #[test]
    fn rename_is_atomic_replace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StdBackend::default();
        let tmp = dir.path().join("tmp");
        let dest = dir.path().join("dest");
        backend.open_w(&tmp).unwrap().write_all(b"data").unwrap();
        backend.rename(&tmp, &dest).unwrap();
        assert!(backend.is_file(&dest));
        assert!(!backend.is_file(&tmp));
    }

    #[test]
    fn dir_contents_on_missing_dir_is_empty_not_error() {
        let backend = StdBackend::default();
        let contents = backend.dir_contents(Path::new("/no/such/dir/hopefully")).unwrap();
        assert!(contents.is_empty());
    }
}
