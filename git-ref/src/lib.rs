//! The reference store (§4.9): symbolic, slash-separated names resolving to object
//! digests, backed by one file per reference plus a `packed-refs` side file that shadows
//! any reference without its own per-file entry.
#![forbid(unsafe_code)]

mod error;
mod packed;

pub use error::Error;

use bstr::ByteSlice;
use git_hash::ObjectId;
use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::RwLock,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Maximum number of symbolic hops [`Store::resolve`] and [`normalize`] will follow before
/// giving up — a backstop against a reference cycle, since chains are otherwise unbounded
/// by construction (§4.9).
pub const MAX_HOPS: usize = 10;

/// What a reference's own content names: either an object directly, or another reference
/// (forming a chain terminated by a digest or by absence, per §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Object(ObjectId),
    Symbolic(String),
}

impl Target {
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Target::Object(id) => Some(*id),
            Target::Symbolic(_) => None,
        }
    }
}

/// A store for reading and writing the references rooted at a repository's git directory
/// (the parent of `refs/`, `packed-refs`, and `HEAD`).
pub struct Store {
    git_dir: PathBuf,
    packed_shadow: RwLock<Option<HashMap<String, ObjectId>>>,
}

impl Store {
    /// Open the reference store rooted at `git_dir`. If `HEAD` does not exist yet it is
    /// initialized to `ref: refs/heads/master\n`, the default a fresh repository starts at.
    pub fn at(git_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_dir = git_dir.into();
        let store = Store {
            git_dir,
            packed_shadow: RwLock::new(None),
        };
        if !store.path_for("HEAD").is_file() {
            store.write_loose("HEAD", &Target::Symbolic("refs/heads/master".into()))?;
        }
        Ok(store)
    }

    /// `true` if `name` resolves to a per-file ref or a packed-refs entry.
    pub fn mem(&self, name: &str) -> bool {
        if validate_name(name).is_err() {
            return false;
        }
        self.path_for(name).is_file() || self.packed().map(|packed| packed.contains_key(name)).unwrap_or(false)
    }

    /// Every reference name known to the store, loose or packed, sorted and de-duplicated.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.list_loose()?.into_iter().collect();
        for name in self.packed()?.keys() {
            names.insert(name.clone());
        }
        Ok(names.into_iter().collect())
    }

    /// Read `name`'s own content without following a symbolic chain: the per-file path is
    /// tried first, falling back to the packed-refs shadow only when no per-file ref exists
    /// (§4.9's read algorithm — a per-file ref always shadows a packed entry).
    pub fn read(&self, name: &str) -> Result<Target> {
        validate_name(name)?;
        match self.read_loose(name) {
            Ok(target) => Ok(target),
            Err(Error::NotFound) => self
                .packed()?
                .get(name)
                .copied()
                .map(Target::Object)
                .ok_or(Error::NotFound),
            Err(err) => Err(err),
        }
    }

    /// Follow `name`'s chain to a concrete digest, bounded to [`MAX_HOPS`] hops.
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        let mut current = name.to_string();
        for _ in 0..MAX_HOPS {
            match self.read(&current)? {
                Target::Object(id) => return Ok(id),
                Target::Symbolic(next) => current = next,
            }
        }
        Err(Error::InvalidReference(name.to_string()))
    }

    /// Write `name -> value` atomically. If `name` previously existed only in packed-refs,
    /// that entry is removed and packed-refs rewritten, since the per-file ref now shadows
    /// it (§4.9's write visibility property).
    pub fn write(&self, name: &str, value: ObjectId) -> Result<()> {
        validate_name(name)?;
        self.write_loose(name, &Target::Object(value))?;
        self.remove_from_packed(name)?;
        Ok(())
    }

    /// Remove `name` entirely, whether it was a per-file ref, a packed-refs entry, or both.
    pub fn remove(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::FsIo("remove", path, err)),
        }
        self.remove_from_packed(name)?;
        Ok(())
    }

    /// Build the full name -> target graph (§4.9): walk `refs/` and `HEAD` for per-file
    /// refs, layer in any packed-refs entry not already present, then resolve symbolic
    /// entries by repeated lookup within the graph itself (bounded to [`MAX_HOPS`] hops).
    /// A chain that does not bottom out in an object within the hop limit is left symbolic.
    pub fn graph(&self) -> Result<HashMap<String, Target>> {
        let mut graph = HashMap::new();
        for name in self.list_loose()? {
            graph.insert(name.clone(), self.read_loose(&name)?);
        }
        for (name, id) in self.packed()? {
            graph.entry(name).or_insert(Target::Object(id));
        }

        let symbolic_names: Vec<String> = graph
            .iter()
            .filter(|(_, target)| matches!(target, Target::Symbolic(_)))
            .map(|(name, _)| name.clone())
            .collect();
        for name in symbolic_names {
            if let Some(resolved) = normalize(&graph, &name) {
                graph.insert(name, Target::Object(resolved));
            }
        }
        Ok(graph)
    }

    fn list_loose(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        if self.path_for("HEAD").is_file() {
            out.push("HEAD".to_string());
        }
        walk_refs(&self.git_dir.join("refs"), "refs", &mut out)?;
        Ok(out)
    }

    fn read_loose(&self, name: &str) -> Result<Target> {
        let path = self.path_for(name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(Error::NotFound),
            Err(err) => return Err(Error::FsIo("read", path, err)),
        };
        parse_target(&bytes)
    }

    fn write_loose(&self, name: &str, target: &Target) -> Result<()> {
        let path = self.path_for(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| Error::FsIo("create ref directory", parent.to_path_buf(), err))?;
        }
        let contents = match target {
            Target::Object(id) => format!("{}\n", id.to_hex()),
            Target::Symbolic(name) => format!("ref: {}\n", name),
        };
        let lock = path.with_file_name(format!("{}.lock", path.file_name().expect("ref path always has a file name").to_string_lossy()));
        std::fs::write(&lock, contents.as_bytes()).map_err(|err| Error::FsIo("write ref", lock.clone(), err))?;
        std::fs::rename(&lock, &path).map_err(|err| Error::FsIo("rename ref into place", path, err))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    fn packed(&self) -> Result<HashMap<String, ObjectId>> {
        if let Some(cached) = self.packed_shadow.read().unwrap().as_ref() {
            return Ok(cached.clone());
        }
        let loaded = packed::read(&self.packed_path())?;
        *self.packed_shadow.write().unwrap() = Some(loaded.clone());
        Ok(loaded)
    }

    fn packed_path(&self) -> PathBuf {
        self.git_dir.join(packed::FILE_NAME)
    }

    fn remove_from_packed(&self, name: &str) -> Result<()> {
        let mut entries = self.packed()?;
        if entries.remove(name).is_some() {
            packed::write(&self.packed_path(), &entries)?;
            *self.packed_shadow.write().unwrap() = Some(entries);
            log::debug!("rewrote packed-refs after '{}' started shadowing it", name);
        }
        Ok(())
    }
}

/// Resolve `name` within an already-built `graph` (as returned by [`Store::graph`]),
/// following symbolic links up to [`MAX_HOPS`] times. Exposed standalone so callers that
/// built their own graph (or a subset of it) don't need a live [`Store`] to normalize it.
pub fn normalize(graph: &HashMap<String, Target>, name: &str) -> Option<ObjectId> {
    let mut current = name.to_string();
    for _ in 0..MAX_HOPS {
        match graph.get(&current)? {
            Target::Object(id) => return Some(*id),
            Target::Symbolic(next) => current = next.clone(),
        }
    }
    None
}

fn walk_refs(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Error::FsIo("list", dir.to_path_buf(), err)),
    };
    for entry in entries {
        let entry = entry.map_err(|err| Error::FsIo("list", dir.to_path_buf(), err))?;
        let path = entry.path();
        let name = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
        if path.is_dir() {
            walk_refs(&path, &name, out)?;
        } else {
            out.push(name);
        }
    }
    Ok(())
}

fn parse_target(bytes: &[u8]) -> Result<Target> {
    let text = bytes.trim_end_with(|c| c == '\n' || c == '\r');
    if let Some(name) = text.strip_prefix(b"ref: ") {
        let name = name
            .to_str()
            .map_err(|_| Error::Decode("symbolic ref target is not valid UTF-8"))?
            .trim();
        return Ok(Target::Symbolic(name.to_string()));
    }
    let id = ObjectId::from_hex(text.trim()).map_err(|_| Error::Decode("reference file is neither a symbolic target nor a valid digest"))?;
    Ok(Target::Object(id))
}

/// A reference name must be `HEAD`, or start with `refs/` and contain no empty, `..`, or
/// otherwise malformed path segments (§4.9's `InvalidReference` failure).
fn validate_name(name: &str) -> Result<()> {
    if name == "HEAD" {
        return Ok(());
    }
    let valid = name.starts_with("refs/")
        && !name.ends_with('/')
        && !name.contains("//")
        && name.split('/').all(|segment| !segment.is_empty() && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidReference(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_initializes_head_to_refs_heads_master() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        assert_eq!(store.read("HEAD").unwrap(), Target::Symbolic("refs/heads/master".to_string()));
    }

    #[test]
    fn write_then_read_round_trips_a_direct_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        let id = git_hash::hash(b"commit");
        store.write("refs/heads/feature", id).unwrap();
        assert!(store.mem("refs/heads/feature"));
        assert_eq!(store.resolve("refs/heads/feature").unwrap(), id);
        assert_eq!(store.read("refs/heads/feature").unwrap(), Target::Object(id));
    }

    #[test]
    fn per_file_ref_shadows_a_packed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        let h1 = git_hash::hash(b"h1");
        let h2 = git_hash::hash(b"h2");

        store.write("refs/heads/feature", h1).unwrap();

        let mut packed_entries = HashMap::new();
        packed_entries.insert("refs/heads/feature".to_string(), h2);
        packed::write(&dir.path().join("packed-refs"), &packed_entries).unwrap();

        let store = Store::at(dir.path()).unwrap();
        assert_eq!(store.resolve("refs/heads/feature").unwrap(), h1);
    }

    #[test]
    fn write_removes_the_now_shadowed_packed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let h1 = git_hash::hash(b"h1");
        let h2 = git_hash::hash(b"h2");

        let mut packed_entries = HashMap::new();
        packed_entries.insert("refs/heads/feature".to_string(), h2);
        packed::write(&dir.path().join("packed-refs"), &packed_entries).unwrap();

        let store = Store::at(dir.path()).unwrap();
        store.write("refs/heads/feature", h1).unwrap();

        let on_disk = packed::read(&dir.path().join("packed-refs")).unwrap();
        assert!(!on_disk.contains_key("refs/heads/feature"));
    }

    #[test]
    fn remove_deletes_both_loose_and_packed_forms() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        let id = git_hash::hash(b"x");
        store.write("refs/heads/feature", id).unwrap();
        store.remove("refs/heads/feature").unwrap();
        assert!(matches!(store.read("refs/heads/feature"), Err(Error::NotFound)));
        assert!(!store.mem("refs/heads/feature"));
    }

    #[test]
    fn graph_resolves_a_symbolic_chain_and_leaves_head_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        let id = git_hash::hash(b"master-tip");
        store.write("refs/heads/master", id).unwrap();

        let graph = store.graph().unwrap();
        assert_eq!(graph.get("HEAD"), Some(&Target::Object(id)));
        assert_eq!(graph.get("refs/heads/master"), Some(&Target::Object(id)));
    }

    #[test]
    fn list_unions_loose_and_packed_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        store.write("refs/heads/a", git_hash::hash(b"a")).unwrap();

        let mut packed_entries = HashMap::new();
        packed_entries.insert("refs/heads/b".to_string(), git_hash::hash(b"b"));
        packed::write(&dir.path().join("packed-refs"), &packed_entries).unwrap();

        let store = Store::at(dir.path()).unwrap();
        let names = store.list().unwrap();
        assert!(names.contains(&"refs/heads/a".to_string()));
        assert!(names.contains(&"refs/heads/b".to_string()));
        assert!(names.contains(&"HEAD".to_string()));
    }

    #[test]
    fn rejects_a_malformed_reference_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at(dir.path()).unwrap();
        assert!(matches!(store.write("not/rooted/at/refs", git_hash::hash(b"x")), Err(Error::InvalidReference(_))));
        assert!(matches!(store.write("refs/heads/../escape", git_hash::hash(b"x")), Err(Error::InvalidReference(_))));
    }
}
