//! The top-level façade (§2, §4): a `Repository` composing the object database
//! (`git-odb`) and the reference store (`git-ref`) rooted at the same git directory,
//! exposing the operations §6 lists as consumed by the CLI/network layer.
#![forbid(unsafe_code)]

pub mod init;

use quick_error::quick_error;
use std::path::{Path, PathBuf};

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Odb(err: git_odb::Error) {
            display("object database error")
            from()
            source(err)
        }
        Ref(err: git_ref::Error) {
            display("reference store error")
            from()
            source(err)
        }
        Io(err: std::io::Error) {
            display("filesystem error")
            from()
            source(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The conventional name of a non-bare repository's git directory.
pub const DOT_GIT: &str = ".git";

/// A repository: an object database and a reference store, both rooted at `git_dir`.
/// Composes, rather than re-implements, the read/write routing each sub-store already
/// provides (§2's control flow).
pub struct Repository {
    git_dir: PathBuf,
    odb: git_odb::Store,
    refs: git_ref::Store,
}

impl Repository {
    /// Open the repository rooted at `git_dir`, initializing its on-disk layout (§6) if it
    /// does not already exist.
    pub fn at(git_dir: impl Into<PathBuf>) -> Result<Self> {
        let git_dir = git_dir.into();
        let odb = git_odb::Store::at(&git_dir)?;
        let refs = git_ref::Store::at(&git_dir)?;
        Ok(Repository { git_dir, odb, refs })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn objects(&self) -> &git_odb::Store {
        &self.odb
    }

    pub fn refs(&self) -> &git_ref::Store {
        &self.refs
    }

    /// Drop every process-local cache in the object database (§4.10).
    pub fn clear_caches(&self) {
        self.odb.clear_caches();
    }

    /// §4.10's `reset`: clear every cache, then truncate and re-initialize both `objects/`
    /// and `refs/` back to an empty repository's layout.
    pub fn reset(&self) -> Result<()> {
        self.odb.reset()?;

        let refs_dir = self.git_dir.join("refs");
        if refs_dir.is_dir() {
            std::fs::remove_dir_all(&refs_dir).map_err(Error::Io)?;
        }
        let packed_refs = self.git_dir.join("packed-refs");
        if packed_refs.is_file() {
            std::fs::remove_file(&packed_refs).map_err(Error::Io)?;
        }
        std::fs::create_dir_all(refs_dir.join("heads")).map_err(Error::Io)?;
        std::fs::create_dir_all(refs_dir.join("tags")).map_err(Error::Io)?;

        let head_path = self.git_dir.join("HEAD");
        if head_path.is_file() {
            std::fs::remove_file(&head_path).map_err(Error::Io)?;
        }
        // Re-initializes HEAD, matching the layout `Repository::at` produces fresh.
        git_ref::Store::at(&self.git_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_fresh_directory_initializes_head_and_odb_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path()).unwrap();
        assert_eq!(
            repo.refs().read("HEAD").unwrap(),
            git_ref::Target::Symbolic("refs/heads/master".to_string())
        );
        assert!(dir.path().join("objects").join("pack").is_dir());
    }

    #[test]
    fn write_through_odb_is_visible_through_the_repository_handle() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path()).unwrap();
        let (id, _) = repo.objects().write(&git_object::Object::Blob(b"hi\n".to_vec())).unwrap();
        assert!(repo.objects().mem(&id));
    }

    #[test]
    fn reset_clears_objects_and_reinitializes_refs() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path()).unwrap();
        let (id, _) = repo.objects().write(&git_object::Object::Blob(b"gone soon".to_vec())).unwrap();
        repo.refs().write("refs/heads/feature", id).unwrap();

        repo.reset().unwrap();

        assert!(!repo.objects().mem(&id));
        assert!(!repo.refs().mem("refs/heads/feature"));
        assert_eq!(
            repo.refs().read("HEAD").unwrap(),
            git_ref::Target::Symbolic("refs/heads/master".to_string())
        );
    }
}
