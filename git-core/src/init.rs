//! Repository initialization, the one entry point the CLI needs (`git init`'s layout).
use crate::{Repository, Result};
use std::path::PathBuf;

/// Initialize a repository in the current directory's `.git`.
pub fn repository() -> Result<()> {
    let cwd = std::env::current_dir().map_err(crate::Error::Io)?;
    at(cwd.join(crate::DOT_GIT))?;
    Ok(())
}

/// Initialize (or open, if already present) a repository rooted at `git_dir`.
pub fn at(git_dir: impl Into<PathBuf>) -> Result<Repository> {
    Repository::at(git_dir)
}
