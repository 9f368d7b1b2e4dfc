use crate::Error;
use git_hash::ObjectId;
use std::io;

/// The unix-style file mode of a tree entry, stored as the raw octal value git uses
/// (`100644` for a regular file, `40000` for a sub-tree, and so on).
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Mode(pub u32);

impl Mode {
    pub const BLOB: Mode = Mode(0o100644);
    pub const BLOB_EXECUTABLE: Mode = Mode(0o100755);
    pub const LINK: Mode = Mode(0o120000);
    pub const TREE: Mode = Mode(0o40000);
    pub const COMMIT: Mode = Mode(0o160000);

    /// `true` if this entry is itself a tree (i.e. a directory).
    pub fn is_tree(&self) -> bool {
        *self == Mode::TREE
    }
}

/// One entry of a [`Tree`]: a name, its mode, and the id of the object it points at.
#[derive(PartialEq, Eq, Debug, Hash, Clone)]
pub struct Entry {
    pub mode: Mode,
    pub filename: Vec<u8>,
    pub oid: ObjectId,
}

/// An immutable, canonically-ordered directory listing.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Tree {
    entries: Vec<Entry>,
}

impl Tree {
    /// Build a tree from entries in any order; they are sorted into canonical order.
    pub fn from_entries(mut entries: Vec<Entry>) -> Self {
        entries.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        Tree { entries }
    }

    /// The entries of this tree, in canonical (sorted) order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn write_to(&self, mut out: impl io::Write) -> Result<(), Error> {
        for entry in &self.entries {
            write!(out, "{:o} ", entry.mode.0)?;
            out.write_all(&entry.filename)?;
            out.write_all(&[0])?;
            out.write_all(entry.oid.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn from_bytes(mut data: &[u8]) -> Result<Self, Error> {
        let mut entries = Vec::new();
        while !data.is_empty() {
            let space = data
                .iter()
                .position(|b| *b == b' ')
                .ok_or(Error::Decode("tree entry missing mode/name separator"))?;
            let mode = std::str::from_utf8(&data[..space])
                .ok()
                .and_then(|s| u32::from_str_radix(s, 8).ok())
                .ok_or(Error::Decode("tree entry mode is not valid octal"))?;
            data = &data[space + 1..];
            let nul = data
                .iter()
                .position(|b| *b == 0)
                .ok_or(Error::Decode("tree entry missing name terminator"))?;
            let filename = data[..nul].to_vec();
            data = &data[nul + 1..];
            if data.len() < git_hash::ObjectId::LEN {
                return Err(Error::Decode("tree entry truncated before its id"));
            }
            let oid = ObjectId::from_bytes(&data[..git_hash::ObjectId::LEN])?;
            data = &data[git_hash::ObjectId::LEN..];
            entries.push(Entry {
                mode: Mode(mode),
                filename,
                oid,
            });
        }
        // entries are written in canonical order already; avoid re-sorting identical input
        // so a round trip of a tree we didn't construct ourselves is the identity function.
        Ok(Tree { entries })
    }
}

/// git sorts tree entries as if directory names had a trailing `/`, so that e.g. `foo`
/// (a file) sorts before `foo.c` but `foo/` (a directory) sorts after it.
fn sort_key(entry: &Entry) -> Vec<u8> {
    let mut key = entry.filename.clone();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_sort_directories_after_files_with_shared_prefix() {
        let tree = Tree::from_entries(vec![
            Entry {
                mode: Mode::TREE,
                filename: b"foo".to_vec(),
                oid: ObjectId::null(),
            },
            Entry {
                mode: Mode::BLOB,
                filename: b"foo.c".to_vec(),
                oid: ObjectId::null(),
            },
        ]);
        let names: Vec<_> = tree.entries().iter().map(|e| e.filename.clone()).collect();
        assert_eq!(names, vec![b"foo.c".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let tree = Tree::from_entries(vec![
            Entry {
                mode: Mode::BLOB,
                filename: b"a.txt".to_vec(),
                oid: git_hash::hash(b"blob 1\0a"),
            },
            Entry {
                mode: Mode::TREE,
                filename: b"sub".to_vec(),
                oid: git_hash::hash(b"tree 0\0"),
            },
        ]);
        let mut buf = Vec::new();
        tree.write_to(&mut buf).unwrap();
        assert_eq!(Tree::from_bytes(&buf).unwrap(), tree);
    }

    #[test]
    fn empty_tree_encodes_to_nothing() {
        let tree = Tree::default();
        assert!(tree.to_vec_via_object().is_empty());
    }

    impl Tree {
        fn to_vec_via_object(&self) -> Vec<u8> {
            let mut buf = Vec::new();
            self.write_to(&mut buf).unwrap();
            buf
        }
    }
}
