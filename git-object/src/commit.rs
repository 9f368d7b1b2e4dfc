use crate::{parse, Error, Signature};
use git_hash::ObjectId;
use std::io;

/// A commit: a snapshot (as a tree), zero or more parents, two attributions, and a message.
#[derive(PartialEq, Eq, Debug, Hash, Clone)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Extra header lines this implementation does not interpret (e.g. `gpgsig`), passed
    /// through verbatim between the attribution lines and the message.
    pub extra_headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub message: Vec<u8>,
}

impl Commit {
    pub(crate) fn write_to(&self, mut out: impl io::Write) -> Result<(), Error> {
        write!(out, "tree {}\n", self.tree)?;
        for parent in &self.parents {
            write!(out, "parent {}\n", parent)?;
        }
        out.write_all(b"author ")?;
        self.author.write_to(&mut out)?;
        out.write_all(b"\n")?;
        out.write_all(b"committer ")?;
        self.committer.write_to(&mut out)?;
        out.write_all(b"\n")?;
        for (key, value) in &self.extra_headers {
            out.write_all(key)?;
            out.write_all(b" ")?;
            out.write_all(value)?;
            out.write_all(b"\n")?;
        }
        out.write_all(b"\n")?;
        out.write_all(&self.message)?;
        Ok(())
    }

    pub(crate) fn from_bytes(mut data: &[u8]) -> Result<Self, Error> {
        let (line, rest) = parse::next_line(data)?;
        let tree = parse::hex_hash(parse::header_line(line, "tree")?)?;
        data = rest;

        let mut parents = Vec::new();
        loop {
            let (line, rest) = parse::next_line(data)?;
            if let Some(value) = line.strip_prefix(b"parent ") {
                parents.push(parse::hex_hash(value)?);
                data = rest;
            } else {
                break;
            }
        }

        let (line, rest) = parse::next_line(data)?;
        let author = Signature::from_bytes(parse::header_line(line, "author")?)?;
        data = rest;

        let (line, rest) = parse::next_line(data)?;
        let committer = Signature::from_bytes(parse::header_line(line, "committer")?)?;
        data = rest;

        let mut extra_headers = Vec::new();
        loop {
            let (line, rest) = parse::next_line(data)?;
            if line.is_empty() {
                data = rest;
                break;
            }
            let space = line
                .iter()
                .position(|b| *b == b' ')
                .ok_or(Error::Decode("extra commit header missing a value"))?;
            extra_headers.push((line[..space].to_vec(), line[space + 1..].to_vec()));
            data = rest;
        }

        Ok(Commit {
            tree,
            parents,
            author,
            committer,
            extra_headers,
            message: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str) -> Signature {
        Signature {
            name: name.as_bytes().to_vec(),
            email: b"a@b.c".to_vec(),
            time: 1_000_000,
            offset_in_seconds: 0,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let commit = Commit {
            tree: git_hash::hash(b"tree 0\0"),
            parents: vec![git_hash::hash(b"commit 0\0")],
            author: sig("Author"),
            committer: sig("Committer"),
            extra_headers: vec![],
            message: b"initial commit\n".to_vec(),
        };
        let mut buf = Vec::new();
        commit.write_to(&mut buf).unwrap();
        assert_eq!(Commit::from_bytes(&buf).unwrap(), commit);
    }

    #[test]
    fn passes_through_extra_headers() {
        let commit = Commit {
            tree: git_hash::hash(b"tree 0\0"),
            parents: vec![],
            author: sig("Author"),
            committer: sig("Committer"),
            extra_headers: vec![(b"gpgsig".to_vec(), b"-----BEGIN".to_vec())],
            message: b"signed\n".to_vec(),
        };
        let mut buf = Vec::new();
        commit.write_to(&mut buf).unwrap();
        assert_eq!(Commit::from_bytes(&buf).unwrap(), commit);
    }
}
