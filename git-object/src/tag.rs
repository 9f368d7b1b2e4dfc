use crate::{parse, Error, Kind, Signature};
use git_hash::ObjectId;
use std::io;

/// An annotated tag: a named, optionally-signed pointer at another object.
#[derive(PartialEq, Eq, Debug, Hash, Clone)]
pub struct Tag {
    pub target: ObjectId,
    pub target_kind: Kind,
    pub name: Vec<u8>,
    pub tagger: Option<Signature>,
    pub message: Vec<u8>,
}

impl Tag {
    pub(crate) fn write_to(&self, mut out: impl io::Write) -> Result<(), Error> {
        write!(out, "object {}\n", self.target)?;
        write!(out, "type {}\n", self.target_kind)?;
        out.write_all(b"tag ")?;
        out.write_all(&self.name)?;
        out.write_all(b"\n")?;
        if let Some(tagger) = &self.tagger {
            out.write_all(b"tagger ")?;
            tagger.write_to(&mut out)?;
            out.write_all(b"\n")?;
        }
        out.write_all(b"\n")?;
        out.write_all(&self.message)?;
        Ok(())
    }

    pub(crate) fn from_bytes(mut data: &[u8]) -> Result<Self, Error> {
        let (line, rest) = parse::next_line(data)?;
        let target = parse::hex_hash(parse::header_line(line, "object")?)?;
        data = rest;

        let (line, rest) = parse::next_line(data)?;
        let target_kind_name = parse::header_line(line, "type")?;
        let target_kind =
            Kind::from_bytes(target_kind_name).ok_or(Error::Decode("tag references an unknown object kind"))?;
        data = rest;

        let (line, rest) = parse::next_line(data)?;
        let name = parse::header_line(line, "tag")?.to_vec();
        data = rest;

        let (line, rest) = parse::next_line(data)?;
        let (tagger, data) = if let Some(value) = line.strip_prefix(b"tagger ") {
            let tagger = Some(Signature::from_bytes(value)?);
            let (blank, after_blank) = parse::next_line(rest)?;
            if !blank.is_empty() {
                return Err(Error::Decode("expected blank line after tag headers"));
            }
            (tagger, after_blank)
        } else {
            if !line.is_empty() {
                return Err(Error::Decode("expected blank line after tag headers"));
            }
            (None, rest)
        };

        Ok(Tag {
            target,
            target_kind,
            name,
            tagger,
            message: data.to_vec(),
        })
    }
}
