use quick_error::quick_error;
use std::{io, path::PathBuf};

quick_error! {
    /// The union of everything that can go wrong reading from or writing to the object
    /// database. Sub-module errors (`loose::Error`, `pack::data::decode::Error`, …) convert
    /// into this via `From` so `?` composes across layer boundaries.
    #[derive(Debug)]
    pub enum Error {
        NotFound(id: git_hash::ObjectId) {
            display("object {} does not exist in the store", id)
        }
        Decode(message: &'static str) {
            display("malformed object data: {}", message)
        }
        Object(err: git_object::Error) {
            display("object could not be decoded")
            from()
            source(err)
        }
        PackHeader(err: crate::pack::data::Error) {
            display("a pack file or entry header was malformed")
            from()
            source(err)
        }
        PackIndex(err: crate::pack::index::Error) {
            display("a pack index was malformed")
            from()
            source(err)
        }
        PackIter(err: crate::pack::data::iter::Error) {
            display("a pack could not be streamed without its index")
            from()
            source(err)
        }
        Inflate(err: git_features::zlib::stream::inflate::Error) {
            display("zlib inflate failed")
            from()
            source(err)
        }
        Deflate(err: git_features::zlib::stream::deflate::Error) {
            display("zlib deflate failed")
            from()
            source(err)
        }
        PackDecode(message: &'static str) {
            display("pack is structurally invalid: {}", message)
        }
        DeltaOutOfRange {
            display("a delta COPY instruction referenced bytes outside of its base")
        }
        DeltaCycle {
            display("a delta chain exceeded the maximum reconstruction depth, a cycle is likely")
        }
        MissingBase(id: git_hash::ObjectId) {
            display("a ref-delta base {} could not be found in this pack, the loose store, or any other open pack", id)
        }
        IndexDecode(message: &'static str) {
            display("pack index is structurally invalid: {}", message)
        }
        IndexEncode(message: &'static str) {
            display("pack index could not be encoded: {}", message)
        }
        FsIo(op: &'static str, path: PathBuf, err: io::Error) {
            display("filesystem operation '{}' failed for {}", op, path.display())
            source(err)
        }
        InvalidHash(err: git_hash::Error) {
            display("malformed object id")
            from()
            source(err)
        }
        DeltaPlan(message: &'static str) {
            display("the delta planner could not produce a valid pack: {}", message)
        }
        Stalled {
            display("the incoming pack stream made no progress and was abandoned")
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
