use quick_error::quick_error;
use std::{io, path::PathBuf};

quick_error! {
    /// Everything that can go wrong reading or writing a reference (§4.9, §7).
    #[derive(Debug)]
    pub enum Error {
        NotFound {
            display("the reference does not exist")
        }
        InvalidReference(name: String) {
            display("'{}' is not a valid reference name", name)
        }
        Decode(message: &'static str) {
            display("malformed reference data: {}", message)
        }
        FsIo(op: &'static str, path: PathBuf, err: io::Error) {
            display("filesystem operation '{}' failed for {}", op, path.display())
            source(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
