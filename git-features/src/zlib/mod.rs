//! The `Inflate`/`Deflate` capability interfaces, backed by `flate2`'s raw zlib codec.
pub mod stream;

pub use stream::deflate::Deflate;
pub use stream::inflate::Inflate;

/// The window size assumed by the spec's codec capability; `flate2`'s raw decompressor
/// manages its own window internally, this constant documents the contract callers rely on.
pub const WINDOW_SIZE: usize = 32 * 1024;

/// The outcome of one `refill`/`flush` step of an incremental codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub consumed_in: usize,
    pub produced_out: usize,
    pub is_done: bool,
}
