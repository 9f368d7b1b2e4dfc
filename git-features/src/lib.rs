//! Capability interfaces shared across the object database engine: the `Inflate`/`Deflate`
//! codecs and the `Filesystem`/`Mapper` abstraction. Each capability has one concrete,
//! usable implementation so the rest of the workspace can build and be tested without an
//! external caller supplying its own backend; callers that need a different backend
//! implement the trait directly rather than going through a registry.
// `unsafe` is confined to `fs::StdBackend::map`, where `memmap2` requires it.
pub mod fs;
pub mod zlib;
