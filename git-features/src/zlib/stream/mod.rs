pub mod deflate;
pub mod inflate;

/// A ready-made `io::Read` adapter that inflates everything read from the wrapped
/// `BufRead`, for callers that want streaming decompression rather than the buffer-based
/// [`inflate::Inflate`] capability (the pack entry iterator is the main user of this).
pub type InflateReader<R> = flate2::bufread::ZlibDecoder<R>;

/// The `io::Write` counterpart, used by the pack encoder to compress an object body
/// directly into the output stream.
pub type DeflateWriter<W> = flate2::write::ZlibEncoder<W>;
