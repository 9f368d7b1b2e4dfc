use crate::zlib::Outcome;
use flate2::{Compress, Compression, FlushCompress, Status};
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Codec(msg: &'static str) {
            display("zlib compression failed: {}", msg)
        }
    }
}

/// An incremental zlib deflator, the concrete implementation of the `Deflate` capability.
/// `level` follows zlib's `0..=9` convention (`0` = store, `9` = best compression).
pub struct Deflate {
    state: Compress,
}

impl Deflate {
    pub fn new(level: u32) -> Self {
        Deflate {
            state: Compress::new(Compression::new(level.min(9)), true),
        }
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn total_in(&self) -> u64 {
        self.state.total_in()
    }

    pub fn total_out(&self) -> u64 {
        self.state.total_out()
    }

    /// Feed as much of `input` as fits, writing compressed bytes into `output`.
    pub fn step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Outcome, Error> {
        let before_in = self.state.total_in();
        let before_out = self.state.total_out();
        let status = self
            .state
            .compress(input, output, FlushCompress::None)
            .map_err(|_| Error::Codec("internal deflate state error"))?;
        Ok(Outcome {
            consumed_in: (self.state.total_in() - before_in) as usize,
            produced_out: (self.state.total_out() - before_out) as usize,
            is_done: matches!(status, Status::StreamEnd),
        })
    }

    /// Compress the entirety of `input` into `output` and finish the stream, returning the
    /// number of bytes written to `output`. `output` must be large enough to hold the
    /// worst-case compressed size (use a size comfortably larger than `input`).
    pub fn once(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, Error> {
        let before_out = self.state.total_out();
        self.state
            .compress(input, output, FlushCompress::Finish)
            .map_err(|_| Error::Codec("internal deflate state error"))?;
        Ok((self.state.total_out() - before_out) as usize)
    }
}
