use crate::zlib::Outcome;
use flate2::{Decompress, DecompressError, FlushDecompress, Status};
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Codec(err: DecompressError) {
            display("the zlib stream is malformed")
            from()
            source(err)
        }
    }
}

/// An incremental zlib inflator with explicit input/output buffer passing, the concrete
/// implementation of the `Inflate` capability. Reusable across many objects via [`Inflate::reset`].
pub struct Inflate {
    state: Decompress,
}

impl Default for Inflate {
    fn default() -> Self {
        Inflate {
            state: Decompress::new(true),
        }
    }
}

impl Inflate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset internal state so the instance can be reused for a new, unrelated stream.
    pub fn reset(&mut self) {
        self.state.reset(true);
    }

    /// Total bytes consumed from the input across all calls since the last [`reset`](Self::reset).
    pub fn total_in(&self) -> u64 {
        self.state.total_in()
    }

    /// Total bytes produced into outputs across all calls since the last [`reset`](Self::reset).
    pub fn total_out(&self) -> u64 {
        self.state.total_out()
    }

    /// Feed as much of `input` as fits, writing decompressed bytes into `output`.
    /// Returns how much of each buffer was used and whether the stream is finished.
    pub fn step(&mut self, input: &[u8], output: &mut [u8]) -> Result<Outcome, Error> {
        let before_in = self.state.total_in();
        let before_out = self.state.total_out();
        let status = self.state.decompress(input, output, FlushDecompress::None)?;
        Ok(Outcome {
            consumed_in: (self.state.total_in() - before_in) as usize,
            produced_out: (self.state.total_out() - before_out) as usize,
            is_done: matches!(status, Status::StreamEnd),
        })
    }

    /// Decompress the entirety of `input` into `output`, looping `step` until the stream
    /// ends. `output` must already be sized to hold the full inflated payload.
    pub fn once(&mut self, mut input: &[u8], mut output: &mut [u8]) -> Result<usize, Error> {
        let mut total_out = 0;
        loop {
            let outcome = self.step(input, output)?;
            input = &input[outcome.consumed_in..];
            output = &mut output[outcome.produced_out..];
            total_out += outcome.produced_out;
            if outcome.is_done {
                return Ok(total_out);
            }
            if outcome.consumed_in == 0 && outcome.produced_out == 0 {
                return Ok(total_out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zlib::stream::deflate::Deflate;

    #[test]
    fn inflate_reverses_deflate() {
        let payload = b"the quick brown fox jumps over the lazy dog";
        let mut deflate = Deflate::new(6);
        let mut compressed = vec![0u8; 256];
        let compressed_len = deflate.once(payload, &mut compressed).unwrap();

        let mut inflate = Inflate::new();
        let mut decompressed = vec![0u8; payload.len()];
        let n = inflate.once(&compressed[..compressed_len], &mut decompressed).unwrap();
        assert_eq!(&decompressed[..n], &payload[..]);
    }
}
