//! The capability contract every codec adapter implements.
//!
//! The finder never talks to a decompression library directly. It asks a
//! [`ProbeSource`] for the [`CodecProbe`] of each selected algorithm and drives
//! it through three calls: a cheap signature check, a bounded trial decode and
//! a final full decode of a proven block.

use std::sync::Arc;

use crate::algorithm::Algorithm;
use crate::error::Result;

/// Output reserved per requested byte by codecs that decode into a flat buffer.
pub const SCRATCH_RATIO: u64 = 128;

/// Largest scratch buffer any single probe may hold.
pub const MAX_SCRATCH_LEN: usize = 1 << 28;

/// Hard output ceiling for "unbounded" trial decodes.
pub const UNBOUNDED_OUTPUT_CAP: u64 = 1 << 32;

/// Outcome of a trial decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// The decoder reached the end of its stream after producing `n` bytes.
    Complete(u64),
    /// Decoding stopped early after producing `n > 0` bytes: the output cap
    /// was reached, the input ran out, or the data turned corrupt.
    Truncated(u64),
    /// Nothing could be decoded at this position.
    Invalid,
}

impl Decoded {
    /// Number of output bytes produced, zero for [`Decoded::Invalid`].
    pub fn len(self) -> u64 {
        match self {
            Decoded::Complete(n) | Decoded::Truncated(n) => n,
            Decoded::Invalid => 0,
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Decoded::Complete(_))
    }

    /// A decode that stopped before the end of stream.
    pub fn from_partial(n: u64) -> Self {
        if n == 0 {
            Decoded::Invalid
        } else {
            Decoded::Truncated(n)
        }
    }
}

/// Per-worker output buffer reused across trial decodes.
#[derive(Debug, Default)]
pub struct Scratch {
    buf: Vec<u8>,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch::default()
    }

    /// A writable slice of `len` bytes, clamped to [`MAX_SCRATCH_LEN`].
    ///
    /// The backing buffer only ever grows; contents are unspecified.
    pub fn get(&mut self, len: usize) -> &mut [u8] {
        let len = len.min(MAX_SCRATCH_LEN);
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
        &mut self.buf[..len]
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

pub trait CodecProbe: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Fast signature check over the bytes at a candidate offset.
    ///
    /// Must never reject a position the codec could actually decode.
    fn is_possible(&self, _bytes: &[u8]) -> bool {
        true
    }

    /// Decode a prefix of `input`, producing at most `max_out` bytes.
    ///
    /// `None` means "as much as the stream holds", limited by
    /// [`UNBOUNDED_OUTPUT_CAP`].
    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch)
        -> Decoded;

    /// Decode a proven block, which must yield exactly `decompressed_len` bytes.
    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>>;
}

/// Resolves the probe for an algorithm.
pub trait ProbeSource: Send + Sync {
    fn probe(&self, algorithm: Algorithm) -> Option<Arc<dyn CodecProbe>>;
}
