//! Shared plumbing for probes built on `std::io::Read` decoders.

use std::io::{self, Read};

use zscan_core::probe::UNBOUNDED_OUTPUT_CAP;
use zscan_core::{Algorithm, Decoded, Error, Result, Scratch};

/// Largest read issued against a streaming decoder in one call.
pub const READ_CHUNK: usize = 64 * 1024;

/// Size of the next read given how much output is still allowed.
#[inline]
pub(crate) fn chunk_len(remaining: u64) -> usize {
    remaining.min(READ_CHUNK as u64) as usize
}

/// Pull output from `reader` until the stream ends, fails, or `max_out` bytes
/// have been produced.
///
/// Some decoders only notice the end of their stream when they trip over the
/// bytes that follow it. `ends_stream` classifies such errors: when it returns
/// true for an error seen after some output, the stream counts as complete.
pub(crate) fn drain<R, F>(
    mut reader: R,
    max_out: Option<u64>,
    scratch: &mut Scratch,
    ends_stream: F,
) -> Decoded
where
    R: Read,
    F: Fn(&io::Error) -> bool,
{
    let limit = max_out.unwrap_or(UNBOUNDED_OUTPUT_CAP);
    let mut total = 0u64;
    while total < limit {
        let buf = scratch.get(chunk_len(limit - total));
        match reader.read(buf) {
            Ok(0) => return Decoded::Complete(total),
            Ok(n) => total += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if total > 0 && ends_stream(&e) => return Decoded::Complete(total),
            Err(_) => return Decoded::from_partial(total),
        }
    }
    Decoded::from_partial(total)
}

/// Read exactly `len` bytes of output, reporting a short stream as a length
/// mismatch.
pub(crate) fn read_to_len<R: Read>(reader: R, len: u64, algorithm: Algorithm) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(usize::try_from(len).unwrap_or(0).min(1 << 30));
    reader
        .take(len)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decode {
            algorithm,
            reason: e.to_string(),
        })?;
    if out.len() as u64 != len {
        return Err(Error::LengthMismatch {
            algorithm,
            expected: len,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}

/// Never treats an error as the end of the stream.
pub(crate) fn strict(_: &io::Error) -> bool {
    false
}
