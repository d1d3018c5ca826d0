use flate2::bufread::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::{Decompress, FlushDecompress, Status};

use zscan_core::probe::UNBOUNDED_OUTPUT_CAP;
use zscan_core::{Algorithm, CodecProbe, Decoded, Result, Scratch};

use crate::stream::{chunk_len, drain, read_to_len, strict};

/// Drive a raw or zlib-wrapped inflate over `input`.
///
/// Uses the low-level state machine instead of a reader so that the end of
/// the stream is reported by the decoder itself, not inferred from EOF.
fn inflate(input: &[u8], zlib_header: bool, max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
    let limit = max_out.unwrap_or(UNBOUNDED_OUTPUT_CAP);
    let mut state = Decompress::new(zlib_header);
    while state.total_out() < limit {
        let consumed = state.total_in() as usize;
        let produced = state.total_out();
        let buf = scratch.get(chunk_len(limit - produced));
        let status = state.decompress(&input[consumed..], buf, FlushDecompress::None);
        match status {
            Ok(Status::StreamEnd) => return Decoded::Complete(state.total_out()),
            Ok(_) if state.total_in() as usize == consumed && state.total_out() == produced => {
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Decoded::from_partial(state.total_out())
}

/// Headerless DEFLATE (RFC 1951). There is no signature, so every offset is a
/// candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateProbe;

impl CodecProbe for DeflateProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Deflate
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        inflate(input, false, max_out, scratch)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        read_to_len(DeflateDecoder::new(input), decompressed_len, Algorithm::Deflate)
    }
}

/// zlib-wrapped DEFLATE (RFC 1950), including the Adler-32 trailer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibProbe;

impl CodecProbe for ZlibProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zlib
    }

    /// CMF/FLG check: deflate method, window of at most 32 KiB, no preset
    /// dictionary, and the header checksum.
    fn is_possible(&self, bytes: &[u8]) -> bool {
        let [cmf, flg, ..] = *bytes else {
            return false;
        };
        cmf & 0x0F == 8
            && cmf >> 4 <= 7
            && flg & 0x20 == 0
            && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        inflate(input, true, max_out, scratch)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        read_to_len(ZlibDecoder::new(input), decompressed_len, Algorithm::Zlib)
    }
}

/// A single gzip member (RFC 1952).
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipProbe;

impl CodecProbe for GzipProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Gzip
    }

    fn is_possible(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&[0x1F, 0x8B, 0x08])
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        drain(GzDecoder::new(input), max_out, scratch, strict)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        read_to_len(GzDecoder::new(input), decompressed_len, Algorithm::Gzip)
    }
}
