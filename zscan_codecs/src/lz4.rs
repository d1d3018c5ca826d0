use lz4_flex::block::{decompress_into, DecompressError};
use lz4_flex::frame::FrameDecoder;
use tracing::trace;

use zscan_core::probe::{MAX_SCRATCH_LEN, SCRATCH_RATIO};
use zscan_core::{Algorithm, CodecProbe, Decoded, Error, Result, Scratch};

use crate::stream::{drain, read_to_len, strict};

pub const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

const RAW_INITIAL_OUTPUT: usize = 64 * 1024;

/// A bare LZ4 block with no framing.
///
/// The block format has no end marker: the decoder consumes its whole input
/// and fails if the input does not end exactly on a sequence boundary. Blocks
/// are therefore only recovered when they run to the end of the scanned data.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4RawProbe;

impl CodecProbe for Lz4RawProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lz4Raw
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        match max_out {
            Some(limit) => {
                let want = limit.saturating_mul(SCRATCH_RATIO).min(MAX_SCRATCH_LEN as u64);
                let buf = scratch.get(want as usize);
                let room = buf.len() as u64;
                match decompress_into(input, buf) {
                    Ok(n) if n as u64 > limit => Decoded::Truncated(limit),
                    Ok(n) => Decoded::Complete(n as u64),
                    Err(DecompressError::OutputTooSmall { .. }) => {
                        Decoded::from_partial(limit.min(room))
                    }
                    Err(_) => Decoded::Invalid,
                }
            }
            None => {
                let mut len = RAW_INITIAL_OUTPUT;
                loop {
                    match decompress_into(input, scratch.get(len)) {
                        Ok(n) => return Decoded::Complete(n as u64),
                        Err(DecompressError::OutputTooSmall { .. }) if len < MAX_SCRATCH_LEN => {
                            len = (len * 2).min(MAX_SCRATCH_LEN);
                        }
                        Err(e) => {
                            trace!("lz4 raw decode gave up: {}", e);
                            return Decoded::Invalid;
                        }
                    }
                }
            }
        }
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        let out = lz4_flex::block::decompress(input, decompressed_len as usize).map_err(|e| {
            Error::Decode {
                algorithm: Algorithm::Lz4Raw,
                reason: e.to_string(),
            }
        })?;
        if out.len() as u64 != decompressed_len {
            return Err(Error::LengthMismatch {
                algorithm: Algorithm::Lz4Raw,
                expected: decompressed_len,
                actual: out.len() as u64,
            });
        }
        Ok(out)
    }
}

const FLG_VERSION_MASK: u8 = 0b1100_0000;
const FLG_VERSION: u8 = 0b0100_0000;
const FLG_BLOCK_CHECKSUM: u8 = 0b0001_0000;
const FLG_CONTENT_SIZE: u8 = 0b0000_1000;
const FLG_CONTENT_CHECKSUM: u8 = 0b0000_0100;
const FLG_DICT_ID: u8 = 0b0000_0001;
const UNCOMPRESSED_BLOCK: u32 = 0x8000_0000;

/// Length of the frame at the start of `bytes`, found by walking its block
/// headers. `None` when the header is malformed or the frame runs past the
/// end of `bytes`.
///
/// The frame decoder only notices that a frame has ended when it fails to
/// read the next one, so the frame is cut out before decoding.
pub fn frame_extent(bytes: &[u8]) -> Option<usize> {
    let flg = *bytes.get(4)?;
    if !bytes.starts_with(&LZ4_FRAME_MAGIC) || flg & FLG_VERSION_MASK != FLG_VERSION {
        return None;
    }
    let mut pos = 4 + 2 + 1;
    if flg & FLG_CONTENT_SIZE != 0 {
        pos += 8;
    }
    if flg & FLG_DICT_ID != 0 {
        pos += 4;
    }
    let block_checksum = if flg & FLG_BLOCK_CHECKSUM != 0 { 4 } else { 0 };
    loop {
        let size = u32::from_le_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?);
        pos += 4;
        if size == 0 {
            break;
        }
        pos = pos
            .checked_add((size & !UNCOMPRESSED_BLOCK) as usize)?
            .checked_add(block_checksum)?;
    }
    if flg & FLG_CONTENT_CHECKSUM != 0 {
        pos += 4;
    }
    (pos <= bytes.len()).then_some(pos)
}

/// One LZ4 frame, up to and including its end mark and optional checksum.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4FrameProbe;

impl CodecProbe for Lz4FrameProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lz4Frame
    }

    fn is_possible(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&LZ4_FRAME_MAGIC)
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        let frame = frame_extent(input).map_or(input, |len| &input[..len]);
        drain(FrameDecoder::new(frame), max_out, scratch, strict)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        let frame = frame_extent(input).map_or(input, |len| &input[..len]);
        read_to_len(FrameDecoder::new(frame), decompressed_len, Algorithm::Lz4Frame)
    }
}
