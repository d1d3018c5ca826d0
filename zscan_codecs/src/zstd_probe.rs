use zstd::stream::read::Decoder;

use zscan_core::{Algorithm, CodecProbe, Decoded, Error, Result, Scratch};

use crate::stream::{drain, read_to_len, strict};

pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// One Zstandard frame. Skippable frames are not treated as blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdProbe;

impl CodecProbe for ZstdProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }

    fn is_possible(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(&ZSTD_MAGIC)
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        match Decoder::with_buffer(input) {
            Ok(decoder) => drain(decoder.single_frame(), max_out, scratch, strict),
            Err(_) => Decoded::Invalid,
        }
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        let decoder = Decoder::with_buffer(input)
            .map_err(|e| Error::Decode {
                algorithm: Algorithm::Zstd,
                reason: e.to_string(),
            })?
            .single_frame();
        read_to_len(decoder, decompressed_len, Algorithm::Zstd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_single_frame() {
        let raw = b"zstd frames carry their own magic number. ".repeat(50);
        let frame = zstd::bulk::compress(&raw, 3).unwrap();
        let mut two = frame.clone();
        two.extend_from_slice(&frame);

        let probe = ZstdProbe;
        let mut scratch = Scratch::new();
        assert!(probe.is_possible(&frame));
        assert_eq!(
            probe.try_decompress(&two, None, &mut scratch),
            Decoded::Complete(raw.len() as u64)
        );
        assert!(!probe
            .try_decompress(&frame[..frame.len() - 1], None, &mut scratch)
            .is_complete());
        assert_eq!(probe.decompress(&two[..frame.len()], raw.len() as u64).unwrap(), raw);
    }
}
