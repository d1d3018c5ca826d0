use bzip2::bufread::BzDecoder;

use zscan_core::{Algorithm, CodecProbe, Decoded, Result, Scratch};

use crate::stream::{drain, read_to_len, strict};

/// A single bzip2 stream. The stream CRC at the end is part of the block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bzip2Probe;

impl CodecProbe for Bzip2Probe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bzip2
    }

    /// `BZh` followed by the block size digit.
    fn is_possible(&self, bytes: &[u8]) -> bool {
        matches!(bytes, [b'B', b'Z', b'h', b'1'..=b'9', ..])
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        drain(BzDecoder::new(input), max_out, scratch, strict)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        read_to_len(BzDecoder::new(input), decompressed_len, Algorithm::Bzip2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    #[test]
    fn test_bzip2_stream() {
        let raw = b"bzip2 works on whole blocks of input at once. ".repeat(30);
        let mut enc = BzEncoder::new(Vec::new(), Compression::best());
        enc.write_all(&raw).unwrap();
        let stream = enc.finish().unwrap();

        let probe = Bzip2Probe;
        let mut scratch = Scratch::new();
        assert!(probe.is_possible(&stream));
        assert!(!probe.is_possible(b"BZh0"));
        assert!(!probe.is_possible(b"BZ"));

        let mut padded = stream.clone();
        padded.extend_from_slice(b"trailing bytes that are not bzip2");
        assert_eq!(
            probe.try_decompress(&padded, None, &mut scratch),
            Decoded::Complete(raw.len() as u64)
        );
        assert!(!probe
            .try_decompress(&stream[..stream.len() - 2], None, &mut scratch)
            .is_complete());
        assert_eq!(probe.decompress(&stream, raw.len() as u64).unwrap(), raw);
    }
}
