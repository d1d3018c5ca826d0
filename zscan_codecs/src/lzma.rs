use lzma_rust2::{Lzma2Reader, LzmaReader};

use zscan_core::{Algorithm, CodecProbe, Decoded, Error, Result, Scratch};

use crate::stream::{drain, read_to_len, strict};

/// Memory limit handed to the `.lzma` reader, in KiB. Headers asking for a
/// larger dictionary are rejected before anything is allocated.
pub const LZMA_MEM_LIMIT_KB: u32 = 64 * 1024;

/// Dictionary size assumed for raw LZMA2 streams, which do not record one.
pub const LZMA2_DICT_SIZE: u32 = 8 << 20;

/// Largest uncompressed size accepted in a `.lzma` header, other than the
/// "unknown" marker.
const LZMA_MAX_KNOWN_SIZE: u64 = 1 << 38;

fn valid_props(props: u8) -> bool {
    props < 9 * 5 * 5
}

fn decode_error(algorithm: Algorithm, e: impl ToString) -> Error {
    Error::Decode {
        algorithm,
        reason: e.to_string(),
    }
}

/// LZMA with the 13-byte `.lzma` ("LZMA alone") header.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzmaProbe;

impl CodecProbe for LzmaProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lzma
    }

    /// Property byte in range, a dictionary size of the form `2^n` or
    /// `2^n + 2^(n-1)`, and a plausible uncompressed size.
    fn is_possible(&self, bytes: &[u8]) -> bool {
        let Some(header) = bytes.get(..13) else {
            return false;
        };
        if !valid_props(header[0]) {
            return false;
        }
        let dict = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
        let size = u64::from_le_bytes([
            header[5], header[6], header[7], header[8], header[9], header[10], header[11],
            header[12],
        ]);
        let canonical = dict.is_power_of_two() || (dict != 0 && dict >> dict.trailing_zeros() == 3);
        canonical && (size == u64::MAX || size < LZMA_MAX_KNOWN_SIZE)
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        match LzmaReader::new_mem_limit(input, LZMA_MEM_LIMIT_KB, None) {
            Ok(reader) => drain(reader, max_out, scratch, strict),
            Err(_) => Decoded::Invalid,
        }
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        let reader = LzmaReader::new_mem_limit(input, LZMA_MEM_LIMIT_KB, None)
            .map_err(|e| decode_error(Algorithm::Lzma, e))?;
        read_to_len(reader, decompressed_len, Algorithm::Lzma)
    }
}

/// A raw LZMA2 chunk sequence, terminated by a zero control byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lzma2Probe;

impl CodecProbe for Lzma2Probe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lzma2
    }

    /// The first chunk has to reset the dictionary: either an uncompressed
    /// chunk (`0x01`) or an LZMA chunk that also sets new properties.
    fn is_possible(&self, bytes: &[u8]) -> bool {
        match bytes {
            [0x01, _, _, ..] => true,
            [control, _, _, _, _, props, ..] if *control >= 0xE0 => {
                valid_props(*props) && {
                    let lc = props % 9;
                    let lp = (props / 9) % 5;
                    lc + lp <= 4
                }
            }
            _ => false,
        }
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        let reader = Lzma2Reader::new(input, LZMA2_DICT_SIZE, None);
        drain(reader, max_out, scratch, strict)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        let reader = Lzma2Reader::new(input, LZMA2_DICT_SIZE, None);
        read_to_len(reader, decompressed_len, Algorithm::Lzma2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS: &[u8] = include_bytes!("../tests/data/words.txt");
    const WORDS_LZMA: &[u8] = include_bytes!("../tests/data/words.lzma");
    const WORDS_LZMA2: &[u8] = include_bytes!("../tests/data/words.lzma2");

    #[test]
    fn test_lzma_header_check() {
        let probe = LzmaProbe;
        assert!(probe.is_possible(WORDS_LZMA));
        assert!(!probe.is_possible(&WORDS_LZMA[..12]));

        let mut header = WORDS_LZMA[..13].to_vec();
        header[0] = 225;
        assert!(!probe.is_possible(&header));

        header[0] = 0x5D;
        header[1..5].copy_from_slice(&0x0000_C000u32.to_le_bytes());
        assert!(probe.is_possible(&header));
        header[1..5].copy_from_slice(&0x0000_A000u32.to_le_bytes());
        assert!(!probe.is_possible(&header));

        header[1..5].copy_from_slice(&0x0080_0000u32.to_le_bytes());
        header[5..13].copy_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(!probe.is_possible(&header));
    }

    #[test]
    fn test_lzma_alone_with_end_marker() {
        let probe = LzmaProbe;
        let mut scratch = Scratch::new();
        assert_eq!(
            probe.try_decompress(WORDS_LZMA, None, &mut scratch),
            Decoded::Complete(WORDS.len() as u64)
        );
        assert_eq!(
            probe.try_decompress(WORDS_LZMA, Some(100), &mut scratch),
            Decoded::Truncated(100)
        );
        assert_eq!(probe.decompress(WORDS_LZMA, WORDS.len() as u64).unwrap(), WORDS);
    }

    #[test]
    fn test_lzma2_chunks() {
        let probe = Lzma2Probe;
        let mut scratch = Scratch::new();
        assert!(probe.is_possible(WORDS_LZMA2));
        assert!(!probe.is_possible(&[0x80, 0, 0, 0, 0, 0x5D]));
        assert!(!probe.is_possible(&[0xE0, 0, 0, 0, 0, 0xE1]));

        assert_eq!(
            probe.try_decompress(WORDS_LZMA2, None, &mut scratch),
            Decoded::Complete(WORDS.len() as u64)
        );
        assert!(!probe
            .try_decompress(&WORDS_LZMA2[..WORDS_LZMA2.len() - 1], None, &mut scratch)
            .is_complete());
        assert_eq!(probe.decompress(WORDS_LZMA2, WORDS.len() as u64).unwrap(), WORDS);
    }
}
