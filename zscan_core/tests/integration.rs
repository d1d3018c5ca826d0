/// Integration tests: embed real compressed streams in surrounding bytes and
/// check that the finder recovers their exact extents.
///
/// Covered:
///  1. A stored zlib stream between runs of zeros (exact length, gaps)
///  2. Two back-to-back raw deflate streams
///  3. Nested streams from two algorithms (overlap removal). The nesting is
///     simulated with bracket-delimited toy codecs, since real streams that
///     contain one another are impractical to build
///  4. gzip, bzip2, zstd and lz4 frames in one container, with the
///     minimality / coverage / idempotence properties of the result
///  5. Pointer search with and without a bias
use std::io::Write;
use std::sync::Arc;

use zscan_codecs::Codecs;
use zscan_core::finder::find_block;
use zscan_core::{
    Algorithm, AlgorithmSet, Block, BlockFinder, BytesData, CodecProbe, Decoded,
    Error, FinderConfig, NonBlockRegion, ProbeSource, Result, Scratch,
};

// ── helpers ───────────────────────────────────────────────────────────────

fn adler32(data: &[u8]) -> u32 {
    let (mut a, mut b) = (1u32, 0u32);
    for &byte in data {
        a = (a + u32::from(byte)) % 65521;
        b = (b + a) % 65521;
    }
    b << 16 | a
}

/// A zlib stream holding `payload` in a single stored block.
///
/// Built by hand so the length is pinned at 11 bytes of framing plus the
/// payload; an encoder at level 0 is free to add an empty final block.
fn stored_zlib(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut out = vec![0x78, 0x01, 0x01];
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&(!len).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&adler32(payload).to_be_bytes());
    out
}

fn scan(bytes: Vec<u8>, config: &FinderConfig) -> BlockFinder {
    BlockFinder::new(Box::new(BytesData::new(bytes)), config, &Codecs).unwrap()
}

fn only(algorithms: impl Into<AlgorithmSet>) -> FinderConfig {
    FinderConfig {
        algorithms: algorithms.into(),
        ..FinderConfig::default()
    }
}

fn filler(len: usize) -> Vec<u8> {
    vec![0xAA; len]
}

// ── stored zlib between zeros ──────────────────────────────────────────────

#[test]
fn test_stored_zlib_between_zeros() {
    let payload = &b"Block payload: the quick brown fox jumps over a dog"[..50];
    let z = stored_zlib(payload);
    assert_eq!(z.len(), 61);

    let mut data = vec![0u8; 100];
    data.extend_from_slice(&z);
    data.extend_from_slice(&[0u8; 20]);

    let finder = scan(data, &only(Algorithm::Zlib));
    assert_eq!(
        finder.blocks(),
        &[Block {
            algorithm: Algorithm::Zlib,
            offset: 100,
            compressed_len: 61,
            decompressed_len: 50,
        }]
    );
    assert_eq!(
        finder.non_block_regions(),
        &[
            NonBlockRegion { offset: 0, length: 100 },
            NonBlockRegion { offset: 161, length: 20 },
        ]
    );
    assert_eq!(finder.decompress(&finder.blocks()[0]).unwrap(), payload);
}

#[test]
fn test_position_only_reports_starts() {
    let payload = &b"Block payload: the quick brown fox jumps over a dog"[..50];
    let mut data = vec![0u8; 100];
    data.extend_from_slice(&stored_zlib(payload));

    let config = FinderConfig {
        position_only: true,
        ..only(Algorithm::Zlib)
    };
    let finder = scan(data, &config);
    assert!(finder.blocks().is_empty());
    let starts: Vec<_> = finder
        .starting_positions()
        .iter()
        .map(|s| (s.offset, s.algorithm))
        .collect();
    assert_eq!(starts, vec![(100, Algorithm::Zlib)]);
    assert!(finder.non_block_regions().is_empty());
}

#[test]
fn test_stored_zlib_helper_is_valid_zlib() {
    use std::io::Read;

    let payload = b"stored blocks keep their bytes verbatim";
    let stream = stored_zlib(payload);
    assert_eq!(stream.len(), payload.len() + 11);

    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(&stream[..])
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, payload);
}

// ── back-to-back deflate ───────────────────────────────────────────────────

#[test]
fn test_two_deflate_streams_are_contiguous() {
    let data = include_bytes!("data/two_deflate.bin").to_vec();
    let config = FinderConfig {
        min_length: 32,
        ..only(Algorithm::Deflate)
    };
    let finder = scan(data, &config);
    assert_eq!(
        finder.blocks(),
        &[
            Block {
                algorithm: Algorithm::Deflate,
                offset: 0,
                compressed_len: 40,
                decompressed_len: 290,
            },
            Block {
                algorithm: Algorithm::Deflate,
                offset: 40,
                compressed_len: 44,
                decompressed_len: 303,
            },
        ]
    );
    assert!(finder.non_block_regions().is_empty());

    let first = finder.decompress(&finder.blocks()[0]).unwrap();
    assert!(first.starts_with(b"first stream: alpha beta"));
    let second = finder.decompress(&finder.blocks()[1]).unwrap();
    assert!(second.starts_with(b"second stream: one two"));
}

// ── nested streams ─────────────────────────────────────────────────────────

/// Toy codec: a stream opens with `open`, every following byte decodes to
/// one output byte, and `close` ends the stream.
struct Bracketed {
    algorithm: Algorithm,
    open: u8,
    close: u8,
}

impl CodecProbe for Bracketed {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, _: &mut Scratch) -> Decoded {
        if input.first() != Some(&self.open) {
            return Decoded::Invalid;
        }
        let limit = max_out.unwrap_or(u64::MAX);
        let mut produced = 0;
        for &b in &input[1..] {
            if b == self.close {
                return Decoded::Complete(produced);
            }
            if produced == limit {
                return Decoded::Truncated(produced);
            }
            produced += 1;
        }
        Decoded::from_partial(produced)
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        Ok(input[1..=decompressed_len as usize].to_vec())
    }
}

struct Toys;

impl ProbeSource for Toys {
    fn probe(&self, algorithm: Algorithm) -> Option<Arc<dyn CodecProbe>> {
        let (open, close) = match algorithm {
            Algorithm::Bzip2 => (b'{', b'}'),
            Algorithm::Gzip => (b'[', b']'),
            _ => return None,
        };
        Some(Arc::new(Bracketed {
            algorithm,
            open,
            close,
        }))
    }
}

/// Toy stand-ins: a "gzip" block nested inside a "bzip2" block.
#[test]
fn test_nested_block_is_removed() {
    let data = b"..{ab[cde]fg}..[hi]".to_vec();
    let config = only(Algorithm::Bzip2 | Algorithm::Gzip);
    let finder = BlockFinder::new(Box::new(BytesData::new(data.clone())), &config, &Toys).unwrap();
    assert_eq!(
        finder.blocks(),
        &[
            Block {
                algorithm: Algorithm::Bzip2,
                offset: 2,
                compressed_len: 11,
                decompressed_len: 9,
            },
            Block {
                algorithm: Algorithm::Gzip,
                offset: 15,
                compressed_len: 4,
                decompressed_len: 2,
            },
        ]
    );
    assert_eq!(finder.decompress(&finder.blocks()[0]).unwrap(), b"ab[cde]fg");

    let keep = FinderConfig {
        remove_overlapping: false,
        ..config
    };
    let finder = BlockFinder::new(Box::new(BytesData::new(data)), &keep, &Toys).unwrap();
    let offsets: Vec<_> = finder.blocks().iter().map(|b| (b.offset, b.algorithm)).collect();
    assert_eq!(
        offsets,
        vec![(2, Algorithm::Bzip2), (5, Algorithm::Gzip), (15, Algorithm::Gzip)]
    );
    assert_eq!(
        finder.non_block_regions(),
        &[
            NonBlockRegion { offset: 0, length: 2 },
            NonBlockRegion { offset: 13, length: 2 },
        ]
    );
}

#[test]
fn test_missing_probe_is_an_error() {
    let config = only(Algorithm::Gzip | Algorithm::Zstd);
    let err = BlockFinder::new(Box::new(BytesData::new(vec![0; 8])), &config, &Toys)
        .err()
        .unwrap();
    assert!(matches!(err, Error::UnsupportedAlgorithm(Algorithm::Zstd)));
}

#[test]
fn test_zero_min_length_is_rejected() {
    let config = FinderConfig {
        min_length: 0,
        ..FinderConfig::default()
    };
    let err = BlockFinder::new(Box::new(BytesData::new(vec![0; 8])), &config, &Codecs)
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

// ── mixed container ────────────────────────────────────────────────────────

struct Container {
    bytes: Vec<u8>,
    expected: Vec<(Block, Vec<u8>)>,
}

fn mixed_container() -> Container {
    let gz_raw = b"gzip member with a crc32 and isize trailer. ".repeat(20);
    let bz_raw = b"bzip2 stream, block sorted and huffman coded. ".repeat(25);
    let zs_raw = b"zstd frame with its own magic number. ".repeat(30);
    let lz_raw = b"lz4 frame, end mark included. ".repeat(35);

    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&gz_raw).unwrap();
    let gz = gz.finish().unwrap();

    let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    bz.write_all(&bz_raw).unwrap();
    let bz = bz.finish().unwrap();

    let zs = zstd::bulk::compress(&zs_raw, 3).unwrap();

    let mut lz = lz4_flex::frame::FrameEncoder::new(Vec::new());
    lz.write_all(&lz_raw).unwrap();
    let lz = lz.finish().unwrap();

    let mut bytes = filler(33);
    let mut expected = Vec::new();
    for (algorithm, stream, raw, gap) in [
        (Algorithm::Gzip, gz, gz_raw, 17),
        (Algorithm::Bzip2, bz, bz_raw, 9),
        (Algorithm::Zstd, zs, zs_raw, 21),
        (Algorithm::Lz4Frame, lz, lz_raw, 40),
    ] {
        expected.push((
            Block {
                algorithm,
                offset: bytes.len() as u64,
                compressed_len: stream.len() as u64,
                decompressed_len: raw.len() as u64,
            },
            raw,
        ));
        bytes.extend_from_slice(&stream);
        bytes.extend_from_slice(&filler(gap));
    }
    Container { bytes, expected }
}

fn container_config() -> FinderConfig {
    only(Algorithm::Gzip | Algorithm::Bzip2 | Algorithm::Zstd | Algorithm::Lz4Frame)
}

#[test]
fn test_mixed_container_blocks() {
    let container = mixed_container();
    let finder = scan(container.bytes.clone(), &container_config());

    let blocks: Vec<Block> = container.expected.iter().map(|(b, _)| *b).collect();
    assert_eq!(finder.blocks(), blocks.as_slice());
    for (block, raw) in &container.expected {
        assert_eq!(&finder.decompress(block).unwrap(), raw, "{} payload", block.algorithm);
    }
}

#[test]
fn test_block_lengths_are_minimal() {
    let container = mixed_container();
    let finder = scan(container.bytes.clone(), &container_config());
    let mut scratch = Scratch::new();

    for block in finder.blocks() {
        let probe = Codecs.probe(block.algorithm).unwrap();
        let start = block.offset as usize;
        let exact = &container.bytes[start..start + block.compressed_len as usize];
        let short = &exact[..exact.len() - 1];
        let cap = Some(block.decompressed_len + 1);

        assert_eq!(
            probe.try_decompress(exact, cap, &mut scratch),
            Decoded::Complete(block.decompressed_len),
            "{} at 0x{:X}",
            block.algorithm,
            block.offset
        );
        assert!(
            !probe.try_decompress(short, cap, &mut scratch).is_complete(),
            "{} at 0x{:X}",
            block.algorithm,
            block.offset
        );
    }
}

#[test]
fn test_blocks_and_regions_partition_the_data() {
    let container = mixed_container();
    let len = container.bytes.len() as u64;
    let finder = scan(container.bytes, &container_config());

    let mut extents: Vec<(u64, u64)> = finder
        .blocks()
        .iter()
        .map(|b| (b.offset, b.end()))
        .chain(finder.non_block_regions().iter().map(|r| (r.offset, r.end())))
        .collect();
    extents.sort_unstable();
    let mut cursor = 0;
    for (start, end) in extents {
        assert_eq!(start, cursor);
        assert!(end > start);
        cursor = end;
    }
    assert_eq!(cursor, len);

    for a in finder.blocks() {
        for b in finder.blocks() {
            assert!(!a.dominates(b));
        }
    }
}

#[test]
fn test_scans_are_repeatable() {
    let container = mixed_container();
    let first = scan(container.bytes.clone(), &container_config());
    let second = scan(container.bytes, &container_config());
    assert_eq!(first.blocks(), second.blocks());
    assert_eq!(first.non_block_regions(), second.non_block_regions());
    assert_eq!(first.starting_positions(), second.starting_positions());
}

#[test]
fn test_find_block_matches_finder() {
    let container = mixed_container();
    let data = BytesData::new(container.bytes);
    let mut scratch = Scratch::new();
    for (expected, _) in &container.expected {
        let probe = Codecs.probe(expected.algorithm).unwrap();
        let found = find_block(probe.as_ref(), &data, expected.offset, &mut scratch);
        assert_eq!(found.as_ref(), Some(expected));
    }
    let gzip = Codecs.probe(Algorithm::Gzip).unwrap();
    assert_eq!(find_block(gzip.as_ref(), &data, 0, &mut scratch), None);
}

// ── pointers ───────────────────────────────────────────────────────────────

/// 64 bytes of filler holding LE 0x40 at 8 and LE 0x30 at 20, a stored zlib
/// block at 0x40 whose payload also contains LE 0x40, then filler holding BE
/// 0x40.
fn pointer_fixture() -> (Vec<u8>, u64) {
    let mut data = filler(64);
    data[8..12].copy_from_slice(&0x40u32.to_le_bytes());
    data[20..24].copy_from_slice(&0x30u32.to_le_bytes());
    data.extend_from_slice(&stored_zlib(b"\x40\x00\x00\x00 pointer bait inside a stored block"));
    let be_at = data.len() as u64 + 10;
    let mut suffix = filler(32);
    suffix[10..14].copy_from_slice(&0x40u32.to_be_bytes());
    data.extend_from_slice(&suffix);
    (data, be_at)
}

#[test]
fn test_pointers_outside_blocks_only() {
    let (data, be_at) = pointer_fixture();
    let finder = scan(data, &only(Algorithm::Zlib));
    assert_eq!(finder.blocks().len(), 1);
    let block = finder.blocks()[0];
    assert_eq!((block.offset, block.compressed_len), (0x40, 50));

    assert_eq!(finder.find_pointers_to(0x40).unwrap(), vec![8, be_at]);
    assert_eq!(finder.find_pointers(0).unwrap(), vec![(block, vec![8, be_at])]);
}

#[test]
fn test_pointers_with_bias() {
    let (data, _) = pointer_fixture();
    let finder = scan(data, &only(Algorithm::Zlib));
    let block = finder.blocks()[0];

    assert_eq!(finder.find_pointers(0x10).unwrap(), vec![(block, vec![20])]);
    // Target below the minimum pointer value.
    assert!(finder.find_pointers(0x30).unwrap().is_empty());
    // Bias larger than the block offset.
    assert!(finder.find_pointers(0x41).unwrap().is_empty());
    assert!(finder.find_pointers_to(0x1F).unwrap().is_empty());
}
