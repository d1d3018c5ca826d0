use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::algorithm::{Algorithm, AlgorithmSet};
use crate::block::{non_block_regions, remove_dominated, Block, NonBlockRegion, StartingPosition};
use crate::data::AddressableData;
use crate::error::{Error, Result};
use crate::probe::{CodecProbe, ProbeSource, Scratch};

/// Knobs for a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderConfig {
    /// A start only counts when at least this many bytes decode from it.
    pub min_length: u64,
    pub algorithms: AlgorithmSet,
    /// Stop after start discovery; no boundaries are computed.
    pub position_only: bool,
    /// Discard blocks that lie entirely inside another block.
    pub remove_overlapping: bool,
}

impl Default for FinderConfig {
    fn default() -> Self {
        FinderConfig {
            min_length: 1,
            algorithms: AlgorithmSet::ALL,
            position_only: false,
            remove_overlapping: true,
        }
    }
}

impl FinderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_length == 0 {
            return Err(Error::InvalidConfig(
                "minimum decompressed length must be at least 1".into(),
            ));
        }
        if self.algorithms.is_empty() {
            return Err(Error::InvalidConfig("no algorithms selected".into()));
        }
        Ok(())
    }
}

/// Locates compressed streams embedded at arbitrary offsets in a byte source.
///
/// All work happens in [`BlockFinder::new`]:
/// 1. For every selected algorithm, every offset is probed in parallel with an
///    output cap of `min_length` bytes. Offsets that decode far enough become
///    starting positions.
/// 2. Unless only positions were requested, each start is decoded once in full
///    and the shortest input prefix that reproduces that output is found by
///    exponential growth followed by binary search.
/// 3. Blocks from all algorithms are merged, and blocks nested inside another
///    block are dropped.
/// 4. The gaps between the surviving blocks become the non-block regions that
///    pointer searches run over.
///
/// The results are immutable afterwards.
pub struct BlockFinder {
    data: Box<dyn AddressableData>,
    probes: Vec<Arc<dyn CodecProbe>>,
    starting_positions: Vec<StartingPosition>,
    blocks: Vec<Block>,
    non_blocks: Vec<NonBlockRegion>,
}

impl BlockFinder {
    pub fn new(
        data: Box<dyn AddressableData>,
        config: &FinderConfig,
        source: &dyn ProbeSource,
    ) -> Result<Self> {
        config.validate()?;
        let probes = config
            .algorithms
            .iter()
            .map(|algorithm| {
                source
                    .probe(algorithm)
                    .ok_or(Error::UnsupportedAlgorithm(algorithm))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut starting_positions = Vec::new();
        let mut blocks = Vec::new();
        for probe in &probes {
            let algorithm = probe.algorithm();
            info!("Searching for {} blocks", algorithm);
            let starts = find_starts(probe.as_ref(), data.as_ref(), config.min_length);
            info!("Found {} possible starting positions", starts.len());

            if config.position_only {
                starting_positions.extend(
                    starts
                        .into_iter()
                        .map(|offset| StartingPosition { offset, algorithm }),
                );
                continue;
            }

            let found: Vec<Block> = starts
                .par_iter()
                .map_init(Scratch::new, |scratch, &offset| {
                    find_block(probe.as_ref(), data.as_ref(), offset, scratch)
                })
                .flatten()
                .collect();
            info!("Found {} {} blocks", found.len(), algorithm);
            blocks.extend(found);
        }

        blocks.sort_by_key(|b| (b.offset, b.algorithm, b.compressed_len));
        if config.remove_overlapping && !blocks.is_empty() {
            info!("Removing overlapping blocks");
            let before = blocks.len();
            blocks = remove_dominated(blocks);
            info!("Removed {} overlapping blocks", before - blocks.len());
        }

        if config.position_only {
            starting_positions.sort();
        } else {
            starting_positions = blocks
                .iter()
                .map(|b| StartingPosition {
                    offset: b.offset,
                    algorithm: b.algorithm,
                })
                .collect();
        }
        // Without boundaries there are no gaps to report.
        let non_blocks = if config.position_only {
            Vec::new()
        } else {
            non_block_regions(&blocks, data.len())
        };

        Ok(BlockFinder {
            data,
            probes,
            starting_positions,
            blocks,
            non_blocks,
        })
    }

    pub fn data(&self) -> &dyn AddressableData {
        self.data.as_ref()
    }

    pub fn len(&self) -> u64 {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sorted by offset, then algorithm.
    pub fn starting_positions(&self) -> &[StartingPosition] {
        &self.starting_positions
    }

    /// Sorted by offset, then algorithm.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Gaps between blocks, ascending. Empty when only starting positions
    /// were requested.
    pub fn non_block_regions(&self) -> &[NonBlockRegion] {
        &self.non_blocks
    }

    pub(crate) fn probe(&self, algorithm: Algorithm) -> Result<&dyn CodecProbe> {
        self.probes
            .iter()
            .find(|p| p.algorithm() == algorithm)
            .map(|p| p.as_ref())
            .ok_or(Error::UnsupportedAlgorithm(algorithm))
    }

    /// Decompress a block previously returned by [`BlockFinder::blocks`].
    pub fn decompress(&self, block: &Block) -> Result<Vec<u8>> {
        let probe = self.probe(block.algorithm)?;
        let input = self.data.view(block.offset, block.compressed_len)?;
        probe.decompress(&input, block.decompressed_len)
    }
}

/// Every offset at which `probe` decodes at least `min_length` bytes, ascending.
pub fn find_starts(
    probe: &dyn CodecProbe,
    data: &dyn AddressableData,
    min_length: u64,
) -> Vec<u64> {
    let mut starts: Vec<u64> = (0..data.len().saturating_sub(1))
        .into_par_iter()
        .map_init(Scratch::new, |scratch, offset| {
            let window = data.window(offset);
            if !probe.is_possible(window) {
                return None;
            }
            let decoded = probe.try_decompress(window, Some(min_length), scratch);
            (decoded.len() >= min_length).then_some(offset)
        })
        .flatten()
        .collect();
    starts.sort_unstable();
    starts
}

/// Determine the exact extent of the stream starting at `offset`.
///
/// Returns `None` when nothing decodes there.
pub fn find_block(
    probe: &dyn CodecProbe,
    data: &dyn AddressableData,
    offset: u64,
    scratch: &mut Scratch,
) -> Option<Block> {
    let window = data.window(offset);
    let full = probe.try_decompress(window, None, scratch);
    let dsize = full.len();
    if dsize == 0 {
        return None;
    }

    // A clean end of stream has to be seen again, which pulls trailers
    // (checksums, end marks) into the compressed length.
    let cap = Some(dsize.saturating_add(1));
    let mut reproduces = |len: usize| {
        let out = probe.try_decompress(&window[..len], cap, scratch);
        out.len() >= dsize && (out.is_complete() || !full.is_complete())
    };

    let mut bottom = 0usize;
    let mut top = 1usize.min(window.len());
    while !reproduces(top) {
        if top == window.len() {
            break;
        }
        bottom = top;
        top = (top * 2).min(window.len());
    }

    while top - bottom > 1 {
        let mid = bottom + (top - bottom) / 2;
        if reproduces(mid) {
            top = mid;
        } else {
            bottom = mid;
        }
    }

    let block = Block {
        algorithm: probe.algorithm(),
        offset,
        compressed_len: top as u64,
        decompressed_len: dsize,
    };
    trace!(?full, "boundary search at 0x{:X}", offset);
    debug!(
        "[{}] block at 0x{:X}: compressed 0x{:X}, decompressed 0x{:X}",
        block.algorithm, block.offset, block.compressed_len, block.decompressed_len
    );
    Some(block)
}
