use rayon::prelude::*;

use crate::algorithm::Algorithm;

/// An offset at which a codec decoded at least the minimum output length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StartingPosition {
    pub offset: u64,
    pub algorithm: Algorithm,
}

/// A compressed stream located inside the scanned data.
///
/// `compressed_len` is the shortest prefix starting at `offset` that still
/// reproduces `decompressed_len` bytes of output, so it includes any trailer
/// the codec has to see before it reports a clean end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    pub algorithm: Algorithm,
    pub offset: u64,
    pub compressed_len: u64,
    pub decompressed_len: u64,
}

impl Block {
    /// One past the last compressed byte.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.compressed_len
    }

    pub fn same_extent(&self, other: &Block) -> bool {
        self.offset == other.offset && self.compressed_len == other.compressed_len
    }

    /// True when `other` lies entirely within this block and the two do not
    /// share the exact same extent.
    pub fn dominates(&self, other: &Block) -> bool {
        !self.same_extent(other) && self.offset <= other.offset && self.end() >= other.end()
    }
}

/// A stretch of bytes not covered by any block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonBlockRegion {
    pub offset: u64,
    pub length: u64,
}

impl NonBlockRegion {
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Complement of `blocks` within `[0, data_len)`.
///
/// `blocks` must be sorted by offset. They may still overlap when overlap
/// removal was disabled, so the cursor only ever moves forward.
pub fn non_block_regions(blocks: &[Block], data_len: u64) -> Vec<NonBlockRegion> {
    let mut regions = Vec::new();
    let mut cursor = 0u64;
    for block in blocks {
        if block.offset > cursor {
            regions.push(NonBlockRegion {
                offset: cursor,
                length: block.offset - cursor,
            });
        }
        cursor = cursor.max(block.end());
    }
    if cursor < data_len {
        regions.push(NonBlockRegion {
            offset: cursor,
            length: data_len - cursor,
        });
    }
    regions
}

/// Drop every block that is contained in some other block.
///
/// Quadratic in the number of blocks; the per-block check runs in parallel and
/// the input order is preserved.
pub fn remove_dominated(blocks: Vec<Block>) -> Vec<Block> {
    let keep: Vec<bool> = blocks
        .par_iter()
        .map(|candidate| !blocks.iter().any(|other| other.dominates(candidate)))
        .collect();
    blocks
        .into_iter()
        .zip(keep)
        .filter_map(|(block, keep)| keep.then_some(block))
        .collect()
}
