//! Search for literal references to block offsets in the bytes between blocks.
//!
//! Containers often store a table of offsets pointing at their compressed
//! members. Once the blocks are known, the non-block regions can be scanned
//! for their offsets (optionally minus a bias, for tables relative to some
//! header) encoded as little- or big-endian integers.

use memchr::memmem;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::block::{Block, NonBlockRegion};
use crate::error::{Error, Result};
use crate::finder::BlockFinder;

/// Values below this are too common to be meaningful pointers.
pub const MIN_POINTER_VALUE: u64 = 0x20;

/// Regions are scanned in windows of this size, aligned to absolute offsets.
pub const POINTER_WINDOW: u64 = 1 << 24;

/// The byte patterns a pointer value may appear as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerPattern {
    le: Vec<u8>,
    be: Vec<u8>,
}

impl PointerPattern {
    /// Four-byte patterns for values that fit in 32 bits, eight-byte otherwise.
    /// `None` for values below [`MIN_POINTER_VALUE`].
    pub fn new(value: u64) -> Option<Self> {
        if value < MIN_POINTER_VALUE {
            return None;
        }
        let (le, be) = match u32::try_from(value) {
            Ok(v) => (v.to_le_bytes().to_vec(), v.to_be_bytes().to_vec()),
            Err(_) => (value.to_le_bytes().to_vec(), value.to_be_bytes().to_vec()),
        };
        Some(PointerPattern { le, be })
    }

    pub fn width(&self) -> usize {
        self.le.len()
    }

    fn needles(&self) -> impl Iterator<Item = &[u8]> {
        let be = (self.be != self.le).then_some(self.be.as_slice());
        std::iter::once(self.le.as_slice()).chain(be)
    }

    /// Absolute offsets of every occurrence inside `haystack`, which starts at
    /// absolute offset `base`.
    pub fn find_in(&self, haystack: &[u8], base: u64) -> Vec<u64> {
        let mut hits: Vec<u64> = self
            .needles()
            .flat_map(|needle| memmem::find_iter(haystack, needle).map(move |i| base + i as u64))
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Half-open byte ranges covering `regions` such that every occurrence of a
/// `width`-byte pattern lying inside a region falls in exactly one range.
///
/// Each region is cut at multiples of [`POINTER_WINDOW`]; a seam range of
/// `2 * (width - 1)` bytes around every interior cut catches the occurrences
/// straddling it.
pub fn search_windows(regions: &[NonBlockRegion], width: usize) -> Vec<(u64, u64)> {
    let reach = width.saturating_sub(1) as u64;
    let mut windows = Vec::new();
    for region in regions {
        let (start, end) = (region.offset, region.end());
        let mut pos = start;
        while pos < end {
            let cut = ((pos / POINTER_WINDOW) + 1) * POINTER_WINDOW;
            let next = cut.min(end);
            windows.push((pos, next));
            if next < end && reach > 0 {
                windows.push((cut.saturating_sub(reach).max(start), (cut + reach).min(end)));
            }
            pos = next;
        }
    }
    windows
}

impl BlockFinder {
    /// Offsets inside the non-block regions where `value` is stored, ascending.
    pub fn find_pointers_to(&self, value: u64) -> Result<Vec<u64>> {
        let Some(pattern) = PointerPattern::new(value) else {
            return Ok(Vec::new());
        };
        let windows = search_windows(self.non_block_regions(), pattern.width());
        let mut hits = windows
            .par_iter()
            .map(|&(start, end)| {
                let view = self.data().view(start, end - start)?;
                Ok::<_, Error>(pattern.find_in(&view, start))
            })
            .collect::<Result<Vec<_>>>()?
            .concat();
        hits.sort_unstable();
        Ok(hits)
    }

    /// For each block, where its offset minus `bias` is stored.
    ///
    /// Only blocks with at least one hit are returned, in block order.
    pub fn find_pointers(&self, bias: u64) -> Result<Vec<(Block, Vec<u64>)>> {
        info!("Searching for pointers with bias {}", bias);
        let targets: Vec<(usize, PointerPattern)> = self
            .blocks()
            .iter()
            .enumerate()
            .filter_map(|(i, block)| {
                let value = block.offset.checked_sub(bias)?;
                PointerPattern::new(value).map(|p| (i, p))
            })
            .collect();

        let regions = self.non_block_regions();
        let narrow = search_windows(regions, 4);
        let wide = search_windows(regions, 8);
        let jobs: Vec<(usize, &PointerPattern, (u64, u64))> = targets
            .iter()
            .flat_map(|(i, pattern)| {
                let windows = if pattern.width() == 4 { &narrow } else { &wide };
                windows.iter().map(move |&w| (*i, pattern, w))
            })
            .collect();
        debug!("{} pointer search jobs", jobs.len());

        let found = jobs
            .par_iter()
            .map(|&(i, pattern, (start, end))| {
                let view = self.data().view(start, end - start)?;
                Ok::<_, Error>((i, pattern.find_in(&view, start)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut per_block: Vec<Vec<u64>> = vec![Vec::new(); self.blocks().len()];
        for (i, hits) in found {
            per_block[i].extend(hits);
        }
        Ok(self
            .blocks()
            .iter()
            .zip(per_block)
            .filter(|(_, hits)| !hits.is_empty())
            .map(|(block, mut hits)| {
                hits.sort_unstable();
                (*block, hits)
            })
            .collect())
    }
}

/// Parse a list of biases such as `"0, 4, 8-16"`.
///
/// Entries are non-negative integers or inclusive `a-b` ranges, separated by
/// commas. Empty entries are ignored.
pub fn parse_offset_spec(spec: &str) -> Result<Vec<u64>> {
    let invalid = |entry: &str| Error::InvalidOffsetSpec(format!("'{entry}' in '{spec}'"));
    let mut offsets = Vec::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once('-') {
            Some((lo, hi)) => {
                let lo: u64 = lo.trim().parse().map_err(|_| invalid(entry))?;
                let hi: u64 = hi.trim().parse().map_err(|_| invalid(entry))?;
                if lo > hi {
                    return Err(invalid(entry));
                }
                offsets.extend(lo..=hi);
            }
            None => offsets.push(entry.parse().map_err(|_| invalid(entry))?),
        }
    }
    Ok(offsets)
}
