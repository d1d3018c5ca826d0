use std::borrow::Cow;
use std::fs::{self, File};
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

use crate::error::{Error, Result};

/// Size of one mapped cluster. Offsets inside a cluster always fit in 32 bits.
pub const CLUSTER_SIZE: u64 = 1 << 30;

/// Read-only random access to the bytes being scanned.
///
/// Implementations are shared by every worker thread, so they must be
/// `Send + Sync` and never hand out mutable state.
pub trait AddressableData: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contiguous bytes from `start` up to the end of the segment holding it.
    ///
    /// For clustered sources the slice stops at the cluster edge, so callers
    /// that need an exact range should use [`AddressableData::view`]. Returns
    /// an empty slice when `start` is at or past the end.
    fn window(&self, start: u64) -> &[u8];

    /// Exactly the bytes `[start, start + len)`.
    ///
    /// Borrowed when the range sits inside one segment, otherwise copied into
    /// a fresh buffer.
    fn view(&self, start: u64, len: u64) -> Result<Cow<'_, [u8]>>;
}

fn check_range(start: u64, len: u64, data_len: u64) -> Result<()> {
    match start.checked_add(len) {
        Some(end) if end <= data_len => Ok(()),
        _ => Err(Error::OutOfBounds {
            start,
            len,
            data_len,
        }),
    }
}

// ── owned buffer ────────────────────────────────────────────────────────────

/// The whole input held in memory.
#[derive(Debug, Clone, Default)]
pub struct BytesData {
    bytes: Vec<u8>,
}

impl BytesData {
    pub fn new(bytes: Vec<u8>) -> Self {
        BytesData { bytes }
    }

    /// Load a file completely into memory.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(BytesData::new(fs::read(path)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for BytesData {
    fn from(bytes: Vec<u8>) -> Self {
        BytesData::new(bytes)
    }
}

impl AddressableData for BytesData {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn window(&self, start: u64) -> &[u8] {
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        self.bytes.get(start..).unwrap_or(&[])
    }

    fn view(&self, start: u64, len: u64) -> Result<Cow<'_, [u8]>> {
        check_range(start, len, self.len())?;
        let (start, len) = (start as usize, len as usize);
        Ok(Cow::Borrowed(&self.bytes[start..start + len]))
    }
}

// ── memory-mapped clusters ──────────────────────────────────────────────────

/// A file mapped as a sequence of fixed-size clusters.
///
/// Every cluster except possibly the last is exactly `cluster_size` bytes.
/// Mappings are released when the value is dropped.
pub struct MappedData {
    clusters: Vec<Mmap>,
    cluster_size: u64,
    len: u64,
}

impl MappedData {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cluster_size(path, CLUSTER_SIZE)
    }

    /// Map `path` using clusters of `cluster_size` bytes.
    ///
    /// Smaller clusters are mainly useful to exercise boundary handling on
    /// small files.
    pub fn open_with_cluster_size(path: impl AsRef<Path>, cluster_size: u64) -> Result<Self> {
        if cluster_size == 0 || cluster_size > CLUSTER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "cluster size must be in 1..={CLUSTER_SIZE}, got {cluster_size}"
            )));
        }
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();

        let mut clusters = Vec::with_capacity(len.div_ceil(cluster_size) as usize);
        let mut offset = 0u64;
        while offset < len {
            let size = cluster_size.min(len - offset);
            // SAFETY: the mapping is read-only and the file is not expected to
            // be modified while it is being scanned.
            let mmap = unsafe {
                MmapOptions::new()
                    .offset(offset)
                    .len(size as usize)
                    .map(&file)?
            };
            debug!(
                "Mapped cluster {} at 0x{:X} ({} bytes)",
                clusters.len(),
                offset,
                size
            );
            clusters.push(mmap);
            offset += size;
        }

        Ok(MappedData {
            clusters,
            cluster_size,
            len,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    #[inline]
    fn locate(&self, pos: u64) -> (usize, usize) {
        (
            (pos / self.cluster_size) as usize,
            (pos % self.cluster_size) as usize,
        )
    }
}

impl AddressableData for MappedData {
    fn len(&self) -> u64 {
        self.len
    }

    fn window(&self, start: u64) -> &[u8] {
        if start >= self.len {
            return &[];
        }
        let (cluster, inner) = self.locate(start);
        &self.clusters[cluster][inner..]
    }

    fn view(&self, start: u64, len: u64) -> Result<Cow<'_, [u8]>> {
        check_range(start, len, self.len)?;
        if len == 0 {
            return Ok(Cow::Borrowed(&[]));
        }
        let (first, inner) = self.locate(start);
        let (last, _) = self.locate(start + len - 1);
        if first == last {
            return Ok(Cow::Borrowed(&self.clusters[first][inner..inner + len as usize]));
        }

        let mut out = Vec::with_capacity(len as usize);
        let mut pos = start;
        let end = start + len;
        while pos < end {
            let (cluster, inner) = self.locate(pos);
            let take = (self.clusters[cluster].len() - inner).min((end - pos) as usize);
            out.extend_from_slice(&self.clusters[cluster][inner..inner + take]);
            pos += take as u64;
        }
        Ok(Cow::Owned(out))
    }
}
