mod bzip2_probe;
mod deflate;
mod lz4;
mod lzma;
mod lzw;
mod stream;
mod zstd_probe;

pub use bzip2_probe::Bzip2Probe;
pub use deflate::{DeflateProbe, GzipProbe, ZlibProbe};
pub use lz4::{Lz4FrameProbe, Lz4RawProbe, LZ4_FRAME_MAGIC};
pub use lzma::{Lzma2Probe, LzmaProbe, LZMA2_DICT_SIZE};
pub use lzw::{LzwDecoder, LzwProbe, LZW_MAGIC};
pub use zstd_probe::{ZstdProbe, ZSTD_MAGIC};

use std::sync::Arc;

use zscan_core::{Algorithm, CodecProbe, ProbeSource};

/// Resolve the probe for an algorithm.
///
/// Every [`Algorithm`] has a probe, so unlike [`ProbeSource::probe`] this
/// never fails.
pub fn probe_for(algorithm: Algorithm) -> Arc<dyn CodecProbe> {
    match algorithm {
        Algorithm::Deflate => Arc::new(DeflateProbe),
        Algorithm::Zlib => Arc::new(ZlibProbe),
        Algorithm::Gzip => Arc::new(GzipProbe),
        Algorithm::Bzip2 => Arc::new(Bzip2Probe),
        Algorithm::Lzma => Arc::new(LzmaProbe),
        Algorithm::Lzma2 => Arc::new(Lzma2Probe),
        Algorithm::Lzw => Arc::new(LzwProbe),
        Algorithm::Lz4Raw => Arc::new(Lz4RawProbe),
        Algorithm::Lz4Frame => Arc::new(Lz4FrameProbe),
        Algorithm::Zstd => Arc::new(ZstdProbe),
    }
}

/// The stock probe set, one per algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codecs;

impl ProbeSource for Codecs {
    fn probe(&self, algorithm: Algorithm) -> Option<Arc<dyn CodecProbe>> {
        Some(probe_for(algorithm))
    }
}
