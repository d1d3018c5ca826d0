pub mod algorithm;
pub mod block;
pub mod data;
pub mod error;
pub mod finder;
pub mod pointers;
pub mod probe;

pub use algorithm::{Algorithm, AlgorithmSet};
pub use block::{Block, NonBlockRegion, StartingPosition};
pub use data::{AddressableData, BytesData, MappedData, CLUSTER_SIZE};
pub use error::{Error, Result};
pub use finder::{BlockFinder, FinderConfig};
pub use pointers::parse_offset_spec;
pub use probe::{CodecProbe, Decoded, ProbeSource, Scratch};
