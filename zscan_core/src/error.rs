//! Error types for block discovery and extraction

use std::io;
use thiserror::Error;

use crate::algorithm::Algorithm;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown compression algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("no codec probe is registered for {0}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("invalid offset string for pointer search: {0}")]
    InvalidOffsetSpec(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("range 0x{start:X}+0x{len:X} is outside the data (length 0x{data_len:X})")]
    OutOfBounds { start: u64, len: u64, data_len: u64 },

    #[error("{algorithm} block decoded to {actual} bytes but {expected} were expected")]
    LengthMismatch {
        algorithm: Algorithm,
        expected: u64,
        actual: u64,
    },

    #[error("{algorithm} decode failed: {reason}")]
    Decode { algorithm: Algorithm, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
