use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Every compression format the finder knows how to probe for.
///
/// The discriminant doubles as the bit position inside [`AlgorithmSet`], so
/// iteration order (and therefore scan order) follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Deflate = 0,
    Zlib = 1,
    Gzip = 2,
    Bzip2 = 3,
    Lzma = 4,
    Lzma2 = 5,
    Lzw = 6,
    Lz4Raw = 7,
    Lz4Frame = 8,
    Zstd = 9,
}

impl Algorithm {
    pub const ALL: [Algorithm; 10] = [
        Algorithm::Deflate,
        Algorithm::Zlib,
        Algorithm::Gzip,
        Algorithm::Bzip2,
        Algorithm::Lzma,
        Algorithm::Lzma2,
        Algorithm::Lzw,
        Algorithm::Lz4Raw,
        Algorithm::Lz4Frame,
        Algorithm::Zstd,
    ];

    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Lower-case name used on the command line and in extracted file names.
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Deflate => "deflate",
            Algorithm::Zlib => "zlib",
            Algorithm::Gzip => "gzip",
            Algorithm::Bzip2 => "bzip2",
            Algorithm::Lzma => "lzma",
            Algorithm::Lzma2 => "lzma2",
            Algorithm::Lzw => "lzw",
            Algorithm::Lz4Raw => "lz4raw",
            Algorithm::Lz4Frame => "lz4frame",
            Algorithm::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownAlgorithm(wanted.to_string()))
    }
}

/// Bitmask selecting a subset of [`Algorithm`]s to scan for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmSet(u32);

impl AlgorithmSet {
    pub const EMPTY: AlgorithmSet = AlgorithmSet(0);
    pub const ALL: AlgorithmSet = AlgorithmSet((1 << Algorithm::ALL.len()) - 1);

    pub fn contains(self, algorithm: Algorithm) -> bool {
        self.0 & algorithm.bit() != 0
    }

    pub fn with(self, algorithm: Algorithm) -> Self {
        AlgorithmSet(self.0 | algorithm.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Algorithm> {
        Algorithm::ALL.into_iter().filter(move |a| self.contains(*a))
    }

    /// Parse a comma-separated list such as `"zlib, gzip"` or `"all"`.
    ///
    /// Names are case-insensitive and empty entries are skipped. An unknown
    /// name fails the whole list.
    pub fn parse_list(list: &str) -> Result<Self> {
        let mut set = AlgorithmSet::EMPTY;
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                set = AlgorithmSet::ALL;
            } else {
                set = set.with(name.parse()?);
            }
        }
        if set.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "no algorithms selected by '{list}'"
            )));
        }
        Ok(set)
    }
}

impl Default for AlgorithmSet {
    fn default() -> Self {
        AlgorithmSet::ALL
    }
}

impl From<Algorithm> for AlgorithmSet {
    fn from(algorithm: Algorithm) -> Self {
        AlgorithmSet(algorithm.bit())
    }
}

impl BitOr for Algorithm {
    type Output = AlgorithmSet;

    fn bitor(self, rhs: Algorithm) -> AlgorithmSet {
        AlgorithmSet::from(self).with(rhs)
    }
}

impl BitOr<Algorithm> for AlgorithmSet {
    type Output = AlgorithmSet;

    fn bitor(self, rhs: Algorithm) -> AlgorithmSet {
        self.with(rhs)
    }
}

impl FromIterator<Algorithm> for AlgorithmSet {
    fn from_iter<I: IntoIterator<Item = Algorithm>>(iter: I) -> Self {
        iter.into_iter().fold(AlgorithmSet::EMPTY, AlgorithmSet::with)
    }
}
