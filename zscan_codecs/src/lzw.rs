//! Unix `compress` (`.Z`) streams.
//!
//! No crate in the dependency tree reads this format, so the decoder lives
//! here. It follows the classic `compress` layout:
//!
//! - a three-byte header `1F 9D flags`, where the low five flag bits hold the
//!   maximum code width (9 to 16) and `0x80` selects block mode;
//! - codes packed least-significant bit first, starting at 9 bits wide;
//! - codes are written in groups of eight, so whenever the code width changes
//!   (or the table is cleared) the reader skips to the end of the current
//!   group;
//! - in block mode, code 256 clears the table.
//!
//! The format has no end marker. A stream ends when fewer bits remain than
//! the current code width.

use std::io::{self, Read};

use zscan_core::{Algorithm, CodecProbe, Decoded, Error, Result, Scratch};

use crate::stream::{drain, read_to_len, strict};

pub const LZW_MAGIC: [u8; 2] = [0x1F, 0x9D];

const HEADER_LEN: usize = 3;
const BLOCK_MODE: u8 = 0x80;
const BITS_MASK: u8 = 0x1F;
const RESERVED_MASK: u8 = 0x60;
const INIT_BITS: u32 = 9;
const MIN_MAX_BITS: u8 = 9;
const MAX_MAX_BITS: u8 = 16;
const CLEAR: u32 = 256;

fn parse_header(bytes: &[u8]) -> Option<(u32, bool)> {
    match *bytes {
        [0x1F, 0x9D, flags, ..] => {
            let max_bits = flags & BITS_MASK;
            (flags & RESERVED_MASK == 0 && (MIN_MAX_BITS..=MAX_MAX_BITS).contains(&max_bits))
                .then_some((u32::from(max_bits), flags & BLOCK_MODE != 0))
        }
        _ => None,
    }
}

fn corrupt(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Streaming `.Z` decoder over an in-memory buffer.
pub struct LzwDecoder<'a> {
    input: &'a [u8],
    bit_pos: u64,
    group_start: u64,
    n_bits: u32,
    max_bits: u32,
    max_code: u32,
    max_max_code: u32,
    block_mode: bool,
    free_ent: u32,
    old_code: Option<u32>,
    fin_char: u8,
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    /// Decoded bytes waiting to be handed out, last byte first.
    pending: Vec<u8>,
    finished: bool,
    error: Option<io::Error>,
}

impl<'a> LzwDecoder<'a> {
    pub fn new(input: &'a [u8]) -> io::Result<Self> {
        let (max_bits, block_mode) =
            parse_header(input).ok_or_else(|| corrupt("not a compress (.Z) header"))?;
        let max_max_code = 1u32 << max_bits;
        Ok(LzwDecoder {
            input: &input[HEADER_LEN..],
            bit_pos: 0,
            group_start: 0,
            n_bits: INIT_BITS,
            max_bits,
            max_code: (1 << INIT_BITS) - 1,
            max_max_code,
            block_mode,
            free_ent: if block_mode { CLEAR + 1 } else { CLEAR },
            old_code: None,
            fin_char: 0,
            prefix: vec![0; max_max_code as usize],
            suffix: (0..max_max_code).map(|c| c as u8).collect(),
            pending: Vec::new(),
            finished: false,
            error: None,
        })
    }

    /// Skip the rest of the current group of eight codes.
    fn align_group(&mut self) {
        let group = u64::from(self.n_bits) * 8;
        let used = (self.bit_pos - self.group_start) % group;
        if used != 0 {
            self.bit_pos += group - used;
        }
        self.group_start = self.bit_pos;
    }

    fn next_code(&mut self) -> Option<u32> {
        let n = u64::from(self.n_bits);
        if self.bit_pos + n > self.input.len() as u64 * 8 {
            return None;
        }
        let byte = (self.bit_pos / 8) as usize;
        let shift = self.bit_pos % 8;
        let word = (0..3)
            .filter_map(|i| self.input.get(byte + i))
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc | u32::from(b) << (8 * i));
        self.bit_pos += n;
        Some((word >> shift) & ((1 << n) - 1))
    }

    /// Decode one code into `pending`. Returns false at the end of input.
    fn step(&mut self) -> io::Result<bool> {
        loop {
            if self.free_ent > self.max_code {
                self.align_group();
                self.n_bits += 1;
                self.max_code = if self.n_bits == self.max_bits {
                    self.max_max_code
                } else {
                    (1 << self.n_bits) - 1
                };
            }
            let Some(mut code) = self.next_code() else {
                return Ok(false);
            };

            let Some(old_code) = self.old_code else {
                if code >= CLEAR {
                    return Err(corrupt("first code is not a literal"));
                }
                self.old_code = Some(code);
                self.fin_char = code as u8;
                self.pending.push(code as u8);
                return Ok(true);
            };

            if code == CLEAR && self.block_mode {
                self.free_ent = CLEAR;
                self.align_group();
                self.n_bits = INIT_BITS;
                self.max_code = (1 << INIT_BITS) - 1;
                continue;
            }

            let in_code = code;
            if code >= self.free_ent {
                if code > self.free_ent {
                    return Err(corrupt("code refers past the end of the table"));
                }
                self.pending.push(self.fin_char);
                code = old_code;
            }
            while code >= CLEAR {
                self.pending.push(self.suffix[code as usize]);
                code = u32::from(self.prefix[code as usize]);
            }
            self.fin_char = code as u8;
            self.pending.push(self.fin_char);

            if self.free_ent < self.max_max_code {
                self.prefix[self.free_ent as usize] = old_code as u16;
                self.suffix[self.free_ent as usize] = self.fin_char;
                self.free_ent += 1;
            }
            self.old_code = Some(in_code);
            return Ok(true);
        }
    }
}

impl Read for LzwDecoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if let Some(b) = self.pending.pop() {
                buf[written] = b;
                written += 1;
                continue;
            }
            if self.finished || self.error.is_some() {
                break;
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => self.finished = true,
                Err(e) => self.error = Some(e),
            }
        }
        if written == 0 {
            if let Some(e) = self.error.take() {
                self.finished = true;
                return Err(e);
            }
        }
        Ok(written)
    }
}

/// Unix `compress` output, located by its `1F 9D` magic.
#[derive(Debug, Default, Clone, Copy)]
pub struct LzwProbe;

impl CodecProbe for LzwProbe {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lzw
    }

    fn is_possible(&self, bytes: &[u8]) -> bool {
        parse_header(bytes).is_some()
    }

    fn try_decompress(&self, input: &[u8], max_out: Option<u64>, scratch: &mut Scratch) -> Decoded {
        match LzwDecoder::new(input) {
            Ok(decoder) => drain(decoder, max_out, scratch, strict),
            Err(_) => Decoded::Invalid,
        }
    }

    fn decompress(&self, input: &[u8], decompressed_len: u64) -> Result<Vec<u8>> {
        let decoder = LzwDecoder::new(input).map_err(|e| Error::Decode {
            algorithm: Algorithm::Lzw,
            reason: e.to_string(),
        })?;
        read_to_len(decoder, decompressed_len, Algorithm::Lzw)
    }
}
