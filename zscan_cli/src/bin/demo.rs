//! zscan demo
//!
//! Builds a synthetic firmware-style image: a small header holding a table of
//! stream offsets, followed by zlib, gzip, bzip2, LZ4 and zstd streams packed
//! between runs of filler. The image is then scanned without any knowledge of
//! that table, every stream is checked against what was written, and the
//! table entries are found again by pointer search.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bzip2::write::BzEncoder;
use clap::Parser;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use lz4_flex::frame::FrameEncoder;

use zscan_codecs::Codecs;
use zscan_core::{Algorithm, AlgorithmSet, BlockFinder, BytesData, FinderConfig};

// ── constants ──────────────────────────────────────────────────────────────

const IMAGE_MAGIC: &[u8; 8] = b"ZDEMOIMG";
const FILLER: u8 = 0xAA;
const MIN_LENGTH: u64 = 16;

// Filler before each stream; the last entry also pads the end of the image.
const GAPS: [usize; 5] = [37, 120, 9, 64, 211];

const EMBEDDED: [Algorithm; 5] = [
    Algorithm::Zlib,
    Algorithm::Gzip,
    Algorithm::Bzip2,
    Algorithm::Lz4Frame,
    Algorithm::Zstd,
];

const SENSORS: &[&str] = &["intake", "exhaust", "cpu0", "cpu1", "psu", "board"];
const STATES: &[&str] = &["ok", "ok", "ok", "warn", "ok", "throttled", "ok"];

#[derive(Parser)]
#[command(
    name = "zscan-demo",
    about = "Build a synthetic image with embedded streams and scan it"
)]
struct Args {
    /// Also write the generated image to this path
    #[arg(long, value_name = "PATH")]
    write: Option<PathBuf>,
    /// Records per embedded payload
    #[arg(long, default_value_t = 200)]
    records: u64,
}

struct Embedded {
    algorithm: Algorithm,
    offset: u64,
    table_entry: u64,
    compressed: Vec<u8>,
    payload: Vec<u8>,
}

// ── data generator ─────────────────────────────────────────────────────────

/// A deterministic telemetry line; the same `(stream, i)` always gives the
/// same bytes.
fn generate_record(stream: u64, i: u64) -> String {
    let sensor = SENSORS[((i * 5 + stream) as usize) % SENSORS.len()];
    let state = STATES[((i * 3 + stream * 7) as usize) % STATES.len()];
    let temp = 30.0 + ((i * 37 + stream * 11) % 450) as f64 / 10.0;
    let fan = 1200 + (i * 53 + stream * 17) % 2400;
    let ts = 1_760_000_000 + stream * 86_400 + i * 15;
    format!("{ts} stream={stream} sensor={sensor} temp={temp:.1}C fan={fan}rpm state={state}\n")
}

fn generate_payload(stream: u64, records: u64) -> Vec<u8> {
    (0..records)
        .flat_map(|i| generate_record(stream, i).into_bytes())
        .collect()
}

fn compress(algorithm: Algorithm, payload: &[u8]) -> Result<Vec<u8>> {
    let out = match algorithm {
        Algorithm::Zlib => {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(payload)?;
            enc.finish()?
        }
        Algorithm::Gzip => {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(payload)?;
            enc.finish()?
        }
        Algorithm::Bzip2 => {
            let mut enc = BzEncoder::new(Vec::new(), bzip2::Compression::default());
            enc.write_all(payload)?;
            enc.finish()?
        }
        Algorithm::Lz4Frame => {
            let mut enc = FrameEncoder::new(Vec::new());
            enc.write_all(payload)?;
            enc.finish()?
        }
        Algorithm::Zstd => zstd::bulk::compress(payload, 3)?,
        other => anyhow::bail!("the demo does not embed {} streams", other),
    };
    Ok(out)
}

/// Header, offset table, then each stream after its gap of filler.
fn build_image(records: u64) -> Result<(Vec<u8>, Vec<Embedded>)> {
    let table_start = IMAGE_MAGIC.len() + 4;
    let mut offset = table_start + EMBEDDED.len() * 8;
    let mut embedded = Vec::with_capacity(EMBEDDED.len());
    for (i, (&algorithm, gap)) in EMBEDDED.iter().zip(GAPS).enumerate() {
        let payload = generate_payload(i as u64, records);
        let compressed = compress(algorithm, &payload)?;
        offset += gap;
        embedded.push(Embedded {
            algorithm,
            offset: offset as u64,
            table_entry: (table_start + i * 8) as u64,
            compressed,
            payload,
        });
        offset += embedded[i].compressed.len();
    }

    let mut image = Vec::with_capacity(offset + GAPS[GAPS.len() - 1]);
    image.extend_from_slice(IMAGE_MAGIC);
    image.extend_from_slice(&(embedded.len() as u32).to_le_bytes());
    for e in &embedded {
        image.extend_from_slice(&(e.offset as u32).to_le_bytes());
        image.extend_from_slice(&(e.compressed.len() as u32).to_le_bytes());
    }
    for (e, gap) in embedded.iter().zip(GAPS) {
        image.resize(image.len() + gap, FILLER);
        image.extend_from_slice(&e.compressed);
    }
    image.resize(image.len() + GAPS[GAPS.len() - 1], FILLER);
    Ok((image, embedded))
}

// ── formatting ─────────────────────────────────────────────────────────────

/// Image sizes stay in the kilobyte range.
fn size(n: u64) -> String {
    if n < 1024 {
        format!("{n} B")
    } else {
        format!("{:.1} KiB", n as f64 / 1024.0)
    }
}

fn millis(d: Duration) -> String {
    format!("{:.2} ms", d.as_secs_f64() * 1e3)
}

fn phase(n: usize, title: &str) {
    println!();
    println!("[{n}] {title}");
    println!("{}", "─".repeat(title.len() + 4));
}

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

// ── demo runner ────────────────────────────────────────────────────────────

fn run() -> Result<()> {
    let args = Args::parse();

    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║          zscan · embedded compressed stream finder demo          ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    phase(0, "image");
    let (image, embedded) = build_image(args.records)?;
    println!("  image size   : {}", size(image.len() as u64));
    println!("  streams      : {}", embedded.len());
    for e in &embedded {
        println!(
            "    {:<9} at 0x{:05X}  {:>10} → {:>10}",
            e.algorithm,
            e.offset,
            size(e.compressed.len() as u64),
            size(e.payload.len() as u64)
        );
    }
    if let Some(path) = &args.write {
        std::fs::write(path, &image).with_context(|| format!("writing image to {:?}", path))?;
        println!("  written to {:?}", path);
    }

    phase(1, "scan");
    let algorithms: AlgorithmSet = EMBEDDED.iter().copied().collect();
    let config = FinderConfig {
        min_length: MIN_LENGTH,
        algorithms,
        ..FinderConfig::default()
    };
    let t0 = Instant::now();
    let finder = BlockFinder::new(Box::new(BytesData::new(image)), &config, &Codecs)?;
    let elapsed = t0.elapsed();
    for block in finder.blocks() {
        println!(
            "  [{}] 0x{:X} - 0x{:X} (compressed 0x{:X}, decompressed 0x{:X})",
            block.algorithm,
            block.offset,
            block.end(),
            block.compressed_len,
            block.decompressed_len
        );
    }
    println!(
        "  {} blocks, {} non-block regions, scanned in {}",
        finder.blocks().len(),
        finder.non_block_regions().len(),
        millis(elapsed)
    );

    phase(2, "verify");
    let mut recovered = 0;
    for e in &embedded {
        let found = finder
            .blocks()
            .iter()
            .find(|b| b.offset == e.offset && b.algorithm == e.algorithm);
        let ok = found.is_some_and(|b| {
            b.compressed_len == e.compressed.len() as u64
                && finder.decompress(b).is_ok_and(|bytes| bytes == e.payload)
        });
        if ok {
            recovered += 1;
        }
        println!("  {} {:<9} at 0x{:05X}", mark(ok), e.algorithm, e.offset);
    }
    println!("  recovered {}/{} streams byte-exact", recovered, embedded.len());

    phase(3, "pointers");
    let pointers = finder.find_pointers(0)?;
    for (block, from) in &pointers {
        let from: Vec<String> = from.iter().map(|p| format!("0x{p:X}")).collect();
        println!("  block 0x{:X} referenced from {}", block.offset, from.join(", "));
    }
    let table_hits = embedded
        .iter()
        .filter(|e| {
            pointers
                .iter()
                .any(|(b, from)| b.offset == e.offset && from.contains(&e.table_entry))
        })
        .count();
    println!(
        "  {} {}/{} offset table entries found",
        mark(table_hits == embedded.len()),
        table_hits,
        embedded.len()
    );
    println!();
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
