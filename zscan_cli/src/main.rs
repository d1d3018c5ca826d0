mod identify;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Parser};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xxhash_rust::xxh3::xxh3_64;

use identify::{Classifier, SignatureClassifier};
use zscan_codecs::Codecs;
use zscan_core::{
    parse_offset_spec, AddressableData, AlgorithmSet, Block, BlockFinder, BytesData,
    FinderConfig, MappedData, StartingPosition,
};

const MANIFEST_NAME: &str = "manifest.tsv";

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zscan",
    about = "Locate headerless compressed streams embedded in binary files",
    version
)]
struct Cli {
    /// File to scan
    file: PathBuf,
    /// Silence messages (requires --extract-to)
    #[arg(short, long)]
    quiet: bool,
    /// Verbose messages; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Only find starting positions of blocks
    #[arg(short, long)]
    start_only: bool,
    /// Look for magic in decompressed blocks
    #[arg(short, long)]
    identify: bool,
    /// Read the entire file into memory instead of mapping it
    #[arg(long)]
    read_file: bool,
    /// Keep blocks that lie entirely inside another block
    #[arg(short, long)]
    preserve_overlapping: bool,
    /// Directory to write decompressed blocks to
    #[arg(short, long, value_name = "DIR")]
    extract_to: Option<PathBuf>,
    /// Comma-separated algorithms: all, deflate, zlib, gzip, bzip2, lzma,
    /// lzma2, lzw, lz4raw, lz4frame, zstd
    #[arg(short, long, default_value = "all")]
    algorithms: String,
    /// Offsets/ranges before each block to search pointers for (e.g. 0,4,8-16)
    #[arg(short, long, value_name = "SPEC")]
    find_pointers: Option<String>,
    /// Minimum decompressed block length
    #[arg(short, long, default_value_t = 1)]
    min_length: u64,
    /// Worker threads (default: one per core)
    #[arg(short, long)]
    threads: Option<usize>,
}

impl Cli {
    fn finder_config(&self) -> anyhow::Result<FinderConfig> {
        Ok(FinderConfig {
            min_length: self.min_length,
            algorithms: AlgorithmSet::parse_list(&self.algorithms)?,
            position_only: self.start_only,
            remove_overlapping: !self.preserve_overlapping,
        })
    }

    /// Biases to search pointers for, parsed before any scanning starts.
    fn pointer_biases(&self) -> anyhow::Result<Option<Vec<u64>>> {
        let Some(spec) = &self.find_pointers else {
            return Ok(None);
        };
        Ok(Some(parse_offset_spec(spec)?))
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn validate_flags(cli: &Cli) -> anyhow::Result<()> {
    if cli.quiet {
        let conflict = if cli.start_only {
            Some("-s/--start-only")
        } else if cli.verbose > 0 {
            Some("-v/--verbose")
        } else if cli.identify {
            Some("-i/--identify")
        } else if cli.find_pointers.is_some() {
            Some("-f/--find-pointers")
        } else {
            None
        };
        if let Some(flag) = conflict {
            anyhow::bail!("-q/--quiet cannot be combined with {}", flag);
        }
        if cli.extract_to.is_none() {
            anyhow::bail!("-q/--quiet cannot be used without -e/--extract-to");
        }
    }
    Ok(())
}

fn log_level(quiet: bool, verbose: u8) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level(quiet, verbose))),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn open_data(path: &Path, read_file: bool) -> anyhow::Result<Box<dyn AddressableData>> {
    let data: Box<dyn AddressableData> = if read_file {
        Box::new(BytesData::read(path).with_context(|| format!("reading input file {:?}", path))?)
    } else {
        Box::new(MappedData::open(path).with_context(|| format!("mapping input file {:?}", path))?)
    };
    Ok(data)
}

fn start_line(start: &StartingPosition) -> String {
    format!("[{}] Block starts at 0x{:X}", start.algorithm, start.offset)
}

fn block_line(block: &Block) -> String {
    format!(
        "[{}] 0x{:X} - 0x{:X} (compressed length 0x{:X}, decompressed length 0x{:X})",
        block.algorithm,
        block.offset,
        block.end(),
        block.compressed_len,
        block.decompressed_len
    )
}

fn pointer_line(block: &Block, bias: u64, pointers: &[u64]) -> String {
    let target = if bias == 0 {
        String::new()
    } else {
        format!(" (- {} == 0x{:X})", bias, block.offset - bias)
    };
    let from: Vec<String> = pointers.iter().map(|p| format!("0x{:X}", p)).collect();
    format!(
        "Block 0x{:X}{} has pointers from: {}",
        block.offset,
        target,
        from.join(", ")
    )
}

fn identify_line(block: &Block, label: &str) -> String {
    format!(
        "[{}] 0x{:X} - 0x{:X} (decompressed length 0x{:X}): {}",
        block.algorithm,
        block.offset,
        block.end(),
        block.decompressed_len,
        label
    )
}

fn extract_file_name(block: &Block) -> String {
    format!("0x{:X}-0x{:X}_{}.bin", block.offset, block.end(), block.algorithm)
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_start_only(finder: &BlockFinder) {
    for start in finder.starting_positions() {
        println!("{}", start_line(start));
    }
    println!("{} starting positions found", finder.starting_positions().len());
}

fn run_blocks(finder: &BlockFinder) {
    for block in finder.blocks() {
        println!("{}", block_line(block));
    }
    println!("{} blocks found", finder.blocks().len());
}

fn run_pointers(finder: &BlockFinder, biases: &[u64]) -> anyhow::Result<()> {
    for &bias in biases {
        if bias == 0 {
            info!("Finding pointers to blocks");
        } else {
            info!("Finding pointers to {} bytes before the blocks", bias);
        }
        let found = finder.find_pointers(bias)?;
        for (block, pointers) in &found {
            println!("{}", pointer_line(block, bias, pointers));
        }
        let total: usize = found.iter().map(|(_, p)| p.len()).sum();
        println!("Pointers with offset {}: {}", bias, total);
    }
    Ok(())
}

fn identify_blocks(
    finder: &BlockFinder,
    classifier: &dyn Classifier,
) -> Vec<(Block, &'static str)> {
    finder
        .blocks()
        .par_iter()
        .filter_map(|block| match finder.decompress(block) {
            Ok(bytes) => classifier.classify(&bytes).map(|label| (*block, label)),
            Err(e) => {
                warn!("Could not decompress block at 0x{:X}: {}", block.offset, e);
                None
            }
        })
        .collect()
}

fn run_identify(finder: &BlockFinder) {
    info!("Beginning block identification");
    for (block, label) in identify_blocks(finder, &SignatureClassifier) {
        println!("{}", identify_line(&block, label));
    }
}

/// Write every block's decompressed bytes into `dir`, plus a manifest.
/// Returns the number of files written.
fn run_extract(finder: &BlockFinder, dir: &Path) -> anyhow::Result<usize> {
    info!("Beginning block extraction");
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {:?}", dir))?;

    let t0 = Instant::now();
    let rows = finder
        .blocks()
        .par_iter()
        .map(|block| -> anyhow::Result<String> {
            let bytes = finder
                .decompress(block)
                .with_context(|| format!("decompressing block at 0x{:X}", block.offset))?;
            let name = extract_file_name(block);
            let path = dir.join(&name);
            fs::write(&path, &bytes).with_context(|| format!("writing {:?}", path))?;
            Ok(format!(
                "0x{:X}\t{}\t{}\t{}\t{:016x}\t{}",
                block.offset,
                block.algorithm,
                block.compressed_len,
                block.decompressed_len,
                xxh3_64(&bytes),
                name
            ))
        })
        .collect::<anyhow::Result<Vec<String>>>()?;

    let mut manifest =
        String::from("offset\talgorithm\tcompressed\tdecompressed\txxh3\tfile\n");
    for row in &rows {
        manifest.push_str(row);
        manifest.push('\n');
    }
    let manifest_path = dir.join(MANIFEST_NAME);
    fs::write(&manifest_path, manifest)
        .with_context(|| format!("writing {:?}", manifest_path))?;

    info!(
        "Extracted {} blocks in {:.3}s",
        rows.len(),
        t0.elapsed().as_secs_f64()
    );
    Ok(rows.len())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn run(cli: Cli) -> anyhow::Result<()> {
    validate_flags(&cli)?;
    let config = cli.finder_config()?;
    let biases = cli.pointer_biases()?;
    init_logging(cli.quiet, cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring the worker pool")?;
    }

    let data = open_data(&cli.file, cli.read_file)?;
    let finder = BlockFinder::new(data, &config, &Codecs)?;

    if cli.start_only {
        run_start_only(&finder);
        return Ok(());
    }

    if !cli.quiet {
        run_blocks(&finder);
    }
    if let Some(biases) = &biases {
        run_pointers(&finder, biases)?;
    }
    if cli.identify {
        run_identify(&finder);
    }
    if let Some(dir) = &cli.extract_to {
        run_extract(&finder, dir)?;
        info!("Done!");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    run(Cli::parse())
}
