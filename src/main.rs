//! Companion Reader - inspect and verify companion-file datasets.
//!
//! This binary exposes the engine on the command line: `info` opens a
//! dataset and prints its resolved series, `verify` eagerly checks every
//! referenced plane file (the one thing the lazy engine deliberately does
//! not do at open).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use companion_reader::{
    build_index, is_companion_file, parse_companion_xml, sniff_file, CompanionReader, OpenError,
    ReaderOptions, SeriesIndex,
};

// =============================================================================
// CLI
// =============================================================================

/// Companion Reader - lazy plane resolution for multi-file microscopy
/// datasets.
#[derive(Parser, Debug)]
#[command(name = "companion-reader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved series of a dataset.
    Info(InfoArgs),

    /// Eagerly check every referenced plane file.
    Verify(VerifyArgs),
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Companion document (or plane file with an embedded document).
    path: PathBuf,

    /// Abort instead of deferring when a reference has no filename.
    #[arg(long, default_value_t = false, env = "COMPANION_FAIL_ON_MISSING")]
    fail_on_missing: bool,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Companion document (or plane file with an embedded document).
    path: PathBuf,

    /// List every file checked, not only the failures.
    #[arg(long, default_value_t = false)]
    list_files: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Info(args) => run_info(args),
        Command::Verify(args) => run_verify(args),
    }
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(args: InfoArgs) -> ExitCode {
    init_logging(args.verbose);
    hint_suffix(&args.path);

    let options = ReaderOptions::default().fail_on_missing(args.fail_on_missing);
    let reader = match CompanionReader::open_with(&args.path, options) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        print_info_json(&reader);
    } else {
        print_info_text(&args.path, &reader);
    }

    ExitCode::SUCCESS
}

fn print_info_text(path: &Path, reader: &CompanionReader) {
    println!("Companion dataset: {}", path.display());
    println!("═════════════════════════════════");
    println!("Series: {}", reader.series_count());

    for index in 0..reader.series_count() {
        let series = match reader.series(index) {
            Some(s) => s,
            None => continue,
        };
        println!();
        match &series.name {
            Some(name) => println!("Series {} ({})", index, name),
            None => println!("Series {}", index),
        }
        println!("─────────────────");
        println!("  Size:      {} x {}", series.size_x, series.size_y);
        println!(
            "  Z/C/T:     {} / {} / {}",
            series.size_z, series.size_c, series.size_t
        );
        println!("  Planes:    {}", series.image_count);
        println!(
            "  Pixels:    {} ({} bits), {}",
            series.pixel_type.name(),
            series.bits_per_pixel,
            if series.big_endian { "big-endian" } else { "little-endian" }
        );
        println!("  Order:     {}", series.dimension_order.as_str());
        if series.rgb {
            println!("  RGB:       {} samples/pixel", series.samples_per_pixel);
        }
        println!(
            "  Tile:      {} x {}",
            reader.optimal_tile_width(index).unwrap_or(0),
            reader.optimal_tile_height(index).unwrap_or(0)
        );
    }
}

/// One series in the machine-readable `info` report.
#[derive(Serialize)]
struct SeriesReport {
    series: usize,
    name: Option<String>,
    size_x: u32,
    size_y: u32,
    size_z: u32,
    size_c: u32,
    size_t: u32,
    plane_count: usize,
    pixel_type: &'static str,
    bits_per_pixel: u32,
    dimension_order: &'static str,
    rgb: bool,
    samples_per_pixel: u32,
    big_endian: bool,
    tile_width: Option<u32>,
    tile_height: Option<u32>,
}

#[derive(Serialize)]
struct InfoReport {
    series: Vec<SeriesReport>,
}

fn print_info_json(reader: &CompanionReader) {
    let series = (0..reader.series_count())
        .filter_map(|index| reader.series(index).map(|s| (index, s)))
        .map(|(index, s)| SeriesReport {
            series: index,
            name: s.name.clone(),
            size_x: s.size_x,
            size_y: s.size_y,
            size_z: s.size_z,
            size_c: s.size_c,
            size_t: s.size_t,
            plane_count: s.image_count,
            pixel_type: s.pixel_type.name(),
            bits_per_pixel: s.bits_per_pixel,
            dimension_order: s.dimension_order.as_str(),
            rgb: s.rgb,
            samples_per_pixel: s.samples_per_pixel,
            big_endian: s.big_endian,
            tile_width: reader.optimal_tile_width(index),
            tile_height: reader.optimal_tile_height(index),
        })
        .collect();

    match serde_json::to_string_pretty(&InfoReport { series }) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}

// =============================================================================
// Verify Command
// =============================================================================

fn run_verify(args: VerifyArgs) -> ExitCode {
    init_logging(args.verbose);
    hint_suffix(&args.path);

    println!("Companion Dataset Verification");
    println!("═════════════════════════════════");
    println!();

    let series = match load_series(&args.path) {
        Ok(series) => {
            println!("✓ Document: {} series", series.len());
            series
        }
        Err(e) => {
            println!("✗ Document: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Unique referenced files across all series, in stable order.
    let mut files = BTreeSet::new();
    let mut unresolved = 0usize;
    for s in &series {
        for plane in &s.planes {
            match &plane.file {
                Some(file) => {
                    files.insert(file.as_str().to_string());
                }
                None if plane.certain => unresolved += 1,
                None => {}
            }
        }
    }

    println!("✓ Referenced files: {}", files.len());
    if unresolved > 0 {
        println!("  {} reference(s) without a resolvable filename", unresolved);
    }
    println!();

    let mut failures = 0usize;
    for file in &files {
        match sniff_file(Path::new(file)) {
            Ok(_) => {
                if args.list_files {
                    println!("  ✓ {}", file);
                }
            }
            Err(e) => {
                failures += 1;
                println!("  ✗ {} ({})", file, e);
            }
        }
    }

    println!();
    println!("═════════════════════════════════");
    if failures == 0 {
        println!("✓ All {} file(s) present and well-formed", files.len());
        ExitCode::SUCCESS
    } else {
        println!("✗ {} of {} file(s) failed verification", failures, files.len());
        ExitCode::FAILURE
    }
}

/// Parse the document and build the plane index without opening a reader,
/// so the per-file descriptors stay accessible.
fn load_series(path: &Path) -> Result<Vec<SeriesIndex>, OpenError> {
    let xml = if companion_reader::looks_like_plane_file(&read_prefix(path)?) {
        companion_reader::tiff::extract_comment(path)
            .map_err(|e| OpenError::Io(e.to_string()))?
            .ok_or(OpenError::Metadata(
                companion_reader::MetadataError::MissingRoot,
            ))?
    } else {
        std::fs::read_to_string(path)?
    };

    let metadata = parse_companion_xml(&xml)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    build_index(&metadata, base_dir, false)
}

fn read_prefix(path: &Path) -> Result<Vec<u8>, OpenError> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut prefix = [0u8; 8];
    let filled = file.read(&mut prefix)?;
    Ok(prefix[..filled].to_vec())
}

// =============================================================================
// Helpers
// =============================================================================

/// Point out when a dataset does not carry the reserved companion suffix;
/// it still opens, the suffix is only the auto-detection pattern.
fn hint_suffix(path: &Path) {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !is_companion_file(name) {
        debug!(
            file = name,
            "file does not carry the .companion.ome suffix; opening explicitly"
        );
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "companion_reader=debug"
    } else {
        "companion_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
