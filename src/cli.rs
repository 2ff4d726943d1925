// ============================================================================
// wmark CLI — headless batch watermarking via command-line arguments
// ============================================================================
//
// Usage examples:
//   wmark --input photo.jpg --watermark logo.png --output out.jpg
//   wmark -i "shots/*.jpg" -w logo.png --output-dir marked/
//   wmark -i photo.png --text "© studio" --font-size 32 --color ffffffcc
//   wmark -i a.png b.png -w logo.png --position 0.85,0.9 --scale 0.2 --opacity 0.7
//
// Placement flags author directly in natural-image space (no preview is
// involved), so scale is a plain fraction of the watermark's natural size.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use crate::batch;
use crate::geometry::Position;
use crate::io::{self, OutputFormat};
use crate::store::WatermarkStore;
use crate::watermark::{FontSpec, WatermarkContent, WatermarkPatch};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// wmark headless watermark processor.
///
/// Stamp image or text watermarks onto photos in bulk — no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "wmark",
    about = "wmark headless batch watermarker",
    long_about = "Apply image or text watermarks to photos from the command line.\n\
                  Inputs may be literal paths or glob patterns; outputs default to\n\
                  watermarked_<name> next to each input, in the input's own format.\n\n\
                  Example:\n  \
                  wmark --input photo.jpg --watermark logo.png --opacity 0.7\n  \
                  wmark -i \"*.png\" --text \"© studio\" --output-dir marked/"
)]
pub struct CliArgs {
    /// Input image file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Image file to stamp as a watermark.
    #[arg(short = 'w', long, value_name = "FILE")]
    pub watermark: Option<PathBuf>,

    /// Text to stamp as a watermark (may be combined with --watermark).
    #[arg(short = 't', long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Font family for text watermarks.
    #[arg(long, default_value = "Arial", value_name = "FAMILY")]
    pub font_family: String,

    /// Font size in pixels (at scale 1.0) for text watermarks.
    #[arg(long, default_value_t = 24.0, value_name = "PX")]
    pub font_size: f32,

    /// CSS-style font weight (400 = regular, 700 = bold).
    #[arg(long, default_value_t = 700, value_name = "WEIGHT")]
    pub font_weight: u16,

    /// Text color as hex RGB or RGBA (e.g. ffffff or ffffffcc).
    #[arg(long, default_value = "ffffff", value_name = "HEX")]
    pub color: String,

    /// Watermark center position, normalized "X,Y" in [0,1] (default 0.5,0.5).
    #[arg(short, long, value_name = "X,Y")]
    pub position: Option<String>,

    /// Scale as a fraction of the watermark's natural size.
    #[arg(short, long, default_value_t = 0.5, value_name = "FACTOR")]
    pub scale: f32,

    /// Watermark opacity in [0,1].
    #[arg(long, default_value_t = 1.0, value_name = "ALPHA")]
    pub opacity: f32,

    /// Rotation in degrees about the watermark's center.
    #[arg(short, long, default_value_t = 0.0, value_name = "DEG")]
    pub rotation: f32,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here as watermarked_<stem>.<ext>.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp.
    /// When omitted, inferred from --output's extension or the input's own type.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG / WebP quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if args.watermark.is_none() && args.text.is_none() {
        eprintln!("error: nothing to apply — pass --watermark FILE and/or --text TEXT.");
        return ExitCode::FAILURE;
    }

    // Parse placement flags up front so bad values fail before any decoding
    let placement = match build_placement(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Decode the watermark asset once; every image shares the bitmap
    let watermark_bitmap = match &args.watermark {
        Some(path) => match io::load_watermark_image(path) {
            Ok(img) => Some(Arc::new(img)),
            Err(e) => {
                eprintln!("error: could not load watermark '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let text_content = args.text.as_ref().map(|text| WatermarkContent::Text {
        text: text.clone(),
        font: FontSpec {
            family: args.font_family.clone(),
            size: args.font_size,
            weight: args.font_weight,
            color: parse_color(&args.color).unwrap_or([255, 255, 255, 255]),
        },
    });

    // Create output directory if specified
    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    // -- Step 1: Load every input into the store ----------------------------
    let mut store = WatermarkStore::new();
    let mut input_paths: Vec<(uuid::Uuid, PathBuf)> = Vec::new();
    let mut any_failure = false;

    for path in &inputs {
        match io::load_source_image(path) {
            Ok(record) => {
                let id = store.add_image(record);
                input_paths.push((id, path.clone()));
            }
            Err(e) => {
                eprintln!("  error: could not load '{}': {}", path.display(), e);
                any_failure = true;
            }
        }
    }
    if input_paths.is_empty() {
        eprintln!("error: no input could be loaded.");
        return ExitCode::FAILURE;
    }

    // -- Step 2: Stamp the watermark(s) on the first image, then copy the
    //            set to every other open image (independent copies).
    let first_image = input_paths[0].0;
    if let Some(bitmap) = watermark_bitmap {
        store.add_watermark_to(first_image, WatermarkContent::Image(bitmap), placement.clone());
    }
    if let Some(content) = text_content {
        store.add_watermark_to(first_image, content, placement);
    }
    store.clone_all_to_every_other(first_image);

    // -- Step 3: Render ------------------------------------------------------
    let batch_start = Instant::now();
    let summary = batch::process_all(&mut store, 1.0);

    // -- Step 4: Write outputs ----------------------------------------------
    let total = input_paths.len();
    let multi = total > 1;
    for (idx, (image_id, input_path)) in input_paths.iter().enumerate() {
        let record = match store.record(*image_id) {
            Some(r) => r,
            None => continue,
        };
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let result = match &record.result {
            Some(bitmap) => bitmap,
            None => {
                if let Some((_, err)) = summary.failures.iter().find(|(id, _)| id == image_id) {
                    eprintln!("  error: {}", err);
                    any_failure = true;
                }
                continue;
            }
        };

        let format = output_format_for(record.format, &args);
        let output_path = build_output_path(
            input_path,
            &record.name,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            format,
        );

        let file_start = Instant::now();
        match io::encode_and_write(result, &output_path, format, args.quality) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: save failed: {}", e);
                any_failure = true;
            }
        }
    }

    if args.verbose {
        println!(
            "{} in {:.0}ms",
            summary.message(),
            batch_start.elapsed().as_secs_f64() * 1000.0
        );
    } else if multi {
        println!("{}", summary.message());
    }

    if any_failure || !summary.all_succeeded() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path — use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Placement patch from the CLI flags.
fn build_placement(args: &CliArgs) -> Result<WatermarkPatch, String> {
    let position = match &args.position {
        Some(spec) => Some(parse_position(spec)?),
        None => None,
    };
    Ok(WatermarkPatch {
        position,
        scale: Some(args.scale),
        opacity: Some(args.opacity),
        rotation: Some(args.rotation),
        content: None,
    })
}

/// Parse "X,Y" into a normalized position.
fn parse_position(spec: &str) -> Result<Position, String> {
    let (x, y) = spec
        .split_once(',')
        .ok_or_else(|| format!("invalid --position '{}': expected X,Y", spec))?;
    let x: f32 = x.trim().parse().map_err(|_| format!("invalid --position x '{}'", x))?;
    let y: f32 = y.trim().parse().map_err(|_| format!("invalid --position y '{}'", y))?;
    Ok(Position::new(x, y))
}

/// Parse a hex RGB / RGBA color string.
fn parse_color(hex: &str) -> Option<[u8; 4]> {
    let hex = hex.trim_start_matches('#');
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

/// Choose the output format: `--format` wins, then `--output`'s extension,
/// then the source's own type.
fn output_format_for(source_format: OutputFormat, args: &CliArgs) -> OutputFormat {
    if let Some(f) = &args.format {
        return OutputFormat::parse(f);
    }
    if let Some(out) = &args.output {
        if let Some(ext) = out.extension().and_then(|e| e.to_str()) {
            return OutputFormat::parse(ext);
        }
    }
    source_format
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, watermarked_<stem>.<ext>)
/// 3. Fallback: next to the input, watermarked_<stem>.<ext>
fn build_output_path(
    input: &Path,
    source_name: &str,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }

    let file_name = io::output_file_name(source_name, format);
    if let Some(dir) = output_dir {
        return dir.join(file_name);
    }
    input.parent().unwrap_or(Path::new(".")).join(file_name)
}
