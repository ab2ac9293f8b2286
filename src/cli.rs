// ============================================================================
// pixelsel CLI - headless selection / masked-move batch processing
// ============================================================================
//
// Usage examples:
//   pixelsel -i photo.png --rect 10,10,200,120 --rotate 15 -o rotated.png
//   pixelsel -i photo.png --ellipse 0,0,64,64 --translate 100,0 --sampling nearest
//   pixelsel -i "shots/*.png" --rect 0,0,50,50 --rect 25,25,50,50 --mode xor --output-dir out/
//   pixelsel -i photo.png --rect 5,5,40,40 --save-selection sel.pss
//
// For every input the selection shapes are combined into one selection, the
// selected pixels are lifted out of the image and drawn back through the
// requested transform.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::RgbaImage;

use crate::geometry::{Affine, CombineMode, Rect, RectF, Region};
use crate::history::HistoryManager;
use crate::io::{load_image, save_image, save_masked, save_selection};
use crate::masked::{MaskedBuffer, Sampling};
use crate::selection::{ContinuationShape, Selection};
use crate::settings::Settings;
use crate::{log_info, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// pixelsel headless selection processor.
#[derive(Parser, Debug)]
#[command(
    name = "pixelsel",
    about = "Select, lift and transform image regions from the command line",
    long_about = "Build a selection from rectangles and ellipses, lift the selected\n\
                  pixels and draw them back through a rotate/scale/translate transform.\n\n\
                  Example:\n  \
                  pixelsel --input photo.png --rect 10,10,200,120 --rotate 15 --output out.png\n  \
                  pixelsel -i *.png --ellipse 0,0,64,64 --mode union --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rectangle selection shape "x,y,w,h". May be repeated.
    #[arg(long, value_name = "X,Y,W,H")]
    pub rect: Vec<String>,

    /// Ellipse selection shape inscribed in "x,y,w,h". May be repeated.
    #[arg(long, value_name = "X,Y,W,H")]
    pub ellipse: Vec<String>,

    /// How each shape after the first joins the selection:
    /// replace, union, intersect, xor, exclude, complement.
    #[arg(short, long, default_value = "union", value_name = "MODE")]
    pub mode: String,

    /// Rotation in degrees (clockwise) about the selection centre.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub rotate: f64,

    /// Uniform scale about the selection centre.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Translation "dx,dy" applied after rotation and scale.
    #[arg(long, value_name = "DX,DY", allow_hyphen_values = true)]
    pub translate: Option<String>,

    /// Resampling: nearest or bilinear. Defaults to the configured sampling.
    #[arg(long, value_name = "MODE")]
    pub sampling: Option<String>,

    /// Leave the original pixels in place instead of moving them.
    #[arg(long)]
    pub copy: bool,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing. Files keep their stem and
    /// are written as PNG.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Save the final selection as a .pss document. Only valid for
    /// single-file input.
    #[arg(long, value_name = "FILE")]
    pub save_selection: Option<PathBuf>,

    /// Save the lifted pixels and their mask as a .psm document, tiled by
    /// the `tile_size` setting. Only valid for single-file input.
    #[arg(long, value_name = "FILE")]
    pub save_pixels: Option<PathBuf>,

    /// Settings file to use instead of the default location.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Echo log output and per-file timing to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Optional documents written next to the output image.
#[derive(Debug, Default)]
struct Saves<'a> {
    selection: Option<&'a Path>,
    pixels: Option<&'a Path>,
}

/// Everything `run_one` needs, parsed once up front.
#[derive(Debug)]
struct Job {
    shapes: Vec<ContinuationShape>,
    mode: CombineMode,
    rotate: f64,
    scale: f64,
    translate: (f64, f64),
    sampling: Sampling,
    copy: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    settings.apply_thread_pool();

    let job = match build_job(&args, &settings) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let single_only = args.output.is_some() || args.save_selection.is_some() || args.save_pixels.is_some();
    if inputs.len() > 1 && single_only && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output / --save-selection / --save-pixels only accept a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };
        let saves = Saves {
            selection: if multi { None } else { args.save_selection.as_deref() },
            pixels: if multi { None } else { args.save_pixels.as_deref() },
        };

        match run_one(input_path, &output_path, &saves, &job, &settings) {
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
                log_warn!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn build_job(args: &CliArgs, settings: &Settings) -> Result<Job, String> {
    let mut shapes = Vec::new();
    for s in &args.rect {
        let [x, y, w, h] = parse_numbers::<4>(s, "--rect")?;
        shapes.push(ContinuationShape::Rect(Rect::new(x as i32, y as i32, w as i32, h as i32)));
    }
    for s in &args.ellipse {
        let [x, y, w, h] = parse_numbers::<4>(s, "--ellipse")?;
        shapes.push(ContinuationShape::Ellipse(RectF::new(x, y, w, h)));
    }

    let mode = CombineMode::from_name(&args.mode).ok_or_else(|| format!("unknown --mode '{}'", args.mode))?;
    let sampling = match &args.sampling {
        Some(name) => Sampling::from_name(name).ok_or_else(|| format!("unknown --sampling '{}'", name))?,
        None => settings.default_sampling,
    };
    let translate = match &args.translate {
        Some(s) => {
            let [dx, dy] = parse_numbers::<2>(s, "--translate")?;
            (dx, dy)
        }
        None => (0.0, 0.0),
    };
    if !(args.scale.is_finite() && args.scale != 0.0) {
        return Err(format!("--scale must be a finite, non-zero number (got {})", args.scale));
    }

    Ok(Job {
        shapes,
        mode,
        rotate: args.rotate,
        scale: args.scale,
        translate,
        sampling,
        copy: args.copy,
    })
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    saves: &Saves<'_>,
    job: &Job,
    settings: &Settings,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut image = load_image(input).map_err(|e| format!("load failed: {}", e))?;
    let image_rect = Rect::new(0, 0, image.width() as i32, image.height() as i32);

    // -- Step 2: Build the selection -------------------------------------
    let mut selection = Selection::with_clip_rect(settings.clip_rect().intersect(&image_rect));
    let mut history = HistoryManager::new(settings.max_undo_steps);
    for (i, shape) in job.shapes.iter().enumerate() {
        let mode = if i == 0 { CombineMode::Replace } else { job.mode };
        history.record(format!("{} selection", mode), &mut selection, |s| {
            s.set_continuation(shape.clone(), mode);
            s.commit_continuation();
        });
    }
    let region = selection.create_region();
    log_info!(
        "{}: selection of {} px in {} scans, bounds {:?} ({} history steps)",
        input.display(),
        region.area(),
        region.scan_count(),
        region.bounds(),
        history.undo_count()
    );

    // -- Step 3: Lift, transform, draw -----------------------------------
    let transform = job_transform(job, &selection.bounds_f());
    let buffer = MaskedBuffer::extract(&image, &region);
    if let Some(path) = saves.pixels {
        save_masked(&buffer, path, settings.tile_size).map_err(|e| format!("pixel save failed: {}", e))?;
    }
    if !transform.is_identity() {
        if !job.copy {
            clear_region(&mut image, &region);
        }
        buffer
            .draw(&mut image, &transform, job.sampling)
            .map_err(|e| format!("draw failed: {}", e))?;
        history.record("Move selection", &mut selection, |s| {
            s.set_interim_transform(transform);
            s.commit_interim_transform();
        });
    }

    // -- Step 4: Save ----------------------------------------------------
    save_image(&image, output).map_err(|e| format!("save failed: {}", e))?;
    if let Some(path) = saves.selection {
        save_selection(&selection, path).map_err(|e| format!("selection save failed: {}", e))?;
    }
    Ok(())
}

/// Scale, then rotate about the centre of `bounds`, then translate.
fn job_transform(job: &Job, bounds: &RectF) -> Affine {
    let cx = bounds.x + bounds.width / 2.0;
    let cy = bounds.y + bounds.height / 2.0;
    Affine::translation(-cx, -cy)
        .then(&Affine::scaling(job.scale, job.scale))
        .then(&Affine::rotation_degrees(job.rotate))
        .then(&Affine::translation(cx + job.translate.0, cy + job.translate.1))
}

/// Make every pixel under `region` fully transparent.
fn clear_region(image: &mut RgbaImage, region: &Region) {
    let bounds = Rect::new(0, 0, image.width() as i32, image.height() as i32);
    let stride = image.width() as usize * 4;
    let raw: &mut [u8] = image.as_mut();
    for scan in region.scans().iter() {
        let r = scan.intersect(&bounds);
        for y in r.top()..r.bottom() {
            let start = y as usize * stride + r.left() as usize * 4;
            raw[start..start + r.width as usize * 4].fill(0);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse exactly `N` comma-separated numbers.
fn parse_numbers<const N: usize>(s: &str, flag: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("{} expects {} comma-separated numbers, got '{}'", flag, N, s));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("{}: '{}' is not a number", flag, part))?;
    }
    Ok(out)
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

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

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input as `<stem>_sel.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_sel.png", stem)))
}
