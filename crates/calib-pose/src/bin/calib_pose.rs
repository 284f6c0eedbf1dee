//! calib-pose CLI: checkerboard calibration and marker pose estimation on image files.

use calib_pose::aruco::builtins::{builtin_dictionary, BUILTIN_DICTIONARY_NAMES};
use calib_pose::aruco::Dictionary;
use calib_pose::chessboard::PatternSize;
use calib_pose::core::GrayImage;
use calib_pose::detect::{self, PatternSearchParams};
use calib_pose::intrinsics::CalibrationOptions;
use calib_pose::io::{default_intrinsics, load_intrinsics_or_default, IntrinsicsRecord};
use calib_pose::pipeline::{run_pipeline, FrameSource, JsonLinesSink, MarkerPipeline, PipelineConfig};
use clap::{Args, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "calib-pose")]
#[command(about = "Calibrate a camera from checkerboard images and estimate square-marker poses")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Emit logs as JSON (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate intrinsics from checkerboard images and write a JSON record.
    Calibrate(CalibrateArgs),

    /// Detect markers in images and print one JSON line of poses per image.
    Detect(DetectArgs),

    /// Write the fallback intrinsics for a frame size.
    DefaultIntrinsics {
        #[arg(long, default_value_t = 1280)]
        width: usize,
        #[arg(long, default_value_t = 720)]
        height: usize,
        /// Output path; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Checkerboard images.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Inner corners per row.
    #[arg(long)]
    cols: usize,

    /// Inner corners per column.
    #[arg(long)]
    rows: usize,

    /// Square edge length; calibrated translations use this unit.
    #[arg(long, default_value_t = 1.0)]
    square: f64,

    /// Where to write the intrinsics record (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Minimal number of usable views.
    #[arg(long, default_value_t = 2)]
    min_views: usize,

    /// Keep the principal point at the image centre.
    #[arg(long)]
    fix_principal_point: bool,

    /// Keep k3 at zero.
    #[arg(long)]
    fix_k3: bool,
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Frames to process, in order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Intrinsics record; default intrinsics are used if it cannot be read.
    #[arg(long, default_value = "camera_calibration.json")]
    intrinsics: PathBuf,

    /// Built-in dictionary name.
    #[arg(long, default_value = "DICT_4X4_250", conflicts_with = "dictionary_json")]
    dictionary: String,

    /// Dictionary JSON file.
    #[arg(long)]
    dictionary_json: Option<PathBuf>,

    /// Marker edge length; poses are reported in this unit.
    #[arg(long, default_value_t = 0.07)]
    marker_size: f64,

    /// Undistort whole frames before detection.
    #[arg(long)]
    undistort: bool,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    init_logging(cli.log_level, cli.json_log)?;

    match cli.command {
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Detect(args) => run_detect(&args),
        Commands::DefaultIntrinsics { width, height, out } => {
            run_default_intrinsics(width, height, out)
        }
    }
}

#[cfg(feature = "tracing")]
fn init_logging(level: LevelFilter, json: bool) -> CliResult<()> {
    calib_pose::core::init_tracing(level, json);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter, json: bool) -> CliResult<()> {
    if json {
        return Err("--json-log needs a build with the `tracing` feature".into());
    }
    calib_pose::core::init_with_level(level)?;
    Ok(())
}

// ── calibrate ─────────────────────────────────────────────────────────

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        match detect::load_gray(path) {
            Ok(img) => images.push(img),
            Err(err) => warn!("skipping {}: {err}", path.display()),
        }
    }

    let options = CalibrationOptions {
        min_views: args.min_views,
        fix_principal_point: args.fix_principal_point,
        fix_k3: args.fix_k3,
        ..CalibrationOptions::default()
    };
    let calib = detect::calibrate_from_images(
        &images,
        PatternSize::new(args.cols, args.rows),
        args.square,
        &detect::default_chess_config(),
        &PatternSearchParams::default(),
        &options,
    )?;

    let record = IntrinsicsRecord::from_calibration(
        &calib.result,
        calib.image_width as usize,
        calib.image_height as usize,
    );
    record.write_json(&args.out)?;
    info!("wrote {}", args.out.display());

    let summary = serde_json::json!({
        "rms": calib.result.rms,
        "quality": calib.result.quality(),
        "used_images": calib.used_images,
        "camera_matrix": record.camera_matrix,
        "dist_coeffs": record.dist_coeffs,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

// ── detect ────────────────────────────────────────────────────────────

/// Frames read lazily from files; unreadable files are skipped.
struct FileFrames {
    paths: std::vec::IntoIter<PathBuf>,
}

impl FrameSource for FileFrames {
    fn next_frame(&mut self) -> Option<GrayImage> {
        for path in self.paths.by_ref() {
            match detect::load_gray(&path).and_then(detect::to_core_image) {
                Ok(img) => return Some(img),
                Err(err) => warn!("skipping {}: {err}", path.display()),
            }
        }
        None
    }
}

fn load_dictionary(args: &DetectArgs) -> CliResult<Dictionary> {
    if let Some(path) = &args.dictionary_json {
        return Ok(Dictionary::load_json(path)?);
    }
    builtin_dictionary(&args.dictionary).ok_or_else(|| {
        format!(
            "unknown dictionary {:?}; built-ins: {}",
            args.dictionary,
            BUILTIN_DICTIONARY_NAMES.join(", ")
        )
        .into()
    })
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let (width, height) = match ::image::image_dimensions(&args.images[0]) {
        Ok((w, h)) => (w as usize, h as usize),
        Err(err) => {
            warn!("{}: {err}; assuming 1280x720", args.images[0].display());
            (1280, 720)
        }
    };
    let record = load_intrinsics_or_default(&args.intrinsics, width, height);
    let intrinsics = record.intrinsics()?;

    let mut config = PipelineConfig::default();
    config.identify.marker_length = args.marker_size;
    let mut pipeline = MarkerPipeline::new(intrinsics, load_dictionary(args)?, config)?;
    if args.undistort {
        pipeline = pipeline.with_frame_undistortion(width, height);
    }

    let mut source = FileFrames {
        paths: args.images.clone().into_iter(),
    };
    let mut sink = JsonLinesSink::new(std::io::stdout().lock());
    let frames = run_pipeline(&pipeline, &mut source, &mut sink, args.max_frames)?;
    info!("processed {frames} frames");
    Ok(())
}

// ── default-intrinsics ────────────────────────────────────────────────

fn run_default_intrinsics(width: usize, height: usize, out: Option<PathBuf>) -> CliResult<()> {
    let record = default_intrinsics(width, height);
    match out {
        Some(path) => {
            record.write_json(&path)?;
            info!("wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(())
}
