//! honeyseg: measure the honey-covered area of a frame photograph.
//!
//! Loads an image, establishes the pixel-to-area calibration, runs the
//! tiled segmentation pipeline and exports the mask and highlighted
//! overlay next to (or away from) the source.
//!
//! Calibration comes either from a known constant or from a reference line
//! drawn over an object of known length:
//!
//! ```text
//! honeyseg frame.jpg --model honey.onnx --area-per-pixel 0.000144
//! honeyseg frame.jpg --model honey.onnx --reference 102,388,718,391 \
//!     --reference-cm 10 --display 1024x768
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use honeyseg_pipeline::{
    AreaPerPixel, Dimensions, PipelineConfig, PipelineDiagnostics, Point, PointerEvent, Progress,
    ReferenceLine, SegmentationModel, SegmentationPipeline, Session, StdClock,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Measure the honey-covered area of a honeycomb frame photograph.
///
/// Splits the image into overlapping tiles, segments each tile with the
/// model, merges the tile masks and converts positive pixels to cm².
#[derive(Parser)]
#[command(name = "honeyseg", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Segmentation model (ONNX).
    #[arg(long)]
    model: PathBuf,

    /// Input tensor layout expected by the model.
    #[cfg(feature = "onnx")]
    #[arg(long, value_enum, default_value_t = Layout::Nhwc)]
    layout: Layout,

    /// Known calibration constant in cm² per source pixel.
    #[arg(long, conflicts_with = "reference")]
    area_per_pixel: Option<f64>,

    /// Reference line endpoints as `x1,y1,x2,y2` in display coordinates.
    #[arg(long, value_parser = parse_reference, requires = "reference_cm")]
    reference: Option<ReferenceArg>,

    /// Real-world length of the reference line in centimetres.
    #[arg(long)]
    reference_cm: Option<f64>,

    /// Size the reference was measured on, as `WIDTHxHEIGHT`.
    ///
    /// Defaults to the source image size.
    #[arg(long, value_parser = parse_dimensions)]
    display: Option<Dimensions>,

    /// Write the source with the reference line drawn on it.
    #[arg(long, requires = "reference")]
    reference_preview: Option<PathBuf>,

    /// Directory for the mask and overlay. Defaults to the image's directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Image format extension for exported files.
    #[arg(long, default_value = "png")]
    format: String,

    /// Tile width in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TILE_WIDTH)]
    tile_width: u32,

    /// Tile height in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TILE_HEIGHT)]
    tile_height: u32,

    /// Fraction of a tile shared with its neighbour (0.0 to <1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OVERLAP)]
    overlap: f64,

    /// Probabilities strictly above this are honey.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Overlay weight of the source image.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SOURCE_WEIGHT)]
    source_weight: f32,

    /// Overlay weight of the highlight color.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MASK_WEIGHT)]
    mask_weight: f32,

    /// Highlight color as `R,G,B`.
    #[arg(long, value_parser = parse_color, default_value = "255,0,0")]
    highlight: [u8; 3],

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the result as JSON instead of a sentence.
    #[arg(long)]
    json: bool,

    /// Print per-stage timing diagnostics to stderr.
    #[arg(long)]
    diagnostics: bool,

    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,
}

/// Input tensor layout selection.
#[cfg(feature = "onnx")]
#[derive(Clone, Copy, clap::ValueEnum)]
enum Layout {
    /// Batch, height, width, channels (Keras export).
    Nhwc,
    /// Batch, channels, height, width (PyTorch export).
    Nchw,
}

/// Reference line endpoints from the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReferenceArg {
    start: Point,
    end: Point,
}

fn parse_reference(s: &str) -> Result<ReferenceArg, String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid coordinate {v:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match values[..] {
        [x1, y1, x2, y2] => Ok(ReferenceArg {
            start: Point::new(x1, y1),
            end: Point::new(x2, y2),
        }),
        _ => Err(format!("expected x1,y1,x2,y2, got {} values", values.len())),
    }
}

fn parse_dimensions(s: &str) -> Result<Dimensions, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid size {v:?}: {e}"))
    };
    Ok(Dimensions::new(parse(w)?, parse(h)?))
}

fn parse_color(s: &str) -> Result<[u8; 3], String> {
    let channels = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<u8>()
                .map_err(|e| format!("invalid channel {v:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    <[u8; 3]>::try_from(channels.as_slice())
        .map_err(|_| format!("expected R,G,B, got {} values", channels.len()))
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        tile_width: cli.tile_width,
        tile_height: cli.tile_height,
        overlap: cli.overlap,
        threshold: cli.threshold,
        source_weight: cli.source_weight,
        mask_weight: cli.mask_weight,
        highlight: cli.highlight,
    })
}

/// Level filter from `-v`/`-q`: warnings by default, `-v` info, `-vv`
/// debug, `-vvv` trace, `-q` errors only, `-qq` off.
///
/// `RUST_LOG` is honoured when neither flag is given.
fn init_logging(verbosity: &Verbosity<WarnLevel>) {
    let use_env = !verbosity.is_present() && std::env::var_os("RUST_LOG").is_some();
    let mut logger = if use_env {
        env_logger::Builder::from_env(env_logger::Env::default())
    } else {
        let mut b = env_logger::Builder::new();
        b.filter_level(verbosity.log_level_filter());
        b
    };
    logger
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// Establish the calibration from `--area-per-pixel` or `--reference`.
///
/// The reference endpoints are fed through the same press/release
/// tracking an interactive surface would use.
fn calibrate(cli: &Cli, session: &mut Session) -> Result<Option<ReferenceLine>, String> {
    if let Some(value) = cli.area_per_pixel {
        let app = AreaPerPixel::new(value).map_err(|e| e.to_string())?;
        session.set_area_per_pixel(app);
        return Ok(None);
    }
    let (Some(reference), Some(cm)) = (cli.reference, cli.reference_cm) else {
        return Ok(None);
    };
    let source = session
        .source_dimensions()
        .ok_or_else(|| "no image loaded".to_owned())?;
    let display = cli.display.unwrap_or(source);
    let mut tracker = session
        .reference_tracker(display)
        .ok_or_else(|| "no image loaded".to_owned())?;
    tracker.handle(PointerEvent::Press(reference.start));
    let line = tracker
        .handle(PointerEvent::Release(reference.end))
        .ok_or_else(|| "reference line was not completed".to_owned())?;
    session
        .calibrate(&line, cm)
        .map_err(|e| format!("Calibration failed: {e}"))?;
    Ok(Some(line))
}

#[cfg(feature = "onnx")]
fn load_model(cli: &Cli) -> Result<Box<dyn SegmentationModel>, String> {
    let layout = match cli.layout {
        Layout::Nhwc => honeyseg_io::TensorLayout::Nhwc,
        Layout::Nchw => honeyseg_io::TensorLayout::Nchw,
    };
    let model = honeyseg_io::OnnxModel::load(&cli.model).map_err(|e| e.to_string())?;
    Ok(Box::new(model.with_layout(layout)))
}

#[cfg(not(feature = "onnx"))]
fn load_model(cli: &Cli) -> Result<Box<dyn SegmentationModel>, String> {
    Err(format!(
        "cannot load {}: honeyseg was built without the `onnx` feature",
        cli.model.display()
    ))
}

/// A progress bar over `[0, 1]`, only when stderr is interactive.
fn progress_bar() -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new(1000);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:30}] {percent:>3}% {msg}")
    {
        pb.set_style(style.progress_chars("#> "));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Machine-readable result for `--json`.
#[derive(Serialize)]
struct Report<'a> {
    image: &'a Path,
    area_cm2: f64,
    positive_pixels: u64,
    area_per_pixel: f64,
    mask: &'a Path,
    overlay: &'a Path,
    diagnostics: &'a PipelineDiagnostics,
}

#[allow(clippy::too_many_lines)]
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);

    let config = match config_from_cli(&cli).and_then(|c| {
        c.validate().map_err(|e| e.to_string())?;
        Ok(c)
    }) {
        Ok(c) => c,
        Err(msg) => {
            log::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    log::debug!("config: {config:?}");

    let source = match honeyseg_io::load_rgb(&cli.image_path) {
        Ok(image) => image,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let mut session = Session::new();
    session.load_image(source);

    let line = match calibrate(&cli, &mut session) {
        Ok(line) => line,
        Err(msg) => {
            log::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let Some(area_per_pixel) = session.area_per_pixel() else {
        log::error!(
            "{}; pass --area-per-pixel or --reference with --reference-cm",
            honeyseg_pipeline::CalibrationError::NotCalibrated
        );
        return ExitCode::FAILURE;
    };

    if let (Some(path), Some(line), Some(source)) =
        (&cli.reference_preview, line.as_ref(), session.source())
    {
        let written = honeyseg_pipeline::draw_reference_line(source, line, [0, 255, 0])
            .map_err(|e| e.to_string())
            .and_then(|preview| {
                honeyseg_io::save_rgb(path, &preview).map_err(|e| e.to_string())
            });
        if let Err(msg) = written {
            log::error!("Error writing reference preview: {msg}");
            return ExitCode::FAILURE;
        }
        log::info!("reference preview written to {}", path.display());
    }

    let mut model = match load_model(&cli) {
        Ok(m) => m,
        Err(msg) => {
            log::error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let mut scratch = match honeyseg_io::ScratchDir::for_source(&cli.image_path) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let bar = progress_bar();
    let mut on_progress = |p: Progress| {
        if let Some(ref pb) = bar {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let position = (p.fraction * 1000.0).round() as u64;
            pb.set_position(position);
            pb.set_message(p.stage.to_string());
        }
    };
    let result = session.process(
        SegmentationPipeline::new(config).on_progress(&mut on_progress),
        model.as_mut(),
        &mut scratch,
        &StdClock,
    );
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(failure) => {
            log::error!("{failure}");
            return ExitCode::FAILURE;
        }
    };

    let output_dir = cli.output_dir.clone().unwrap_or_else(|| {
        cli.image_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    });
    let name = cli
        .image_path
        .file_stem()
        .map_or_else(|| "image".to_owned(), |s| s.to_string_lossy().into_owned());
    let paths = match honeyseg_io::export_results(
        &output_dir,
        &name,
        &cli.format,
        &outcome.mask,
        &outcome.overlay,
    ) {
        Ok(paths) => paths,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.diagnostics {
        eprintln!("{}", outcome.diagnostics.report());
    }

    if cli.json {
        let report = Report {
            image: &cli.image_path,
            area_cm2: outcome.area_cm2,
            positive_pixels: outcome.positive_pixels,
            area_per_pixel: area_per_pixel.get(),
            mask: &paths.mask,
            overlay: &paths.overlay,
            diagnostics: &outcome.diagnostics,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                log::error!("Error serializing result: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("The honey area is {:.4} cm²", outcome.area_cm2);
        println!("Mask: {}", paths.mask.display());
        println!("Overlay: {}", paths.overlay.display());
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["honeyseg", "frame.png", "--model", "honey.onnx"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn reference_parses_four_coordinates() {
        let r = parse_reference("10, 20.5,30,40").unwrap();
        assert_eq!(r.start, Point::new(10.0, 20.5));
        assert_eq!(r.end, Point::new(30.0, 40.0));
        assert!(parse_reference("1,2,3").is_err());
        assert!(parse_reference("1,2,3,x").is_err());
    }

    #[test]
    fn dimensions_parse() {
        assert_eq!(
            parse_dimensions("1024x768").unwrap(),
            Dimensions::new(1024, 768)
        );
        assert!(parse_dimensions("1024").is_err());
    }

    #[test]
    fn color_parses() {
        assert_eq!(parse_color("0,255,10").unwrap(), [0, 255, 10]);
        assert!(parse_color("0,256,10").is_err());
        assert!(parse_color("0,255").is_err());
    }

    #[test]
    fn defaults_match_pipeline_config() {
        let config = config_from_cli(&cli(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn config_json_overrides_flags() {
        let config = config_from_cli(&cli(&[
            "--tile-width",
            "128",
            "--config-json",
            r#"{"tile_width": 320, "overlap": 0.25}"#,
        ]))
        .unwrap();
        assert_eq!(config.tile_width, 320);
        assert_eq!(config.tile_height, PipelineConfig::DEFAULT_TILE_HEIGHT);
        assert!((config.overlap - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn reference_requires_length() {
        let argv = [
            "honeyseg",
            "frame.png",
            "--model",
            "m.onnx",
            "--reference",
            "0,0,10,0",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn area_per_pixel_conflicts_with_reference() {
        let argv = [
            "honeyseg",
            "frame.png",
            "--model",
            "m.onnx",
            "--area-per-pixel",
            "0.1",
            "--reference",
            "0,0,10,0",
            "--reference-cm",
            "5",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn reference_on_scaled_display_calibrates_in_source_pixels() {
        let args = cli(&[
            "--reference",
            "0,0,50,0",
            "--reference-cm",
            "10",
            "--display",
            "50x40",
        ]);
        let mut session = Session::new();
        session.load_image(honeyseg_pipeline::RgbImage::new(100, 80));
        let line = calibrate(&args, &mut session).unwrap().unwrap();
        assert_eq!(line.display, Dimensions::new(50, 40));
        // 50 display px is 100 source px; (10 / 100)² = 0.01.
        let app = session.area_per_pixel().unwrap();
        assert!((app.get() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn explicit_area_per_pixel_is_validated() {
        let mut session = Session::new();
        session.load_image(honeyseg_pipeline::RgbImage::new(4, 4));
        assert!(calibrate(&cli(&["--area-per-pixel", "0"]), &mut session).is_err());
        assert!(
            calibrate(&cli(&["--area-per-pixel", "0.5"]), &mut session)
                .unwrap()
                .is_none()
        );
        assert!(session.can_process());
    }
}
