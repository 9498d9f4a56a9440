//! zoloto CLI: detect markers in images and render marker images.

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use zoloto::aruco::render_marker;
use zoloto::{
    BaseCamera, BaseMarker, CameraConfig, ImageFileCamera, MarkerRecord, MarkerSize, MarkerType,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "zoloto")]
#[command(about = "Detect ArUco markers and estimate their pose")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect markers in an image and print them as JSON.
    Detect(DetectArgs),

    /// Render marker images to PNG files.
    Markers(MarkersArgs),

    /// List the ids of attached cameras.
    #[cfg(feature = "opencv")]
    Cameras,
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Path to the input image.
    image: PathBuf,

    /// Camera config (JSON). Other options override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Marker dictionary, e.g. DICT_4X4_50.
    #[arg(long)]
    marker_type: Option<MarkerType>,

    /// Marker side length used for every id.
    #[arg(long)]
    marker_size: Option<u32>,

    /// Calibration file (JSON). Without one, records carry no pose.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Compute poses up front; requires calibration.
    #[arg(long)]
    eager: bool,

    /// Also write an annotated copy of the image.
    #[arg(long)]
    annotated: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct MarkersArgs {
    /// Output directory.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, default_value = "DICT_4X4_50")]
    marker_type: MarkerType,

    /// Render only this id instead of the whole dictionary.
    #[arg(long)]
    id: Option<u32>,

    /// Pixels per marker cell.
    #[arg(long, default_value = "20")]
    cell_px: usize,

    /// Black border width in cells.
    #[arg(long, default_value = "1")]
    border_bits: usize,

    /// White margin around the marker in pixels.
    #[arg(long, default_value = "20")]
    quiet_zone_px: usize,
}

fn verbosity_level(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter) -> CliResult<()> {
    zoloto::core::init_with_level(level)?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(level: LevelFilter) -> CliResult<()> {
    use tracing_subscriber::EnvFilter;

    tracing_log::LogTracer::init()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_ascii_lowercase()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    init_logging(verbosity_level(cli.verbose))?;

    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Markers(args) => run_markers(&args),
        #[cfg(feature = "opencv")]
        Commands::Cameras => run_cameras(),
    }
}

// detect

fn detect_config(args: &DetectArgs) -> CliResult<CameraConfig> {
    let mut config = match &args.config {
        Some(path) => CameraConfig::load(path)?,
        None => CameraConfig::default(),
    };
    if let Some(marker_type) = args.marker_type {
        config.marker_type = marker_type;
    }
    if let Some(size) = args.marker_size {
        config.marker_size = MarkerSize::Fixed(size);
    }
    if let Some(calibration) = &args.calibration {
        config.calibration_file = Some(calibration.clone());
    }
    Ok(config)
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let config = detect_config(args)?;
    let processor = config.build_processor()?;
    log::info!(
        "detecting {} markers in {}",
        processor.marker_type(),
        args.image.display()
    );

    let mut camera = ImageFileCamera::new(&args.image, processor);
    let records = if args.eager {
        camera
            .process_frame_eager()?
            .iter()
            .map(|m| m.to_record())
            .collect::<Result<Vec<_>, _>>()?
    } else {
        lazy_records(camera.process_frame()?.iter())
    };
    log::info!("found {} markers", records.len());

    if let Some(out) = &args.annotated {
        camera.save_frame(out, true)?;
        log::info!("annotated image written to {}", out.display());
    }

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn lazy_records<'a, M: BaseMarker + 'a>(markers: impl Iterator<Item = &'a M>) -> Vec<MarkerRecord> {
    markers
        .filter_map(|marker| match marker.to_record() {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("marker {}: {e}", marker.id());
                None
            }
        })
        .collect()
}

// markers

fn run_markers(args: &MarkersArgs) -> CliResult<()> {
    let dict = args.marker_type.dictionary();
    let ids: Vec<u32> = match args.id {
        Some(id) => vec![id],
        None => (0..=args.marker_type.max_id()).collect(),
    };
    std::fs::create_dir_all(&args.out_dir)?;

    for id in ids {
        let img = render_marker(&dict, id, args.cell_px, args.border_bits, args.quiet_zone_px)?;
        let path = marker_path(&args.out_dir, args.marker_type, id);
        let out = image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data)
            .ok_or("rendered marker has an inconsistent buffer size")?;
        out.save(&path)?;
        log::debug!("wrote {}", path.display());
    }
    println!("{}", args.out_dir.display());
    Ok(())
}

fn marker_path(dir: &Path, marker_type: MarkerType, id: u32) -> PathBuf {
    dir.join(format!("{}_{id}.png", marker_type.name().to_ascii_lowercase()))
}

// cameras

#[cfg(feature = "opencv")]
fn run_cameras() -> CliResult<()> {
    let ids = zoloto::find_camera_ids(&zoloto::OpenCvBackend);
    println!("{}", serde_json::to_string(&ids)?);
    Ok(())
}
