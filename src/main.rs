use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use first_frame::{
    config::Config,
    engine::{EngineHandle, FfmpegEngine},
    media::{MediaAsset, MediaKind, ScaleTarget, TargetContainer},
    pipeline::PipelineCoordinator,
    FirstFrameError,
};

#[derive(Parser)]
#[command(
    name = "first-frame",
    version,
    about = "Replace the first frame of a video with an image",
    long_about = "First-Frame splices a still image in as the opening frame of a video, optionally rescaling, changing the framerate or cutting the length, and can repackage the result as MOV or MKV."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the opening frame of a video
    Replace(ReplaceArgs),

    /// Convert a finished MP4 into another container
    Convert(ConvertArgs),
}

#[derive(Args)]
struct ReplaceArgs {
    /// Source video
    #[arg(long)]
    video: PathBuf,

    /// Image to use as the first frame
    #[arg(long)]
    image: PathBuf,

    /// Which asset's dimensions the output takes (video, image)
    #[arg(long)]
    scale_to: Option<ScaleTarget>,

    /// Output framerate; re-encodes the video
    #[arg(long)]
    framerate: Option<u32>,

    /// Output length in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Base name of the output files
    #[arg(long)]
    name: Option<String>,

    /// Directory the results are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Also write the result in these containers (mov, mkv)
    #[arg(long = "convert")]
    containers: Vec<TargetContainer>,
}

#[derive(Args)]
struct ConvertArgs {
    /// Finished MP4 to convert
    #[arg(short, long)]
    input: PathBuf,

    /// Target container (mov, mkv)
    #[arg(long)]
    to: TargetContainer,

    /// Directory the result is written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting First-Frame v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path).map_err(report)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.validate().map_err(report)?;

    let engine = FfmpegEngine::new(config.engine.clone()).map_err(FirstFrameError::from).map_err(report)?;
    let handle = Arc::new(EngineHandle::new(Arc::new(engine)));
    let coordinator = PipelineCoordinator::new(handle, config.pipeline.clone())
        .with_conversion(config.conversion.clone());
    coordinator.load_engine().await.map_err(FirstFrameError::from).map_err(report)?;

    match cli.command {
        Command::Replace(args) => replace(&coordinator, &config, args).await,
        Command::Convert(args) => convert(&coordinator, args).await,
    }
}

async fn replace(coordinator: &PipelineCoordinator, config: &Config, args: ReplaceArgs) -> Result<()> {
    let mut options = config.defaults.clone();
    if let Some(scale_target) = args.scale_to {
        options.scale_target = scale_target;
    }
    if args.framerate.is_some() {
        options.framerate = args.framerate;
    }
    if args.duration.is_some() {
        options.duration = args.duration;
    }
    if let Some(name) = args.name {
        options.output_base_name = name;
    }

    let video = load_asset(&args.video, MediaKind::Video).await?;
    let image = load_asset(&args.image, MediaKind::Image).await?;
    info!("Video: {:?} ({:.2} MB)", args.video, video.size_mb());
    info!("Image: {:?} ({:.2} MB)", args.image, image.size_mb());

    let output = coordinator
        .run(&video, &image, &options)
        .await
        .map_err(FirstFrameError::from)
        .map_err(report)?;
    let path = write_asset(&args.output_dir, &output).await?;
    info!("✅ Saved {:?} ({:.2} MB)", path, output.size_mb());

    for container in args.containers {
        match coordinator.convert_container(&output, container).await {
            Ok(converted) => {
                let path = write_asset(&args.output_dir, &converted).await?;
                info!("✅ Saved {:?} ({:.2} MB)", path, converted.size_mb());
            }
            // The MP4 is already written; one failed conversion does not undo it
            Err(e) => warn!("{}", FirstFrameError::from(e).user_message()),
        }
    }

    Ok(())
}

async fn convert(coordinator: &PipelineCoordinator, args: ConvertArgs) -> Result<()> {
    let input = load_asset(&args.input, MediaKind::Video).await?;
    let converted = coordinator
        .convert_container(&input, args.to)
        .await
        .map_err(FirstFrameError::from)
        .map_err(report)?;

    let path = write_asset(&args.output_dir, &converted).await?;
    info!("✅ Saved {:?} ({:.2} MB)", path, converted.size_mb());
    Ok(())
}

async fn load_asset(path: &Path, expected: MediaKind) -> Result<MediaAsset> {
    let asset = MediaAsset::load(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    if asset.kind() != expected {
        anyhow::bail!("{:?} is not a {:?} file", path, expected);
    }
    Ok(asset)
}

async fn write_asset(dir: &Path, asset: &MediaAsset) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(asset.name());
    tokio::fs::write(&path, asset.data())
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

fn report(error: FirstFrameError) -> anyhow::Error {
    anyhow::anyhow!(error.user_message())
}
