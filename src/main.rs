use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stereocast::{
    config::Config,
    pipeline::ConversionEngine,
    upload::{DownloadResponse, UploadStore},
};

#[derive(Parser)]
#[command(
    name = "stereocast",
    version,
    about = "Convert an uploaded 2D video into a 3D rendition",
    long_about = "Stereocast samples an uploaded video at a fixed frame rate, optionally sends every frame through a remote 2D-to-3D inference endpoint, reassembles the frames into a video and prints a JSON object with its download URL."
)]
struct Cli {
    /// Uploaded video file
    #[arg(short, long)]
    input: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the sampling frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Prefix for relative download URLs, e.g. http://localhost:8000
    #[arg(long)]
    base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Stereocast v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration once; everything downstream receives it by value
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.apply_env();
    if let Some(fps) = cli.fps {
        config.pipeline.target_fps = fps;
    }
    if cli.base_url.is_some() {
        config.server.base_url = cli.base_url.clone();
    }
    config.validate()?;

    let store = UploadStore::new(&config.pipeline.upload_dir);
    let upload_path = store
        .ingest(&cli.input)
        .await
        .with_context(|| format!("storing upload {:?}", cli.input))?;

    let base_url = config.server.base_url.clone();
    let engine = ConversionEngine::new(config);

    match engine.process_video(&upload_path).await {
        Ok(processed) => {
            let response = DownloadResponse::new(processed.download_url, base_url.as_deref());
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        Err(e) => {
            error!("{}", e.user_message());
            Err(e.into())
        }
    }
}
