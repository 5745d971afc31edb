// Writes a synthetic clip for trying the pipeline without real footage

use std::path::PathBuf;

use clap::Parser;
use stereocast::video::{ffmpeg_available, FrameMerger};

#[derive(Parser)]
#[command(name = "make_sample", about = "Write a synthetic hue-cycling test video")]
struct Args {
    /// Output video path
    #[arg(short, long, default_value = "sample.mp4")]
    output: PathBuf,

    /// Clip length in seconds
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,

    #[arg(long, default_value_t = 48)]
    fps: u32,

    #[arg(long, default_value_t = 100)]
    width: u32,

    #[arg(long, default_value_t = 100)]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    if !ffmpeg_available() {
        anyhow::bail!("ffmpeg and ffprobe must be on PATH");
    }

    let path = FrameMerger::default().create_test_video(
        &args.output,
        args.seconds,
        args.fps,
        args.width,
        args.height,
    )?;

    println!("Wrote {} ({}s @ {}fps, {}x{})", path.display(), args.seconds, args.fps, args.width, args.height);
    Ok(())
}
