use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use sync_cycle::{config::RenderConfig, preview, render_frames, render_video};

/// Renders the audio/video sync offset animation.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON render config; anything it leaves out keeps its default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output video path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write PNG frames into this directory instead of encoding a video
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Do not open the finished video
    #[arg(long)]
    no_show: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RenderConfig::load(path)?,
        None => RenderConfig::default(),
    };
    if let Some(output) = cli.output {
        config.output = output;
    }
    if cli.no_show {
        config.show = false;
    }

    if let Some(dir) = cli.frames_dir {
        render_frames(&config, &dir)?;
        return Ok(());
    }

    let summary = render_video(&config)?;
    log::info!(
        "{} frames, {:?} of video, rendered in {:?}",
        summary.frames,
        summary.video_duration,
        summary.elapsed
    );

    if config.show {
        preview::show(config.ffplay.as_deref(), &summary.output)?;
    }

    Ok(())
}
