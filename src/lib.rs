/*

Renders one sync cycle: a red marker walks along a number line from -500 ms
to +95 ms while a triangle underneath says which stream is ahead.

  -500 ms          0          500 ms
  ---|-----|-----|-----|-----|---
     ^
  Video ahead

*/

pub mod animator;
pub mod config;
pub mod encoder;
pub mod file;
pub mod plot;
pub mod preview;
pub mod raster;
pub mod summary;
pub mod temp;
pub mod ticks;

use std::{io, path::Path, time::Instant};

use anyhow::Result;

use crate::{
    animator::movie,
    config::RenderConfig,
    encoder::{EncodeSettings, FfmpegEncoder, PngSequence, find_ffmpeg, ffmpeg_version},
    file::{ensure_output_dir, summary_path},
    plot::base_plot,
    summary::{RenderSummary, video_duration},
};

/// Renders the configured animation into a video file and writes its JSON
/// summary next to it.
pub fn render_video(config: &RenderConfig) -> Result<RenderSummary> {
    config.validate()?;
    ensure_output_dir(&config.output)?;

    let figure = base_plot(config.range, config.layout())?;
    let (width, height) = figure.pixel_size();

    let ffmpeg = find_ffmpeg(config.ffmpeg.as_deref())?;
    let version = match ffmpeg_version(&ffmpeg) {
        Ok(version) => {
            log::info!("Using ffmpeg {} at {}", version, ffmpeg.display());
            Some(version)
        }
        Err(e) => {
            log::warn!("Could not read ffmpeg version: {e:#}");
            None
        }
    };

    let settings = EncodeSettings {
        width,
        height,
        fps: config.fps,
        codec: config.codec.clone(),
        bitrate_kbps: config.bitrate_kbps,
    };

    let started = Instant::now();
    let mut encoder = FfmpegEncoder::spawn(&ffmpeg, settings, &config.output)?;
    movie(&figure, config, &mut encoder, &mut io::stdout())?;
    let frames = encoder.frames_written();

    let summary = RenderSummary {
        output: config.output.clone(),
        frames,
        fps: config.fps,
        width,
        height,
        codec: config.codec.clone(),
        bitrate_kbps: config.bitrate_kbps,
        video_duration: video_duration(frames, config.fps),
        elapsed: started.elapsed(),
        ffmpeg_version: version,
    };
    summary.write(summary_path(&config.output))?;

    Ok(summary)
}

/// Renders the configured animation as a PNG sequence in `dir`.
pub fn render_frames(config: &RenderConfig, dir: &Path) -> Result<u32> {
    config.validate()?;
    let figure = base_plot(config.range, config.layout())?;
    let mut sink = PngSequence::create(dir)?;
    movie(&figure, config, &mut sink, &mut io::stdout())?;
    Ok(sink.frames_written())
}
