use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::plot::{AxisRange, FigureLayout};

/// Everything a render needs. Every field has a default, so an empty JSON
/// object is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub range: AxisRange,
    /// Number of frames rendered.
    pub frames: u32,
    /// Interpolation steps across the range; frame `i` sits at `i / steps`.
    pub steps: u32,
    pub fps: u32,
    pub codec: String,
    /// Target bitrate; `None` leaves the encoder unconstrained.
    pub bitrate_kbps: Option<u32>,
    pub dpi: f64,
    pub figure_size: [f64; 2],
    pub font_size: f64,
    pub annotation_font_size: f64,
    pub output: PathBuf,
    /// Explicit ffmpeg binary; looked up on `PATH` when unset.
    pub ffmpeg: Option<PathBuf>,
    pub ffplay: Option<PathBuf>,
    /// Open the written video in a player window afterwards.
    pub show: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            range: AxisRange::default(),
            frames: 120,
            steps: 200,
            fps: 200,
            codec: "libx264".to_owned(),
            bitrate_kbps: None,
            dpi: 240.0,
            figure_size: [8.0, 4.5],
            font_size: 16.0,
            annotation_font_size: 10.0,
            output: PathBuf::from("editing/one_sync_cycle.mp4"),
            ffmpeg: None,
            ffplay: None,
            show: true,
        }
    }
}

impl RenderConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config {}", path.as_ref().display()))?;
        let config: RenderConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.as_ref().display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.frames > 0, "frames must be at least 1");
        ensure!(self.steps > 0, "steps must be at least 1");
        let positions = u64::from(self.steps) + 1;
        ensure!(
            u64::from(self.frames) <= positions,
            "frames ({}) cannot exceed steps + 1 ({})",
            self.frames,
            positions
        );
        ensure!(self.fps > 0, "fps must be at least 1");
        ensure!(!self.codec.trim().is_empty(), "codec must not be empty");
        ensure!(
            self.output.file_name().is_some(),
            "output {} has no file name",
            self.output.display()
        );
        Ok(())
    }

    pub fn layout(&self) -> FigureLayout {
        FigureLayout {
            size_inches: (self.figure_size[0], self.figure_size[1]),
            dpi: self.dpi,
            font_size_pt: self.font_size,
        }
    }
}
