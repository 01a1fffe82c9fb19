use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What a render produced, written next to the video as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSummary {
    pub output: PathBuf,
    pub frames: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate_kbps: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub video_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub ffmpeg_version: Option<String>,
}

pub fn video_duration(frames: u32, fps: u32) -> Duration {
    if fps == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(frames as u64 * 1_000_000_000 / fps as u64)
}

impl RenderSummary {
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            log::warn!(
                "Output file already exists and will be overwritten: {}",
                path.display()
            );
        }
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create file at {}", path.display()))?;
        let json = serde_json::to_string_pretty(self)?;
        writeln!(file, "{}", json)?;
        log::info!("Wrote: {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
