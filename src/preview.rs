use std::{ffi::OsString, path::Path, process::Command};

use anyhow::{Context, Result};

use crate::encoder::find_tool;

pub fn preview_args(video: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-window_title",
        "sync-cycle",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(video.as_os_str().to_owned());
    args
}

/// Plays `video` in an ffplay window and waits until it is closed.
///
/// The video is already on disk by the time this runs, so a missing player
/// only skips the preview.
pub fn show(ffplay: Option<&Path>, video: &Path) -> Result<()> {
    let program = match find_tool("ffplay", ffplay) {
        Ok(program) => program,
        Err(e) => {
            log::warn!("Skipping preview: {e:#}");
            return Ok(());
        }
    };

    log::info!("Showing {}, close the window to exit", video.display());
    let status = Command::new(&program)
        .args(preview_args(video))
        .status()
        .with_context(|| format!("Failed to start {}", program.display()))?;
    if !status.success() {
        log::warn!("{} exited with status: {}", program.display(), status);
    }
    Ok(())
}
