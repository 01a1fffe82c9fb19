use std::{
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use image::{ImageFormat, RgbImage};
use regex::Regex;
use tempfile::NamedTempFile;

use crate::file::clear_folder_contents;
use crate::temp::{create_log_file, create_staging_file, read_log};

/// Consumer of rendered frames, in order.
pub trait FrameSink {
    fn push_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flushes everything; no frames may be pushed afterwards.
    fn finish(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub bitrate_kbps: Option<u32>,
}

impl EncodeSettings {
    /// Command line for reading raw RGB frames from stdin and encoding them
    /// into `output`.
    pub fn ffmpeg_args(&self, output: &Path) -> Vec<OsString> {
        let size = format!("{}x{}", self.width, self.height);
        let fps = self.fps.to_string();
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            size.as_str(),
            "-framerate",
            fps.as_str(),
            "-i",
            "pipe:0",
            "-vcodec",
            self.codec.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if let Some(kbps) = self.bitrate_kbps {
            args.push("-b:v".into());
            args.push(format!("{kbps}k").into());
        }

        // yuv420p needs even dimensions
        args.extend(
            [
                "-vf",
                "pad=ceil(iw/2)*2:ceil(ih/2)*2",
                "-pix_fmt",
                "yuv420p",
                "-y",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// Resolves an external tool: the configured path if given, otherwise a
/// `PATH` lookup.
pub fn find_tool(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        ensure!(
            path.is_file(),
            "Configured {} binary {} does not exist",
            name,
            path.display()
        );
        return Ok(path.to_path_buf());
    }
    which::which(name).with_context(|| format!("{name} not found on PATH"))
}

pub fn find_ffmpeg(configured: Option<&Path>) -> Result<PathBuf> {
    find_tool("ffmpeg", configured)
}

pub fn parse_ffmpeg_version(text: &str) -> Option<String> {
    let re = Regex::new(r"(?m)^ffmpeg version (\S+)").ok()?;
    re.captures(text).map(|caps| caps[1].to_owned())
}

pub fn ffmpeg_version(program: &Path) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to run {} -version", program.display()))?;
    if !output.status.success() {
        bail!(
            "{} -version exited with status: {}",
            program.display(),
            output.status
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ffmpeg_version(&stdout).ok_or_else(|| anyhow!("Unrecognised ffmpeg -version output"))
}

/// Streams frames into an ffmpeg child process.
///
/// ffmpeg writes into a staging file beside the output, which replaces the
/// output only after ffmpeg exits successfully. A failed or abandoned encode
/// leaves any previous output untouched.
pub struct FfmpegEncoder {
    settings: EncodeSettings,
    output: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    staging: Option<NamedTempFile>,
    log: File,
    frames: u32,
}

impl FfmpegEncoder {
    pub fn spawn(program: &Path, settings: EncodeSettings, output: &Path) -> Result<Self> {
        ensure!(
            settings.width > 0 && settings.height > 0,
            "Cannot encode {}x{} frames",
            settings.width,
            settings.height
        );

        let staging = create_staging_file(output)?;
        let log = create_log_file()?;
        let stderr = log.try_clone().context("Failed to share ffmpeg log file")?;

        let mut child = Command::new(program)
            .args(settings.ffmpeg_args(staging.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .with_context(|| format!("Failed to start {}", program.display()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin was not captured"))?;

        log::info!(
            "Encoding {}x{} @ {} fps with {} into {}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec,
            output.display()
        );

        Ok(Self {
            settings,
            output: output.to_path_buf(),
            child: Some(child),
            stdin: Some(stdin),
            staging: Some(staging),
            log,
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.frames
    }

    fn wait_for_exit(&mut self) -> Result<()> {
        // Closing stdin is ffmpeg's end-of-stream
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait().context("Failed to wait for ffmpeg")?;
        if !status.success() {
            let stderr = read_log(&mut self.log);
            log::error!("Output path: {}", self.output.display());
            log::error!("stderr\n{}", stderr);
            bail!(
                "ffmpeg failed on {} with status: {}: {}",
                self.output.display(),
                status,
                stderr
            );
        }
        Ok(())
    }
}

impl FrameSink for FfmpegEncoder {
    fn push_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let expected = (self.settings.width, self.settings.height);
        ensure!(
            frame.dimensions() == expected,
            "Frame is {:?}, encoder expects {:?}",
            frame.dimensions(),
            expected
        );
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("Encoder already finished"))?;

        if let Err(err) = stdin.write_all(frame.as_raw()) {
            // A broken pipe means ffmpeg quit; its exit status says why
            self.wait_for_exit()?;
            return Err(err).context("Failed to send frame to ffmpeg");
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.wait_for_exit()?;
        let staging = self
            .staging
            .take()
            .ok_or_else(|| anyhow!("Encoder already finished"))?;
        staging
            .persist(&self.output)
            .with_context(|| format!("Failed to move video to {}", self.output.display()))?;

        log::info!("Wrote: {} ({} frames)", self.output.display(), self.frames);
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Writes each frame as `frame_NNNN.png` into a directory.
pub struct PngSequence {
    dir: PathBuf,
    frames: u32,
}

impl PngSequence {
    /// Creates `dir` if needed and removes whatever it held before.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create frame directory {}", dir.display()))?;
        clear_folder_contents(dir)
            .with_context(|| format!("Failed to clear frame directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            frames: 0,
        })
    }

    pub fn frame_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("frame_{index:04}.png"))
    }

    pub fn frames_written(&self) -> u32 {
        self.frames
    }
}

impl FrameSink for PngSequence {
    fn push_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.frame_path(self.frames);
        frame
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        log::info!("Wrote {} frames to {}", self.frames, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn settings(width: u32, height: u32) -> EncodeSettings {
        EncodeSettings {
            width,
            height,
            fps: 200,
            codec: "libx264".to_owned(),
            bitrate_kbps: None,
        }
    }

    fn args_as_strings(settings: &EncodeSettings) -> Vec<String> {
        settings
            .ffmpeg_args(Path::new("out.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).cloned()
    }

    #[test]
    fn args_describe_raw_input_and_codec() {
        let args = args_as_strings(&settings(1920, 1080));
        assert_eq!(value_after(&args, "-s").as_deref(), Some("1920x1080"));
        assert_eq!(value_after(&args, "-framerate").as_deref(), Some("200"));
        assert_eq!(value_after(&args, "-vcodec").as_deref(), Some("libx264"));
        assert_eq!(value_after(&args, "-i").as_deref(), Some("pipe:0"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn bitrate_only_when_constrained() {
        let args = args_as_strings(&settings(16, 16));
        assert!(!args.iter().any(|a| a == "-b:v"));

        let constrained = EncodeSettings {
            bitrate_kbps: Some(1800),
            ..settings(16, 16)
        };
        let args = args_as_strings(&constrained);
        assert_eq!(value_after(&args, "-b:v").as_deref(), Some("1800k"));
    }

    #[test]
    fn parses_version_banner() {
        let banner = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc 13\n";
        assert_eq!(parse_ffmpeg_version(banner).as_deref(), Some("6.1.1-3ubuntu5"));
        assert_eq!(parse_ffmpeg_version("avconv version 12"), None);
    }

    #[test]
    fn configured_tool_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("ffmpeg");
        assert!(find_tool("ffmpeg", Some(&missing)).is_err());

        fs::write(&missing, b"").unwrap();
        assert_eq!(find_tool("ffmpeg", Some(&missing)).unwrap(), missing);
    }

    #[test]
    fn png_sequence_numbers_frames_and_clears_old_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stale.png"), b"old").unwrap();

        let mut sink = PngSequence::create(dir.path()).unwrap();
        assert!(!dir.path().join("stale.png").exists());

        let frame = RgbImage::from_pixel(4, 3, Rgb([255, 0, 0]));
        for _ in 0..3 {
            sink.push_frame(&frame).unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 3);
        assert!(sink.frame_path(2).exists());
        assert!(dir.path().join("frame_0002.png").exists());
        let decoded = image::open(sink.frame_path(0)).unwrap().to_rgb8();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn ffmpeg_encodes_frames_when_available() {
        let Ok(program) = find_ffmpeg(None) else {
            eprintln!("ffmpeg not on PATH, skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");

        let mut encoder = FfmpegEncoder::spawn(&program, settings(64, 36), &output).unwrap();
        let frame = RgbImage::from_pixel(64, 36, Rgb([0, 0, 0]));
        for _ in 0..10 {
            encoder.push_frame(&frame).unwrap();
        }
        assert!(encoder.push_frame(&RgbImage::new(8, 8)).is_err());
        encoder.finish().unwrap();

        assert_eq!(encoder.frames_written(), 10);
        assert!(fs::metadata(&output).unwrap().len() > 0);
        // Only the video remains, no staging leftovers
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn ffmpeg_failure_leaves_no_output() {
        let Ok(program) = find_ffmpeg(None) else {
            eprintln!("ffmpeg not on PATH, skipping");
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");
        let bogus = EncodeSettings {
            codec: "no-such-codec".to_owned(),
            ..settings(64, 36)
        };

        let mut encoder = FfmpegEncoder::spawn(&program, bogus, &output).unwrap();
        let frame = RgbImage::new(64, 36);
        let pushed: Result<()> = (0..10).try_for_each(|_| encoder.push_frame(&frame));
        let result = pushed.and_then(|_| encoder.finish());

        assert!(result.is_err());
        assert!(!output.exists());
    }
}
