use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};
use tempfile::NamedTempFile;

use crate::file::output_dir;

/// Creates a hidden temporary file next to `output`, keeping its extension
/// so tools that sniff the container from the name still work. Persisting
/// it onto `output` is then a rename within one directory.
pub fn create_staging_file(output: &Path) -> Result<NamedTempFile> {
    let dir = output_dir(output);
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(".sync-cycle-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create staging file in {}", dir.display()))
}

/// Anonymous file used to collect a child process' stderr.
pub fn create_log_file() -> Result<File> {
    tempfile::tempfile().context("Failed to create temporary log file")
}

/// Reads a log file written by a child process from the beginning.
pub fn read_log(file: &mut File) -> String {
    let mut bytes = Vec::new();
    if file.seek(SeekFrom::Start(0)).is_err() || file.read_to_end(&mut bytes).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&bytes).trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn staging_file_sits_next_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");
        let staging = create_staging_file(&output).unwrap();

        assert_eq!(staging.path().parent(), Some(dir.path()));
        assert_eq!(staging.path().extension().unwrap(), "mp4");
        assert!(!output.exists());

        staging.persist(&output).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn staging_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing").join("clip.mp4");
        assert!(create_staging_file(&output).is_err());
    }

    #[test]
    fn log_reads_from_start() {
        let mut log = create_log_file().unwrap();
        writeln!(log, "Unknown encoder 'nope'").unwrap();
        assert_eq!(read_log(&mut log), "Unknown encoder 'nope'");
    }
}
