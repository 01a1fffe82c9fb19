use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};

/// The directory `output` will be written into. A bare file name means the
/// current directory.
pub fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Fails unless the directory for `output` already exists. The directory is
/// never created here.
pub fn ensure_output_dir(output: &Path) -> Result<()> {
    let dir = output_dir(output);
    if !dir.is_dir() {
        bail!(
            "Output directory {} does not exist (needed for {})",
            dir.display(),
            output.display()
        );
    }
    Ok(())
}

/// Where the JSON render summary for `output` goes.
pub fn summary_path(output: &Path) -> PathBuf {
    output.with_extension("json")
}

pub fn clear_folder_contents(folder: &Path) -> std::io::Result<()> {
    // If is a directory
    if folder.is_dir() {
        for entry_result in fs::read_dir(folder)? {
            let entry = entry_result?;
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
    }
    Ok(())
}
