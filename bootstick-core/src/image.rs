//! Discovery of ISO images on disk.
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// The only extension recognised as an image. Matching is case-sensitive.
pub const ISO_EXTENSION: &str = "iso";

/// An ISO file found in the search directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFile {
    /// Path to the image, absolute when the search directory is.
    pub path: PathBuf,
    /// File name without the directory.
    pub name: String,
    /// Size of the file in bytes.
    pub size_bytes: u64,
}

impl fmt::Display for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size_gb = self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        write!(f, "{} ({:.1} GB)", self.name, size_gb)
    }
}

fn is_iso(path: &Path) -> bool {
    path.extension() == Some(OsStr::new(ISO_EXTENSION))
}

/// Lists the regular files in `dir` whose extension is exactly `.iso`.
///
/// Directories, symlinks and anything else are skipped. The result is sorted
/// by file name.
pub fn list_iso_files(dir: &Path) -> Result<Vec<ImageFile>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        let file_type = entry.file_type()?;
        let path = entry.path();

        if !file_type.is_file() || !is_iso(&path) {
            continue;
        }

        images.push(ImageFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            size_bytes: entry.metadata()?.len(),
            path,
        });
    }

    images.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(images)
}
