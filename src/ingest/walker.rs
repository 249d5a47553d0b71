use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{FaxError, Result};

/// True when the path's extension is in `formats` (lowercase, no dot).
pub fn has_supported_extension(path: &Path, formats: &[String]) -> bool {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    !extension.is_empty() && formats.iter().any(|f| *f == extension)
}

/// List image files already sitting in the watched directory.
///
/// Only the top level is scanned (sub-directories are not fax drops). Results
/// are absolute and sorted by file name so startup reconciliation runs in a
/// stable order.
pub fn discover_existing(root: &Path, formats: &[String]) -> Result<Vec<PathBuf>> {
    let root = std::path::absolute(root).map_err(FaxError::Io)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if !has_supported_extension(entry.path(), formats) {
            continue;
        }

        files.push(entry.into_path());
    }

    log::info!("Found {} existing image files in {}", files.len(), root.display());
    Ok(files)
}
