//! Artwork copier.
//!
//! Cover images sitting next to the audio are copied verbatim so the mirror
//! keeps its album art. Existing copies are left alone.

use crate::transcoder::{PARTIAL_PREFIX, PARTIAL_SUFFIX};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const ARTWORK_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyResult {
    pub total_files: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, String)>,
}

impl CopyResult {
    fn fail(&mut self, path: &Path, reason: String) {
        warn!(path = %path.display(), reason = %reason, "Artwork copy failed");
        self.failed += 1;
        self.errors.push((path.to_path_buf(), reason));
    }
}

fn is_artwork(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    if hidden {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| ARTWORK_EXTENSIONS.contains(&e.as_str()))
}

/// Copies every artwork file under `source_root` whose counterpart under
/// `dest_root` does not exist yet.
pub fn copy_missing_artwork(source_root: &Path, dest_root: &Path) -> CopyResult {
    let mut result = CopyResult::default();

    for entry in WalkDir::new(source_root)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(source_root).to_path_buf();
                result.fail(&path, format!("Failed to read: {}", e));
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_artwork(entry.path()) {
            continue;
        }

        let path = entry.path();
        result.total_files += 1;

        let rel_path = path.strip_prefix(source_root).unwrap_or(path);
        let dest = dest_root.join(rel_path);
        if dest.exists() {
            result.skipped += 1;
            continue;
        }

        match copy_atomically(path, &dest) {
            Ok(()) => {
                debug!(path = %rel_path.display(), "Copied artwork");
                result.copied += 1;
            }
            Err(reason) => result.fail(path, reason),
        }
    }

    result
}

/// Copies through a temporary file in the destination directory, so a
/// partial copy is never visible under the final name.
fn copy_atomically(source: &Path, dest: &Path) -> Result<(), String> {
    let parent = dest
        .parent()
        .ok_or_else(|| "destination has no parent directory".to_string())?;
    fs::create_dir_all(parent).map_err(|e| format!("Failed to create dir: {}", e))?;

    let partial = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .suffix(PARTIAL_SUFFIX)
        .tempfile_in(parent)
        .map_err(|e| format!("Failed to create temporary file: {}", e))?
        .into_temp_path();
    fs::copy(source, &partial).map_err(|e| format!("Failed to copy: {}", e))?;
    partial
        .persist(dest)
        .map_err(|e| format!("Failed to move into place: {}", e.error))?;
    Ok(())
}
