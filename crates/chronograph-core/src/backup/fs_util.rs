//! Directory-tree helpers for snapshots

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{ChronoError, Result};
use crate::store::persistence::TEMP_SUFFIX;

/// Files and bytes moved by a copy or found by a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TreeStats {
    pub files: usize,
    pub bytes: u64,
}

impl std::ops::AddAssign for TreeStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.bytes += other.bytes;
    }
}

fn walk_error(root: &Path, e: walkdir::Error) -> ChronoError {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
    ChronoError::io(path, e.into())
}

fn is_temp(path: &Path) -> bool {
    path.to_string_lossy().ends_with(TEMP_SUFFIX)
}

/// Recursively copy `src` into `dst`, skipping in-flight temp files.
///
/// `dst` is created even when `src` does not exist, so a snapshot always
/// has both kind directories.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<TreeStats> {
    std::fs::create_dir_all(dst).map_err(|e| ChronoError::io(dst, e))?;
    let mut stats = TreeStats::default();
    if !src.exists() {
        return Ok(stats);
    }

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ChronoError::InvalidArgument(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ChronoError::io(&target, e))?;
        } else if entry.file_type().is_file() && !is_temp(entry.path()) {
            let bytes =
                std::fs::copy(entry.path(), &target).map_err(|e| ChronoError::io(entry.path(), e))?;
            stats.files += 1;
            stats.bytes += bytes;
        }
    }
    Ok(stats)
}

/// Count regular files and bytes under `dir`. A missing `dir` is empty.
pub(crate) fn tree_stats(dir: &Path) -> Result<TreeStats> {
    let mut stats = TreeStats::default();
    if !dir.exists() {
        return Ok(stats);
    }
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_file() {
            let len = entry
                .metadata()
                .map_err(|e| walk_error(dir, e))?
                .len();
            stats.files += 1;
            stats.bytes += len;
        }
    }
    Ok(stats)
}

/// Rename with the failing source in the error
pub(crate) fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| ChronoError::io(from, e))
}

/// Remove a tree if it exists
pub(crate) fn remove_tree(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ChronoError::io(dir, e)),
    }
}
