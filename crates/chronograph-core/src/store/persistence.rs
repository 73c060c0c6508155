//! On-disk layout and crash-safe history files
//!
//! ```text
//! <data-dir>/nodes/<node-type>/<node-id>.json   (every node version, ordered)
//! <data-dir>/edges/<edge-id>.json               (every edge version, ordered)
//! ```
//!
//! Files are written to a temp file in the destination directory and then
//! renamed over the canonical path, so a crash never leaves a half-written
//! history visible.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::Durability;
use crate::error::{ChronoError, Result};
use crate::model::EntityKind;

/// Extension of every history file
pub const HISTORY_EXTENSION: &str = "json";

/// Suffix of in-flight temp files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path resolution for one data directory
#[derive(Debug, Clone)]
pub struct DiskLayout {
    root: PathBuf,
}

impl DiskLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `nodes/` or `edges/`
    pub fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn node_path(&self, node_type: &str, id: &str) -> PathBuf {
        self.kind_dir(EntityKind::Node)
            .join(node_type)
            .join(format!("{}.{}", id, HISTORY_EXTENSION))
    }

    pub fn edge_path(&self, id: &str) -> PathBuf {
        self.kind_dir(EntityKind::Edge)
            .join(format!("{}.{}", id, HISTORY_EXTENSION))
    }

    /// Create the root and both kind directories
    pub fn ensure_dirs(&self) -> Result<()> {
        for kind in [EntityKind::Node, EntityKind::Edge] {
            let dir = self.kind_dir(kind);
            std::fs::create_dir_all(&dir).map_err(|e| ChronoError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Reject values that cannot be used as a single path component
pub fn check_path_component(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ChronoError::InvalidArgument(format!("{} must not be empty", label)));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(ChronoError::InvalidArgument(format!(
            "{} {:?} is not a valid file name",
            label, value
        )));
    }
    Ok(())
}

/// Whether a directory entry is a leftover temp file or otherwise not a
/// history file
pub fn is_history_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.')
        && !name.ends_with(TEMP_SUFFIX)
        && path.extension().and_then(|e| e.to_str()) == Some(HISTORY_EXTENSION)
}

/// Atomically replace `path` with the JSON encoding of `history`
pub fn write_history<E: Serialize>(
    path: &Path,
    history: &[E],
    durability: Durability,
) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ChronoError::InvalidArgument(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| ChronoError::io(dir, e))?;

    let bytes = serde_json::to_vec_pretty(history).map_err(|e| ChronoError::serialization(path, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("history");
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| ChronoError::io(dir, e))?;

    tmp.write_all(&bytes).map_err(|e| ChronoError::io(tmp.path(), e))?;
    if durability == Durability::Fsync {
        tmp.as_file()
            .sync_all()
            .map_err(|e| ChronoError::io(tmp.path(), e))?;
    }
    tmp.persist(path).map_err(|e| ChronoError::io(path, e.error))?;

    if durability == Durability::Fsync {
        sync_dir(dir);
    }
    Ok(())
}

/// Flush the directory entry after a rename where the platform allows it
fn sync_dir(dir: &Path) {
    if let Ok(handle) = std::fs::File::open(dir) {
        if let Err(e) = handle.sync_all() {
            tracing::debug!(dir = %dir.display(), error = %e, "directory fsync not supported");
        }
    }
}

/// Read one history file
pub fn read_history<E: DeserializeOwned>(path: &Path) -> Result<Vec<E>> {
    let bytes = std::fs::read(path).map_err(|e| ChronoError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ChronoError::serialization(path, e))
}

/// Every history file under `dir`, in path order. A missing `dir` is empty.
pub fn history_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            ChronoError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_history_file(path) {
            files.push(path.to_path_buf());
        } else if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
            tracing::warn!(path = %path.display(), "ignoring leftover temp file");
        }
    }
    Ok(files)
}

/// Load every history of one kind
pub fn load_histories<E: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, Vec<E>)>> {
    history_files(dir)?
        .into_iter()
        .map(|path| {
            let versions = read_history(&path)?;
            Ok((path, versions))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use crate::types::data_map;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_layout_paths() {
        let layout = DiskLayout::new("/data");
        assert_eq!(
            layout.node_path("goal", "g1"),
            PathBuf::from("/data/nodes/goal/g1.json")
        );
        assert_eq!(layout.edge_path("e1"), PathBuf::from("/data/edges/e1.json"));
    }

    #[test]
    fn test_path_component_rules() {
        assert!(check_path_component("id", "goal-42").is_ok());
        assert!(check_path_component("id", "").is_err());
        assert!(check_path_component("id", "..").is_err());
        assert!(check_path_component("id", "a/b").is_err());
        assert!(check_path_component("type", "a\\b").is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes/goal/g1.json");
        let history = vec![Node::new("goal", data_map(json!({"title": "x"}))).with_id("g1")];

        write_history(&path, &history, Durability::Fsync).unwrap();
        let back: Vec<Node> = read_history(&path).unwrap();
        assert_eq!(back, history);
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("edges/e1.json");
        let history = vec![Node::new("goal", data_map(json!({}))).with_id("e1")];
        write_history(&path, &history, Durability::Buffered).unwrap();
        write_history(&path, &history, Durability::Buffered).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("edges"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("e1.json")]);
    }

    #[test]
    fn test_history_files_skips_temp() {
        let dir = tempdir().unwrap();
        let nodes = dir.path().join("nodes/goal");
        std::fs::create_dir_all(&nodes).unwrap();
        std::fs::write(nodes.join("a.json"), "[]").unwrap();
        std::fs::write(nodes.join(".a.json.x1y2.tmp"), "[").unwrap();
        std::fs::write(nodes.join("notes.txt"), "hi").unwrap();

        let files = history_files(&dir.path().join("nodes")).unwrap();
        assert_eq!(files, vec![nodes.join("a.json")]);
        assert!(history_files(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_read_malformed_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[{").unwrap();

        let err = read_history::<Node>(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
