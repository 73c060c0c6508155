//! Backup & Recovery Manager
//!
//! Full-directory snapshots of `nodes/` and `edges/`, retention pruning,
//! transactional restore and iterative corruption recovery.
//!
//! ```text
//! <backup-dir>/<YYYYmmdd_HHMMSS.mmm>/nodes/...
//! <backup-dir>/<YYYYmmdd_HHMMSS.mmm>/edges/...
//! <backup-dir>/<YYYYmmdd_HHMMSS.mmm>/backup_metadata.json
//! ```
//!
//! The manager works on files only. A live [`Store`](crate::Store) must be
//! [`reload`](crate::Store::reload)ed after a restore.

mod fs_util;
mod restore;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{ChronoError, Result};
use crate::model::EntityKind;
use crate::store::persistence::{check_path_component, DiskLayout};
use crate::types::Timestamp;
use crate::validation::{validate_directory, HealthReport};
use fs_util::{copy_tree, tree_stats, TreeStats};

/// File written at the root of every snapshot
pub const METADATA_FILE: &str = "backup_metadata.json";

/// Snapshot directory name format (UTC)
pub const BACKUP_NAME_FORMAT: &str = "%Y%m%d_%H%M%S%.3f";

/// Contents of `backup_metadata.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub timestamp: Timestamp,
    pub size_bytes: u64,
    pub file_count: usize,
    #[serde(default)]
    pub node_files: usize,
    #[serde(default)]
    pub edge_files: usize,
}

/// One snapshot on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub metadata: BackupMetadata,
}

/// What [`BackupManager::recover_from_corruption`] did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Validation passed; nothing was touched
    Healthy,
    /// Live data was replaced from `backup`
    Recovered {
        backup: BackupInfo,
        /// Backups tried, including the one that worked
        attempts: usize,
        /// Validation of the restored data
        report: HealthReport,
    },
}

/// Snapshot manager for one data directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    layout: DiskLayout,
    backup_dir: PathBuf,
    retention: usize,
}

impl BackupManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            layout: DiskLayout::new(&config.data_dir),
            backup_dir: config.backup_dir(),
            retention: config.backup.retention,
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.layout.root()
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot the data directory, then prune beyond the retention count
    pub fn create_backup(&self) -> Result<BackupInfo> {
        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| ChronoError::io(&self.backup_dir, e))?;

        let timestamp = crate::types::now();
        let name = self.unused_name(&timestamp.format(BACKUP_NAME_FORMAT).to_string());
        let path = self.backup_dir.join(&name);

        // Built under a hidden name so listings never see a partial snapshot.
        let partial = self.backup_dir.join(format!(".{}.partial", name));
        let metadata = match self.write_snapshot(&partial, timestamp) {
            Ok(metadata) => metadata,
            Err(e) => {
                let _ = fs_util::remove_tree(&partial);
                return Err(e);
            }
        };
        fs_util::rename(&partial, &path)?;

        tracing::info!(
            backup = %name,
            files = metadata.file_count,
            bytes = metadata.size_bytes,
            "backup created"
        );

        if self.retention > 0 {
            self.prune()?;
        }
        Ok(BackupInfo {
            name,
            path,
            metadata,
        })
    }

    fn write_snapshot(&self, target: &Path, timestamp: Timestamp) -> Result<BackupMetadata> {
        let nodes = copy_tree(
            &self.layout.kind_dir(EntityKind::Node),
            &target.join(EntityKind::Node.dir_name()),
        )?;
        let edges = copy_tree(
            &self.layout.kind_dir(EntityKind::Edge),
            &target.join(EntityKind::Edge.dir_name()),
        )?;

        let mut total = nodes;
        total += edges;
        let metadata = BackupMetadata {
            timestamp,
            size_bytes: total.bytes,
            file_count: total.files,
            node_files: nodes.files,
            edge_files: edges.files,
        };

        let meta_path = target.join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| ChronoError::serialization(&meta_path, e))?;
        std::fs::write(&meta_path, json).map_err(|e| ChronoError::io(&meta_path, e))?;
        Ok(metadata)
    }

    fn unused_name(&self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 1;
        while self.backup_dir.join(&name).exists() {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        name
    }

    /// Every snapshot, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let entries = match std::fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChronoError::io(&self.backup_dir, e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ChronoError::io(&self.backup_dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !path.is_dir() || !restore::has_snapshot_shape(&path) {
                continue;
            }
            let metadata = read_metadata(&path)?;
            backups.push(BackupInfo {
                name,
                path,
                metadata,
            });
        }

        backups.sort_by(|a, b| {
            b.metadata
                .timestamp
                .cmp(&a.metadata.timestamp)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(backups)
    }

    /// Delete the oldest snapshots beyond the retention count. Returns how
    /// many were removed. A retention of 0 keeps everything.
    pub fn prune(&self) -> Result<usize> {
        if self.retention == 0 {
            return Ok(0);
        }
        let expired: Vec<_> = self.list_backups()?.into_iter().skip(self.retention).collect();
        for backup in &expired {
            fs_util::remove_tree(&backup.path)?;
            tracing::info!(backup = %backup.name, "pruned old backup");
        }
        Ok(expired.len())
    }

    /// Find a snapshot by name under the backup directory, or by path
    ///
    /// A bare name never leaves the backup directory.
    pub fn resolve(&self, name_or_path: &str) -> Result<PathBuf> {
        if name_or_path.contains(['/', '\\']) {
            let by_path = PathBuf::from(name_or_path);
            if by_path.is_dir() {
                return Ok(by_path);
            }
        } else {
            check_path_component("backup name", name_or_path)?;
            let by_name = self.backup_dir.join(name_or_path);
            if by_name.is_dir() {
                return Ok(by_name);
            }
        }
        Err(ChronoError::InvalidArgument(format!(
            "no backup named {:?} in {}",
            name_or_path,
            self.backup_dir.display()
        )))
    }

    /// Replace live `nodes/` and `edges/` with the snapshot at `path`.
    ///
    /// The snapshot is staged first and the live trees are parked in a
    /// safety directory until the swap completes; any failure mid-swap puts
    /// them back.
    pub fn restore_from(&self, path: impl AsRef<Path>) -> Result<()> {
        restore::restore(&self.layout, path.as_ref())
    }

    /// Validate the live data and, when anything is invalid, restore
    /// snapshots newest to oldest until one validates cleanly.
    pub fn recover_from_corruption(&self) -> Result<RecoveryOutcome> {
        let report = validate_directory(self.layout.root())?;
        if report.is_healthy() {
            tracing::info!(files = report.total, "data directory healthy; no recovery needed");
            return Ok(RecoveryOutcome::Healthy);
        }

        tracing::warn!(
            invalid = report.invalid,
            total = report.total,
            "corruption detected; starting recovery"
        );
        for file in report.invalid_files() {
            tracing::warn!(path = %file.path.display(), errors = file.errors.len(), "invalid history file");
        }

        let backups = self.list_backups()?;
        if backups.is_empty() {
            tracing::error!("no backups available for recovery");
            return Err(ChronoError::CorruptionUnrecoverable { attempted: 0 });
        }

        for (i, backup) in backups.iter().enumerate() {
            let attempt = i + 1;
            tracing::info!(backup = %backup.name, attempt, of = backups.len(), "trying backup");

            if let Err(e) = self.restore_from(&backup.path) {
                tracing::warn!(backup = %backup.name, error = %e, "restore failed; trying an older backup");
                continue;
            }

            let report = validate_directory(self.layout.root())?;
            if report.is_healthy() {
                tracing::info!(backup = %backup.name, attempts = attempt, "recovered from backup");
                return Ok(RecoveryOutcome::Recovered {
                    backup: backup.clone(),
                    attempts: attempt,
                    report,
                });
            }
            tracing::warn!(
                backup = %backup.name,
                invalid = report.invalid,
                "restored data still invalid; trying an older backup"
            );
        }

        tracing::error!(attempted = backups.len(), "no backup restored to a clean state");
        Err(ChronoError::CorruptionUnrecoverable {
            attempted: backups.len(),
        })
    }
}

/// Read `backup_metadata.json`, or rebuild it from the tree when missing or
/// unreadable
fn read_metadata(snapshot: &Path) -> Result<BackupMetadata> {
    let meta_path = snapshot.join(METADATA_FILE);
    if let Ok(bytes) = std::fs::read(&meta_path) {
        match serde_json::from_slice(&bytes) {
            Ok(metadata) => return Ok(metadata),
            Err(e) => {
                tracing::warn!(path = %meta_path.display(), error = %e, "unreadable backup metadata")
            }
        }
    }

    let nodes = tree_stats(&snapshot.join(EntityKind::Node.dir_name()))?;
    let edges = tree_stats(&snapshot.join(EntityKind::Edge.dir_name()))?;
    let mut total = TreeStats::default();
    total += nodes;
    total += edges;
    let timestamp = std::fs::metadata(snapshot)
        .and_then(|m| m.modified())
        .map(Timestamp::from)
        .map_err(|e| ChronoError::io(snapshot, e))?;

    Ok(BackupMetadata {
        timestamp,
        size_bytes: total.bytes,
        file_count: total.files,
        node_files: nodes.files,
        edge_files: edges.files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::Node;
    use crate::store::Store;
    use crate::types::data_map;
    use serde_json::json;
    use tempfile::tempdir;

    fn seeded(dir: &Path, retention: usize) -> (Store, BackupManager) {
        let config = EngineConfig::new(dir).with_backup_retention(retention);
        let store = Store::open(&config).unwrap();
        store
            .add_node(Node::new("goal", data_map(json!({"title": "Learn X"}))).with_id("g1"))
            .unwrap();
        (store, BackupManager::new(&config))
    }

    #[test]
    fn test_create_writes_metadata() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);

        let info = manager.create_backup().unwrap();
        assert_eq!(info.metadata.file_count, 1);
        assert_eq!(info.metadata.node_files, 1);
        assert!(info.metadata.size_bytes > 0);
        assert!(info.path.join(METADATA_FILE).exists());
        assert!(info.path.join("nodes/goal/g1.json").exists());
        assert!(info.path.join("edges").is_dir());
        assert!(info.path.starts_with(dir.path().join("backups")));
    }

    #[test]
    fn test_list_newest_first_and_prune() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 2);

        let names: Vec<_> = (0..4).map(|_| manager.create_backup().unwrap().name).collect();
        let listed = manager.list_backups().unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, names[3]);
        assert_eq!(listed[1].name, names[2]);
    }

    #[test]
    fn test_zero_retention_keeps_everything() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 0);
        for _ in 0..3 {
            manager.create_backup().unwrap();
        }
        assert_eq!(manager.list_backups().unwrap().len(), 3);
        assert_eq!(manager.prune().unwrap(), 0);
    }

    #[test]
    fn test_metadata_fallback() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);
        let info = manager.create_backup().unwrap();
        std::fs::remove_file(info.path.join(METADATA_FILE)).unwrap();

        let listed = manager.list_backups().unwrap();
        assert_eq!(listed[0].metadata.file_count, 1);
        assert_eq!(listed[0].metadata.size_bytes, info.metadata.size_bytes);
    }

    #[test]
    fn test_list_without_backup_dir() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new(&EngineConfig::new(dir.path()));
        assert!(manager.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_by_name_and_path() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);
        let info = manager.create_backup().unwrap();

        assert_eq!(manager.resolve(&info.name).unwrap(), info.path);
        assert_eq!(manager.resolve(info.path.to_str().unwrap()).unwrap(), info.path);
        assert!(manager.resolve("19990101_000000.000").is_err());
    }

    #[test]
    fn test_resolve_keeps_names_inside_backup_dir() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);
        manager.create_backup().unwrap();

        for name in ["..", ".", ""] {
            let err = manager.resolve(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_recover_healthy_is_noop() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);
        assert!(matches!(
            manager.recover_from_corruption().unwrap(),
            RecoveryOutcome::Healthy
        ));
    }

    #[test]
    fn test_recover_without_backups_fails() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);
        std::fs::write(dir.path().join("nodes/goal/g1.json"), "[{").unwrap();

        let err = manager.recover_from_corruption().unwrap_err();
        assert!(matches!(err, ChronoError::CorruptionUnrecoverable { attempted: 0 }));
    }

    #[test]
    fn test_recover_skips_bad_backup() {
        let dir = tempdir().unwrap();
        let (_store, manager) = seeded(dir.path(), 10);
        let good = manager.create_backup().unwrap();
        let bad = manager.create_backup().unwrap();
        std::fs::write(bad.path.join("nodes/goal/g1.json"), "[]").unwrap();
        std::fs::write(dir.path().join("nodes/goal/g1.json"), "[{").unwrap();

        match manager.recover_from_corruption().unwrap() {
            RecoveryOutcome::Recovered {
                backup, attempts, report,
            } => {
                assert_eq!(backup.name, good.name);
                assert_eq!(attempts, 2);
                assert!(report.is_healthy());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            std::fs::read(dir.path().join("nodes/goal/g1.json")).unwrap(),
            std::fs::read(good.path.join("nodes/goal/g1.json")).unwrap()
        );
    }
}
