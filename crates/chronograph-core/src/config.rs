//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ChronoError, Result};

/// Default number of snapshots kept by the backup manager
pub const DEFAULT_BACKUP_RETENTION: usize = 10;

/// Name of the backup directory under the data directory
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root of the on-disk tree (`nodes/`, `edges/`, `backups/`)
    pub data_dir: PathBuf,

    /// Whether history writes are fsynced before the rename
    #[serde(default)]
    pub durability: Durability,

    /// Backup settings
    #[serde(default)]
    pub backup: BackupConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            durability: Durability::default(),
            backup: BackupConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the durability mode
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Set how many snapshots to keep (0 keeps everything)
    pub fn with_backup_retention(mut self, retention: usize) -> Self {
        self.backup.retention = retention;
        self
    }

    /// Put snapshots somewhere other than `<data_dir>/backups`
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup.dir = Some(dir.into());
        self
    }

    /// Resolved backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DEFAULT_BACKUP_DIR))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ChronoError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| ChronoError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).map_err(|e| ChronoError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ChronoError::io(path, e))
    }
}

/// How hard persistence tries to reach the platter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// `sync_all` the temp file before renaming it into place
    #[default]
    Fsync,
    /// Rely on the OS page cache; the rename is still atomic
    Buffered,
}

/// Backup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Snapshot directory; defaults to `<data_dir>/backups`
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Snapshots kept after each backup; 0 disables pruning
    #[serde(default = "default_retention")]
    pub retention: usize,
}

fn default_retention() -> usize {
    DEFAULT_BACKUP_RETENTION
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention: DEFAULT_BACKUP_RETENTION,
        }
    }
}
