//! Validation Subsystem
//!
//! Structural and temporal integrity checks over persisted history files.
//! Runs straight against the directory tree, with or without a live store.
//!
//! Problems found are data: they come back in a [`HealthReport`]. Only an
//! unreadable file or an unwalkable directory is an error.
//!
//! # Checks
//!
//! Per version: non-empty id, type and timestamps, `data` present,
//! `created_at <= valid_from`, `valid_until > valid_from` when closed, and
//! distinct endpoints for edges.
//!
//! Per history: non-empty, one id throughout, no repeated `valid_from`,
//! exactly one current version (none is a warning), file name matching the
//! id and, for nodes, directory matching the type (warnings).

mod checks;

pub use checks::validate_file;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ChronoError, Result};
use crate::model::EntityKind;
use crate::store::persistence::{history_files, DiskLayout};
use crate::types::Timestamp;

/// How bad an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// What an issue is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Not a JSON array of objects
    Malformed,
    /// Zero versions in the file
    EmptyHistory,
    /// A required field is absent or empty
    MissingField,
    /// A timestamp could not be parsed
    BadTimestamp,
    /// Window ordering is violated
    TemporalOrder,
    /// Edge source equals target
    SelfReference,
    /// Versions disagree about their id
    IdMismatch,
    /// Two versions start at the same instant
    DuplicateValidFrom,
    /// Not exactly one current version
    CurrentCount,
    /// File name or directory disagrees with the records
    Location,
}

/// One finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Index of the offending version, for per-version findings
    pub version: Option<usize>,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(i) => write!(f, "version {}: {}", i, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Result of validating one history file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: EntityKind,
    /// Number of version records found
    pub versions: usize,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl FileReport {
    pub(crate) fn new(path: impl Into<PathBuf>, kind: EntityKind) -> Self {
        Self {
            path: path.into(),
            kind,
            versions: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn push(
        &mut self,
        severity: Severity,
        kind: IssueKind,
        version: Option<usize>,
        message: impl Into<String>,
    ) {
        let issue = Issue {
            kind,
            version,
            message: message.into(),
        };
        match severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    /// No errors (warnings allowed)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Directory-wide health summary
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub checked_at: Timestamp,
    /// Files examined
    pub total: usize,
    /// Files without errors
    pub valid: usize,
    /// Files with at least one error
    pub invalid: usize,
    /// Warnings across all files
    pub warnings: usize,
    pub reports: Vec<FileReport>,
}

impl HealthReport {
    fn from_reports(reports: Vec<FileReport>) -> Self {
        let invalid = reports.iter().filter(|r| !r.is_valid()).count();
        Self {
            checked_at: crate::types::now(),
            total: reports.len(),
            valid: reports.len() - invalid,
            invalid,
            warnings: reports.iter().map(|r| r.warnings.len()).sum(),
            reports,
        }
    }

    /// Zero invalid files
    pub fn is_healthy(&self) -> bool {
        self.invalid == 0
    }

    /// Reports of files with errors
    pub fn invalid_files(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|r| !r.is_valid())
    }

    /// `Ok(self)` when healthy, otherwise a [`ChronoError::Validation`]
    pub fn into_result(self) -> Result<Self> {
        if self.is_healthy() {
            Ok(self)
        } else {
            Err(ChronoError::Validation(Box::new(self)))
        }
    }
}

/// Validate every node and edge history under `data_dir`
pub fn validate_directory(data_dir: impl AsRef<Path>) -> Result<HealthReport> {
    let layout = DiskLayout::new(data_dir.as_ref());
    let mut reports = Vec::new();
    for kind in [EntityKind::Node, EntityKind::Edge] {
        for path in history_files(&layout.kind_dir(kind))? {
            reports.push(validate_file(&path, kind)?);
        }
    }

    let report = HealthReport::from_reports(reports);
    tracing::debug!(
        data_dir = %layout.root().display(),
        total = report.total,
        invalid = report.invalid,
        warnings = report.warnings,
        "validation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, Node};
    use crate::store::Store;
    use crate::types::DataMap;
    use tempfile::tempdir;

    #[test]
    fn test_store_output_is_healthy() {
        let dir = tempdir().unwrap();
        let store = Store::open_dir(dir.path()).unwrap();
        let a = store.add_node(Node::new("goal", DataMap::new())).unwrap();
        let b = store.add_node(Node::new("goal", DataMap::new())).unwrap();
        store.update_node(&a.id, DataMap::new()).unwrap();
        store.update_node(&a.id, DataMap::new()).unwrap();
        store.add_edge(Edge::new(&a.id, &b.id, "rel", DataMap::new())).unwrap();

        let report = validate_directory(dir.path()).unwrap();
        assert_eq!(report.total, 3);
        assert!(report.is_healthy(), "{:?}", report.reports);
        assert_eq!(report.warnings, 0);
    }

    #[test]
    fn test_corrupt_file_counts_as_invalid() {
        let dir = tempdir().unwrap();
        let goals = dir.path().join("nodes/goal");
        std::fs::create_dir_all(&goals).unwrap();
        std::fs::write(goals.join("g1.json"), "{not json").unwrap();

        let report = validate_directory(dir.path()).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.invalid_files().next().unwrap().errors[0].kind, IssueKind::Malformed);
        assert!(matches!(
            report.into_result().unwrap_err(),
            ChronoError::Validation(_)
        ));
    }

    #[test]
    fn test_empty_directory_is_healthy() {
        let dir = tempdir().unwrap();
        let report = validate_directory(dir.path()).unwrap();
        assert_eq!(report.total, 0);
        assert!(report.is_healthy());
    }
}
