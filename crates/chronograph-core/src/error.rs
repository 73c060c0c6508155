//! Error types for Chronograph Core
//!
//! This module defines all error types used throughout the storage engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.
//!
//! Problems found by the validator are *data*, not errors: they travel in a
//! [`HealthReport`](crate::validation::HealthReport). Only the inability to
//! read or walk the data directory is surfaced through [`ChronoError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::model::EntityKind;
use crate::validation::HealthReport;

/// Result type alias for Chronograph operations
pub type Result<T> = std::result::Result<T, ChronoError>;

/// Main error type for Chronograph operations
#[derive(Error, Debug)]
pub enum ChronoError {
    /// No history exists for the id
    #[error("{kind} not found: {id}")]
    EntityNotFound { kind: EntityKind, id: String },

    /// The history exists but has no open version
    #[error("{kind} {id} has no current version")]
    NoCurrentVersion { kind: EntityKind, id: String },

    /// No version of the entity was active at the requested instant
    #[error("{kind} {id} has no version active at {at}")]
    NoVersionAt {
        kind: EntityKind,
        id: String,
        at: crate::types::Timestamp,
    },

    /// An edge references a node that is not in the store
    #[error("edge {edge_id} references missing node {node_id}")]
    MissingEndpoint { edge_id: String, node_id: String },

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Filesystem failure, with the failing path
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A history file could not be encoded or decoded
    #[error("Serialization error at {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file could not be parsed or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// In-memory state was updated but the history could not be written.
    ///
    /// The logical write happened; the file on disk is stale. Retry with
    /// `Store::persist_node` / `Store::persist_edge`.
    #[error("{kind} {id} changed in memory but was not persisted: {source}")]
    NotDurable {
        kind: EntityKind,
        id: String,
        #[source]
        source: Box<ChronoError>,
    },

    /// Validation found defects where clean data was required
    #[error("Validation failed: {} invalid file(s)", .0.invalid)]
    Validation(Box<HealthReport>),

    /// No backup restored to a clean state
    #[error("Corruption unrecoverable: {attempted} backup(s) tried, none restored cleanly")]
    CorruptionUnrecoverable { attempted: usize },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<ChronoError>,
    },
}

/// Coarse error classification for callers that branch on failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    IoFailure,
    ValidationFailure,
    CorruptionUnrecoverable,
}

impl ChronoError {
    /// Build an IO error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a serialization error bound to a path
    pub fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChronoError::EntityNotFound { .. }
            | ChronoError::NoCurrentVersion { .. }
            | ChronoError::NoVersionAt { .. }
            | ChronoError::MissingEndpoint { .. } => ErrorKind::NotFound,
            ChronoError::InvalidArgument(_) | ChronoError::Config(_) => {
                ErrorKind::InvalidArgument
            }
            ChronoError::Io { .. }
            | ChronoError::Serialization { .. }
            | ChronoError::NotDurable { .. } => ErrorKind::IoFailure,
            ChronoError::Validation(_) => ErrorKind::ValidationFailure,
            ChronoError::CorruptionUnrecoverable { .. } => ErrorKind::CorruptionUnrecoverable,
            ChronoError::WithContext { source, .. } => source.kind(),
        }
    }

    /// Shorthand for `kind() == ErrorKind::NotFound`
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}
