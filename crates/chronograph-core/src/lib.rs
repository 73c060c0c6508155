//! Chronograph Core - temporal, versioned graph storage engine
//!
//! Nodes and typed edges are never overwritten: every mutation appends a new
//! time-stamped version, and any past state of the graph can be read back.
//!
//! # Architecture
//!
//! 1. **Entity Model** (`model`): Node/Edge versions and their validity windows
//! 2. **Entity Store** (`store`): in-memory indexes over crash-safe history files
//! 3. **Query Engine** (`query`): immutable filter builder with as-of/between modes
//! 4. **Validation** (`validation`): integrity checks over the on-disk histories
//! 5. **Backup & Recovery** (`backup`): snapshots, restore, corruption recovery
//!
//! # Quick Start
//!
//! ```
//! use chronograph_core::{Edge, Node, Store};
//! use chronograph_core::types::data_map;
//! use serde_json::json;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = Store::open_dir(dir.path()).unwrap();
//!
//! let goal = store
//!     .add_node(Node::new("goal", data_map(json!({"title": "Learn X"}))))
//!     .unwrap();
//! let step = store
//!     .add_node(Node::new("objective", data_map(json!({"title": "Read the book"}))))
//!     .unwrap();
//! store
//!     .add_edge(Edge::new(&goal.id, &step.id, "has_objective", Default::default()))
//!     .unwrap();
//!
//! let before = store.get_node(&goal.id).unwrap();
//! store
//!     .update_node(&goal.id, data_map(json!({"title": "Learn Y"})))
//!     .unwrap();
//!
//! // The old version is still there
//! let then = store.get_node_at_time(&goal.id, before.valid_from).unwrap();
//! assert_eq!(then.data["title"], "Learn X");
//!
//! // Graph queries
//! let objectives = store.nodes().with_id(&goal.id).neighbors_via("has_objective").all();
//! assert_eq!(objectives.len(), 1);
//! ```
//!
//! # On-disk layout
//!
//! ```text
//! <data-dir>/nodes/<node-type>/<node-id>.json
//! <data-dir>/edges/<edge-id>.json
//! <data-dir>/backups/<timestamp>/...
//! ```
//!
//! The filesystem is the source of truth; [`Store::open`] rebuilds every
//! index from it.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod backup;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types for convenience
pub use backup::{BackupInfo, BackupManager, BackupMetadata, RecoveryOutcome};
pub use config::{BackupConfig, Durability, EngineConfig};
pub use error::{ChronoError, ErrorKind, Result, ResultExt};
pub use model::{Edge, Entity, EntityKind, Node};
pub use query::{Query, QueryStep, TemporalMode};
pub use store::{Store, StoreStats};
pub use types::{DataMap, Timestamp};
pub use validation::{validate_directory, validate_file, FileReport, HealthReport, Issue, IssueKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
