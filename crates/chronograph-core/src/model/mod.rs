//! Versioned entity model
//!
//! Nodes and edges are never overwritten. Every mutation produces a new
//! version with its own validity window `[valid_from, valid_until)`; a
//! version whose `valid_until` is open is the *current* one.
//!
//! # Invariants
//!
//! - An entity's `id` never changes across its versions
//! - After creation completes, exactly one version per id is current
//! - Superseding closes the window once; superseding again is a no-op
//!
//! This layer never fails: anomalies such as a supersede time earlier than
//! `valid_from` are accepted here and reported by [`crate::validation`].

pub mod edge;
pub mod history;
pub mod node;

pub use edge::Edge;
pub use node::Node;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{DataMap, Timestamp};

/// Which half of the graph an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Edge,
}

impl EntityKind {
    /// Name of the top-level data directory holding this kind
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityKind::Node => "nodes",
            EntityKind::Edge => "edges",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Edge => write!(f, "edge"),
        }
    }
}

/// Behaviour shared by every versioned record
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Node or edge
    const KIND: EntityKind;

    /// Stable identity shared by all versions
    fn id(&self) -> &str;

    /// Category (node type or relationship label)
    fn entity_type(&self) -> &str;

    /// Version payload
    fn data(&self) -> &DataMap;

    /// When this version record was produced
    fn created_at(&self) -> Timestamp;

    /// Start of the active window (inclusive)
    fn valid_from(&self) -> Timestamp;

    /// End of the active window (exclusive); `None` while current
    fn valid_until(&self) -> Option<Timestamp>;

    /// Overwrite the window end. Only [`Entity::supersede`] and
    /// [`Entity::reopen_at`] call this.
    fn set_valid_until(&mut self, until: Option<Timestamp>);

    /// Overwrite `created_at` and `valid_from`
    fn set_start(&mut self, at: Timestamp);

    /// Produce the next version: immutable fields carried forward, `data`
    /// replaced, window opened at `at`.
    fn next_version(&self, data: DataMap, at: Timestamp) -> Self;

    /// A version is current iff its window is open
    fn is_current(&self) -> bool {
        self.valid_until().is_none()
    }

    /// `valid_from <= t` and (open or `t < valid_until`)
    fn is_active_at(&self, t: Timestamp) -> bool {
        self.valid_from() <= t && self.valid_until().map_or(true, |until| t < until)
    }

    /// Whether the window overlaps `[start, end)`; an open window is
    /// treated as ending at `now`.
    fn overlaps(&self, start: Timestamp, end: Timestamp, now: Timestamp) -> bool {
        self.valid_from() < end && start < self.valid_until().unwrap_or(now)
    }

    /// Close the window at `at`. No-op when already superseded.
    fn supersede(&mut self, at: Timestamp) {
        if self.is_current() {
            self.set_valid_until(Some(at));
        }
    }

    /// Restamp as a freshly opened version starting at `at`
    fn reopen_at(&mut self, at: Timestamp) {
        self.set_start(at);
        self.set_valid_until(None);
    }

    /// Look up a data field
    fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data().get(key)
    }
}
