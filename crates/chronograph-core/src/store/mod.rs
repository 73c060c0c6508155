//! Entity Store
//!
//! Owns the in-memory histories and indexes and keeps them in step with the
//! on-disk tree.
//!
//! # Concurrency
//!
//! A single reader/writer lock guards all index state. Reads share it;
//! every add/update holds it exclusively across index mutation *and* the
//! file write, so writes to the same id are strictly serialized and each
//! update supersedes the true current version.
//!
//! # Durability
//!
//! Each write persists the full history for the touched id before
//! returning. If that write fails after the in-memory state changed, the
//! call returns [`ChronoError::NotDurable`]: the logical change stands and
//! the caller can re-persist with [`Store::persist_node`] /
//! [`Store::persist_edge`].
//!
//! # Example
//!
//! ```no_run
//! use chronograph_core::{EngineConfig, Node, Store};
//! use chronograph_core::types::data_map;
//! use serde_json::json;
//!
//! # fn example() -> chronograph_core::Result<()> {
//! let store = Store::open(&EngineConfig::new("/var/lib/chronograph"))?;
//! let goal = store.add_node(Node::new("goal", data_map(json!({"title": "Learn X"}))))?;
//! store.update_node(&goal.id, data_map(json!({"title": "Learn Y"})))?;
//! assert_eq!(store.node_history(&goal.id)?.len(), 2);
//! # Ok(())
//! # }
//! ```

pub(crate) mod index;
pub mod persistence;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;

use crate::config::{Durability, EngineConfig};
use crate::error::{ChronoError, Result};
use crate::model::{history, Edge, EntityKind, Node};
use crate::query::{Query, TemporalMode};
use crate::types::{DataMap, Timestamp};
use index::{StoreState, Stored};
use persistence::{check_path_component, DiskLayout};

/// Counts over the in-memory indexes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub node_histories: usize,
    pub node_versions: usize,
    pub current_nodes: usize,
    pub edge_histories: usize,
    pub edge_versions: usize,
    pub current_edges: usize,
}

/// Temporal graph store over one data directory
#[derive(Debug)]
pub struct Store {
    layout: DiskLayout,
    durability: Durability,
    state: RwLock<StoreState>,
}

impl Store {
    /// Open (or create) the store described by `config`, rebuilding every
    /// index from the files on disk.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let layout = DiskLayout::new(&config.data_dir);
        layout.ensure_dirs()?;
        let state = load_state(&layout)?;

        tracing::info!(
            data_dir = %layout.root().display(),
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            "store opened"
        );

        Ok(Self {
            layout,
            durability: config.durability,
            state: RwLock::new(state),
        })
    }

    /// Open with default settings rooted at `data_dir`
    pub fn open_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(&EngineConfig::new(data_dir.as_ref()))
    }

    /// Root of the on-disk tree
    pub fn data_dir(&self) -> &Path {
        self.layout.root()
    }

    /// Drop all in-memory state and rebuild it from disk.
    ///
    /// Needed after the backup manager restores a snapshot underneath a live
    /// store.
    pub fn reload(&self) -> Result<()> {
        let mut state = self.state.write();
        *state = load_state(&self.layout)?;
        tracing::info!(
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            "store reloaded from disk"
        );
        Ok(())
    }

    /// Release resources. Nothing is buffered, so this only consumes the
    /// handle.
    pub fn close(self) -> Result<()> {
        tracing::debug!(data_dir = %self.layout.root().display(), "store closed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a node version.
    ///
    /// A fresh id starts a new history. An existing id gets `node` appended
    /// as its new current version and the previous one superseded; the node
    /// type must match the existing history.
    pub fn add_node(&self, node: Node) -> Result<Node> {
        check_path_component("node type", &node.node_type)?;
        self.add_entity(node, |_, _| Ok(()))
    }

    /// New version of node `id` carrying `data`
    pub fn update_node(&self, id: &str, data: DataMap) -> Result<Node> {
        self.update_entity::<Node>(id, data)
    }

    /// Current version of node `id`
    pub fn get_node(&self, id: &str) -> Result<Node> {
        self.state.read().nodes.current(id).cloned()
    }

    /// Version of node `id` active at `at`
    pub fn get_node_at_time(&self, id: &str, at: Timestamp) -> Result<Node> {
        self.state.read().nodes.at_time(id, at).cloned()
    }

    /// Every version of node `id`, ordered by `valid_from`
    pub fn node_history(&self, id: &str) -> Result<Vec<Node>> {
        self.history::<Node>(id)
    }

    /// Current version of every node of `node_type`
    pub fn list_nodes_by_type(&self, node_type: &str) -> Vec<Node> {
        self.list_by_type::<Node>(node_type)
    }

    /// Whether any history exists for node `id`
    pub fn contains_node(&self, id: &str) -> bool {
        self.state.read().nodes.contains(id)
    }

    /// Rewrite the history file for node `id` without adding a version
    pub fn persist_node(&self, id: &str) -> Result<()> {
        self.persist_entity::<Node>(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Edges
    // ─────────────────────────────────────────────────────────────────────────

    /// Add an edge version.
    ///
    /// Fails without touching any state when the edge points at itself or
    /// either endpoint is not a known node. Endpoints and label are fixed
    /// for the lifetime of an edge id.
    pub fn add_edge(&self, edge: Edge) -> Result<Edge> {
        if edge.source_id == edge.target_id {
            return Err(ChronoError::InvalidArgument(format!(
                "edge {} is self-referential ({})",
                edge.id, edge.source_id
            )));
        }
        if edge.edge_type.is_empty() {
            return Err(ChronoError::InvalidArgument(format!(
                "edge {} has an empty type",
                edge.id
            )));
        }
        self.add_entity(edge, |state, edge| {
            for endpoint in [&edge.source_id, &edge.target_id] {
                if !state.nodes.contains(endpoint) {
                    return Err(ChronoError::MissingEndpoint {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
            Ok(())
        })
    }

    /// New version of edge `id` carrying `data`
    pub fn update_edge(&self, id: &str, data: DataMap) -> Result<Edge> {
        self.update_entity::<Edge>(id, data)
    }

    /// Current version of edge `id`
    pub fn get_edge(&self, id: &str) -> Result<Edge> {
        self.state.read().edges.current(id).cloned()
    }

    /// Version of edge `id` active at `at`
    pub fn get_edge_at_time(&self, id: &str, at: Timestamp) -> Result<Edge> {
        self.state.read().edges.at_time(id, at).cloned()
    }

    /// Every version of edge `id`, ordered by `valid_from`
    pub fn edge_history(&self, id: &str) -> Result<Vec<Edge>> {
        self.history::<Edge>(id)
    }

    /// Every edge whose current version has label `edge_type`
    pub fn list_edges_by_type(&self, edge_type: &str) -> Vec<Edge> {
        self.list_by_type::<Edge>(edge_type)
    }

    /// Rewrite the history file for edge `id` without adding a version
    pub fn persist_edge(&self, id: &str) -> Result<()> {
        self.persist_entity::<Edge>(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Graph
    // ─────────────────────────────────────────────────────────────────────────

    /// Distinct nodes joined to `node_id` by any current edge, in either
    /// direction
    pub fn neighbors(&self, node_id: &str) -> Result<Vec<Node>> {
        let state = self.state.read();
        if !state.nodes.contains(node_id) {
            return Err(ChronoError::EntityNotFound {
                kind: EntityKind::Node,
                id: node_id.to_string(),
            });
        }
        let found = state.neighbors(node_id, None, &TemporalMode::Current, crate::types::now());
        Ok(found.into_values().collect())
    }

    /// Current edges with `node_id` as either endpoint
    pub fn edges_of(&self, node_id: &str) -> Vec<Edge> {
        let state = self.state.read();
        state
            .incident_edge_ids(node_id)
            .filter_map(|edge_id| state.edges.current(edge_id).ok().cloned())
            .collect()
    }

    /// Start a node query
    pub fn nodes(&self) -> Query<'_, Node> {
        Query::new(self)
    }

    /// Start an edge query
    pub fn edges(&self) -> Query<'_, Edge> {
        Query::new(self)
    }

    /// Counts over the indexes
    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            node_histories: state.nodes.len(),
            node_versions: state.nodes.version_count(),
            current_nodes: state.nodes.current_count(),
            edge_histories: state.edges.len(),
            edge_versions: state.edges.version_count(),
            current_edges: state.edges.current_count(),
        }
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Generic write path
    // ─────────────────────────────────────────────────────────────────────────

    fn add_entity<E, F>(&self, entity: E, preflight: F) -> Result<E>
    where
        E: Stored,
        F: FnOnce(&StoreState, &E) -> Result<()>,
    {
        check_path_component("id", entity.id())?;

        let mut state = self.state.write();
        preflight(&*state, &entity)?;
        if let Some(existing) = E::histories(&state).get(entity.id()).and_then(|h| h.first()) {
            if !existing.same_identity(&entity) {
                return Err(ChronoError::InvalidArgument(format!(
                    "{} {} cannot change its type or endpoints",
                    E::KIND,
                    entity.id()
                )));
            }
        }

        let now = crate::types::now();
        let id = entity.id().to_string();
        let versions = E::histories_mut(&mut state).append(entity, now).to_vec();
        let added = match history::current(&versions) {
            Some(current) => current.clone(),
            None => {
                return Err(ChronoError::NoCurrentVersion { kind: E::KIND, id });
            }
        };
        E::on_append(&mut state, &added);

        self.write_or_flag(&id, &versions)?;
        Ok(added)
    }

    fn update_entity<E: Stored>(&self, id: &str, data: DataMap) -> Result<E> {
        let mut state = self.state.write();
        let versions = E::histories_mut(&mut state)
            .update(id, data, crate::types::now())?
            .to_vec();
        let updated = history::current(&versions)
            .cloned()
            .ok_or_else(|| ChronoError::NoCurrentVersion {
                kind: E::KIND,
                id: id.to_string(),
            })?;

        self.write_or_flag(id, &versions)?;
        Ok(updated)
    }

    fn persist_entity<E: Stored>(&self, id: &str) -> Result<()> {
        let state = self.state.read();
        let versions = E::histories(&state)
            .get(id)
            .ok_or_else(|| ChronoError::EntityNotFound {
                kind: E::KIND,
                id: id.to_string(),
            })?;
        self.write_history(versions)
    }

    /// Persist after an in-memory change; failures become `NotDurable`
    fn write_or_flag<E: Stored>(&self, id: &str, versions: &[E]) -> Result<()> {
        self.write_history(versions).map_err(|source| {
            tracing::warn!(kind = %E::KIND, id, error = %source, "history not persisted");
            ChronoError::NotDurable {
                kind: E::KIND,
                id: id.to_string(),
                source: Box::new(source),
            }
        })
    }

    fn write_history<E: Stored>(&self, versions: &[E]) -> Result<()> {
        let Some(first) = versions.first() else {
            return Ok(());
        };
        let path = E::file_path(&self.layout, first);
        persistence::write_history(&path, versions, self.durability)?;
        tracing::debug!(
            kind = %E::KIND,
            id = first.id(),
            versions = versions.len(),
            path = %path.display(),
            "history persisted"
        );
        Ok(())
    }

    fn history<E: Stored>(&self, id: &str) -> Result<Vec<E>> {
        let state = self.state.read();
        E::histories(&state)
            .get(id)
            .map(<[E]>::to_vec)
            .ok_or_else(|| ChronoError::EntityNotFound {
                kind: E::KIND,
                id: id.to_string(),
            })
    }

    fn list_by_type<E: Stored>(&self, entity_type: &str) -> Vec<E> {
        let state = self.state.read();
        let histories = E::histories(&state);
        histories
            .ids_of_type(entity_type)
            .filter_map(|id| histories.current(id).ok())
            .filter(|current| current.entity_type() == entity_type)
            .cloned()
            .collect()
    }
}

/// Rebuild every index from the files under `layout`
fn load_state(layout: &DiskLayout) -> Result<StoreState> {
    let mut state = StoreState::default();
    load_kind::<Node>(layout, &mut state)?;
    load_kind::<Edge>(layout, &mut state)?;
    Ok(state)
}

fn load_kind<E: Stored>(layout: &DiskLayout, state: &mut StoreState) -> Result<()> {
    // id -> (file, canonical?, versions)
    let mut chosen: BTreeMap<String, (PathBuf, bool, Vec<E>)> = BTreeMap::new();
    for (path, versions) in persistence::load_histories::<E>(&layout.kind_dir(E::KIND))? {
        let Some(first) = versions.first() else {
            tracing::warn!(path = %path.display(), "skipping empty history file");
            continue;
        };
        let id = first.id().to_string();
        let canonical = path == E::file_path(layout, first);
        match chosen.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert((path, canonical, versions));
            }
            Entry::Occupied(mut slot) => {
                let (kept, kept_canonical, _) = slot.get();
                if canonical && !kept_canonical {
                    tracing::warn!(
                        kind = %E::KIND,
                        id = %slot.key(),
                        kept = %path.display(),
                        ignored = %kept.display(),
                        "duplicate history file outside its canonical location ignored"
                    );
                    slot.insert((path, canonical, versions));
                } else {
                    tracing::warn!(
                        kind = %E::KIND,
                        id = %slot.key(),
                        kept = %kept.display(),
                        ignored = %path.display(),
                        "duplicate history file ignored"
                    );
                }
            }
        }
    }

    for (id, (_, _, versions)) in chosen {
        match history::count_current(&versions) {
            1 => {}
            0 => tracing::warn!(kind = %E::KIND, id = %id, "history has no current version"),
            n => tracing::warn!(kind = %E::KIND, id = %id, current = n, "history has several current versions"),
        }
        for version in &versions {
            E::on_append(state, version);
        }
        E::histories_mut(state).insert_loaded(versions);
    }
    Ok(())
}
