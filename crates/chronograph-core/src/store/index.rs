//! In-memory indexes guarded by the store-wide lock
//!
//! `Histories<E>` owns the authoritative version list per id plus a type
//! index. `StoreState` adds the node → incident-edge adjacency used for
//! neighbour lookups.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::Duration;

use super::persistence::DiskLayout;
use crate::error::{ChronoError, Result};
use crate::model::{history, Edge, Entity, Node};
use crate::query::TemporalMode;
use crate::types::{DataMap, Timestamp};

/// Version histories for one entity kind
#[derive(Debug)]
pub(crate) struct Histories<E> {
    by_id: BTreeMap<String, Vec<E>>,
    by_type: HashMap<String, BTreeSet<String>>,
}

impl<E: Entity> Default for Histories<E> {
    fn default() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_type: HashMap::new(),
        }
    }
}

impl<E: Entity> Histories<E> {
    pub fn get(&self, id: &str) -> Option<&[E]> {
        self.by_id.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<E>)> {
        self.by_id.iter()
    }

    /// Ids whose entity has category `entity_type`
    pub fn ids_of_type(&self, entity_type: &str) -> impl Iterator<Item = &String> {
        self.by_type.get(entity_type).into_iter().flatten()
    }

    /// Install a history read from disk. Versions are sorted by `valid_from`.
    pub fn insert_loaded(&mut self, mut versions: Vec<E>) {
        let Some(first) = versions.first() else {
            return;
        };
        let id = first.id().to_string();
        let entity_type = first.entity_type().to_string();
        history::sort(&mut versions);
        self.by_type.entry(entity_type).or_default().insert(id.clone());
        self.by_id.insert(id, versions);
    }

    /// Append `entity` as the newest version of its id.
    ///
    /// A fresh id starts a one-version history. For a known id every open
    /// version is superseded at the write instant and `entity` is reopened
    /// at that same instant, so the windows abut.
    pub fn append(&mut self, mut entity: E, now: Timestamp) -> &[E] {
        let id = entity.id().to_string();
        match self.by_id.get_mut(&id) {
            Some(versions) => {
                let at = next_instant(versions, now);
                for version in versions.iter_mut() {
                    version.supersede(at);
                }
                entity.reopen_at(at);
                versions.push(entity);
            }
            None => {
                entity.set_valid_until(None);
                self.by_type
                    .entry(entity.entity_type().to_string())
                    .or_default()
                    .insert(id.clone());
                self.by_id.insert(id.clone(), vec![entity]);
            }
        }
        self.by_id.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Derive a new version from the current one and append it
    pub fn update(&mut self, id: &str, data: DataMap, now: Timestamp) -> Result<&[E]> {
        let versions = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| ChronoError::EntityNotFound {
                kind: E::KIND,
                id: id.to_string(),
            })?;
        let current = history::current_index(versions).ok_or_else(|| {
            ChronoError::NoCurrentVersion {
                kind: E::KIND,
                id: id.to_string(),
            }
        })?;

        let at = next_instant(versions, now);
        let next = versions[current].next_version(data, at);
        for version in versions.iter_mut() {
            version.supersede(at);
        }
        versions.push(next);
        Ok(versions.as_slice())
    }

    /// Current version of `id`
    pub fn current(&self, id: &str) -> Result<&E> {
        let versions = self.get(id).ok_or_else(|| ChronoError::EntityNotFound {
            kind: E::KIND,
            id: id.to_string(),
        })?;
        history::current(versions).ok_or_else(|| ChronoError::NoCurrentVersion {
            kind: E::KIND,
            id: id.to_string(),
        })
    }

    /// Version of `id` active at `at`
    pub fn at_time(&self, id: &str, at: Timestamp) -> Result<&E> {
        let versions = self.get(id).ok_or_else(|| ChronoError::EntityNotFound {
            kind: E::KIND,
            id: id.to_string(),
        })?;
        history::active_at(versions, at).ok_or_else(|| ChronoError::NoVersionAt {
            kind: E::KIND,
            id: id.to_string(),
            at,
        })
    }

    pub fn version_count(&self) -> usize {
        self.by_id.values().map(Vec::len).sum()
    }

    pub fn current_count(&self) -> usize {
        self.by_id
            .values()
            .filter(|versions| history::current(versions).is_some())
            .count()
    }
}

/// Earliest instant a new version may start at: `now`, unless the clock has
/// not moved past the newest `valid_from` yet.
fn next_instant<E: Entity>(versions: &[E], now: Timestamp) -> Timestamp {
    match versions.iter().map(Entity::valid_from).max() {
        Some(latest) if now <= latest => latest + Duration::nanoseconds(1),
        _ => now,
    }
}

/// Everything behind the store lock
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub nodes: Histories<Node>,
    pub edges: Histories<Edge>,
    /// node id → ids of edges with that node as an endpoint
    adjacency: HashMap<String, BTreeSet<String>>,
}

impl StoreState {
    /// Record both endpoints of an edge id
    pub fn link(&mut self, edge: &Edge) {
        for endpoint in [&edge.source_id, &edge.target_id] {
            self.adjacency
                .entry(endpoint.clone())
                .or_default()
                .insert(edge.id.clone());
        }
    }

    /// Ids of every edge ever attached to `node_id`
    pub fn incident_edge_ids(&self, node_id: &str) -> impl Iterator<Item = &String> {
        self.adjacency.get(node_id).into_iter().flatten()
    }

    /// Distinct neighbours of `node_id` under `mode`, optionally restricted
    /// to one relationship label. Edge and neighbour versions are both
    /// selected by `mode`.
    pub fn neighbors(
        &self,
        node_id: &str,
        edge_type: Option<&str>,
        mode: &TemporalMode,
        now: Timestamp,
    ) -> BTreeMap<String, Node> {
        let mut found = BTreeMap::new();
        for edge_id in self.incident_edge_ids(node_id) {
            let Some(edge) = self.edges.get(edge_id).and_then(|h| mode.select(h, now)) else {
                continue;
            };
            if edge_type.is_some_and(|t| edge.edge_type != t) {
                continue;
            }
            let Some(other) = edge.other_end(node_id) else {
                continue;
            };
            if found.contains_key(other) {
                continue;
            }
            if let Some(node) = self.nodes.get(other).and_then(|h| mode.select(h, now)) {
                found.insert(other.to_string(), node.clone());
            }
        }
        found
    }
}

/// Per-kind hooks the generic store and query code dispatch through
pub(crate) trait Stored: Entity {
    fn histories(state: &StoreState) -> &Histories<Self>;

    fn histories_mut(state: &mut StoreState) -> &mut Histories<Self>;

    /// Canonical file for this entity's history
    fn file_path(layout: &DiskLayout, entity: &Self) -> PathBuf;

    /// Identity fields that may not change between versions
    fn same_identity(&self, other: &Self) -> bool;

    /// Hook run after a version is appended under the write lock
    fn on_append(_state: &mut StoreState, _entity: &Self) {}

    /// Expand a result set one hop along `edge_type`
    fn traverse(
        state: &StoreState,
        from: &[Self],
        edge_type: &str,
        mode: &TemporalMode,
        now: Timestamp,
    ) -> Vec<Self>;
}

impl Stored for Node {
    fn histories(state: &StoreState) -> &Histories<Self> {
        &state.nodes
    }

    fn histories_mut(state: &mut StoreState) -> &mut Histories<Self> {
        &mut state.nodes
    }

    fn file_path(layout: &DiskLayout, entity: &Self) -> PathBuf {
        layout.node_path(&entity.node_type, &entity.id)
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.node_type == other.node_type
    }

    fn traverse(
        state: &StoreState,
        from: &[Self],
        edge_type: &str,
        mode: &TemporalMode,
        now: Timestamp,
    ) -> Vec<Self> {
        let mut reached = BTreeMap::new();
        for node in from {
            reached.extend(state.neighbors(&node.id, Some(edge_type), mode, now));
        }
        reached.into_values().collect()
    }
}

impl Stored for Edge {
    fn histories(state: &StoreState) -> &Histories<Self> {
        &state.edges
    }

    fn histories_mut(state: &mut StoreState) -> &mut Histories<Self> {
        &mut state.edges
    }

    fn file_path(layout: &DiskLayout, entity: &Self) -> PathBuf {
        layout.edge_path(&entity.id)
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.source_id == other.source_id
            && self.target_id == other.target_id
            && self.edge_type == other.edge_type
    }

    fn on_append(state: &mut StoreState, entity: &Self) {
        state.link(entity);
    }

    /// Edge queries expose no neighbour step, so nothing is reachable.
    fn traverse(
        _state: &StoreState,
        _from: &[Self],
        _edge_type: &str,
        _mode: &TemporalMode,
        _now: Timestamp,
    ) -> Vec<Self> {
        Vec::new()
    }
}
