//! Query Engine
//!
//! Composable, immutable filter builder over the store's in-memory
//! indexes. Every builder call returns a new [`Query`]; the receiver is
//! left untouched, so a partially built query can serve as the base of
//! several branches.
//!
//! # Temporal modes
//!
//! - default: each entity's current version
//! - [`Query::as_of`]: the version active at an instant
//! - [`Query::between`]: the latest version overlapping `[start, end)`
//!
//! # Example
//!
//! ```no_run
//! # use chronograph_core::Store;
//! # fn example(store: &Store) {
//! let active = store.nodes().of_type("goal").with_field_equals("status", "active");
//! let objectives = active.neighbors_via("has_objective").all();
//! let how_many = active.count();
//! # let _ = (objectives, how_many);
//! # }
//! ```

mod step;

pub use step::{QueryStep, TemporalMode};

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;

use crate::model::{Edge, Node};
use crate::store::index::{StoreState, Stored};
use crate::store::Store;
use crate::types::Timestamp;

/// A query over nodes or edges borrowed from one [`Store`]
pub struct Query<'s, E> {
    store: &'s Store,
    steps: Vec<QueryStep>,
    mode: TemporalMode,
    limit: Option<usize>,
    _kind: PhantomData<fn() -> E>,
}

impl<E> Clone for Query<'_, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            steps: self.steps.clone(),
            mode: self.mode,
            limit: self.limit,
            _kind: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Query<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("steps", &self.steps)
            .field("mode", &self.mode)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<'s, E> Query<'s, E> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self {
            store,
            steps: Vec::new(),
            mode: TemporalMode::Current,
            limit: None,
            _kind: PhantomData,
        }
    }

    fn push(&self, step: QueryStep) -> Self {
        let mut next = self.clone();
        next.steps.push(step);
        next
    }

    /// Keep entities of category `entity_type`
    pub fn of_type(&self, entity_type: impl Into<String>) -> Self {
        self.push(QueryStep::TypeEq(entity_type.into()))
    }

    /// Keep entities whose `data[key]` equals `value`
    pub fn with_field_equals(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(QueryStep::FieldEq {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Keep the entity with this id
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        self.push(QueryStep::IdEq(id.into()))
    }

    /// Look at the version active at `at`
    pub fn as_of(&self, at: Timestamp) -> Self {
        let mut next = self.clone();
        next.mode = TemporalMode::AsOf(at);
        next
    }

    /// Look at the latest version overlapping `[start, end)`
    pub fn between(&self, start: Timestamp, end: Timestamp) -> Self {
        let mut next = self.clone();
        next.mode = TemporalMode::Between { start, end };
        next
    }

    /// Back to current versions
    pub fn current(&self) -> Self {
        let mut next = self.clone();
        next.mode = TemporalMode::Current;
        next
    }

    /// Return at most `n` results
    pub fn limit(&self, n: usize) -> Self {
        let mut next = self.clone();
        next.limit = Some(n);
        next
    }

    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    pub fn mode(&self) -> TemporalMode {
        self.mode
    }
}

impl Query<'_, Node> {
    /// Replace the result set with the distinct nodes joined to it by edges
    /// labelled `edge_type`. Later filters apply to the neighbours.
    pub fn neighbors_via(&self, edge_type: impl Into<String>) -> Self {
        self.push(QueryStep::Neighbor {
            edge_type: edge_type.into(),
        })
    }
}

#[allow(private_bounds)]
impl<E: Stored> Query<'_, E> {
    /// Every match, in id order
    pub fn all(&self) -> Vec<E> {
        let state = self.store.read_state();
        let mut found = evaluate::<E>(&state, &self.steps, &self.mode, crate::types::now());
        if let Some(n) = self.limit {
            found.truncate(n);
        }
        found
    }

    /// First match in id order
    pub fn first(&self) -> Option<E> {
        self.limit(1).all().into_iter().next()
    }

    /// Number of matches
    pub fn count(&self) -> usize {
        self.all().len()
    }

    /// Ids of every match
    pub fn ids(&self) -> Vec<String> {
        self.all().iter().map(|e| e.id().to_string()).collect()
    }
}

/// Run `steps` against `state`.
///
/// The step list is cut into stages at each traversal step. The first stage
/// seeds candidates from the narrowest index available (an id, then a type,
/// else every history) and keeps the version `mode` selects when it passes
/// the stage's filters. A traversal replaces the result set with its
/// neighbours; the following filters then apply to those.
fn evaluate<E: Stored>(
    state: &StoreState,
    steps: &[QueryStep],
    mode: &TemporalMode,
    now: Timestamp,
) -> Vec<E> {
    let mut stages = steps.split(QueryStep::is_traversal);
    let seed_filters = stages.next().unwrap_or_default();
    let mut results = seed::<E>(state, seed_filters, mode, now);

    let traversals = steps.iter().filter_map(|s| match s {
        QueryStep::Neighbor { edge_type } => Some(edge_type),
        _ => None,
    });
    for (edge_type, filters) in traversals.zip(stages) {
        results = E::traverse(state, &results, edge_type, mode, now)
            .into_iter()
            .filter(|e| filters.iter().all(|f| f.matches(e)))
            .collect();
    }
    results
}

fn seed<E: Stored>(
    state: &StoreState,
    filters: &[QueryStep],
    mode: &TemporalMode,
    now: Timestamp,
) -> Vec<E> {
    let histories = E::histories(state);
    let by_id = filters.iter().find_map(|s| match s {
        QueryStep::IdEq(id) => Some(id),
        _ => None,
    });
    let by_type = filters.iter().find_map(|s| match s {
        QueryStep::TypeEq(t) => Some(t),
        _ => None,
    });

    let candidates: Box<dyn Iterator<Item = &String> + '_> = match (by_id, by_type) {
        (Some(id), _) => Box::new(histories.get(id).map(|_| id).into_iter()),
        (None, Some(t)) => Box::new(histories.ids_of_type(t)),
        (None, None) => Box::new(histories.iter().map(|(id, _)| id)),
    };

    let mut matched = BTreeMap::new();
    for id in candidates {
        let Some(version) = histories.get(id).and_then(|h| mode.select(h, now)) else {
            continue;
        };
        if filters.iter().all(|f| f.matches(version)) {
            matched.insert(id.clone(), version.clone());
        }
    }
    matched.into_values().collect()
}

pub type NodeQuery<'s> = Query<'s, Node>;
pub type EdgeQuery<'s> = Query<'s, Edge>;
