//! Query steps and temporal modes
//!
//! A query is plain data: an ordered list of [`QueryStep`]s plus one
//! [`TemporalMode`]. The interpreter in the parent module walks the list;
//! nothing here holds a closure.

use serde_json::Value;

use crate::model::{history, Entity};
use crate::types::Timestamp;

/// One step of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStep {
    /// Category equals the given type / relationship label
    TypeEq(String),
    /// `data[key] == value`
    FieldEq { key: String, value: Value },
    /// Id equals the given id
    IdEq(String),
    /// Replace the result set with its neighbours over edges of `edge_type`
    Neighbor { edge_type: String },
}

impl QueryStep {
    /// Whether a filter step accepts `entity`. Traversal steps never filter.
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        match self {
            QueryStep::TypeEq(t) => entity.entity_type() == t,
            QueryStep::FieldEq { key, value } => entity.field(key) == Some(value),
            QueryStep::IdEq(id) => entity.id() == id,
            QueryStep::Neighbor { .. } => true,
        }
    }

    pub fn is_traversal(&self) -> bool {
        matches!(self, QueryStep::Neighbor { .. })
    }
}

/// Which version of each entity a query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalMode {
    /// The open version
    #[default]
    Current,
    /// The version active at the instant
    AsOf(Timestamp),
    /// The latest version whose window overlaps `[start, end)`
    Between { start: Timestamp, end: Timestamp },
}

impl TemporalMode {
    /// Pick at most one version from `history`. `now` closes open windows
    /// for the overlap test. An empty or inverted range selects nothing.
    pub fn select<'a, E: Entity>(&self, history: &'a [E], now: Timestamp) -> Option<&'a E> {
        match *self {
            TemporalMode::Current => history::current(history),
            TemporalMode::AsOf(at) => history::active_at(history, at),
            TemporalMode::Between { start, end } if start < end => {
                history::overlapping(history, start, end, now)
            }
            TemporalMode::Between { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use crate::types::data_map;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_filter_steps() {
        let node = Node::new("goal", data_map(json!({"status": "active"}))).with_id("g1");

        assert!(QueryStep::TypeEq("goal".into()).matches(&node));
        assert!(!QueryStep::TypeEq("method".into()).matches(&node));
        assert!(QueryStep::IdEq("g1".into()).matches(&node));
        assert!(QueryStep::FieldEq {
            key: "status".into(),
            value: json!("active")
        }
        .matches(&node));
        assert!(!QueryStep::FieldEq {
            key: "missing".into(),
            value: Value::Null
        }
        .matches(&node));
    }

    #[test]
    fn test_inverted_range_selects_nothing() {
        let node = Node::new("goal", data_map(json!({})));
        let t = node.valid_from;
        let history = vec![node];
        let mode = TemporalMode::Between {
            start: t + Duration::seconds(5),
            end: t,
        };
        assert!(mode.select(&history, t + Duration::seconds(10)).is_none());
        assert!(TemporalMode::Current.select(&history, t).is_some());
    }
}
