//! Edge records
//!
//! Endpoints and relationship label are fixed for the lifetime of an edge;
//! only `data` changes between versions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, EntityKind};
use crate::types::{nullable_map, open_time, DataMap, Timestamp};

/// One version of a typed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,

    pub source_id: String,

    pub target_id: String,

    /// Relationship label, e.g. "depends_on"
    #[serde(rename = "type")]
    pub edge_type: String,

    #[serde(default, deserialize_with = "nullable_map")]
    pub data: DataMap,

    pub created_at: Timestamp,

    pub valid_from: Timestamp,

    #[serde(with = "open_time", default)]
    pub valid_until: Option<Timestamp>,
}

impl Edge {
    /// Create a first version with a fresh UUID id, opened now
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        edge_type: impl Into<String>,
        data: DataMap,
    ) -> Self {
        let now = crate::types::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type: edge_type.into(),
            data,
            created_at: now,
            valid_from: now,
            valid_until: None,
        }
    }

    /// Replace the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Whether `node_id` is either endpoint
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }

    /// The endpoint opposite `node_id`, if `node_id` is an endpoint
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source_id == node_id {
            Some(&self.target_id)
        } else if self.target_id == node_id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

impl Entity for Edge {
    const KIND: EntityKind = EntityKind::Edge;

    fn id(&self) -> &str {
        &self.id
    }

    fn entity_type(&self) -> &str {
        &self.edge_type
    }

    fn data(&self) -> &DataMap {
        &self.data
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn valid_from(&self) -> Timestamp {
        self.valid_from
    }

    fn valid_until(&self) -> Option<Timestamp> {
        self.valid_until
    }

    fn set_valid_until(&mut self, until: Option<Timestamp>) {
        self.valid_until = until;
    }

    fn set_start(&mut self, at: Timestamp) {
        self.created_at = at;
        self.valid_from = at;
    }

    fn next_version(&self, data: DataMap, at: Timestamp) -> Self {
        Self {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            edge_type: self.edge_type.clone(),
            data,
            created_at: at,
            valid_from: at,
            valid_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_map;
    use serde_json::json;

    #[test]
    fn test_edge_json_shape() {
        let edge = Edge::new("g1", "o1", "has_objective", DataMap::new()).with_id("e1");
        let value = serde_json::to_value(&edge).unwrap();

        assert_eq!(value["id"], "e1");
        assert_eq!(value["source_id"], "g1");
        assert_eq!(value["target_id"], "o1");
        assert_eq!(value["type"], "has_objective");
        assert_eq!(value["valid_until"], "0001-01-01T00:00:00Z");
    }

    #[test]
    fn test_other_end() {
        let edge = Edge::new("a", "b", "rel", DataMap::new());
        assert_eq!(edge.other_end("a"), Some("b"));
        assert_eq!(edge.other_end("b"), Some("a"));
        assert_eq!(edge.other_end("c"), None);
        assert!(edge.touches("a"));
    }

    #[test]
    fn test_next_version_keeps_endpoints() {
        let v1 = Edge::new("a", "b", "rel", data_map(json!({"weight": 1})));
        let at = v1.valid_from + chrono::Duration::seconds(1);
        let v2 = v1.next_version(data_map(json!({"weight": 2})), at);

        assert_eq!((v2.source_id.as_str(), v2.target_id.as_str()), ("a", "b"));
        assert_eq!(v2.edge_type, "rel");
        assert_eq!(v2.field("weight"), Some(&json!(2)));
    }
}
