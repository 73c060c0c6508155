//! Node records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Entity, EntityKind};
use crate::types::{nullable_map, open_time, DataMap, Timestamp};

/// One version of a graph node
///
/// # Examples
///
/// ```
/// use chronograph_core::model::{Entity, Node};
/// use chronograph_core::types::data_map;
/// use serde_json::json;
///
/// let node = Node::new("goal", data_map(json!({"title": "Learn X"})));
/// assert!(node.is_current());
/// assert_eq!(node.entity_type(), "goal");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier shared by every version
    pub id: String,

    /// Free-form category, e.g. "goal"
    #[serde(rename = "type")]
    pub node_type: String,

    /// Version payload
    #[serde(default, deserialize_with = "nullable_map")]
    pub data: DataMap,

    pub created_at: Timestamp,

    pub valid_from: Timestamp,

    /// Open (`None`) while this is the current version
    #[serde(with = "open_time", default)]
    pub valid_until: Option<Timestamp>,
}

impl Node {
    /// Create a first version with a fresh UUID id, opened now
    pub fn new(node_type: impl Into<String>, data: DataMap) -> Self {
        let now = crate::types::now();
        Self {
            id: Uuid::new_v4().to_string(),
            node_type: node_type.into(),
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

    /// Set a single data field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl Entity for Node {
    const KIND: EntityKind = EntityKind::Node;

    fn id(&self) -> &str {
        &self.id
    }

    fn entity_type(&self) -> &str {
        &self.node_type
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
            node_type: self.node_type.clone(),
            data,
            created_at: at,
            valid_from: at,
            valid_until: None,
        }
    }
}
