// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persisted record shapes.
//!
//! These are stored as JSON and must round-trip exactly, so field names are
//! camelCase and optional fields are omitted when absent.

use crate::connection::Edge;
use crate::handle::{DataType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Collection holding composite definitions, keyed by identifier
pub const DEFINITIONS_COLLECTION: &str = "userNodes";
/// Collection holding persisted graphs, keyed by graph id
pub const GRAPHS_COLLECTION: &str = "graphs";

/// Boundary handle of a composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryHandleRecord {
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Data type
    pub data_type: DataType,
}

/// A composite node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeNodeDefinition {
    /// Key of the internal graph in the graphs collection
    pub internal_graph_id: String,
    /// Boundary handles in port order
    pub handle_definitions: IndexMap<String, BoundaryHandleRecord>,
    /// Whether the composite has signal in/out handles
    pub is_bangable: bool,
    /// Label of the action button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
}

/// Position on the editor canvas
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Position {
    /// Create a position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Saved state of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNodeState {
    /// Handle values
    #[serde(default)]
    pub reactive: IndexMap<String, Value>,
    /// Behavior specific state such as the selected operator
    #[serde(default = "empty_object")]
    pub other: serde_json::Value,
}

impl Default for SavedNodeState {
    fn default() -> Self {
        Self {
            reactive: IndexMap::new(),
            other: empty_object(),
        }
    }
}

pub(crate) fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A saved node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedNode {
    /// Node type identifier
    pub type_name: String,
    /// Canvas position
    #[serde(default)]
    pub position: Position,
    /// Saved state
    #[serde(default)]
    pub state: SavedNodeState,
}

/// A saved graph: either a named top-level flow or a composite's internals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedGraph {
    /// Name; `None` for composite internals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Edges in declaration order
    pub edges: Vec<Edge>,
    /// Nodes by id
    pub nodes: IndexMap<String, SavedNode>,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl PersistedGraph {
    /// Whether any node, including nested composite snapshots, uses a type
    pub fn references_type(&self, identifier: &str) -> bool {
        self.nodes
            .values()
            .any(|n| n.type_name == identifier || snapshot_references(&n.state.other, identifier))
    }
}

/// Key holding nested node snapshots inside a composite's `other` state
pub const INTERNAL_STATE_KEY: &str = "internal";

/// Nested node snapshots of a composite, if present
pub fn internal_snapshot(other: &serde_json::Value) -> Option<IndexMap<String, SavedNode>> {
    let internal = other.get(INTERNAL_STATE_KEY)?;
    serde_json::from_value(internal.clone()).ok()
}

fn snapshot_references(other: &serde_json::Value, identifier: &str) -> bool {
    internal_snapshot(other).is_some_and(|nodes| {
        nodes
            .values()
            .any(|n| n.type_name == identifier || snapshot_references(&n.state.other, identifier))
    })
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
