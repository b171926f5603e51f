// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    /// Create a new random edge ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connection between two handles.
///
/// Field names match the persisted edge record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Source node ID
    pub source: String,
    /// Source handle ID
    pub source_handle: String,
    /// Target node ID
    pub target: String,
    /// Target handle ID
    pub target_handle: String,
}

impl Edge {
    /// Create a new edge with a fresh id
    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: EdgeId::new(),
            source: source.into(),
            source_handle: source_handle.into(),
            target: target.into(),
            target_handle: target_handle.into(),
        }
    }

    /// Check if this edge involves a specific node
    pub fn involves_node(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Check if this edge starts at a specific handle
    pub fn is_from(&self, node_id: &str, handle: &str) -> bool {
        self.source == node_id && self.source_handle == handle
    }

    /// Check if this edge ends at a specific handle
    pub fn is_into(&self, node_id: &str, handle: &str) -> bool {
        self.target == node_id && self.target_handle == handle
    }

    /// Replace a node id at either end
    pub fn remap_node(&mut self, from: &str, to: &str) {
        if self.source == from {
            self.source = to.to_string();
        }
        if self.target == from {
            self.target = to.to_string();
        }
    }
}
