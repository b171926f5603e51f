// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge storage and connectivity queries.

use crate::connection::{Edge, EdgeId};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;

/// Edges of one scope in declaration order
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    edges: IndexMap<EdgeId, Edge>,
}

impl EdgeSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge, returning its id
    pub fn insert(&mut self, edge: Edge) -> EdgeId {
        let id = edge.id.clone();
        self.edges.insert(id.clone(), edge);
        id
    }

    /// Remove an edge, keeping the order of the rest
    pub fn remove(&mut self, id: &EdgeId) -> Option<Edge> {
        self.edges.shift_remove(id)
    }

    /// Get an edge by ID
    pub fn get(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Whether the edge is still present
    pub fn contains(&self, id: &EdgeId) -> bool {
        self.edges.contains_key(id)
    }

    /// All edges in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether there are no edges
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges leaving a handle
    pub fn from_handle<'a>(
        &'a self,
        node_id: &'a str,
        handle: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| e.is_from(node_id, handle))
    }

    /// Edges entering a handle
    pub fn into_handle<'a>(
        &'a self,
        node_id: &'a str,
        handle: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| e.is_into(node_id, handle))
    }

    /// Edges touching a node
    pub fn for_node<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| e.involves_node(node_id))
    }

    /// Whether any edge touches the handle at either end
    pub fn is_handle_connected(&self, node_id: &str, handle: &str) -> bool {
        self.edges
            .values()
            .any(|e| e.is_from(node_id, handle) || e.is_into(node_id, handle))
    }

    /// Remove every edge touching a node
    pub fn remove_node(&mut self, node_id: &str) -> Vec<Edge> {
        self.remove_where(|e| e.involves_node(node_id))
    }

    /// Remove every edge entering a handle
    pub fn remove_into(&mut self, node_id: &str, handle: &str) -> Vec<Edge> {
        self.remove_where(|e| e.is_into(node_id, handle))
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&Edge) -> bool) -> Vec<Edge> {
        let ids: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| predicate(e))
            .map(|e| e.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Nodes reachable from `start` ignoring edge direction, in discovery order
    pub fn island(&self, start: &str) -> IndexSet<String> {
        let mut seen = IndexSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start.to_string());
        queue.push_back(start.to_string());

        while let Some(node) = queue.pop_front() {
            for edge in self.for_node(&node) {
                for next in [&edge.source, &edge.target] {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        seen
    }

    /// Clone the edges into a list
    pub fn to_vec(&self) -> Vec<Edge> {
        self.edges.values().cloned().collect()
    }
}

impl FromIterator<Edge> for EdgeSet {
    fn from_iter<I: IntoIterator<Item = Edge>>(iter: I) -> Self {
        let mut set = Self::new();
        for edge in iter {
            set.insert(edge);
        }
        set
    }
}
