// SPDX-License-Identifier: MIT OR Apache-2.0
//! Saving and loading graphs, and snapshots of live nodes.

use super::Engine;
use crate::composite::{composite_type_def, BOUNDARY_ID};
use crate::connection::Edge;
use crate::error::{IntegrityError, NotFoundError, Result, ValidationError};
use crate::events::EngineEvent;
use crate::instance::Placement;
use crate::records::{
    now_millis, PersistedGraph, SavedNode, SavedNodeState, INTERNAL_STATE_KEY,
};
use crate::registry::{InstanceKey, ScopeId};
use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

/// A named graph in the saved graph list
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSummary {
    /// Graph id
    pub id: String,
    /// Display name
    pub name: String,
    /// Last save, milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Engine {
    /// Reload persisted records and register every composite type.
    ///
    /// Records that fail to decode or reference missing state are skipped
    /// and reported as notifications.
    pub fn resync(&mut self) -> Result<()> {
        let definitions = self.definitions.sync()?;
        let graphs = self.graphs.sync()?;
        for skipped in definitions.skipped.iter().chain(&graphs.skipped) {
            tracing::warn!("Skipped persisted record: {}", skipped);
            self.events
                .emit(EngineEvent::warning(format!("Skipped saved record: {skipped}")));
        }

        let composites: Vec<_> = self
            .definitions
            .iter()
            .map(|(id, def)| (id.to_string(), def.clone()))
            .collect();
        for (identifier, definition) in composites {
            let Some(graph) = self.graphs.get(&definition.internal_graph_id) else {
                let e = NotFoundError::MissingPersistedState(definition.internal_graph_id.clone());
                tracing::warn!("Composite {} not registered: {}", identifier, e);
                self.events
                    .emit(EngineEvent::warning(format!("Node '{identifier}' is unavailable: {e}")));
                continue;
            };
            if self.types.get(&identifier).is_some_and(|t| !t.is_composite()) {
                tracing::warn!("Composite {} shadows a built-in type", identifier);
                self.events.emit(EngineEvent::warning(
                    ValidationError::DuplicateIdentifier(identifier).to_string(),
                ));
                continue;
            }
            let def = composite_type_def(&identifier, &definition, graph);
            if let Err(e) = self.types.replace(def) {
                tracing::warn!("Composite {} not registered: {}", identifier, e);
                self.events
                    .emit(EngineEvent::warning(format!("Node '{identifier}' is unavailable: {e}")));
            }
        }

        tracing::info!(
            "Loaded {} composite definitions and {} graphs",
            definitions.loaded,
            graphs.loaded
        );
        self.events.emit(EngineEvent::TypeRegistryChanged);
        self.events.emit(EngineEvent::GraphListChanged);
        Ok(())
    }

    /// Snapshot of a node in the live graph
    pub fn snapshot(&self, id: &str) -> Result<SavedNode> {
        let key = self.resolve_root(id)?;
        self.snapshot_instance(key)
    }

    /// Persistable state of an instance, including composite internals
    pub(crate) fn snapshot_instance(&self, key: InstanceKey) -> Result<SavedNode> {
        let instance = self
            .instances
            .get(key)
            .ok_or_else(|| NotFoundError::Instance(format!("{key:?}")))?;
        let reactive = instance
            .state
            .iter()
            .filter(|(_, v)| v.is_persistable())
            .map(|(h, v)| (h.clone(), *v))
            .collect();

        let mut other = instance.behavior.save_state();
        if let Some(inner) = instance.inner_scope() {
            let nodes = self.scope_snapshot(inner)?;
            let nodes = serde_json::to_value(nodes).map_err(|e| IntegrityError::CorruptReference {
                record: instance.id.clone(),
                message: e.to_string(),
            })?;
            if let Some(map) = other.as_object_mut() {
                map.insert(INTERNAL_STATE_KEY.to_string(), nodes);
            }
        }

        Ok(SavedNode {
            type_name: instance.type_name.clone(),
            position: instance.position,
            state: SavedNodeState { reactive, other },
        })
    }

    /// Current state of every node inside a composite, keyed by internal
    /// id, with nested composites carrying their own internals
    pub fn save_sub_graph_state(&self, id: &str) -> Result<IndexMap<String, SavedNode>> {
        let key = self.resolve_root(id)?;
        match self.instances.get(key).and_then(|i| i.inner_scope()) {
            Some(inner) => self.scope_snapshot(inner),
            None => Ok(IndexMap::new()),
        }
    }

    fn scope_snapshot(&self, inner: ScopeId) -> Result<IndexMap<String, SavedNode>> {
        let Some(scope) = self.instances.scope(inner) else {
            return Ok(IndexMap::new());
        };
        scope
            .nodes()
            .map(|(id, key)| Ok((id.to_string(), self.snapshot_instance(key)?)))
            .collect()
    }

    /// Snapshot the given live nodes and the edges among them.
    ///
    /// Edges touching the boundary placeholder are kept when it is listed;
    /// the placeholder itself is never saved as a node.
    pub(crate) fn snapshot_graph(
        &self,
        ids: &IndexSet<String>,
        name: Option<String>,
    ) -> Result<PersistedGraph> {
        let mut nodes = IndexMap::new();
        for id in ids.iter().filter(|id| id.as_str() != BOUNDARY_ID) {
            nodes.insert(id.clone(), self.snapshot(id)?);
        }
        let edges = self
            .instances
            .scope(ScopeId::ROOT)
            .map(|root| {
                root.edges
                    .iter()
                    .filter(|e| ids.contains(&e.source) && ids.contains(&e.target))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(PersistedGraph {
            name,
            edges,
            nodes,
            timestamp: now_millis(),
        })
    }

    /// Save the live graph under a name, replacing a graph with the same name
    pub fn save_graph(&mut self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyIdentifier.into());
        }
        let ids: IndexSet<String> = self
            .node_ids()
            .into_iter()
            .filter(|id| id != BOUNDARY_ID)
            .collect();
        let graph = self.snapshot_graph(&ids, Some(name.to_string()))?;

        let id = self
            .graphs
            .iter()
            .find(|(_, g)| g.name.as_deref() == Some(name))
            .map(|(id, _)| id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.graphs.put(id.clone(), graph);
        tracing::info!("Saved graph '{}' ({} nodes)", name, ids.len());
        self.events.emit(EngineEvent::GraphListChanged);
        Ok(id)
    }

    /// Replace the live graph with a saved one
    pub fn load_graph(&mut self, id: &str) -> Result<()> {
        let graph = self
            .graphs
            .get(id)
            .filter(|g| g.name.is_some())
            .cloned()
            .ok_or_else(|| NotFoundError::Graph(id.to_string()))?;
        self.clear();
        if let Err(e) = self.load_into_root(&graph) {
            self.clear();
            return Err(e);
        }
        tracing::info!("Loaded graph {}", id);
        Ok(())
    }

    /// Construct a saved graph's nodes in the live graph under fresh ids.
    /// Edges are restored without delivering values; the saved state
    /// already holds them. Returns the old to new id mapping.
    pub(crate) fn load_into_root(&mut self, graph: &PersistedGraph) -> Result<IndexMap<String, String>> {
        let mut ids = IndexMap::new();
        for (old, saved) in &graph.nodes {
            let new = Uuid::new_v4().to_string();
            self.construct_in(
                ScopeId::ROOT,
                new.clone(),
                &saved.type_name,
                saved.position,
                Some(&saved.state),
                Placement::Real,
                &mut Vec::new(),
            )?;
            ids.insert(old.clone(), new);
        }

        let map = |id: &str| -> Result<String> {
            if id == BOUNDARY_ID {
                return Ok(id.to_string());
            }
            ids.get(id).cloned().ok_or_else(|| {
                IntegrityError::CorruptReference {
                    record: id.to_string(),
                    message: "edge references a node that is not in the graph".to_string(),
                }
                .into()
            })
        };
        let edges = graph
            .edges
            .iter()
            .map(|e| {
                Ok(Edge::new(
                    map(&e.source)?,
                    e.source_handle.clone(),
                    map(&e.target)?,
                    e.target_handle.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(root) = self.instances.scope_mut(ScopeId::ROOT) {
            for edge in edges {
                root.edges.insert(edge);
            }
        }
        Ok(ids)
    }

    /// Delete a named graph
    pub fn delete_graph(&mut self, id: &str, confirmed: bool) -> Result<()> {
        let name = self
            .graphs
            .get(id)
            .and_then(|g| g.name.clone())
            .ok_or_else(|| NotFoundError::Graph(id.to_string()))?;
        if !confirmed {
            return Err(ValidationError::ConfirmationRequired(name).into());
        }
        self.graphs.delete(id);
        tracing::info!("Deleted graph '{}'", name);
        self.events.emit(EngineEvent::GraphListChanged);
        Ok(())
    }

    /// Named graphs, newest first
    pub fn list_graphs(&self) -> Vec<GraphSummary> {
        let mut list: Vec<GraphSummary> = self
            .graphs
            .iter()
            .filter_map(|(id, g)| {
                g.name.as_ref().map(|name| GraphSummary {
                    id: id.to_string(),
                    name: name.clone(),
                    timestamp: g.timestamp,
                })
            })
            .collect();
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list
    }

    /// Remove every node and edge from the live graph, closing any
    /// composite being authored
    pub fn clear(&mut self) {
        let keys: Vec<InstanceKey> = self
            .instances
            .scope(ScopeId::ROOT)
            .map(|s| s.nodes().map(|(_, k)| k).collect())
            .unwrap_or_default();
        for key in keys {
            self.destroy(key);
        }
        if let Some(root) = self.instances.scope_mut(ScopeId::ROOT) {
            root.edges = Default::default();
        }
        self.editing = None;
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::engine;
    use crate::error::{EngineError, ValidationError};
    use crate::handle::{Value, MAIN_OUTPUT};
    use crate::records::Position;

    #[test]
    fn test_save_and_load_graph() {
        let mut engine = engine();
        let a = engine.place("Math", Position::new(1.0, 2.0)).unwrap();
        let sink = engine.place("Number", Position::default()).unwrap();
        engine.configure(&a, &serde_json::json!({ "operator": "*" })).unwrap();
        engine.set_input(&a, "p1", 3.0).unwrap();
        engine.set_input(&a, "p2", 4.0).unwrap();
        engine.connect(&a, MAIN_OUTPUT, &sink, "in").unwrap();

        let id = engine.save_graph("Flow").unwrap();
        engine.clear();
        assert!(engine.node_ids().is_empty());

        engine.load_graph(&id).unwrap();
        let ids = engine.node_ids();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&a));
        assert_eq!(engine.edges().len(), 1);

        let math = ids
            .iter()
            .find(|id| engine.instance(id).unwrap().type_name() == "Math")
            .unwrap()
            .clone();
        let number = ids.iter().find(|id| **id != math).unwrap().clone();
        assert_eq!(engine.state(&math, MAIN_OUTPUT).unwrap(), Some(Value::Number(12.0)));
        assert_eq!(engine.state(&number, MAIN_OUTPUT).unwrap(), Some(Value::Number(12.0)));
        assert_eq!(engine.instance(&math).unwrap().position(), Position::new(1.0, 2.0));

        engine.set_input(&math, "p1", 5.0).unwrap();
        assert_eq!(engine.state(&number, MAIN_OUTPUT).unwrap(), Some(Value::Number(20.0)));
    }

    #[test]
    fn test_save_same_name_overwrites() {
        let mut engine = engine();
        let first = engine.save_graph("Flow").unwrap();
        engine.place("Number", Position::default()).unwrap();
        let second = engine.save_graph(" Flow ").unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.list_graphs().len(), 1);
        assert!(matches!(
            engine.save_graph("  "),
            Err(EngineError::Validation(ValidationError::EmptyIdentifier))
        ));
    }

    #[test]
    fn test_delete_graph_requires_confirmation() {
        let mut engine = engine();
        let id = engine.save_graph("Flow").unwrap();
        assert!(matches!(
            engine.delete_graph(&id, false),
            Err(EngineError::Validation(ValidationError::ConfirmationRequired(_)))
        ));
        engine.delete_graph(&id, true).unwrap();
        assert!(engine.list_graphs().is_empty());
        assert!(engine.load_graph(&id).is_err());
    }

    #[test]
    fn test_non_finite_values_are_not_saved() {
        let mut engine = engine();
        let a = engine.place("Math", Position::default()).unwrap();
        engine.set_input(&a, "p1", f64::INFINITY).unwrap();
        let saved = engine.snapshot(&a).unwrap();
        assert!(!saved.state.reactive.contains_key("p1"));
        assert!(!saved.state.reactive.contains_key(MAIN_OUTPUT));
        assert_eq!(saved.state.reactive.get("p2"), Some(&Value::Number(0.0)));
        assert_eq!(saved.state.other["operator"], "+");
    }
}
