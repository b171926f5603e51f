// SPDX-License-Identifier: MIT OR Apache-2.0
//! Building a composite instance's internal graph.

use super::BOUNDARY_ID;
use crate::engine::Engine;
use crate::error::{IntegrityError, NotFoundError, Result};
use crate::graph::EdgeSet;
use crate::handle::{is_reserved, DataType};
use crate::instance::Placement;
use crate::records::SavedNode;
use crate::registry::{InstanceKey, ScopeId};
use indexmap::IndexMap;

impl Engine {
    /// Create the virtual internals of composite `key` from its persisted
    /// internal graph, using `internal` snapshots where present.
    pub(crate) fn instantiate_composite(
        &mut self,
        key: InstanceKey,
        type_name: &str,
        internal: Option<&IndexMap<String, SavedNode>>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        if stack.iter().any(|t| t == type_name) {
            return Err(IntegrityError::RecursiveComposite(type_name.to_string()).into());
        }
        if stack.len() >= self.config.max_composite_depth {
            return Err(IntegrityError::NestingTooDeep(self.config.max_composite_depth).into());
        }
        let definition = self
            .definitions
            .get(type_name)
            .cloned()
            .ok_or_else(|| NotFoundError::CompositeDefinition(type_name.to_string()))?;
        let graph = self
            .graphs
            .get(&definition.internal_graph_id)
            .cloned()
            .ok_or_else(|| NotFoundError::MissingPersistedState(definition.internal_graph_id.clone()))?;

        let (home, id) = self
            .instances
            .get(key)
            .map(|i| (i.scope, i.id.clone()))
            .ok_or_else(|| NotFoundError::Instance(type_name.to_string()))?;
        let inner = self.instances.create_scope(home, Some(key));
        self.instances.alias(inner, id.clone(), key);
        if let Some(instance) = self.instances.get_mut(key) {
            instance.inner = Some(inner);
        }

        let edges: EdgeSet = graph
            .edges
            .into_iter()
            .map(|mut e| {
                e.remap_node(BOUNDARY_ID, &id);
                e
            })
            .collect();
        if let Some(scope) = self.instances.scope_mut(inner) {
            scope.edges = edges;
        }

        stack.push(type_name.to_string());
        let built = self.construct_internals(inner, &graph.nodes, internal, stack);
        stack.pop();
        built?;

        self.derive_boundary_state(key, inner, &id);
        tracing::debug!("Instantiated {} with {} internal nodes", type_name, graph.nodes.len());
        Ok(())
    }

    fn construct_internals(
        &mut self,
        inner: ScopeId,
        nodes: &IndexMap<String, SavedNode>,
        internal: Option<&IndexMap<String, SavedNode>>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        for (node_id, saved) in nodes {
            let state = internal
                .and_then(|snapshots| snapshots.get(node_id))
                .filter(|snapshot| snapshot.type_name == saved.type_name)
                .map_or(&saved.state, |snapshot| &snapshot.state);
            self.construct_in(
                inner,
                node_id.clone(),
                &saved.type_name,
                saved.position,
                Some(state),
                Placement::Virtual,
                stack,
            )?;
        }
        Ok(())
    }

    /// Seed boundary port values from the internals: an input port mirrors
    /// the first internal handle it feeds, an output port mirrors the first
    /// internal handle feeding it.
    fn derive_boundary_state(&mut self, key: InstanceKey, inner: ScopeId, id: &str) {
        let ports: Vec<(String, bool)> = match self.instances.get(key) {
            Some(instance) => instance
                .handles()
                .filter(|h| h.data_type != DataType::Signal && !is_reserved(&h.id))
                .map(|h| (h.id.clone(), h.kind.is_target()))
                .collect(),
            None => return,
        };

        for (port, is_input) in ports {
            let Some(scope) = self.instances.scope(inner) else {
                return;
            };
            let end = if is_input {
                scope
                    .edges
                    .from_handle(id, &port)
                    .next()
                    .map(|e| (e.target.clone(), e.target_handle.clone()))
            } else {
                scope
                    .edges
                    .into_handle(id, &port)
                    .next()
                    .map(|e| (e.source.clone(), e.source_handle.clone()))
            };
            let value = end.and_then(|(node, handle)| {
                let key = self.instances.resolve(inner, &node)?;
                self.instances.get(key)?.value(&handle)
            });
            if let (Some(value), Some(instance)) = (value, self.instances.get_mut(key)) {
                instance.state.insert(port, value);
            }
        }
    }
}
