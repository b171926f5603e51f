// SPDX-License-Identifier: MIT OR Apache-2.0
//! Renaming and deleting composite types across persisted graphs.
//!
//! A composite type is referenced by name from every graph that contains
//! an instance of it, including the internal graphs of other composites
//! and the nested snapshots saved inside composite nodes. Changing the name
//! rewrites each referencing graph durably, one at a time, and stops at the
//! first failure so the report says exactly which graphs were touched.

use crate::engine::Engine;
use crate::error::{IntegrityError, NotFoundError, Result, ValidationError};
use crate::events::EngineEvent;
use crate::records::{internal_snapshot, PersistedGraph, SavedNode, INTERNAL_STATE_KEY};
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;

/// Progress of a change applied to every graph referencing a type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameReport {
    /// Graphs rewritten
    pub renamed: Vec<String>,
    /// Graph that failed and the reason
    pub failed: Option<(String, String)>,
    /// Graphs not attempted after the failure
    pub skipped: Vec<String>,
}

impl RenameReport {
    /// Number of graphs that needed the change
    pub fn total(&self) -> usize {
        self.renamed.len() + usize::from(self.failed.is_some()) + self.skipped.len()
    }

    /// Description of the failure, if any
    pub fn failure_message(&self) -> String {
        match &self.failed {
            Some((graph, message)) => format!("graph {graph}: {message}"),
            None => "no failure".to_string(),
        }
    }
}

/// Apply `f` to every node in a snapshot map, descending into nested
/// composite snapshots
fn visit_nodes(
    nodes: &mut IndexMap<String, SavedNode>,
    f: &mut dyn FnMut(&mut IndexMap<String, SavedNode>),
) -> std::result::Result<(), String> {
    f(nodes);
    for node in nodes.values_mut() {
        let Some(mut inner) = internal_snapshot(&node.state.other) else {
            continue;
        };
        visit_nodes(&mut inner, f)?;
        let inner = serde_json::to_value(inner).map_err(|e| e.to_string())?;
        if let Some(map) = node.state.other.as_object_mut() {
            map.insert(INTERNAL_STATE_KEY.to_string(), inner);
        }
    }
    Ok(())
}

/// Point every node of type `old` at `new`
pub(crate) fn rename_in_graph(
    graph: &mut PersistedGraph,
    old: &str,
    new: &str,
) -> std::result::Result<(), String> {
    visit_nodes(&mut graph.nodes, &mut |nodes| {
        for node in nodes.values_mut().filter(|n| n.type_name == old) {
            node.type_name = new.to_string();
        }
    })
}

/// Drop every node of `identifier` and the edges touching them
pub(crate) fn strip_type(graph: &mut PersistedGraph, identifier: &str) -> std::result::Result<(), String> {
    let removed: Vec<String> = graph
        .nodes
        .iter()
        .filter(|(_, n)| n.type_name == identifier)
        .map(|(id, _)| id.clone())
        .collect();
    graph
        .edges
        .retain(|e| !removed.contains(&e.source) && !removed.contains(&e.target));
    visit_nodes(&mut graph.nodes, &mut |nodes| {
        nodes.retain(|_, n| n.type_name != identifier);
    })
}

impl Engine {
    /// Composite types whose internal graph uses `identifier`
    pub fn direct_dependents(&self, identifier: &str) -> Vec<String> {
        self.definitions
            .iter()
            .filter(|(name, def)| {
                *name != identifier
                    && self
                        .graphs
                        .get(&def.internal_graph_id)
                        .is_some_and(|g| g.references_type(identifier))
            })
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Composite types that contain `identifier` at any depth
    pub fn transitive_dependents(&self, identifier: &str) -> IndexSet<String> {
        let mut found = IndexSet::new();
        let mut queue = VecDeque::from([identifier.to_string()]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(&current) {
                if dependent != identifier && found.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        found
    }

    /// Rewrite every stored graph referencing `identifier`, durably and in
    /// order, stopping at the first failure. `exclude` names a graph to
    /// leave alone.
    pub(crate) fn rewrite_referencing_graphs(
        &mut self,
        identifier: &str,
        exclude: Option<&str>,
        mut f: impl FnMut(&mut PersistedGraph) -> std::result::Result<(), String>,
    ) -> RenameReport {
        let keys: Vec<String> = self
            .graphs
            .iter()
            .filter(|(key, graph)| Some(*key) != exclude && graph.references_type(identifier))
            .map(|(key, _)| key.to_string())
            .collect();

        let mut report = RenameReport::default();
        let mut pending = keys.into_iter();
        for key in pending.by_ref() {
            let Some(mut graph) = self.graphs.get(&key).cloned() else {
                continue;
            };
            let outcome = f(&mut graph).and_then(|()| {
                self.graphs
                    .put_durable(key.clone(), graph)
                    .map_err(|e| e.to_string())
            });
            match outcome {
                Ok(()) => report.renamed.push(key),
                Err(message) => {
                    tracing::error!("Failed to update graph {}: {}", key, message);
                    report.failed = Some((key, message));
                    break;
                }
            }
        }
        report.skipped = pending.collect();
        if !report.renamed.is_empty() {
            self.events.emit(EngineEvent::GraphListChanged);
        }
        report
    }

    /// Rename a composite type everywhere it is referenced.
    ///
    /// Referencing graphs are rewritten first; if one fails the definition
    /// keeps its old name and the error carries the per-graph report.
    pub fn rename_type(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if new.is_empty() {
            return Err(ValidationError::EmptyIdentifier.into());
        }
        if old == new {
            return Ok(());
        }
        if self.types.contains(new) {
            return Err(ValidationError::DuplicateTypeName(new.to_string()).into());
        }
        let definition = self
            .definitions
            .get(old)
            .cloned()
            .ok_or_else(|| NotFoundError::CompositeDefinition(old.to_string()))?;

        let report = self.rewrite_referencing_graphs(old, None, |graph| rename_in_graph(graph, old, new));
        if report.failed.is_some() {
            return Err(IntegrityError::RenamePropagationFailure(report).into());
        }

        self.definitions.put_durable(new, definition)?;
        self.definitions.delete_durable(old)?;
        self.types.rename(old, new)?;
        for (_, instance) in self.instances.iter_mut() {
            if instance.type_name == old {
                instance.type_name = new.to_string();
            }
        }
        if let Some(session) = self.editing.as_mut().filter(|s| s.identifier == old) {
            session.identifier = new.to_string();
        }

        tracing::info!("Renamed {} to {} in {} graphs", old, new, report.renamed.len());
        self.events.emit(EngineEvent::TypeRegistryChanged);
        Ok(())
    }
}
