// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composite node types: a subgraph frozen into a reusable node.
//!
//! Authoring starts by opening the boundary placeholder, a special node
//! whose ports appear as edges are drawn to or from it. Building freezes
//! the placeholder's connected island into an internal graph, registers a
//! new type whose handles are the placeholder's ports, and replaces the
//! island with a single instance of that type.
//!
//! ```text
//!  [boundary] --x--> [Math] --> [Number] --y--> [boundary]
//!        becomes
//!  x --> [Composite] --> y
//! ```

mod behavior;
mod instantiate;

pub use behavior::{BoundaryBehavior, CompositeBehavior};

use crate::connection::Edge;
use crate::engine::Engine;
use crate::error::{IntegrityError, NotFoundError, Result, ValidationError};
use crate::events::EngineEvent;
use crate::handle::{DataType, HandleDef, HandleKind, ACTIVE, SIGNAL_IN};
use crate::instance::{NodeInstance, Placement};
use crate::node::{NodeTypeDef, Tag, TypeImpl};
use crate::records::{
    BoundaryHandleRecord, CompositeNodeDefinition, PersistedGraph, Position,
};
use crate::registry::ScopeId;
use crate::rename::strip_type;
use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

/// Id of the boundary placeholder, and the node id standing for the
/// composite itself in persisted internal graphs
pub const BOUNDARY_ID: &str = "boundary";
/// Type name shown for the boundary placeholder
pub const BOUNDARY_TYPE: &str = "Node Creator";
/// Placeholder handles that are not boundary ports
pub(crate) const BOUNDARY_PORTS: [&str; 2] = [ACTIVE, SIGNAL_IN];

/// A composite type opened for editing
#[derive(Debug, Clone)]
pub(crate) struct EditSession {
    pub(crate) identifier: String,
    pub(crate) internal_graph_id: String,
    pub(crate) node_ids: Vec<String>,
}

/// Whether internal edges leave `port` (it feeds the internals) rather
/// than enter it
fn feeds_inward(edges: &[Edge], port: &str) -> bool {
    edges
        .iter()
        .any(|e| e.source == BOUNDARY_ID && e.source_handle == port)
}

/// Type definition of a composite, seen from outside
pub(crate) fn composite_type_def(
    identifier: &str,
    definition: &CompositeNodeDefinition,
    graph: &PersistedGraph,
) -> NodeTypeDef {
    let mut def = NodeTypeDef::with_impl(identifier, TypeImpl::Composite).tag(Tag::UserDefined);
    for (port, record) in &definition.handle_definitions {
        let is_signal = record.data_type == DataType::Signal;
        let kind = match (feeds_inward(&graph.edges, port), is_signal) {
            (true, true) => HandleKind::SignalIn,
            (true, false) => HandleKind::Input,
            (false, true) => HandleKind::SignalOut,
            (false, false) => HandleKind::ExtraOutput,
        };
        let mut handle = HandleDef::new(port.clone(), record.data_type, kind);
        if let Some(label) = &record.label {
            handle = handle.with_label(label.clone());
        }
        def = def.handle(handle);
    }
    if definition.is_bangable {
        def = def.bangable();
    }
    if let Some(label) = &definition.action_label {
        def = def.action_label(label.clone());
    }
    def
}

impl Engine {
    /// Place the boundary placeholder to start authoring a composite
    pub fn open_boundary(&mut self, position: Position) -> Result<()> {
        if self.is_boundary_open() {
            return Err(ValidationError::BoundaryAlreadyOpen.into());
        }
        let handles = [
            HandleDef::input(ACTIVE, DataType::Boolean).with_default(true),
            HandleDef::new(SIGNAL_IN, DataType::Signal, HandleKind::SignalOut).with_label("Signal"),
        ]
        .into_iter()
        .map(|h| (h.id.clone(), h))
        .collect();
        let placeholder = NodeInstance::new(
            BOUNDARY_ID,
            BOUNDARY_TYPE,
            ScopeId::ROOT,
            handles,
            Box::new(BoundaryBehavior),
            Placement::Real,
            position,
        );
        self.instances.insert(placeholder)?;
        tracing::debug!("Opened boundary placeholder");
        Ok(())
    }

    /// Whether the boundary placeholder is in the live graph
    pub fn is_boundary_open(&self) -> bool {
        self.instances.resolve(ScopeId::ROOT, BOUNDARY_ID).is_some()
    }

    /// Label a boundary port
    pub fn set_boundary_label(&mut self, port: &str, label: impl Into<String>) -> Result<()> {
        let key = self
            .instances
            .resolve(ScopeId::ROOT, BOUNDARY_ID)
            .ok_or(ValidationError::BoundaryNotOpen)?;
        let handle = self
            .instances
            .get_mut(key)
            .and_then(|b| b.handles.get_mut(port))
            .filter(|h| !BOUNDARY_PORTS.contains(&h.id.as_str()))
            .ok_or_else(|| NotFoundError::Handle {
                node: BOUNDARY_ID.to_string(),
                handle: port.to_string(),
            })?;
        handle.label = Some(label.into());
        Ok(())
    }

    /// Composite type being edited, if any
    pub fn editing(&self) -> Option<&str> {
        self.editing.as_ref().map(|s| s.identifier.as_str())
    }

    /// Persisted definition of a composite type
    pub fn composite_definition(&self, identifier: &str) -> Option<&CompositeNodeDefinition> {
        self.definitions.get(identifier)
    }

    /// Freeze the placeholder's island into a new composite type and
    /// replace it with an instance of that type. Returns the new node's id.
    pub fn build_composite(&mut self, identifier: &str, action_label: Option<&str>) -> Result<String> {
        if self.editing.is_some() {
            return Err(ValidationError::BoundaryAlreadyOpen.into());
        }
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ValidationError::EmptyIdentifier.into());
        }
        if self.types.contains(identifier) {
            return Err(ValidationError::DuplicateTypeName(identifier.to_string()).into());
        }
        let position = self
            .instance(BOUNDARY_ID)
            .map(NodeInstance::position)
            .ok_or(ValidationError::BoundaryNotOpen)?;
        let (island, graph, definition) =
            self.freeze_island(Uuid::new_v4().to_string(), action_label)?;

        self.graphs.put(definition.internal_graph_id.clone(), graph.clone());
        self.definitions.put(identifier, definition.clone());
        self.types
            .register(composite_type_def(identifier, &definition, &graph))?;
        self.events.emit(EngineEvent::TypeRegistryChanged);
        tracing::info!("Created composite {} ({} nodes)", identifier, graph.nodes.len());

        self.remove_island(&island);
        self.close_boundary();
        self.place(identifier, position)
    }

    /// Load a composite's internals into the live graph for editing
    pub fn open_for_editing(&mut self, identifier: &str) -> Result<()> {
        if self.is_boundary_open() {
            return Err(ValidationError::BoundaryAlreadyOpen.into());
        }
        let definition = self
            .definitions
            .get(identifier)
            .cloned()
            .ok_or_else(|| NotFoundError::CompositeDefinition(identifier.to_string()))?;
        if self.is_type_live(identifier) {
            return Err(ValidationError::TypeInUse(identifier.to_string()).into());
        }
        let graph = self
            .graphs
            .get(&definition.internal_graph_id)
            .cloned()
            .ok_or_else(|| NotFoundError::MissingPersistedState(definition.internal_graph_id.clone()))?;

        self.open_boundary(Position::default())?;
        for (port, record) in &definition.handle_definitions {
            let inward = feeds_inward(&graph.edges, port);
            let is_signal = record.data_type == DataType::Signal;
            let kind = match (inward, is_signal) {
                (true, true) => HandleKind::SignalOut,
                (true, false) => HandleKind::ExtraOutput,
                (false, true) => HandleKind::SignalIn,
                (false, false) => HandleKind::Input,
            };
            let mut handle = HandleDef::new(port.clone(), record.data_type, kind);
            handle.label = record.label.clone();
            self.add_boundary_port(handle);
        }

        let ids = match self.load_into_root(&graph) {
            Ok(ids) => ids,
            Err(e) => {
                self.close_boundary();
                return Err(e);
            }
        };
        self.editing = Some(EditSession {
            identifier: identifier.to_string(),
            internal_graph_id: definition.internal_graph_id,
            node_ids: ids.into_values().collect(),
        });
        tracing::info!("Editing composite {}", identifier);
        Ok(())
    }

    /// Write the edited internals back, optionally renaming the type
    pub fn save_editing(&mut self, identifier: &str, action_label: Option<&str>) -> Result<()> {
        let session = self.editing.clone().ok_or(ValidationError::BoundaryNotOpen)?;
        if self.is_type_live(&session.identifier) {
            return Err(ValidationError::TypeInUse(session.identifier).into());
        }
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ValidationError::EmptyIdentifier.into());
        }
        if identifier != session.identifier && self.types.contains(identifier) {
            return Err(ValidationError::DuplicateTypeName(identifier.to_string()).into());
        }
        let (island, graph, definition) =
            self.freeze_island(session.internal_graph_id.clone(), action_label)?;

        let mut cycle = self.transitive_dependents(&session.identifier);
        cycle.insert(session.identifier.clone());
        if let Some(node) = graph.nodes.values().find(|n| cycle.contains(&n.type_name)) {
            return Err(IntegrityError::RecursiveComposite(node.type_name.clone()).into());
        }

        self.graphs.put(session.internal_graph_id.clone(), graph.clone());
        self.definitions.put(session.identifier.clone(), definition.clone());
        if identifier != session.identifier {
            self.rename_type(&session.identifier, identifier)?;
        }
        self.types
            .replace(composite_type_def(identifier, &definition, &graph))?;
        self.events.emit(EngineEvent::TypeRegistryChanged);
        tracing::info!("Saved composite {}", identifier);

        self.remove_island(&island);
        self.close_boundary();
        Ok(())
    }

    /// Discard the composite being authored or edited: the placeholder
    /// and any nodes loaded for editing are removed without saving
    pub fn cancel_editing(&mut self) {
        self.close_boundary();
    }

    pub(crate) fn close_boundary(&mut self) {
        if let Some(session) = self.editing.take() {
            for id in &session.node_ids {
                if let Some(key) = self.instances.resolve(ScopeId::ROOT, id) {
                    self.remove_from_root(key);
                }
            }
        }
        if let Some(key) = self.instances.resolve(ScopeId::ROOT, BOUNDARY_ID) {
            self.remove_from_root(key);
        }
    }

    /// Delete a composite type, removing its nodes from every saved graph
    pub fn delete_composite(&mut self, identifier: &str, confirmed: bool) -> Result<()> {
        let definition = self
            .definitions
            .get(identifier)
            .cloned()
            .ok_or_else(|| NotFoundError::CompositeDefinition(identifier.to_string()))?;
        if !confirmed {
            return Err(ValidationError::ConfirmationRequired(identifier.to_string()).into());
        }
        if self.is_type_live(identifier) || self.editing() == Some(identifier) {
            return Err(ValidationError::TypeInUse(identifier.to_string()).into());
        }

        let report = self.rewrite_referencing_graphs(
            identifier,
            Some(definition.internal_graph_id.as_str()),
            |graph| strip_type(graph, identifier),
        );
        if report.failed.is_some() {
            return Err(IntegrityError::DeletePropagationFailure(report).into());
        }

        self.graphs.delete_durable(&definition.internal_graph_id)?;
        self.definitions.delete_durable(identifier)?;
        self.types.remove(identifier);
        tracing::info!("Deleted composite {} ({} graphs updated)", identifier, report.renamed.len());
        self.events.emit(EngineEvent::TypeRegistryChanged);
        self.events.emit(EngineEvent::GraphListChanged);
        Ok(())
    }

    /// Whether the type, or a composite containing it, has live instances
    pub fn is_type_live(&self, identifier: &str) -> bool {
        let live = self.live_types();
        live.contains(identifier)
            || self
                .transitive_dependents(identifier)
                .iter()
                .any(|t| live.contains(t))
    }

    /// Refuse to place the type being edited, or a composite containing it
    pub(crate) fn ensure_not_editing(&self, type_name: &str) -> Result<()> {
        let Some(session) = &self.editing else {
            return Ok(());
        };
        if type_name == session.identifier
            || self.transitive_dependents(&session.identifier).contains(type_name)
        {
            return Err(ValidationError::TypeInUse(session.identifier.clone()).into());
        }
        Ok(())
    }

    /// Type names of every live instance, internals included
    pub(crate) fn live_types(&self) -> IndexSet<String> {
        self.instances
            .iter()
            .filter(|(_, i)| i.type_name != BOUNDARY_TYPE)
            .map(|(_, i)| i.type_name.clone())
            .collect()
    }

    /// Snapshot the placeholder's island and collect its ports
    fn freeze_island(
        &self,
        internal_graph_id: String,
        action_label: Option<&str>,
    ) -> Result<(IndexSet<String>, PersistedGraph, CompositeNodeDefinition)> {
        let boundary = self.instance(BOUNDARY_ID).ok_or(ValidationError::BoundaryNotOpen)?;
        let island = self
            .instances
            .scope(ScopeId::ROOT)
            .map(|root| root.edges.island(BOUNDARY_ID))
            .unwrap_or_default();
        if island.len() <= 1 {
            return Err(NotFoundError::BoundaryIsland.into());
        }

        let handle_definitions: IndexMap<String, BoundaryHandleRecord> = boundary
            .handles()
            .filter(|h| !BOUNDARY_PORTS.contains(&h.id.as_str()))
            .map(|h| {
                (
                    h.id.clone(),
                    BoundaryHandleRecord {
                        label: h.label.clone(),
                        data_type: h.data_type,
                    },
                )
            })
            .collect();
        let is_bangable = self.is_handle_connected(BOUNDARY_ID, SIGNAL_IN)?;
        if handle_definitions.is_empty() {
            return Err(ValidationError::NoBoundaryHandles.into());
        }

        let graph = self.snapshot_graph(&island, None)?;
        let definition = CompositeNodeDefinition {
            internal_graph_id,
            handle_definitions,
            is_bangable,
            action_label: action_label.map(str::to_string),
        };
        Ok((island, graph, definition))
    }

    fn remove_island(&mut self, island: &IndexSet<String>) {
        for id in island.iter().filter(|id| id.as_str() != BOUNDARY_ID) {
            if let Some(key) = self.instances.resolve(ScopeId::ROOT, id) {
                self.remove_from_root(key);
            }
        }
    }
}
