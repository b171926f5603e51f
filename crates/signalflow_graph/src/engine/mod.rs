// SPDX-License-Identifier: MIT OR Apache-2.0
//! The engine: owns types, instances, edges, timers and persistence.
//!
//! All operations on the live graph go through [`Engine`]. Propagation is
//! synchronous: a call to [`Engine::set_input`] or [`Engine::bang`] returns
//! once every downstream commit has happened, in edge declaration order.

mod connect;
mod persist;
mod propagate;

pub use persist::GraphSummary;

use crate::behavior::NodeBehavior;
use crate::composite::{CompositeBehavior, EditSession};
use crate::config::EngineConfig;
use crate::error::{NotFoundError, Result, ValidationError};
use crate::events::{EngineEvent, EventBus, NotificationLevel};
use crate::guard::LoopGuard;
use crate::handle::{DataType, Value};
use crate::instance::{NodeInstance, Placement};
use crate::node::{NodeTypeDef, TypeImpl, TypeRegistry};
use crate::nodes::builtin_types;
use crate::records::{
    internal_snapshot, CompositeNodeDefinition, PersistedGraph, Position, SavedNodeState,
    DEFINITIONS_COLLECTION, GRAPHS_COLLECTION,
};
use crate::registry::{InstanceKey, InstanceRegistry, ScopeId};
use crate::timer::TimerQueue;
use rand::rngs::StdRng;
use rand::SeedableRng;
use signalflow_store::{Collection, NoticeOp, Store};
use std::time::Duration;
use uuid::Uuid;

/// Signal flow runtime
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) types: TypeRegistry,
    pub(crate) instances: InstanceRegistry,
    pub(crate) timers: TimerQueue,
    pub(crate) guard: LoopGuard,
    pub(crate) events: EventBus,
    pub(crate) rng: StdRng,
    pub(crate) definitions: Collection<CompositeNodeDefinition>,
    pub(crate) graphs: Collection<PersistedGraph>,
    pub(crate) editing: Option<EditSession>,
    store: Store,
}

impl Engine {
    /// Create an engine with the built-in node types registered.
    ///
    /// Persisted records are not loaded until [`Engine::resync`] is called.
    pub fn new(config: EngineConfig, store: Store) -> Result<Self> {
        let mut types = TypeRegistry::new();
        for def in builtin_types() {
            types.register(def)?;
        }
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            guard: LoopGuard::new(&config.loop_guard),
            config,
            types,
            instances: InstanceRegistry::new(),
            timers: TimerQueue::new(),
            events: EventBus::new(),
            rng,
            definitions: store.collection(DEFINITIONS_COLLECTION),
            graphs: store.collection(GRAPHS_COLLECTION),
            editing: None,
            store,
        })
    }

    /// Engine over an in-memory store
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(config, Store::memory()?)
    }

    /// Configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered node types
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Register an additional node type
    pub fn register_type(&mut self, def: NodeTypeDef) -> Result<()> {
        self.types.register(def)?;
        self.events.emit(EngineEvent::TypeRegistryChanged);
        Ok(())
    }

    /// Handle for the shell to read events from
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// Take queued events, including background persistence failures
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        for notice in self.store.drain_notices() {
            let action = match notice.op {
                NoticeOp::Write => "save",
                NoticeOp::Delete => "delete",
            };
            self.events.emit(EngineEvent::Notification {
                level: NotificationLevel::Error,
                message: format!("Failed to {action} {}: {}", notice.key, notice.message),
            });
        }
        self.events.drain()
    }

    /// Wait for queued persistence writes
    pub fn flush(&self) -> Result<()> {
        Ok(self.store.flush()?)
    }

    // ---- live graph ----

    /// Place a new node of `type_name` on the canvas, returning its id
    pub fn place(&mut self, type_name: &str, position: Position) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.construct_in(
            ScopeId::ROOT,
            id.clone(),
            type_name,
            position,
            None,
            Placement::Real,
            &mut Vec::new(),
        )?;
        Ok(id)
    }

    /// Create a node with a given id, optionally restoring saved state
    pub fn construct(
        &mut self,
        id: impl Into<String>,
        type_name: &str,
        snapshot: Option<&SavedNodeState>,
    ) -> Result<()> {
        self.construct_in(
            ScopeId::ROOT,
            id.into(),
            type_name,
            Position::default(),
            snapshot,
            Placement::Real,
            &mut Vec::new(),
        )?;
        Ok(())
    }

    /// Remove a node and every edge touching it
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let key = self.resolve_root(id)?;
        self.remove_from_root(key);
        Ok(())
    }

    /// Ids of the nodes in the live graph
    pub fn node_ids(&self) -> Vec<String> {
        self.instances
            .scope(ScopeId::ROOT)
            .map(|s| s.nodes().map(|(id, _)| id.to_string()).collect())
            .unwrap_or_default()
    }

    /// A node in the live graph
    pub fn instance(&self, id: &str) -> Option<&NodeInstance> {
        self.instances
            .resolve(ScopeId::ROOT, id)
            .and_then(|key| self.instances.get(key))
    }

    /// Write a value into a handle and propagate
    pub fn set_input(&mut self, id: &str, handle: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let key = self.resolve_root(id)?;
        let data_type = self.handle_def(key, handle)?.data_type;
        if !data_type.accepts(value) {
            return Err(ValidationError::ValueType {
                handle: handle.to_string(),
                expected: data_type,
            }
            .into());
        }
        self.set_input_key(key, handle, value)
    }

    /// Fire a signal into a handle
    pub fn bang(&mut self, id: &str, handle: &str) -> Result<()> {
        let key = self.resolve_root(id)?;
        self.handle_def(key, handle)?;
        self.bang_key(key, handle)
    }

    /// Stored value of a handle
    pub fn state(&self, id: &str, handle: &str) -> Result<Option<Value>> {
        let key = self.resolve_root(id)?;
        self.handle_def(key, handle)?;
        Ok(self.instances.get(key).and_then(|i| i.value(handle)))
    }

    /// Stored value of a handle inside nested composites.
    ///
    /// `path` starts with a node of the live graph and continues with ids
    /// inside each composite's internal graph.
    pub fn state_at(&self, path: &[&str], handle: &str) -> Result<Option<Value>> {
        let key = self.resolve_path(path)?;
        self.handle_def(key, handle)?;
        Ok(self.instances.get(key).and_then(|i| i.value(handle)))
    }

    /// Data type of a handle
    pub fn handle_type(&self, id: &str, handle: &str) -> Result<DataType> {
        let key = self.resolve_root(id)?;
        Ok(self.handle_def(key, handle)?.data_type)
    }

    /// Whether any edge touches a handle
    pub fn is_handle_connected(&self, id: &str, handle: &str) -> Result<bool> {
        let key = self.resolve_root(id)?;
        self.handle_def(key, handle)?;
        Ok(self
            .instances
            .scope(ScopeId::ROOT)
            .is_some_and(|s| s.edges.is_handle_connected(id, handle)))
    }

    /// Label of a node's action button, if it is bangable
    pub fn action_label(&self, id: &str) -> Result<Option<String>> {
        let key = self.resolve_root(id)?;
        let instance = self
            .instances
            .get(key)
            .ok_or_else(|| NotFoundError::Instance(id.to_string()))?;
        if let Some(label) = instance.behavior.action_label() {
            return Ok(Some(label));
        }
        Ok(self
            .types
            .get(&instance.type_name)
            .filter(|t| t.is_bangable)
            .map(|t| {
                t.action_label
                    .clone()
                    .unwrap_or_else(|| self.config.default_action_label.clone())
            }))
    }

    /// Apply non-reactive settings such as the operator, then recompute
    pub fn configure(&mut self, id: &str, settings: &serde_json::Value) -> Result<()> {
        let key = self.resolve_root(id)?;
        let instance = self
            .instances
            .get_mut(key)
            .ok_or_else(|| NotFoundError::Instance(id.to_string()))?;
        instance
            .behavior
            .restore_state(settings)
            .map_err(|message| ValidationError::InvalidSettings {
                type_name: instance.type_name.clone(),
                message,
            })?;
        self.recompute(key)
    }

    /// Move a node on the canvas
    pub fn set_position(&mut self, id: &str, position: Position) -> Result<()> {
        let key = self.resolve_root(id)?;
        if let Some(instance) = self.instances.get_mut(key) {
            instance.position = position;
        }
        Ok(())
    }

    /// Advance virtual time, firing due timers in order
    pub fn advance(&mut self, dt: Duration) -> Result<()> {
        let until = self.timers.now() + dt;
        while let Some(due) = self.timers.pop_due(until) {
            let active = self.instances.get(due.owner).is_some_and(NodeInstance::is_active);
            if active {
                self.fan_out_home(due.owner, &due.handle)?;
            }
        }
        self.timers.advance_to(until);
        Ok(())
    }

    /// Number of pending timers
    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    // ---- internals ----

    pub(crate) fn resolve_root(&self, id: &str) -> Result<InstanceKey> {
        self.instances
            .resolve(ScopeId::ROOT, id)
            .ok_or_else(|| NotFoundError::Instance(id.to_string()).into())
    }

    pub(crate) fn resolve_path(&self, path: &[&str]) -> Result<InstanceKey> {
        let mut scope = ScopeId::ROOT;
        let mut found = None;
        for (depth, id) in path.iter().enumerate() {
            if depth > 0 {
                scope = found
                    .and_then(|key| self.instances.get(key))
                    .and_then(NodeInstance::inner_scope)
                    .ok_or_else(|| NotFoundError::Instance(path[..depth].join("/")))?;
            }
            let key = self
                .instances
                .scope(scope)
                .and_then(|s| s.members.get(*id).copied())
                .ok_or_else(|| NotFoundError::Instance(path[..=depth].join("/")))?;
            found = Some(key);
        }
        found.ok_or_else(|| NotFoundError::Instance(String::new()).into())
    }

    pub(crate) fn handle_def(&self, key: InstanceKey, handle: &str) -> Result<&crate::handle::HandleDef> {
        let instance = self
            .instances
            .get(key)
            .ok_or_else(|| NotFoundError::Instance(format!("{key:?}")))?;
        instance.handles.get(handle).ok_or_else(|| {
            NotFoundError::Handle {
                node: instance.id.clone(),
                handle: handle.to_string(),
            }
            .into()
        })
    }

    /// Create an instance, restoring `snapshot` and instantiating composite
    /// internals. `stack` holds the composite types being instantiated.
    pub(crate) fn construct_in(
        &mut self,
        scope: ScopeId,
        id: String,
        type_name: &str,
        position: Position,
        snapshot: Option<&SavedNodeState>,
        placement: Placement,
        stack: &mut Vec<String>,
    ) -> Result<InstanceKey> {
        if scope == ScopeId::ROOT {
            self.ensure_not_editing(type_name)?;
        }
        let def = self
            .types
            .get(type_name)
            .ok_or_else(|| NotFoundError::Type(type_name.to_string()))?;
        let mut behavior: Box<dyn NodeBehavior> = match def.implementation {
            TypeImpl::Builtin(factory) => factory(),
            TypeImpl::Composite => Box::new(CompositeBehavior),
        };
        let is_composite = def.is_composite();
        let handles = def
            .handles
            .iter()
            .map(|h| (h.id.clone(), h.clone()))
            .collect();

        if let Some(snapshot) = snapshot.filter(|_| !is_composite) {
            behavior
                .restore_state(&snapshot.other)
                .map_err(|message| ValidationError::InvalidSettings {
                    type_name: type_name.to_string(),
                    message,
                })?;
        }

        let mut instance =
            NodeInstance::new(id, type_name, scope, handles, behavior, placement, position);
        if let Some(snapshot) = snapshot {
            for (handle, value) in &snapshot.reactive {
                let fits = instance
                    .handles
                    .get(handle)
                    .is_some_and(|h| h.data_type.accepts(*value));
                if fits {
                    instance.state.insert(handle.clone(), *value);
                }
            }
        }

        let key = self.instances.insert(instance)?;
        if is_composite {
            let internal = snapshot.and_then(|s| internal_snapshot(&s.other));
            if let Err(e) = self.instantiate_composite(key, type_name, internal.as_ref(), stack) {
                self.destroy(key);
                return Err(e);
            }
        }
        tracing::debug!("Constructed {} ({:?})", type_name, placement);
        Ok(key)
    }

    /// Tear down an instance and its internals, cancelling their timers.
    /// Edges in the home scope are left to the caller.
    pub(crate) fn destroy(&mut self, key: InstanceKey) {
        let inner = self.instances.get(key).and_then(NodeInstance::inner_scope);
        if let Some(inner) = inner {
            let children: Vec<InstanceKey> = self
                .instances
                .scope(inner)
                .map(|s| s.nodes().map(|(_, k)| k).collect())
                .unwrap_or_default();
            for child in children {
                self.destroy(child);
            }
            self.instances.remove_scope(inner);
        }
        self.timers.cancel_owner(key);
        if let Some(instance) = self.instances.remove(key) {
            tracing::debug!("Destroyed {} ({})", instance.id, instance.type_name);
        }
    }

    /// Remove an instance of the live graph along with its edges
    pub(crate) fn remove_from_root(&mut self, key: InstanceKey) {
        let Some(id) = self.instances.get(key).map(|i| i.id.clone()) else {
            return;
        };
        self.destroy(key);
        if let Some(root) = self.instances.scope_mut(ScopeId::ROOT) {
            root.edges.remove_node(&id);
        }
        self.prune_boundary_ports();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::handle::{MAIN_OUTPUT, SIGNAL_IN};

    pub(crate) fn engine() -> Engine {
        let config = EngineConfig {
            rng_seed: Some(1),
            ..EngineConfig::default()
        };
        Engine::in_memory(config).unwrap()
    }

    #[test]
    fn test_place_and_read_defaults() {
        let mut engine = engine();
        let id = engine.place("Modulus", Position::new(5.0, 5.0)).unwrap();
        assert_eq!(engine.state(&id, "p1").unwrap(), Some(Value::Number(1.0)));
        assert_eq!(engine.handle_type(&id, MAIN_OUTPUT).unwrap(), DataType::Number);
        assert_eq!(engine.node_ids(), vec![id.clone()]);
        assert!(matches!(
            engine.state(&id, "nope"),
            Err(crate::EngineError::NotFound(NotFoundError::Handle { .. }))
        ));
    }

    #[test]
    fn test_unknown_type() {
        let mut engine = engine();
        assert!(matches!(
            engine.place("Nope", Position::default()),
            Err(crate::EngineError::NotFound(NotFoundError::Type(_)))
        ));
    }

    #[test]
    fn test_set_input_type_checked() {
        let mut engine = engine();
        let id = engine.place("Math", Position::default()).unwrap();
        assert!(matches!(
            engine.set_input(&id, "p1", true),
            Err(crate::EngineError::Validation(ValidationError::ValueType { .. }))
        ));
    }

    #[test]
    fn test_construct_with_snapshot() {
        let mut engine = engine();
        let mut snapshot = SavedNodeState::default();
        snapshot.reactive.insert("p1".to_string(), Value::Number(4.0));
        snapshot.reactive.insert("bogus".to_string(), Value::Number(1.0));
        snapshot.other = serde_json::json!({ "operator": "*" });
        engine.construct("m", "Math", Some(&snapshot)).unwrap();

        assert_eq!(engine.state("m", "p1").unwrap(), Some(Value::Number(4.0)));
        engine.set_input("m", "p2", 3.0).unwrap();
        assert_eq!(engine.state("m", MAIN_OUTPUT).unwrap(), Some(Value::Number(12.0)));

        assert!(matches!(
            engine.construct("m", "Math", None),
            Err(crate::EngineError::Validation(ValidationError::DuplicateInstance(_)))
        ));
    }

    #[test]
    fn test_action_labels() {
        let mut engine = engine();
        let rng = engine.place("RNG", Position::default()).unwrap();
        let clock = engine.place("Clock Pulse", Position::default()).unwrap();
        let math = engine.place("Math", Position::default()).unwrap();

        assert_eq!(engine.action_label(&rng).unwrap().as_deref(), Some("Generate"));
        assert_eq!(engine.action_label(&clock).unwrap().as_deref(), Some("Start"));
        assert_eq!(engine.action_label(&math).unwrap(), None);

        engine.set_input(&clock, "interval", 1.0).unwrap();
        engine.bang(&clock, SIGNAL_IN).unwrap();
        assert_eq!(engine.action_label(&clock).unwrap().as_deref(), Some("Stop"));
    }

    #[test]
    fn test_configure_operator() {
        let mut engine = engine();
        let id = engine.place("Comparison", Position::default()).unwrap();
        engine.set_input(&id, "p1", 2.0).unwrap();
        assert_eq!(engine.state(&id, MAIN_OUTPUT).unwrap(), Some(Value::Boolean(false)));

        engine.configure(&id, &serde_json::json!({ "operator": "!=" })).unwrap();
        assert_eq!(engine.state(&id, MAIN_OUTPUT).unwrap(), Some(Value::Boolean(true)));

        assert!(matches!(
            engine.configure(&id, &serde_json::json!({ "operator": "~" })),
            Err(crate::EngineError::Validation(ValidationError::InvalidSettings { .. }))
        ));
    }

    #[test]
    fn test_remove() {
        let mut engine = engine();
        let id = engine.place("Number", Position::default()).unwrap();
        engine.remove(&id).unwrap();
        assert!(engine.node_ids().is_empty());
        assert!(engine.remove(&id).is_err());
    }
}
