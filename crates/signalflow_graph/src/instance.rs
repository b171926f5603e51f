// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime node instances.

use crate::behavior::NodeBehavior;
use crate::handle::{HandleDef, Value, ACTIVE};
use crate::records::Position;
use crate::registry::ScopeId;
use indexmap::IndexMap;

/// How an instance was created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Placed on the editor canvas
    Real,
    /// Created to execute a composite's internals
    Virtual,
}

/// A placed node: typed state plus its behavior
pub struct NodeInstance {
    pub(crate) id: String,
    pub(crate) type_name: String,
    pub(crate) scope: ScopeId,
    pub(crate) inner: Option<ScopeId>,
    pub(crate) handles: IndexMap<String, HandleDef>,
    pub(crate) state: IndexMap<String, Value>,
    pub(crate) behavior: Box<dyn NodeBehavior>,
    pub(crate) placement: Placement,
    pub(crate) position: Position,
}

impl NodeInstance {
    /// Create an instance with every value handle at its initial value
    pub fn new(
        id: impl Into<String>,
        type_name: impl Into<String>,
        scope: ScopeId,
        handles: IndexMap<String, HandleDef>,
        behavior: Box<dyn NodeBehavior>,
        placement: Placement,
        position: Position,
    ) -> Self {
        let state = handles
            .values()
            .filter_map(|h| h.initial_value().map(|v| (h.id.clone(), v)))
            .collect();
        Self {
            id: id.into(),
            type_name: type_name.into(),
            scope,
            inner: None,
            handles,
            state,
            behavior,
            placement,
            position,
        }
    }

    /// Instance id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Node type identifier
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Real or virtual
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Canvas position
    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether the node reacts to inputs and bangs
    pub fn is_active(&self) -> bool {
        self.state.get(ACTIVE).map_or(true, |v| v.as_bool())
    }

    /// Stored value of a handle
    pub fn value(&self, handle: &str) -> Option<Value> {
        self.state.get(handle).copied()
    }

    /// Handle definition
    pub fn handle(&self, id: &str) -> Option<&HandleDef> {
        self.handles.get(id)
    }

    /// All handles in declaration order
    pub fn handles(&self) -> impl Iterator<Item = &HandleDef> {
        self.handles.values()
    }

    /// Whether this is a composite with live internals
    pub fn is_composite(&self) -> bool {
        self.inner.is_some()
    }

    /// Scope holding this instance's internals
    pub fn inner_scope(&self) -> Option<ScopeId> {
        self.inner
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("placement", &self.placement)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::Inert;
    use crate::handle::DataType;

    #[test]
    fn test_initial_state() {
        let handles: IndexMap<_, _> = [
            HandleDef::input("p1", DataType::Number).with_default(1.0),
            HandleDef::signal_out("pulse"),
            HandleDef::input(ACTIVE, DataType::Boolean).with_default(true),
        ]
        .into_iter()
        .map(|h| (h.id.clone(), h))
        .collect();
        let mut node = NodeInstance::new(
            "n",
            "Test",
            ScopeId::ROOT,
            handles,
            Box::new(Inert),
            Placement::Real,
            Position::default(),
        );

        assert_eq!(node.value("p1"), Some(Value::Number(1.0)));
        assert_eq!(node.value("pulse"), None);
        assert!(node.is_active());
        node.state.insert(ACTIVE.to_string(), Value::Boolean(false));
        assert!(!node.is_active());
    }
}
