// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node type definitions and the type registry.

use crate::behavior::NodeBehavior;
use crate::error::ValidationError;
use crate::handle::{is_reserved, DataType, HandleDef, HandleKind, ACTIVE, MAIN_OUTPUT, SIGNAL_IN, SIGNAL_OUT};
use indexmap::IndexMap;

/// Creates the behavior for a built-in node
pub type BehaviorFactory = fn() -> Box<dyn NodeBehavior>;

/// Type tag, used by the shell for grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Bangable node
    Action,
    /// Node without a signal input
    NotAction,
    /// Composite created by the user
    UserDefined,
    /// Node with a selectable operator
    Operation,
}

/// How instances of a type get their behavior
#[derive(Debug, Clone, Copy)]
pub enum TypeImpl {
    /// Native behavior
    Builtin(BehaviorFactory),
    /// Composite backed by a persisted internal graph
    Composite,
}

/// A registered node type
#[derive(Debug, Clone)]
pub struct NodeTypeDef {
    /// Unique identifier, also the display name
    pub identifier: String,
    /// Handles in declaration order
    pub handles: Vec<HandleDef>,
    /// Whether the type has signal in/out handles
    pub is_bangable: bool,
    /// Label of the action button
    pub action_label: Option<String>,
    /// Declared and derived tags
    pub tags: Vec<Tag>,
    /// Behavior source
    pub implementation: TypeImpl,
}

impl NodeTypeDef {
    /// Create a built-in type
    pub fn builtin(identifier: impl Into<String>, factory: BehaviorFactory) -> Self {
        Self::with_impl(identifier, TypeImpl::Builtin(factory))
    }

    /// Create a type with an explicit implementation
    pub fn with_impl(identifier: impl Into<String>, implementation: TypeImpl) -> Self {
        Self {
            identifier: identifier.into(),
            handles: Vec::new(),
            is_bangable: false,
            action_label: None,
            tags: Vec::new(),
            implementation,
        }
    }

    /// Add a handle
    pub fn handle(mut self, handle: HandleDef) -> Self {
        self.handles.push(handle);
        self
    }

    /// Give the type signal in/out handles
    pub fn bangable(mut self) -> Self {
        self.is_bangable = true;
        self
    }

    /// Set the action button label
    pub fn action_label(mut self, label: impl Into<String>) -> Self {
        self.action_label = Some(label.into());
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: Tag) -> Self {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    /// Look up a handle by id
    pub fn find_handle(&self, id: &str) -> Option<&HandleDef> {
        self.handles.iter().find(|h| h.id == id)
    }

    /// Whether this is a composite type
    pub fn is_composite(&self) -> bool {
        matches!(self.implementation, TypeImpl::Composite)
    }

    /// Check declared handles and add the implicit ones
    fn finalize(mut self) -> Result<Self, ValidationError> {
        if self.identifier.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }

        let mut seen = std::collections::HashSet::new();
        let mut main_outputs = 0;
        for handle in &self.handles {
            if !seen.insert(handle.id.as_str()) {
                return Err(ValidationError::DuplicateHandle {
                    type_name: self.identifier.clone(),
                    handle: handle.id.clone(),
                });
            }
            let is_main = handle.kind == HandleKind::MainOutput;
            if is_main {
                main_outputs += 1;
            }
            if is_reserved(&handle.id) && !(is_main && handle.id == MAIN_OUTPUT) {
                return Err(ValidationError::ReservedHandle(handle.id.clone()));
            }
            if is_main && handle.id != MAIN_OUTPUT {
                return Err(ValidationError::ReservedHandle(handle.id.clone()));
            }
        }
        if main_outputs > 1 {
            return Err(ValidationError::MultipleMainOutputs(self.identifier));
        }

        self.handles.push(
            HandleDef::input(ACTIVE, DataType::Boolean)
                .with_label("Active")
                .with_default(true),
        );
        if self.is_bangable {
            self.handles.push(HandleDef::new(SIGNAL_IN, DataType::Signal, HandleKind::SignalIn));
            self.handles.push(HandleDef::new(SIGNAL_OUT, DataType::Signal, HandleKind::SignalOut));
        }

        self.tags.retain(|t| !matches!(t, Tag::Action | Tag::NotAction));
        self.tags
            .push(if self.is_bangable { Tag::Action } else { Tag::NotAction });
        if self.is_composite() && !self.tags.contains(&Tag::UserDefined) {
            self.tags.push(Tag::UserDefined);
        }

        Ok(self)
    }
}

/// Registry of available node types
#[derive(Default)]
pub struct TypeRegistry {
    types: IndexMap<String, NodeTypeDef>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Implicit handles and derived tags are added here.
    pub fn register(&mut self, def: NodeTypeDef) -> Result<(), ValidationError> {
        if self.types.contains_key(&def.identifier) {
            return Err(ValidationError::DuplicateIdentifier(def.identifier));
        }
        let def = def.finalize()?;
        tracing::debug!("Registered node type {}", def.identifier);
        self.types.insert(def.identifier.clone(), def);
        Ok(())
    }

    /// Replace a type definition, keeping its position
    pub(crate) fn replace(&mut self, def: NodeTypeDef) -> Result<(), ValidationError> {
        let def = def.finalize()?;
        match self.types.get_mut(&def.identifier) {
            Some(existing) => *existing = def,
            None => {
                self.types.insert(def.identifier.clone(), def);
            }
        }
        Ok(())
    }

    /// Move a type to a new identifier, keeping its position
    pub(crate) fn rename(&mut self, old: &str, new: &str) -> Result<(), ValidationError> {
        if self.types.contains_key(new) {
            return Err(ValidationError::DuplicateTypeName(new.to_string()));
        }
        let Some(index) = self.types.get_index_of(old) else {
            return Ok(());
        };
        if let Some((_, mut def)) = self.types.shift_remove_index(index) {
            def.identifier = new.to_string();
            self.types.insert(new.to_string(), def);
            let last = self.types.len() - 1;
            self.types.move_index(last, index);
        }
        Ok(())
    }

    /// Remove a type
    pub(crate) fn remove(&mut self, identifier: &str) -> Option<NodeTypeDef> {
        self.types.shift_remove(identifier)
    }

    /// Get a type
    pub fn get(&self, identifier: &str) -> Option<&NodeTypeDef> {
        self.types.get(identifier)
    }

    /// Whether a type is registered
    pub fn contains(&self, identifier: &str) -> bool {
        self.types.contains_key(identifier)
    }

    /// All types in registration order
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDef> {
        self.types.values()
    }

    /// Types carrying a tag
    pub fn types_with_tag(&self, tag: Tag) -> impl Iterator<Item = &NodeTypeDef> {
        self.types.values().filter(move |t| t.tags.contains(&tag))
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
