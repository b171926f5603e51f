// SPDX-License-Identifier: MIT OR Apache-2.0
//! Instance registry with chained scopes.
//!
//! Every instance lives in one arena and belongs to a scope. The live graph
//! is the root scope; each composite instance owns an inner scope whose
//! parent is the scope the composite lives in. Id lookups walk the chain
//! from the innermost scope outwards, so internal ids shadow outer ones and
//! the same saved ids can be reused by every instance of a composite.
//!
//! ```text
//! root ── members {a, p1}          edges of the live graph
//!  └─ inner(p1) ── members {x, y, p1*}   p1* aliases the composite itself
//! ```

use crate::error::ValidationError;
use crate::graph::EdgeSet;
use crate::instance::NodeInstance;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Arena key of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(u64);

impl InstanceKey {
    /// Key from a raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Identifier of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// The live graph
    pub const ROOT: Self = Self(0);
}

/// A set of instances and the edges between them
#[derive(Debug, Default)]
pub struct Scope {
    /// Enclosing scope for fallback lookups
    pub parent: Option<ScopeId>,
    /// Composite instance owning this scope
    pub owner: Option<InstanceKey>,
    /// Ids visible in this scope, in insertion order
    pub members: IndexMap<String, InstanceKey>,
    /// Edges between members
    pub edges: EdgeSet,
}

impl Scope {
    /// Members other than the owning composite's alias
    pub fn nodes(&self) -> impl Iterator<Item = (&str, InstanceKey)> {
        let owner = self.owner;
        self.members
            .iter()
            .filter(move |(_, key)| Some(**key) != owner)
            .map(|(id, key)| (id.as_str(), *key))
    }
}

/// Arena of instances plus their scopes
pub struct InstanceRegistry {
    instances: HashMap<InstanceKey, NodeInstance>,
    scopes: HashMap<ScopeId, Scope>,
    next_key: u64,
    next_scope: u64,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    /// Create a registry with an empty root scope
    pub fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(ScopeId::ROOT, Scope::default());
        Self {
            instances: HashMap::new(),
            scopes,
            next_key: 0,
            next_scope: 1,
        }
    }

    /// Create a child scope
    pub fn create_scope(&mut self, parent: ScopeId, owner: Option<InstanceKey>) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        self.scopes.insert(
            id,
            Scope {
                parent: Some(parent),
                owner,
                ..Scope::default()
            },
        );
        id
    }

    /// Drop a scope. Its instances must already be removed.
    pub fn remove_scope(&mut self, id: ScopeId) -> Option<Scope> {
        if id == ScopeId::ROOT {
            return None;
        }
        self.scopes.remove(&id)
    }

    /// Get a scope
    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    /// Get a scope mutably
    pub fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(&id)
    }

    /// Add an instance to its scope
    pub fn insert(&mut self, instance: NodeInstance) -> Result<InstanceKey, ValidationError> {
        let scope = self
            .scopes
            .get_mut(&instance.scope)
            .ok_or_else(|| ValidationError::DuplicateInstance(instance.id.clone()))?;
        if scope.members.contains_key(&instance.id) {
            return Err(ValidationError::DuplicateInstance(instance.id.clone()));
        }
        let key = InstanceKey(self.next_key);
        self.next_key += 1;
        scope.members.insert(instance.id.clone(), key);
        self.instances.insert(key, instance);
        Ok(key)
    }

    /// Make `key` visible under `id` in another scope
    pub fn alias(&mut self, scope: ScopeId, id: impl Into<String>, key: InstanceKey) {
        if let Some(scope) = self.scopes.get_mut(&scope) {
            scope.members.insert(id.into(), key);
        }
    }

    /// Remove an instance from the arena and its scope
    pub fn remove(&mut self, key: InstanceKey) -> Option<NodeInstance> {
        let instance = self.instances.remove(&key)?;
        if let Some(scope) = self.scopes.get_mut(&instance.scope) {
            if scope.members.get(&instance.id) == Some(&key) {
                scope.members.shift_remove(&instance.id);
            }
        }
        Some(instance)
    }

    /// Get an instance
    pub fn get(&self, key: InstanceKey) -> Option<&NodeInstance> {
        self.instances.get(&key)
    }

    /// Get an instance mutably
    pub fn get_mut(&mut self, key: InstanceKey) -> Option<&mut NodeInstance> {
        self.instances.get_mut(&key)
    }

    /// Find an id from `scope` outwards
    pub fn resolve(&self, scope: ScopeId, id: &str) -> Option<InstanceKey> {
        let mut current = Some(scope);
        while let Some(scope_id) = current {
            let scope = self.scopes.get(&scope_id)?;
            if let Some(key) = scope.members.get(id) {
                return Some(*key);
            }
            current = scope.parent;
        }
        None
    }

    /// All live instances
    pub fn iter(&self) -> impl Iterator<Item = (InstanceKey, &NodeInstance)> {
        self.instances.iter().map(|(k, v)| (*k, v))
    }

    /// All live instances, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (InstanceKey, &mut NodeInstance)> {
        self.instances.iter_mut().map(|(k, v)| (*k, v))
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether there are no instances
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
