// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signal flow node graph engine.
//!
//! This crate is the runtime behind a visual node-based editor:
//! - Typed handles (number, boolean, signal) on registered node types
//! - Synchronous propagation of values and discrete signals along edges
//! - Composite node types built from a connected island of nodes, nestable
//!   to any depth
//! - Saved graphs and composite definitions in a keyed record store
//!
//! ## Architecture
//!
//! [`Engine`] owns everything: the [`TypeRegistry`], an arena of
//! [`NodeInstance`]s organised in chained scopes, the edges of each scope,
//! virtual-time timers and the record collections. Node kinds implement
//! [`NodeBehavior`]; the engine commits their results and fans them out.
//!
//! The editor shell drives the engine through its methods and reads
//! [`EngineEvent`]s from the [`EventBus`].

pub mod behavior;
pub mod composite;
pub mod config;
pub mod connection;
mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod guard;
pub mod handle;
pub mod instance;
pub mod node;
pub mod nodes;
pub mod records;
pub mod registry;
pub mod rename;
pub mod timer;

pub use behavior::{Effect, NodeBehavior, Outcome, TransformCx};
pub use composite::{BOUNDARY_ID, BOUNDARY_TYPE};
pub use config::{EngineConfig, LoopGuardConfig};
pub use connection::{Edge, EdgeId};
pub use engine::{Engine, GraphSummary};
pub use error::{EngineError, IntegrityError, NotFoundError, Result, ValidationError};
pub use events::{EngineEvent, EventBus, NotificationLevel};
pub use handle::{DataType, HandleDef, HandleKind, Value};
pub use instance::{NodeInstance, Placement};
pub use node::{NodeTypeDef, Tag, TypeRegistry};
pub use records::{CompositeNodeDefinition, PersistedGraph, Position, SavedNode, SavedNodeState};
pub use rename::RenameReport;
