// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the engine.
//!
//! Authoring mistakes are [`ValidationError`]s and are meant to be shown to
//! the user. [`NotFoundError`] during propagation means the graph is
//! structurally corrupt and aborts the operation. [`IntegrityError`] reports
//! persisted state that no longer agrees with itself.

use crate::handle::DataType;
use crate::rename::RenameReport;
use signalflow_store::StoreError;
use thiserror::Error;

/// Any engine failure
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected authoring operation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing instance, handle, graph or state
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Inconsistent persisted state
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Integrity(IntegrityError::Store(e))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Rejected authoring operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A node type with this identifier is already registered
    #[error("Node type already registered: {0}")]
    DuplicateIdentifier(String),

    /// A composite with this name already exists
    #[error("A node type named '{0}' already exists")]
    DuplicateTypeName(String),

    /// Type or graph name is empty
    #[error("Name must not be empty")]
    EmptyIdentifier,

    /// Two handles on one type share an id
    #[error("Handle '{handle}' declared twice on '{type_name}'")]
    DuplicateHandle {
        /// Node type
        type_name: String,
        /// Handle id
        handle: String,
    },

    /// More than one main output declared
    #[error("Node type '{0}' declares more than one main output")]
    MultipleMainOutputs(String),

    /// A reserved handle id was used where it is not allowed
    #[error("Handle id '{0}' is reserved")]
    ReservedHandle(String),

    /// An instance id is already taken in this scope
    #[error("Node id already in use: {0}")]
    DuplicateInstance(String),

    /// Edge from a node to itself
    #[error("A node cannot connect to itself")]
    SelfLoop,

    /// Edge from a handle to itself
    #[error("A handle cannot connect to itself")]
    SameHandle,

    /// Main output wired into another main output
    #[error("Cannot connect an output to another output")]
    OutputToOutput,

    /// Source is not an output or target is not an input
    #[error("Connection must run from an output to an input")]
    WrongDirection,

    /// Handle data types differ
    #[error("Cannot connect {source_type:?} to {target_type:?}")]
    TypeMismatch {
        /// Source handle type
        source_type: DataType,
        /// Target handle type
        target_type: DataType,
    },

    /// A value does not fit the handle's data type
    #[error("Handle '{handle}' expects {expected:?}")]
    ValueType {
        /// Handle id
        handle: String,
        /// Expected data type
        expected: DataType,
    },

    /// Composite would have no ports
    #[error("A node needs at least one input or output")]
    NoBoundaryHandles,

    /// Type (or a dependent) is placed in the live graph
    #[error("Node type '{0}' is in use in the current graph")]
    TypeInUse(String),

    /// Destructive operation without confirmation
    #[error("Deleting '{0}' requires confirmation")]
    ConfirmationRequired(String),

    /// A boundary placeholder is already open
    #[error("A node is already being created or edited")]
    BoundaryAlreadyOpen,

    /// Operation needs an open boundary placeholder
    #[error("No node is being created or edited")]
    BoundaryNotOpen,

    /// Non-reactive state could not be applied
    #[error("Invalid settings for '{type_name}': {message}")]
    InvalidSettings {
        /// Node type
        type_name: String,
        /// Problem description
        message: String,
    },
}

/// Something expected to exist does not
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotFoundError {
    /// No instance with this id is reachable
    #[error("Node not found: {0}")]
    Instance(String),

    /// Instance has no such handle
    #[error("Handle '{handle}' not found on node {node}")]
    Handle {
        /// Node id
        node: String,
        /// Handle id
        handle: String,
    },

    /// No registered type with this identifier
    #[error("Node type not found: {0}")]
    Type(String),

    /// No persisted graph with this id
    #[error("Graph not found: {0}")]
    Graph(String),

    /// No composite definition with this identifier
    #[error("Composite definition not found: {0}")]
    CompositeDefinition(String),

    /// The boundary placeholder is not part of any island
    #[error("No nodes are connected to the node being created")]
    BoundaryIsland,

    /// Persisted state needed to instantiate a node is missing
    #[error("Missing persisted state for {0}")]
    MissingPersistedState(String),

    /// No edge with this id
    #[error("Connection not found: {0}")]
    Edge(String),
}

/// Persisted state that no longer agrees with itself
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Some dependents were rewritten and some were not
    #[error("Rename stopped after {} of {} dependents: {}", .0.renamed.len(), .0.total(), .0.failure_message())]
    RenamePropagationFailure(RenameReport),

    /// Deleting a type stopped partway through its dependent graphs
    #[error("Delete stopped after {} of {} graphs: {}", .0.renamed.len(), .0.total(), .0.failure_message())]
    DeletePropagationFailure(RenameReport),

    /// A composite contains itself
    #[error("Composite '{0}' contains itself")]
    RecursiveComposite(String),

    /// Composite nesting exceeds the configured limit
    #[error("Composite nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    /// A persisted record references something invalid
    #[error("Corrupt reference in {record}: {message}")]
    CorruptReference {
        /// Record key
        record: String,
        /// Problem description
        message: String,
    },

    /// Durable storage failed
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
