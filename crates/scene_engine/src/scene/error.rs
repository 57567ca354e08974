//! Scene tree errors

use thiserror::Error;

use super::definition::DefinitionError;
use super::notification::DispatchReport;
use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::foundation::collections::NodeId;
use crate::meta::RegistryError;
use crate::object::ObjectError;

/// Errors raised by scene tree operations
#[derive(Error, Debug)]
pub enum SceneError {
    /// Handle refers to a node that was destroyed
    #[error("{0:?} refers to a destroyed node")]
    StaleReference(NodeId),

    /// Attaching would make a node its own ancestor
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    CycleRejected {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// Structural change of a subtree that is mid-cascade
    #[error("{0:?} belongs to a subtree that is being cascaded; defer the change instead")]
    ReentrantMutation(NodeId),

    /// Child already has a parent
    #[error("{0:?} already has a parent")]
    AlreadyParented(NodeId),

    /// Node must be detached first
    #[error("{0:?} is still attached to a parent")]
    StillAttached(NodeId),

    /// Node must have no children
    #[error("{0:?} still has children")]
    HasChildren(NodeId),

    /// Not a child of the given parent
    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Given parent
        parent: NodeId,
        /// Given child
        child: NodeId,
    },

    /// The tree root cannot be detached, reparented or destroyed
    #[error("the tree root cannot be detached, reparented or destroyed")]
    RootLocked,

    /// Child position out of range
    #[error("index {index} out of range for {len} children")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of children
        len: usize,
    },

    /// Type is not registered
    #[error("type '{0}' is not registered")]
    UnknownType(String),

    /// Path does not resolve to a node
    #[error("no node at path '{0}'")]
    NodeNotFound(String),

    /// Handler chains nested deeper than the dispatch limit
    #[error("dispatch nested deeper than {0} levels")]
    RecursionLimit(usize),

    /// Member resolution or signal failure
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// Type registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Invalid scene definition
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Invalid tree configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Resource loading failure
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Handler failures collected during a dispatch
    #[error("{} handler failure(s) during dispatch", .0.len())]
    Dispatch(DispatchReport),
}
