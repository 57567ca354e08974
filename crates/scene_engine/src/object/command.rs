//! Tree work requested from inside handlers
//!
//! Handlers only ever see their own [`ObjectBase`](super::ObjectBase), so
//! anything that touches other nodes or the tree structure is queued as a
//! [`TreeCommand`] and carried out by the scene tree once the handler returns.

use super::signal::ConnectFlags;
use crate::foundation::collections::NodeId;
use crate::meta::Value;

/// A tree operation expressed as data
#[derive(Debug, Clone, PartialEq)]
pub enum TreeCommand {
    /// Attach `child` under `parent`
    Attach {
        /// New parent
        parent: NodeId,
        /// Node to attach
        child: NodeId,
    },
    /// Detach `child` from `parent`
    Detach {
        /// Current parent
        parent: NodeId,
        /// Node to detach
        child: NodeId,
    },
    /// Tear down a node and its children
    Free(NodeId),
    /// Reorder a child among its siblings
    MoveChild {
        /// Parent whose children are reordered
        parent: NodeId,
        /// Child to move
        child: NodeId,
        /// New position
        index: usize,
    },
    /// Subscribe `target.method` to a signal of `source`
    Connect {
        /// Emitting node
        source: NodeId,
        /// Signal name
        signal: String,
        /// Receiving node
        target: NodeId,
        /// Handler method
        method: String,
        /// Connection options
        flags: ConnectFlags,
    },
    /// Remove a subscription, leniently
    Disconnect {
        /// Emitting node
        source: NodeId,
        /// Signal name
        signal: String,
        /// Receiving node
        target: NodeId,
        /// Handler method
        method: String,
    },
    /// Invoke a method by name
    Call {
        /// Receiving node
        target: NodeId,
        /// Method name
        method: String,
        /// Call arguments
        args: Vec<Value>,
    },
    /// Write a property by name
    Set {
        /// Receiving node
        target: NodeId,
        /// Property name
        property: String,
        /// New value
        value: Value,
    },
}

impl TreeCommand {
    /// Node the command is primarily about, used to attribute failures
    pub fn subject(&self) -> NodeId {
        match self {
            Self::Attach { child, .. } | Self::Detach { child, .. } | Self::MoveChild { child, .. } => *child,
            Self::Free(node) => *node,
            Self::Connect { source, .. } | Self::Disconnect { source, .. } => *source,
            Self::Call { target, .. } | Self::Set { target, .. } => *target,
        }
    }

    /// Whether the command changes tree structure
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Attach { .. } | Self::Detach { .. } | Self::Free(_) | Self::MoveChild { .. }
        )
    }
}

/// Side effect recorded by a handler, drained by the tree after it returns
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// Signal emission, delivered synchronously once the handler returns
    Emit {
        /// Signal name
        signal: String,
        /// Emission arguments
        args: Vec<Value>,
    },
    /// Command applied as soon as the handler returns
    Request(TreeCommand),
    /// Command applied after the outermost tree operation completes
    Defer(TreeCommand),
}
