//! Lifecycle notifications and dispatch reports

use std::fmt;

use super::error::SceneError;
use crate::foundation::collections::NodeId;

/// Tagged lifecycle or system event delivered synchronously to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    /// The node got a parent
    Parented,
    /// The node lost its parent
    Unparented,
    /// The node became part of the active tree
    EnterTree,
    /// The node is about to leave the active tree
    ExitTree,
    /// The node and all its descendants are in the tree; once per lifetime
    Ready,
    /// The node is about to be destroyed; always the last notification
    Predelete,
    /// The node changed position among its siblings
    MovedInParent,
    /// Application-defined notification
    Custom(i32),
}

impl Notification {
    /// Integer tag of the notification
    pub fn code(self) -> i32 {
        match self {
            Self::Predelete => 1,
            Self::EnterTree => 10,
            Self::ExitTree => 11,
            Self::MovedInParent => 12,
            Self::Ready => 13,
            Self::Parented => 18,
            Self::Unparented => 19,
            Self::Custom(code) => code,
        }
    }

    /// Notification for an integer tag; unknown tags are [`Notification::Custom`]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Predelete,
            10 => Self::EnterTree,
            11 => Self::ExitTree,
            12 => Self::MovedInParent,
            13 => Self::Ready,
            18 => Self::Parented,
            19 => Self::Unparented,
            other => Self::Custom(other),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parented => f.write_str("PARENTED"),
            Self::Unparented => f.write_str("UNPARENTED"),
            Self::EnterTree => f.write_str("ENTER_TREE"),
            Self::ExitTree => f.write_str("EXIT_TREE"),
            Self::Ready => f.write_str("READY"),
            Self::Predelete => f.write_str("PREDELETE"),
            Self::MovedInParent => f.write_str("MOVED_IN_PARENT"),
            Self::Custom(code) => write!(f, "CUSTOM({code})"),
        }
    }
}

/// Traversal order of a cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeOrder {
    /// Parent before children
    PreOrder,
    /// Children before parent
    PostOrder,
}

/// Where an isolated failure happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOrigin {
    /// Notification handling
    Notification(Notification),
    /// Signal handler invocation
    Signal {
        /// Emitted signal
        signal: String,
        /// Handler method
        method: String,
    },
    /// Command requested by a handler
    Command,
    /// Command applied from the deferred queue
    Deferred,
}

/// A failure isolated to one node
#[derive(Debug)]
pub struct NodeFailure {
    /// Node whose handler failed, or that requested the failing command
    pub node: NodeId,
    /// Where it happened
    pub origin: FailureOrigin,
    /// What went wrong
    pub error: SceneError,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            FailureOrigin::Notification(what) => write!(f, "{:?} on {what}: {}", self.node, self.error),
            FailureOrigin::Signal { signal, method } => {
                write!(f, "{:?} handling '{signal}' in '{method}': {}", self.node, self.error)
            }
            FailureOrigin::Command => write!(f, "{:?} command: {}", self.node, self.error),
            FailureOrigin::Deferred => write!(f, "{:?} deferred command: {}", self.node, self.error),
        }
    }
}

/// Handler failures collected during one or more dispatches
///
/// A failing handler never aborts the cascade that called it; the failure is
/// recorded here and delivery continues with the next node.
#[derive(Debug, Default)]
pub struct DispatchReport {
    failures: Vec<NodeFailure>,
}

impl DispatchReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure
    pub fn push(&mut self, node: NodeId, origin: FailureOrigin, error: SceneError) {
        log::warn!("Isolated failure on {node:?} ({origin:?}): {error}");
        self.failures.push(NodeFailure { node, origin, error });
    }

    /// Append another report
    pub fn merge(&mut self, other: DispatchReport) {
        self.failures.extend(other.failures);
    }

    /// Whether no failure was recorded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failure was recorded
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Recorded failures, in occurrence order
    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }

    /// Failures of one node
    pub fn failures_of(&self, node: NodeId) -> impl Iterator<Item = &NodeFailure> {
        self.failures.iter().filter(move |f| f.node == node)
    }

    /// `Ok` if clean, otherwise the report as [`SceneError::Dispatch`]
    pub fn into_result(self) -> Result<(), SceneError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(SceneError::Dispatch(self))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::NodeArena;

    #[test]
    fn test_codes_round_trip() {
        for what in [
            Notification::Parented,
            Notification::Unparented,
            Notification::EnterTree,
            Notification::ExitTree,
            Notification::Ready,
            Notification::Predelete,
            Notification::MovedInParent,
            Notification::Custom(2000),
        ] {
            assert_eq!(Notification::from_code(what.code()), what);
        }
        assert_eq!(Notification::Ready.to_string(), "READY");
    }

    #[test]
    fn test_report_aggregates() {
        let mut arena: NodeArena<()> = NodeArena::with_key();
        let (a, b) = (arena.insert(()), arena.insert(()));

        let mut report = DispatchReport::new();
        assert!(report.is_clean());
        report.push(a, FailureOrigin::Notification(Notification::Ready), SceneError::RootLocked);

        let mut other = DispatchReport::new();
        other.push(b, FailureOrigin::Command, SceneError::StaleReference(b));
        report.merge(other);

        assert_eq!(report.len(), 2);
        assert_eq!(report.failures_of(b).count(), 1);
        assert!(matches!(report.into_result(), Err(SceneError::Dispatch(r)) if r.len() == 2));
    }
}
