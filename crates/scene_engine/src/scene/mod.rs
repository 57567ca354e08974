//! Scene tree and lifecycle notifications
//!
//! The tree owns every object, drives the lifecycle state machine and
//! delivers notifications in a defined order.
//!
//! ## Lifecycle
//!
//! ```text
//! Constructed --attach under in-tree parent--> InTree --detach--> Removed
//!      |                                         ^                  |
//!      |                                         +---- re-attach ---+
//!      +------------------ destroy (no parent, no children) --------+--> Destroyed
//! ```
//!
//! - attach: `PARENTED`, then `ENTER_TREE` pre-order, then `READY` post-order
//!   (once per node lifetime, unless re-armed with `request_ready`)
//! - detach: `EXIT_TREE` pre-order, then `UNPARENTED`
//! - destroy: `PREDELETE`, always last

mod dispatch;
pub mod definition;
pub mod error;
pub mod notification;
pub mod tree;

#[cfg(test)]
mod tests;

pub use definition::{BehaviorFactory, DefinitionError, Instantiated, NodeDefinition, SceneDefinition};
pub use dispatch::MAX_DISPATCH_DEPTH;
pub use error::SceneError;
pub use notification::{CascadeOrder, DispatchReport, FailureOrigin, Notification, NodeFailure};
pub use tree::{NodeState, SceneTree};
