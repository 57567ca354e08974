//! # Scene Engine
//!
//! Core of a tree-structured scene engine: typed objects with registered
//! properties, methods and signals, attachable behaviors that override or
//! extend them, and a scene tree that drives ordered lifecycle notifications
//! as nodes are attached, moved, detached and freed.
//!
//! ## Features
//!
//! - **Type Registry**: Single-inheritance types with properties, methods, signals and generic fallbacks
//! - **Behaviors**: Per-object extension layer consulted before the type
//! - **Signals**: Ordered, snapshot-based delivery with one-shot and deferred connections
//! - **Scene Tree**: Generational handles, ordered children, `ENTER_TREE`/`READY`/`EXIT_TREE` cascades
//! - **Definitions**: RON scene descriptions instantiated as detached subtrees
//! - **Resources**: Eager, lazy and background loading through an injected service
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(TypeRegistryBuilder::with_core_types()?.build()?);
//!     let mut tree = SceneTree::new(registry, SceneConfig::default())?;
//!
//!     let greeter = ScriptedBehavior::new("greeter").on_notification(|scope, what| {
//!         if what == Notification::Ready {
//!             log::info!("{} is ready", scope.base().name());
//!         }
//!         Ok(())
//!     });
//!     let node = tree.create_with_behavior("Node", "Greeter", Box::new(greeter))?;
//!     let root = tree.root();
//!     tree.attach(root, node)?;
//!
//!     tree.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Configuration
pub mod config;
pub mod core;

// Low-level utilities
pub mod foundation;

// Object model
pub mod meta;
pub mod object;

// Tree and collaborators
pub mod assets;
pub mod scene;

pub use foundation::collections::NodeId;

/// Common imports for engine users
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        assets::{Asset, AssetError, ResourceLoader},
        core::config::{Config, EngineConfig, ResourceConfig, SceneConfig},
        foundation::collections::NodeId,
        meta::{
            ClassDef, MethodDescriptor, PropertyDescriptor, SignalDescriptor, TypeRegistry,
            TypeRegistryBuilder, Value, ValueKind,
        },
        object::{
            Behavior, ConnectFlags, DisconnectMode, ObjectBase, ObjectError, ScriptedBehavior,
            Services, TreeCommand,
        },
        scene::{
            BehaviorFactory, CascadeOrder, DispatchReport, Notification, SceneDefinition,
            SceneError, SceneTree,
        },
    };
}
