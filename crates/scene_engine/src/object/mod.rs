//! Objects: engine-side base, behavior layer and signal subscriptions
//!
//! An [`ObjectInstance`] pairs an [`ObjectBase`] (identity, type, storage,
//! signals) with an optional [`Behavior`]. Member access goes through the
//! instance's resolution chain; anything that reaches beyond the object is
//! expressed as a [`TreeCommand`] and carried out by the scene tree.

pub mod base;
pub mod behavior;
pub mod command;
pub mod error;
pub mod instance;
pub mod services;
pub mod signal;

pub use base::ObjectBase;
pub use behavior::{Behavior, ScriptScope, ScriptVar, ScriptVars, ScriptedBehavior};
pub use command::{Outgoing, TreeCommand};
pub use error::ObjectError;
pub use instance::ObjectInstance;
pub use services::Services;
pub use signal::{ConnectFlags, Connection, DisconnectMode, SignalBus};
