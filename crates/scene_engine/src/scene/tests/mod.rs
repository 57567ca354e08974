//! Scenario tests for the scene tree
//!
//! Shared fixtures: a registry with the core types plus a small `Actor`
//! type, and a recording behavior that logs every notification it sees.

mod definition_tests;
mod resolution_tests;
mod signal_tests;

use std::sync::{Arc, Mutex};

use crate::core::config::SceneConfig;
use crate::foundation::collections::NodeId;
use crate::meta::{
    ClassDef, GenericHandler, MethodDescriptor, PropertyDescriptor, SignalDescriptor, TypeRegistry,
    TypeRegistryBuilder, Value, ValueKind,
};
use crate::object::{ObjectBase, ObjectError, ScriptedBehavior};
use crate::scene::{Notification, SceneTree};

/// Notifications seen by recording behaviors, as (node name, notification)
pub(super) type EventLog = Arc<Mutex<Vec<(String, Notification)>>>;

/// Free-form trace shared by handlers
pub(super) type Trace = Arc<Mutex<Vec<String>>>;

/// Answers `speed` and `echo/<x>` for any `Actor`
struct ActorFallback;

impl GenericHandler for ActorFallback {
    fn generic_get(&self, _base: &ObjectBase, name: &str) -> Option<Value> {
        match name {
            "speed" => Some(Value::from("fallback")),
            _ => name.strip_prefix("echo/").map(Value::from),
        }
    }

    fn generic_set(&self, base: &mut ObjectBase, name: &str, value: &Value) -> Option<Result<(), ObjectError>> {
        let key = name.strip_prefix("echo/")?;
        base.set_meta(key, value.clone());
        Some(Ok(()))
    }
}

pub(super) fn registry() -> Arc<TypeRegistry> {
    let mut builder = TypeRegistryBuilder::with_core_types().unwrap();
    builder
        .define(
            ClassDef::new("Actor", Some("Node"))
                .with_property(PropertyDescriptor::new("speed", 1.0).exported())
                .with_property(PropertyDescriptor::new("target", Value::Nil).with_kind(ValueKind::Node))
                .with_method(
                    MethodDescriptor::new("hurt", |base, args| {
                        let amount = args[0].as_int().unwrap_or_default();
                        base.emit_signal("hurt", vec![Value::Int(amount)])?;
                        Ok(Value::Nil)
                    })
                    .with_param("amount", ValueKind::Int),
                )
                .with_signal(SignalDescriptor::new("hurt").with_param("amount", ValueKind::Int))
                .with_generic_handler(ActorFallback),
        )
        .unwrap();
    Arc::new(builder.build().unwrap())
}

pub(super) fn tree() -> SceneTree {
    SceneTree::new(registry(), SceneConfig::default()).unwrap()
}

pub(super) fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(super) fn trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

/// Behavior logging every notification under the node's current name
pub(super) fn recorder(log: &EventLog) -> ScriptedBehavior {
    let log = Arc::clone(log);
    ScriptedBehavior::new("recorder").on_notification(move |scope, what| {
        log.lock().unwrap().push((scope.base().name().to_string(), what));
        Ok(())
    })
}

/// Detached `Node` with a recorder attached
pub(super) fn spawn(tree: &mut SceneTree, name: &str, log: &EventLog) -> NodeId {
    tree.create_with_behavior("Node", name, Box::new(recorder(log))).unwrap()
}

pub(super) fn events(log: &EventLog) -> Vec<(String, Notification)> {
    log.lock().unwrap().clone()
}

/// Names that received `what`, in delivery order
pub(super) fn receivers(log: &EventLog, what: Notification) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(_, n)| *n == what)
        .map(|(name, _)| name.clone())
        .collect()
}

pub(super) fn clear(log: &EventLog) {
    log.lock().unwrap().clear();
}

pub(super) fn lines(trace: &Trace) -> Vec<String> {
    trace.lock().unwrap().clone()
}
