//! Object instance and its member resolution chain
//!
//! `get`/`set`/`call` try, in order and stopping at the first stage that
//! serves the name:
//!
//! 1. the attached behavior's override,
//! 2. the type registry, walking the inheritance chain,
//! 3. the behavior's generic fallback, then the type chain's generic handlers,
//!
//! and fail with [`ObjectError::UnknownMember`] otherwise.

use std::collections::HashSet;
use std::sync::Arc;

use super::base::ObjectBase;
use super::behavior::Behavior;
use super::error::ObjectError;
use super::signal::{ConnectFlags, DisconnectMode};
use crate::foundation::collections::NodeId;
use crate::meta::{PropertyInfo, PropertyUsage, Value};
use crate::scene::Notification;

/// An object: engine-side base plus an optional behavior layer
///
/// The two halves are separate fields so the behavior can be handed the base
/// mutably while it runs.
pub struct ObjectInstance {
    base: ObjectBase,
    behavior: Option<Box<dyn Behavior>>,
}

impl ObjectInstance {
    /// Wrap a freshly constructed base
    pub fn new(base: ObjectBase) -> Self {
        Self { base, behavior: None }
    }

    /// Engine-side state
    pub fn base(&self) -> &ObjectBase {
        &self.base
    }

    /// Mutable engine-side state
    pub fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    /// Attached behavior
    pub fn behavior(&self) -> Option<&dyn Behavior> {
        self.behavior.as_deref()
    }

    /// Whether a behavior is attached
    pub fn has_behavior(&self) -> bool {
        self.behavior.is_some()
    }

    /// Attach, replace or remove the behavior
    ///
    /// The previous behavior is torn down first and returned. Values held by
    /// a behavior live as long as the behavior; detaching the object from the
    /// tree does not reset them.
    pub fn set_behavior(&mut self, behavior: Option<Box<dyn Behavior>>) -> Option<Box<dyn Behavior>> {
        let previous = self.take_behavior();
        if let Some(mut behavior) = behavior {
            self.base.set_extra_signals(behavior.signals());
            behavior.attached(&mut self.base);
            self.behavior = Some(behavior);
        }
        previous
    }

    /// Tear down and drop the behavior, if any
    pub fn teardown(&mut self) {
        self.take_behavior();
    }

    fn take_behavior(&mut self) -> Option<Box<dyn Behavior>> {
        let mut previous = self.behavior.take()?;
        log::debug!("Tearing down behavior '{}' on {:?}", previous.behavior_name(), self.base.id());
        previous.teardown(&mut self.base);
        self.base.set_extra_signals(Vec::new());
        Some(previous)
    }

    /// Read a property by name
    pub fn get(&self, name: &str) -> Result<Value, ObjectError> {
        if let Some(value) = self.behavior.as_ref().and_then(|b| b.get(&self.base, name)) {
            return Ok(value);
        }
        if let Some(value) = registry_get(&self.base, name) {
            return Ok(value);
        }
        if let Some(value) = self.behavior.as_ref().and_then(|b| b.generic_get(&self.base, name)) {
            return Ok(value);
        }
        type_generic_get(&self.base, name).ok_or_else(|| unknown_member(&self.base, name))
    }

    /// Write a property by name
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ObjectError> {
        if let Some(result) = self.behavior.as_mut().and_then(|b| b.set(&mut self.base, name, &value)) {
            return result;
        }
        let value = match registry_set(&mut self.base, name, value) {
            Ok(result) => return result,
            Err(value) => value,
        };
        if let Some(result) = self.behavior.as_mut().and_then(|b| b.generic_set(&mut self.base, name, &value)) {
            return result;
        }
        type_generic_set(&mut self.base, name, &value).unwrap_or_else(|| Err(unknown_member(&self.base, name)))
    }

    /// Call a method by name
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, ObjectError> {
        if let Some(result) = self.behavior.as_mut().and_then(|b| b.call(&mut self.base, name, args)) {
            return result;
        }
        if let Some(result) = registry_call(&mut self.base, name, args) {
            return result;
        }
        if let Some(result) = self.behavior.as_mut().and_then(|b| b.generic_call(&mut self.base, name, args)) {
            return result;
        }
        type_generic_call(&mut self.base, name, args).unwrap_or_else(|| Err(unknown_member(&self.base, name)))
    }

    /// Deliver a notification: behavior first, then the type chain
    ///
    /// Every stage runs even if an earlier one fails; all failures are
    /// returned.
    pub fn notify(&mut self, what: Notification) -> Vec<ObjectError> {
        let mut errors = Vec::new();
        if let Some(behavior) = self.behavior.as_mut() {
            if let Err(error) = behavior.notification(&mut self.base, what) {
                errors.push(error);
            }
        }
        let class = Arc::clone(self.base.class());
        for hook in class.chain().filter_map(|c| c.notification_hook()) {
            if let Err(error) = hook(&mut self.base, what) {
                errors.push(error);
            }
        }
        errors
    }

    /// Subscribe `target.method` to one of this object's signals
    pub fn connect(&mut self, signal: &str, target: NodeId, method: &str, flags: ConnectFlags) -> Result<(), ObjectError> {
        if !self.base.has_signal(signal) {
            return Err(ObjectError::UnknownSignal {
                class: self.base.type_name().to_string(),
                signal: signal.to_string(),
            });
        }
        self.base.signals_mut().connect(signal, target, method, flags)
    }

    /// Remove a subscription from one of this object's signals
    pub fn disconnect(&mut self, signal: &str, target: NodeId, method: &str, mode: DisconnectMode) -> Result<bool, ObjectError> {
        self.base.signals_mut().disconnect(signal, target, method, mode)
    }

    /// Behavior properties first, then the type chain most-derived first
    ///
    /// Names hidden by an earlier entry are listed once.
    pub fn property_list(&self) -> Vec<PropertyInfo> {
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        if let Some(behavior) = &self.behavior {
            for info in behavior.properties() {
                if seen.insert(info.name.clone()) {
                    list.push(info);
                }
            }
        }
        for class in self.base.class().chain() {
            for property in class.own_properties() {
                if seen.insert(property.name.clone()) {
                    list.push(property.info(class.name()));
                }
            }
        }
        list
    }

    /// Exported properties in listing order
    pub fn exported_properties(&self) -> Vec<PropertyInfo> {
        self.property_list()
            .into_iter()
            .filter(|p| p.usage.contains(PropertyUsage::EXPORTED))
            .collect()
    }

    /// Whether the behavior or the type chain declares the method
    pub fn has_method(&self, name: &str) -> bool {
        self.behavior.as_ref().is_some_and(|b| b.has_method(name))
            || self.base.class().lookup_method(name).is_some()
    }

    /// Whether the type chain or the behavior declares the signal
    pub fn has_signal(&self, name: &str) -> bool {
        self.base.has_signal(name)
    }

    /// Whether the object's type is `type_name` or derives from it
    pub fn is_class(&self, type_name: &str) -> bool {
        self.base.class().is_a(type_name)
    }

    /// Advisory configuration warning of the behavior; empty if none
    pub fn configuration_warning(&self) -> String {
        self.behavior
            .as_ref()
            .map(|b| b.configuration_warning(&self.base))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ObjectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectInstance")
            .field("base", &self.base)
            .field("behavior", &self.behavior.as_ref().map(|b| b.behavior_name()))
            .finish()
    }
}

fn unknown_member(base: &ObjectBase, name: &str) -> ObjectError {
    ObjectError::UnknownMember {
        class: base.type_name().to_string(),
        member: name.to_string(),
    }
}

fn registry_get(base: &ObjectBase, name: &str) -> Option<Value> {
    let property = base.class().lookup_property(name)?;
    Some(match property.getter() {
        Some(getter) => getter(base),
        None => base.stored(name).cloned().unwrap_or_else(|| property.default.clone()),
    })
}

/// Hands the value back when the registry does not declare the name
fn registry_set(base: &mut ObjectBase, name: &str, value: Value) -> Result<Result<(), ObjectError>, Value> {
    let class = Arc::clone(base.class());
    let Some(property) = class.lookup_property(name) else {
        return Err(value);
    };
    if property.usage.contains(PropertyUsage::READ_ONLY) {
        return Ok(Err(ObjectError::ReadOnly(name.to_string())));
    }
    if !property.kind.accepts(&value) {
        return Ok(Err(ObjectError::TypeMismatch {
            member: name.to_string(),
            expected: property.kind,
            found: value.kind(),
        }));
    }
    Ok(match property.setter() {
        Some(setter) => setter(base, value),
        None => {
            base.store(name, value);
            Ok(())
        }
    })
}

fn registry_call(base: &mut ObjectBase, name: &str, args: &[Value]) -> Option<Result<Value, ObjectError>> {
    let class = Arc::clone(base.class());
    let method = class.lookup_method(name)?;
    Some(method.check_args(class.name(), args).and_then(|()| method.invoke(base, args)))
}

fn type_generic_get(base: &ObjectBase, name: &str) -> Option<Value> {
    base.class()
        .chain()
        .filter_map(|c| c.generic_handler())
        .find_map(|handler| handler.generic_get(base, name))
}

fn type_generic_set(base: &mut ObjectBase, name: &str, value: &Value) -> Option<Result<(), ObjectError>> {
    let class = Arc::clone(base.class());
    let handlers: Vec<_> = class.chain().filter_map(|c| c.generic_handler()).collect();
    handlers.into_iter().find_map(|handler| handler.generic_set(base, name, value))
}

fn type_generic_call(base: &mut ObjectBase, name: &str, args: &[Value]) -> Option<Result<Value, ObjectError>> {
    let class = Arc::clone(base.class());
    let handlers: Vec<_> = class.chain().filter_map(|c| c.generic_handler()).collect();
    handlers.into_iter().find_map(|handler| handler.generic_call(base, name, args))
}

/// Read through the type only, skipping any behavior
pub(crate) fn class_get(base: &ObjectBase, name: &str) -> Result<Value, ObjectError> {
    registry_get(base, name)
        .or_else(|| type_generic_get(base, name))
        .ok_or_else(|| unknown_member(base, name))
}

/// Write through the type only, skipping any behavior
pub(crate) fn class_set(base: &mut ObjectBase, name: &str, value: Value) -> Result<(), ObjectError> {
    match registry_set(base, name, value) {
        Ok(result) => result,
        Err(value) => type_generic_set(base, name, &value).unwrap_or_else(|| Err(unknown_member(base, name))),
    }
}

/// Call through the type only, skipping any behavior
pub(crate) fn class_call(base: &mut ObjectBase, name: &str, args: &[Value]) -> Result<Value, ObjectError> {
    registry_call(base, name, args)
        .or_else(|| type_generic_call(base, name, args))
        .unwrap_or_else(|| Err(unknown_member(base, name)))
}
