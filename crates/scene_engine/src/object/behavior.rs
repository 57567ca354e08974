//! Behavior layer attached to an object instance
//!
//! A [`Behavior`] sits in front of the object's type: its overrides are
//! consulted before the registry, its generic handlers before the type's, and
//! it sees every notification before the type's built-in handling.
//! [`ScriptedBehavior`] is a closure-driven implementation used by tooling,
//! definitions and tests.

use std::fmt;
use std::sync::Arc;

use super::base::ObjectBase;
use super::command::TreeCommand;
use super::error::ObjectError;
use super::instance;
use crate::foundation::collections::NodeId;
use crate::meta::{PropertyInfo, PropertyUsage, SignalDescriptor, Value, ValueKind};
use crate::scene::Notification;

/// User-supplied extension of an object
///
/// Every hook has a default, so an implementation only overrides what it
/// serves. Returning `None` from an access hook declines the name and lets
/// resolution continue to the next stage.
pub trait Behavior: Send {
    /// Name used for diagnostics and to recreate the behavior from definitions
    fn behavior_name(&self) -> &str;

    /// Extra properties, listed ahead of the type's
    fn properties(&self) -> Vec<PropertyInfo> {
        Vec::new()
    }

    /// Extra signals the object may emit
    fn signals(&self) -> Vec<SignalDescriptor> {
        Vec::new()
    }

    /// Whether `call` serves this method
    fn has_method(&self, _name: &str) -> bool {
        false
    }

    /// Property read override
    fn get(&self, _base: &ObjectBase, _name: &str) -> Option<Value> {
        None
    }

    /// Property write override
    fn set(&mut self, _base: &mut ObjectBase, _name: &str, _value: &Value) -> Option<Result<(), ObjectError>> {
        None
    }

    /// Method override
    fn call(&mut self, _base: &mut ObjectBase, _name: &str, _args: &[Value]) -> Option<Result<Value, ObjectError>> {
        None
    }

    /// Fallback read for names nothing else declares
    fn generic_get(&self, _base: &ObjectBase, _name: &str) -> Option<Value> {
        None
    }

    /// Fallback write for names nothing else declares
    fn generic_set(&mut self, _base: &mut ObjectBase, _name: &str, _value: &Value) -> Option<Result<(), ObjectError>> {
        None
    }

    /// Fallback call for names nothing else declares
    fn generic_call(&mut self, _base: &mut ObjectBase, _name: &str, _args: &[Value]) -> Option<Result<Value, ObjectError>> {
        None
    }

    /// Lifecycle notification, delivered before the type's handling
    fn notification(&mut self, _base: &mut ObjectBase, _what: Notification) -> Result<(), ObjectError> {
        Ok(())
    }

    /// Advisory message for tooling; empty means correctly configured
    fn configuration_warning(&self, _base: &ObjectBase) -> String {
        String::new()
    }

    /// Called right after the behavior is attached to an object
    fn attached(&mut self, _base: &mut ObjectBase) {}

    /// Called before the behavior is replaced or its object destroyed
    fn teardown(&mut self, _base: &mut ObjectBase) {}
}

type ScriptMethod = Arc<dyn Fn(&mut ScriptScope<'_>, &[Value]) -> Result<Value, ObjectError> + Send + Sync>;
type ScriptSetter = Arc<dyn Fn(&mut ScriptScope<'_>, Value) -> Result<(), ObjectError> + Send + Sync>;
type ScriptNotify = Arc<dyn Fn(&mut ScriptScope<'_>, Notification) -> Result<(), ObjectError> + Send + Sync>;
type ScriptGenericGet = Arc<dyn Fn(&ScriptVars, &ObjectBase, &str) -> Option<Value> + Send + Sync>;
type ScriptGenericSet = Arc<dyn Fn(&mut ScriptScope<'_>, &str, &Value) -> Option<Result<(), ObjectError>> + Send + Sync>;
type ScriptWarning = Arc<dyn Fn(&ScriptVars, &ObjectBase) -> String + Send + Sync>;
type ScriptHook = Arc<dyn Fn(&mut ScriptScope<'_>) + Send + Sync>;

/// Declared variable of a scripted behavior
#[derive(Debug, Clone)]
pub struct ScriptVar {
    /// Variable name
    pub name: String,
    /// Accepted schema
    pub kind: ValueKind,
    /// Usage flags
    pub usage: PropertyUsage,
    value: Value,
}

impl ScriptVar {
    /// Current value
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Variables of a scripted behavior, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ScriptVars {
    vars: Vec<ScriptVar>,
}

impl ScriptVars {
    /// Current value of a variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.find(name).map(ScriptVar::value)
    }

    /// Declared variable
    pub fn find(&self, name: &str) -> Option<&ScriptVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Whether a variable is declared
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Checked write of a declared variable
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ObjectError> {
        let var = self
            .vars
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| ObjectError::InvalidArgument(format!("no script variable '{name}'")))?;
        if !var.kind.accepts(&value) {
            return Err(ObjectError::TypeMismatch {
                member: name.to_string(),
                expected: var.kind,
                found: value.kind(),
            });
        }
        var.value = value;
        Ok(())
    }

    /// Iterate declared variables
    pub fn iter(&self) -> impl Iterator<Item = &ScriptVar> {
        self.vars.iter()
    }
}

/// What a script closure can reach: its variables and the object's base
pub struct ScriptScope<'a> {
    vars: &'a mut ScriptVars,
    base: &'a mut ObjectBase,
}

impl<'a> ScriptScope<'a> {
    /// Handle of the object running the script
    pub fn id(&self) -> NodeId {
        self.base.id()
    }

    /// Current value of a script variable
    pub fn var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Checked write of a script variable, bypassing its setter
    pub fn set_var(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ObjectError> {
        self.vars.set(name, value.into())
    }

    /// Script variables
    pub fn vars(&self) -> &ScriptVars {
        self.vars
    }

    /// Engine-side state of the object
    pub fn base(&self) -> &ObjectBase {
        self.base
    }

    /// Mutable engine-side state of the object
    pub fn base_mut(&mut self) -> &mut ObjectBase {
        self.base
    }

    /// Read through the type, skipping this behavior
    pub fn base_get(&self, name: &str) -> Result<Value, ObjectError> {
        instance::class_get(self.base, name)
    }

    /// Write through the type, skipping this behavior
    pub fn base_set(&mut self, name: &str, value: Value) -> Result<(), ObjectError> {
        instance::class_set(self.base, name, value)
    }

    /// Call through the type, skipping this behavior
    pub fn base_call(&mut self, name: &str, args: &[Value]) -> Result<Value, ObjectError> {
        instance::class_call(self.base, name, args)
    }

    /// Emit a declared signal of the object
    pub fn emit(&mut self, signal: &str, args: Vec<Value>) -> Result<(), ObjectError> {
        self.base.emit_signal(signal, args)
    }

    /// Apply a tree command once the handler returns
    pub fn request(&mut self, command: TreeCommand) {
        self.base.request(command);
    }

    /// Apply a tree command after the current tree operation
    pub fn defer(&mut self, command: TreeCommand) {
        self.base.defer(command);
    }
}

/// Closure-driven behavior
///
/// ```ignore
/// let health = ScriptedBehavior::new("health")
///     .with_export("hp", 10)
///     .with_signal(SignalDescriptor::new("died"))
///     .with_setter("hp", |scope, value| {
///         scope.set_var("hp", value.clone())?;
///         if value.as_int() == Some(0) {
///             scope.emit("died", Vec::new())?;
///         }
///         Ok(())
///     });
/// ```
#[derive(Clone)]
pub struct ScriptedBehavior {
    name: String,
    vars: ScriptVars,
    setters: Vec<(String, ScriptSetter)>,
    methods: Vec<(String, ScriptMethod)>,
    signals: Vec<SignalDescriptor>,
    notification_handlers: Vec<ScriptNotify>,
    generic_get: Option<ScriptGenericGet>,
    generic_set: Option<ScriptGenericSet>,
    warning: Option<ScriptWarning>,
    on_attached: Option<ScriptHook>,
    on_teardown: Option<ScriptHook>,
}

impl ScriptedBehavior {
    /// Empty behavior
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: ScriptVars::default(),
            setters: Vec::new(),
            methods: Vec::new(),
            signals: Vec::new(),
            notification_handlers: Vec::new(),
            generic_get: None,
            generic_set: None,
            warning: None,
            on_attached: None,
            on_teardown: None,
        }
    }

    /// Declare a variable; the schema is inferred from the default
    pub fn with_var(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.declare(name.into(), default.into(), None, PropertyUsage::empty())
    }

    /// Declare an exported variable
    pub fn with_export(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.declare(name.into(), default.into(), None, PropertyUsage::EXPORTED)
    }

    /// Declare a variable with an explicit schema
    pub fn with_typed_var(self, name: impl Into<String>, kind: ValueKind, default: impl Into<Value>) -> Self {
        self.declare(name.into(), default.into(), Some(kind), PropertyUsage::empty())
    }

    fn declare(mut self, name: String, value: Value, kind: Option<ValueKind>, usage: PropertyUsage) -> Self {
        let kind = kind.unwrap_or(match value.kind() {
            ValueKind::Nil => ValueKind::Variant,
            kind => kind,
        });
        self.vars.vars.retain(|v| v.name != name);
        self.vars.vars.push(ScriptVar { name, kind, usage, value });
        self
    }

    /// Intercept writes of `name`
    ///
    /// Works for script variables and for type properties alike; the setter
    /// is responsible for storing the value (`set_var` or `base_set`).
    pub fn with_setter<F>(mut self, name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut ScriptScope<'_>, Value) -> Result<(), ObjectError> + Send + Sync + 'static,
    {
        self.setters.push((name.into(), Arc::new(setter)));
        self
    }

    /// Declare a method
    pub fn with_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&mut ScriptScope<'_>, &[Value]) -> Result<Value, ObjectError> + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(method)));
        self
    }

    /// Declare an extra signal
    pub fn with_signal(mut self, signal: SignalDescriptor) -> Self {
        self.signals.push(signal);
        self
    }

    /// Observe notifications; handlers run in registration order
    pub fn on_notification<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut ScriptScope<'_>, Notification) -> Result<(), ObjectError> + Send + Sync + 'static,
    {
        self.notification_handlers.push(Arc::new(handler));
        self
    }

    /// Fallback read for undeclared names
    pub fn with_generic_get<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ScriptVars, &ObjectBase, &str) -> Option<Value> + Send + Sync + 'static,
    {
        self.generic_get = Some(Arc::new(handler));
        self
    }

    /// Fallback write for undeclared names
    pub fn with_generic_set<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut ScriptScope<'_>, &str, &Value) -> Option<Result<(), ObjectError>> + Send + Sync + 'static,
    {
        self.generic_set = Some(Arc::new(handler));
        self
    }

    /// Configuration warning reported to tooling
    pub fn with_warning<F>(mut self, warning: F) -> Self
    where
        F: Fn(&ScriptVars, &ObjectBase) -> String + Send + Sync + 'static,
    {
        self.warning = Some(Arc::new(warning));
        self
    }

    /// Run once the behavior is attached
    pub fn on_attached<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ScriptScope<'_>) + Send + Sync + 'static,
    {
        self.on_attached = Some(Arc::new(hook));
        self
    }

    /// Run before the behavior is replaced or its object destroyed
    pub fn on_teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ScriptScope<'_>) + Send + Sync + 'static,
    {
        self.on_teardown = Some(Arc::new(hook));
        self
    }

    /// Variables and their current values
    pub fn vars(&self) -> &ScriptVars {
        &self.vars
    }

    fn setter(&self, name: &str) -> Option<ScriptSetter> {
        self.setters.iter().find(|(n, _)| n == name).map(|(_, s)| Arc::clone(s))
    }

    fn method(&self, name: &str) -> Option<ScriptMethod> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, m)| Arc::clone(m))
    }
}

impl fmt::Debug for ScriptedBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedBehavior")
            .field("name", &self.name)
            .field("vars", &self.vars)
            .field("methods", &self.methods.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}

impl Behavior for ScriptedBehavior {
    fn behavior_name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        self.vars
            .iter()
            .map(|v| PropertyInfo::new(v.name.clone(), v.kind, v.usage, self.name.clone()))
            .collect()
    }

    fn signals(&self) -> Vec<SignalDescriptor> {
        self.signals.clone()
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|(n, _)| n == name)
    }

    fn get(&self, _base: &ObjectBase, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, base: &mut ObjectBase, name: &str, value: &Value) -> Option<Result<(), ObjectError>> {
        if let Some(setter) = self.setter(name) {
            if let Some(var) = self.vars.find(name) {
                if !var.kind.accepts(value) {
                    return Some(Err(ObjectError::TypeMismatch {
                        member: name.to_string(),
                        expected: var.kind,
                        found: value.kind(),
                    }));
                }
            }
            let mut scope = ScriptScope { vars: &mut self.vars, base };
            return Some(setter(&mut scope, value.clone()));
        }
        if self.vars.contains(name) {
            return Some(self.vars.set(name, value.clone()));
        }
        None
    }

    fn call(&mut self, base: &mut ObjectBase, name: &str, args: &[Value]) -> Option<Result<Value, ObjectError>> {
        let method = self.method(name)?;
        let mut scope = ScriptScope { vars: &mut self.vars, base };
        Some(method(&mut scope, args))
    }

    fn generic_get(&self, base: &ObjectBase, name: &str) -> Option<Value> {
        self.generic_get.as_ref().and_then(|handler| handler(&self.vars, base, name))
    }

    fn generic_set(&mut self, base: &mut ObjectBase, name: &str, value: &Value) -> Option<Result<(), ObjectError>> {
        let handler = self.generic_set.clone()?;
        let mut scope = ScriptScope { vars: &mut self.vars, base };
        handler(&mut scope, name, value)
    }

    fn notification(&mut self, base: &mut ObjectBase, what: Notification) -> Result<(), ObjectError> {
        let handlers = self.notification_handlers.clone();
        let mut scope = ScriptScope { vars: &mut self.vars, base };
        for handler in &handlers {
            handler(&mut scope, what)?;
        }
        Ok(())
    }

    fn configuration_warning(&self, base: &ObjectBase) -> String {
        self.warning
            .as_ref()
            .map(|warning| warning(&self.vars, base))
            .unwrap_or_default()
    }

    fn attached(&mut self, base: &mut ObjectBase) {
        if let Some(hook) = self.on_attached.clone() {
            hook(&mut ScriptScope { vars: &mut self.vars, base });
        }
    }

    fn teardown(&mut self, base: &mut ObjectBase) {
        if let Some(hook) = self.on_teardown.clone() {
            hook(&mut ScriptScope { vars: &mut self.vars, base });
        }
    }
}
