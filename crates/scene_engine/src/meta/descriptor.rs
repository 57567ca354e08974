//! Member descriptors: properties, methods, signals

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use super::value::{Value, ValueKind};
use crate::object::{ObjectBase, ObjectError};
use crate::scene::Notification;

/// Bound property reader
pub type Getter = Arc<dyn Fn(&ObjectBase) -> Value + Send + Sync>;

/// Bound property writer; may have side effects on the object
pub type Setter = Arc<dyn Fn(&mut ObjectBase, Value) -> Result<(), ObjectError> + Send + Sync>;

/// Native method body
pub type MethodFn = Arc<dyn Fn(&mut ObjectBase, &[Value]) -> Result<Value, ObjectError> + Send + Sync>;

/// Built-in notification handling of a type
pub type NotificationHook = Arc<dyn Fn(&mut ObjectBase, Notification) -> Result<(), ObjectError> + Send + Sync>;

bitflags! {
    /// How a property participates in tooling and persistence
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyUsage: u32 {
        /// Stored in definitions and shown to tooling
        const EXPORTED = 1 << 0;
        /// Rejects writes through `set`
        const READ_ONLY = 1 << 1;
    }
}

impl Default for PropertyUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Declared property of a type
#[derive(Clone)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Accepted value schema
    pub kind: ValueKind,
    /// Value reported before anything was stored
    pub default: Value,
    /// Usage flags
    pub usage: PropertyUsage,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl PropertyDescriptor {
    /// Storage-backed property; the schema is inferred from the default
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        let default = default.into();
        let kind = match default.kind() {
            ValueKind::Nil => ValueKind::Variant,
            kind => kind,
        };
        Self {
            name: name.into(),
            kind,
            default,
            usage: PropertyUsage::empty(),
            getter: None,
            setter: None,
        }
    }

    /// Override the inferred schema
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark as exported
    pub fn exported(mut self) -> Self {
        self.usage |= PropertyUsage::EXPORTED;
        self
    }

    /// Mark as read-only
    pub fn read_only(mut self) -> Self {
        self.usage |= PropertyUsage::READ_ONLY;
        self
    }

    /// Bind a getter instead of reading storage
    pub fn with_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&ObjectBase) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Bind a setter instead of writing storage
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut ObjectBase, Value) -> Result<(), ObjectError> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Bound getter, if any
    pub fn getter(&self) -> Option<&Getter> {
        self.getter.as_ref()
    }

    /// Bound setter, if any
    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    /// Listing entry for this property
    pub fn info(&self, origin: &str) -> PropertyInfo {
        PropertyInfo {
            name: self.name.clone(),
            kind: self.kind,
            usage: self.usage,
            origin: origin.to_string(),
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("usage", &self.usage)
            .field("bound_getter", &self.getter.is_some())
            .field("bound_setter", &self.setter.is_some())
            .finish()
    }
}

/// Property listing entry, as reported by introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Property name
    pub name: String,
    /// Accepted value schema
    pub kind: ValueKind,
    /// Usage flags
    pub usage: PropertyUsage,
    /// Type or behavior that declared it
    pub origin: String,
}

impl PropertyInfo {
    /// Listing entry for a behavior-declared property
    pub fn new(name: impl Into<String>, kind: ValueKind, usage: PropertyUsage, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            usage,
            origin: origin.into(),
        }
    }

    /// Whether the property is exported
    pub fn is_exported(&self) -> bool {
        self.usage.contains(PropertyUsage::EXPORTED)
    }
}

/// Named, typed parameter of a method or signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    /// Parameter name
    pub name: String,
    /// Accepted value schema
    pub kind: ValueKind,
}

impl ParamInfo {
    /// Create a parameter
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Declared method of a type
#[derive(Clone)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,
    /// Declared parameters
    pub params: Vec<ParamInfo>,
    /// Accept any number of arguments; `params` only documents the leading ones
    pub vararg: bool,
    func: MethodFn,
}

impl MethodDescriptor {
    /// Create a method with no declared parameters
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut ObjectBase, &[Value]) -> Result<Value, ObjectError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            vararg: false,
            func: Arc::new(func),
        }
    }

    /// Declare a parameter
    pub fn with_param(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.params.push(ParamInfo::new(name, kind));
        self
    }

    /// Accept extra trailing arguments
    pub fn vararg(mut self) -> Self {
        self.vararg = true;
        self
    }

    /// Check arguments against the declared parameters
    pub fn check_args(&self, owner: &str, args: &[Value]) -> Result<(), ObjectError> {
        check_params(owner, &self.name, &self.params, self.vararg, args)
    }

    /// Invoke the method body
    pub fn invoke(&self, base: &mut ObjectBase, args: &[Value]) -> Result<Value, ObjectError> {
        (self.func)(base, args)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("vararg", &self.vararg)
            .finish_non_exhaustive()
    }
}

/// Declared signal and its parameter schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDescriptor {
    /// Signal name
    pub name: String,
    /// Parameter schema checked on emission
    pub params: Vec<ParamInfo>,
}

impl SignalDescriptor {
    /// Signal without parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Declare a parameter
    pub fn with_param(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.params.push(ParamInfo::new(name, kind));
        self
    }

    /// Check emission arguments against the schema
    pub fn check_args(&self, owner: &str, args: &[Value]) -> Result<(), ObjectError> {
        check_params(owner, &self.name, &self.params, false, args)
    }
}

fn check_params(
    owner: &str,
    member: &str,
    params: &[ParamInfo],
    vararg: bool,
    args: &[Value],
) -> Result<(), ObjectError> {
    let count_ok = if vararg {
        args.len() >= params.len()
    } else {
        args.len() == params.len()
    };
    if !count_ok {
        return Err(ObjectError::ArgumentCount {
            class: owner.to_string(),
            member: member.to_string(),
            expected: params.len(),
            found: args.len(),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        if !param.kind.accepts(arg) {
            return Err(ObjectError::TypeMismatch {
                member: format!("{member}({})", param.name),
                expected: param.kind,
                found: arg.kind(),
            });
        }
    }
    Ok(())
}

/// Fallback for names the registry does not declare
///
/// Implement on a type to serve path-style keys (`metadata/color`) or members
/// only known at runtime. Returning `None` declines the name so resolution can
/// continue.
pub trait GenericHandler: Send + Sync {
    /// Read an undeclared name
    fn generic_get(&self, _base: &ObjectBase, _name: &str) -> Option<Value> {
        None
    }

    /// Write an undeclared name
    fn generic_set(&self, _base: &mut ObjectBase, _name: &str, _value: &Value) -> Option<Result<(), ObjectError>> {
        None
    }

    /// Call an undeclared method
    fn generic_call(&self, _base: &mut ObjectBase, _name: &str, _args: &[Value]) -> Option<Result<Value, ObjectError>> {
        None
    }
}
