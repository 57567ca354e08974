//! Type registry with single inheritance
//!
//! Types are declared on a [`TypeRegistryBuilder`] during startup and frozen
//! into an immutable [`TypeRegistry`]. After `build` nothing can be added, so
//! lookups take `&self` and the registry can be shared through an `Arc` and
//! read from any thread without locking.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::descriptor::{
    GenericHandler, MethodDescriptor, NotificationHook, PropertyDescriptor, SignalDescriptor,
};
use crate::object::{ObjectBase, ObjectError};
use crate::scene::Notification;

/// Registry declaration and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The same member name was declared twice on one type
    #[error("'{member}' is declared more than once on type '{type_name}'")]
    DuplicateDeclaration {
        /// Declaring type
        type_name: String,
        /// Duplicated member
        member: String,
    },

    /// The same type name was declared twice
    #[error("type '{0}' is declared more than once")]
    DuplicateType(String),

    /// Type name is not registered
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// Parent type is not registered
    #[error("type '{type_name}' extends unknown type '{parent}'")]
    UnknownParent {
        /// Declaring type
        type_name: String,
        /// Missing parent
        parent: String,
    },

    /// Parent chain loops back on itself
    #[error("inheritance cycle through type '{0}'")]
    InheritanceCycle(String),

    /// No member of that name anywhere in the chain
    #[error("'{member}' not found on type '{type_name}' or its ancestors")]
    NotFound {
        /// Type the lookup started from
        type_name: String,
        /// Missing member
        member: String,
    },
}

/// Mutable type declaration, consumed by [`TypeRegistryBuilder::define`]
pub struct ClassDef {
    name: String,
    parent: Option<String>,
    properties: Vec<PropertyDescriptor>,
    methods: Vec<MethodDescriptor>,
    signals: Vec<SignalDescriptor>,
    notification_hook: Option<NotificationHook>,
    generic: Option<Arc<dyn GenericHandler>>,
}

impl ClassDef {
    /// Declare a type and its parent
    pub fn new(name: &str, parent: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(ToString::to_string),
            properties: Vec::new(),
            methods: Vec::new(),
            signals: Vec::new(),
            notification_hook: None,
            generic: None,
        }
    }

    /// Add a property
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a method
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a signal
    pub fn with_signal(mut self, signal: SignalDescriptor) -> Self {
        self.signals.push(signal);
        self
    }

    /// Install built-in notification handling
    pub fn with_notification_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ObjectBase, Notification) -> Result<(), ObjectError> + Send + Sync + 'static,
    {
        self.notification_hook = Some(Arc::new(hook));
        self
    }

    /// Install the generic fallback
    pub fn with_generic_handler(mut self, handler: impl GenericHandler + 'static) -> Self {
        self.generic = Some(Arc::new(handler));
        self
    }

    fn check_duplicates(&self) -> Result<(), RegistryError> {
        let duplicate = |member: &str| RegistryError::DuplicateDeclaration {
            type_name: self.name.clone(),
            member: member.to_string(),
        };

        let mut seen = HashSet::new();
        for name in self.properties.iter().map(|p| &p.name) {
            if !seen.insert(name) {
                return Err(duplicate(name));
            }
        }
        seen.clear();
        for name in self.methods.iter().map(|m| &m.name) {
            if !seen.insert(name) {
                return Err(duplicate(name));
            }
        }
        seen.clear();
        for name in self.signals.iter().map(|s| &s.name) {
            if !seen.insert(name) {
                return Err(duplicate(name));
            }
        }
        Ok(())
    }
}

/// Frozen type descriptor
///
/// Holds an `Arc` to its parent, so walking the inheritance chain needs no
/// registry access.
pub struct ClassInfo {
    name: String,
    parent: Option<Arc<ClassInfo>>,
    properties: Vec<PropertyDescriptor>,
    property_index: HashMap<String, usize>,
    methods: HashMap<String, MethodDescriptor>,
    signals: Vec<SignalDescriptor>,
    notification_hook: Option<NotificationHook>,
    generic: Option<Arc<dyn GenericHandler>>,
}

impl ClassInfo {
    fn freeze(def: ClassDef, parent: Option<Arc<ClassInfo>>) -> Self {
        let property_index = def
            .properties
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        let methods = def
            .methods
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();
        Self {
            name: def.name,
            parent,
            properties: def.properties,
            property_index,
            methods,
            signals: def.signals,
            notification_hook: def.notification_hook,
            generic: def.generic,
        }
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent type
    pub fn parent(&self) -> Option<&Arc<ClassInfo>> {
        self.parent.as_ref()
    }

    /// This type followed by its ancestors, most-derived first
    pub fn chain(&self) -> impl Iterator<Item = &ClassInfo> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// Type names of the chain, most-derived first
    pub fn chain_names(&self) -> Vec<&str> {
        self.chain().map(ClassInfo::name).collect()
    }

    /// Whether this type is `ancestor` or derives from it
    pub fn is_a(&self, ancestor: &str) -> bool {
        self.chain().any(|class| class.name == ancestor)
    }

    /// Properties declared on this type only, in declaration order
    pub fn own_properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Signals declared on this type only
    pub fn own_signals(&self) -> &[SignalDescriptor] {
        &self.signals
    }

    /// Built-in notification handling declared on this type
    pub fn notification_hook(&self) -> Option<&NotificationHook> {
        self.notification_hook.as_ref()
    }

    /// Generic fallback declared on this type
    pub fn generic_handler(&self) -> Option<&Arc<dyn GenericHandler>> {
        self.generic.as_ref()
    }

    /// Find a property, walking from this type up the chain
    pub fn lookup_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.chain()
            .find_map(|class| class.property_index.get(name).map(|&i| &class.properties[i]))
    }

    /// Find a method, walking from this type up the chain
    pub fn lookup_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.chain().find_map(|class| class.methods.get(name))
    }

    /// Find a signal, walking from this type up the chain
    pub fn lookup_signal(&self, name: &str) -> Option<&SignalDescriptor> {
        self.chain()
            .find_map(|class| class.signals.iter().find(|s| s.name == name))
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("properties", &self.properties.len())
            .field("methods", &self.methods.len())
            .field("signals", &self.signals.len())
            .finish_non_exhaustive()
    }
}

/// Startup-time collector of type declarations
#[derive(Default)]
pub struct TypeRegistryBuilder {
    defs: Vec<ClassDef>,
    index: HashMap<String, usize>,
}

impl TypeRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with `Object` and `Node` already declared
    pub fn with_core_types() -> Result<Self, RegistryError> {
        let mut builder = Self::new();
        super::core_types::register(&mut builder)?;
        Ok(builder)
    }

    /// Add a complete type declaration
    pub fn define(&mut self, def: ClassDef) -> Result<&mut Self, RegistryError> {
        if self.index.contains_key(&def.name) {
            return Err(RegistryError::DuplicateType(def.name));
        }
        def.check_duplicates()?;
        self.index.insert(def.name.clone(), self.defs.len());
        self.defs.push(def);
        Ok(self)
    }

    /// Declare an empty type
    pub fn declare_type(&mut self, name: &str, parent: Option<&str>) -> Result<&mut Self, RegistryError> {
        self.define(ClassDef::new(name, parent))
    }

    fn def_mut(&mut self, type_name: &str) -> Result<&mut ClassDef, RegistryError> {
        let index = *self
            .index
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;
        Ok(&mut self.defs[index])
    }

    /// Add a property to a declared type
    pub fn register_property(&mut self, type_name: &str, property: PropertyDescriptor) -> Result<&mut Self, RegistryError> {
        let def = self.def_mut(type_name)?;
        if def.properties.iter().any(|p| p.name == property.name) {
            return Err(RegistryError::DuplicateDeclaration {
                type_name: type_name.to_string(),
                member: property.name,
            });
        }
        def.properties.push(property);
        Ok(self)
    }

    /// Add a method to a declared type
    pub fn register_method(&mut self, type_name: &str, method: MethodDescriptor) -> Result<&mut Self, RegistryError> {
        let def = self.def_mut(type_name)?;
        if def.methods.iter().any(|m| m.name == method.name) {
            return Err(RegistryError::DuplicateDeclaration {
                type_name: type_name.to_string(),
                member: method.name,
            });
        }
        def.methods.push(method);
        Ok(self)
    }

    /// Declare a signal on a declared type
    pub fn declare_signal(&mut self, type_name: &str, signal: SignalDescriptor) -> Result<&mut Self, RegistryError> {
        let def = self.def_mut(type_name)?;
        if def.signals.iter().any(|s| s.name == signal.name) {
            return Err(RegistryError::DuplicateDeclaration {
                type_name: type_name.to_string(),
                member: signal.name,
            });
        }
        def.signals.push(signal);
        Ok(self)
    }

    /// Whether a type has been declared
    pub fn contains(&self, type_name: &str) -> bool {
        self.index.contains_key(type_name)
    }

    /// Resolve parents and freeze every declaration
    pub fn build(self) -> Result<TypeRegistry, RegistryError> {
        let mut pending: HashMap<String, ClassDef> = self
            .defs
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();

        for def in pending.values() {
            if let Some(parent) = &def.parent {
                if !pending.contains_key(parent) {
                    return Err(RegistryError::UnknownParent {
                        type_name: def.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        let mut names: Vec<String> = pending.keys().cloned().collect();
        names.sort();

        let mut frozen: HashMap<String, Arc<ClassInfo>> = HashMap::new();
        for name in names {
            freeze_chain(&name, &mut pending, &mut frozen, &mut Vec::new())?;
        }

        log::debug!("Type registry built with {} types", frozen.len());
        Ok(TypeRegistry { classes: frozen })
    }
}

fn freeze_chain(
    name: &str,
    pending: &mut HashMap<String, ClassDef>,
    frozen: &mut HashMap<String, Arc<ClassInfo>>,
    visiting: &mut Vec<String>,
) -> Result<Arc<ClassInfo>, RegistryError> {
    if let Some(class) = frozen.get(name) {
        return Ok(Arc::clone(class));
    }
    if visiting.iter().any(|v| v == name) {
        return Err(RegistryError::InheritanceCycle(name.to_string()));
    }
    visiting.push(name.to_string());

    let parent_name = pending
        .get(name)
        .ok_or_else(|| RegistryError::UnknownType(name.to_string()))?
        .parent
        .clone();
    let parent = match parent_name {
        Some(parent) => Some(freeze_chain(&parent, pending, frozen, visiting)?),
        None => None,
    };

    visiting.pop();
    let def = pending
        .remove(name)
        .ok_or_else(|| RegistryError::UnknownType(name.to_string()))?;
    let class = Arc::new(ClassInfo::freeze(def, parent));
    frozen.insert(name.to_string(), Arc::clone(&class));
    Ok(class)
}

/// Immutable, shareable set of types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: HashMap<String, Arc<ClassInfo>>,
}

impl TypeRegistry {
    /// Get a type by name
    pub fn get(&self, type_name: &str) -> Option<&Arc<ClassInfo>> {
        self.classes.get(type_name)
    }

    /// Get a type by name, failing with [`RegistryError::UnknownType`]
    pub fn class(&self, type_name: &str) -> Result<&Arc<ClassInfo>, RegistryError> {
        self.get(type_name)
            .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))
    }

    /// Whether a type exists
    pub fn exists(&self, type_name: &str) -> bool {
        self.classes.contains_key(type_name)
    }

    /// Whether `type_name` is or derives from `ancestor`
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        self.get(type_name).is_some_and(|class| class.is_a(ancestor))
    }

    /// Find a property on a type or its ancestors
    pub fn lookup_property(&self, type_name: &str, name: &str) -> Result<&PropertyDescriptor, RegistryError> {
        self.class(type_name)?
            .lookup_property(name)
            .ok_or_else(|| not_found(type_name, name))
    }

    /// Find a method on a type or its ancestors
    pub fn lookup_method(&self, type_name: &str, name: &str) -> Result<&MethodDescriptor, RegistryError> {
        self.class(type_name)?
            .lookup_method(name)
            .ok_or_else(|| not_found(type_name, name))
    }

    /// Find a signal on a type or its ancestors
    pub fn lookup_signal(&self, type_name: &str, name: &str) -> Result<&SignalDescriptor, RegistryError> {
        self.class(type_name)?
            .lookup_signal(name)
            .ok_or_else(|| not_found(type_name, name))
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no types are registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn not_found(type_name: &str, member: &str) -> RegistryError {
    RegistryError::NotFound {
        type_name: type_name.to_string(),
        member: member.to_string(),
    }
}
