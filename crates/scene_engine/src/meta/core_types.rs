//! Built-in `Object` and `Node` types

use super::descriptor::{GenericHandler, MethodDescriptor, PropertyDescriptor, SignalDescriptor};
use super::registry::{ClassDef, RegistryError, TypeRegistryBuilder};
use super::value::{Value, ValueKind};
use crate::object::{ObjectBase, ObjectError};
use crate::scene::Notification;

/// Prefix of path-style metadata keys served by the `Node` fallback
pub const METADATA_PREFIX: &str = "metadata/";

/// Declare `Object` and `Node` on a builder
pub fn register(builder: &mut TypeRegistryBuilder) -> Result<(), RegistryError> {
    builder.define(ClassDef::new("Object", None))?;
    builder.define(node_class())?;
    Ok(())
}

fn node_class() -> ClassDef {
    ClassDef::new("Node", Some("Object"))
        .with_property(
            PropertyDescriptor::new("name", "")
                .with_getter(|base| Value::Str(base.name().to_string()))
                .with_setter(set_name),
        )
        .with_property(PropertyDescriptor::new("process_priority", 0).exported())
        .with_method(MethodDescriptor::new("get_name", |base, _| {
            Ok(Value::Str(base.name().to_string()))
        }))
        .with_method(MethodDescriptor::new("is_inside_tree", |base, _| {
            Ok(Value::Bool(base.is_inside_tree()))
        }))
        .with_method(MethodDescriptor::new("get_child_count", |base, _| {
            Ok(Value::Int(i64::try_from(base.child_count()).unwrap_or(i64::MAX)))
        }))
        .with_signal(SignalDescriptor::new("tree_entered"))
        .with_signal(SignalDescriptor::new("tree_exiting"))
        .with_signal(SignalDescriptor::new("ready"))
        .with_signal(SignalDescriptor::new("renamed"))
        .with_notification_hook(node_notification)
        .with_generic_handler(MetadataKeys)
}

fn set_name(base: &mut ObjectBase, value: Value) -> Result<(), ObjectError> {
    let found = value.kind();
    let Value::Str(name) = value else {
        return Err(ObjectError::TypeMismatch {
            member: "name".to_string(),
            expected: ValueKind::Str,
            found,
        });
    };
    validate_node_name(&name)?;
    if name != base.name() {
        base.set_name(name);
        base.emit_signal("renamed", Vec::new())?;
    }
    Ok(())
}

/// Reject names that would break path lookup
pub fn validate_node_name(name: &str) -> Result<(), ObjectError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ObjectError::InvalidArgument(format!(
            "'{name}' is not a valid node name"
        )));
    }
    Ok(())
}

fn node_notification(base: &mut ObjectBase, what: Notification) -> Result<(), ObjectError> {
    match what {
        Notification::EnterTree => base.emit_signal("tree_entered", Vec::new()),
        Notification::Ready => base.emit_signal("ready", Vec::new()),
        Notification::ExitTree => base.emit_signal("tree_exiting", Vec::new()),
        _ => Ok(()),
    }
}

/// Serves `metadata/<key>` from per-object metadata
struct MetadataKeys;

impl GenericHandler for MetadataKeys {
    fn generic_get(&self, base: &ObjectBase, name: &str) -> Option<Value> {
        let key = name.strip_prefix(METADATA_PREFIX)?;
        Some(base.meta(key).cloned().unwrap_or_default())
    }

    fn generic_set(&self, base: &mut ObjectBase, name: &str, value: &Value) -> Option<Result<(), ObjectError>> {
        let key = name.strip_prefix(METADATA_PREFIX)?;
        if key.is_empty() {
            return Some(Err(ObjectError::InvalidArgument(
                "metadata key cannot be empty".to_string(),
            )));
        }
        if value.is_nil() {
            base.remove_meta(key);
        } else {
            base.set_meta(key, value.clone());
        }
        Some(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_types_chain() {
        let registry = TypeRegistryBuilder::with_core_types().unwrap().build().unwrap();
        let node = registry.class("Node").unwrap();
        assert_eq!(node.chain_names(), vec!["Node", "Object"]);
        assert!(node.lookup_signal("ready").is_some());
        assert!(node.lookup_property("name").is_some());
        assert!(registry.class("Object").unwrap().lookup_signal("ready").is_none());
    }

    #[test]
    fn test_node_name_validation() {
        assert!(validate_node_name("Player").is_ok());
        assert!(validate_node_name("").is_err());
        assert!(validate_node_name("a/b").is_err());
        assert!(validate_node_name("..").is_err());
    }
}
