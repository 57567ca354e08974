//! Type metadata: values, member descriptors and the type registry
//!
//! Types are registered once at startup and never change afterwards. Each
//! object keeps an `Arc` to its frozen [`ClassInfo`], which is what the
//! resolution chain in [`crate::object`] consults.

pub mod core_types;
pub mod descriptor;
pub mod registry;
pub mod value;

pub use descriptor::{
    GenericHandler, Getter, MethodDescriptor, MethodFn, NotificationHook, ParamInfo,
    PropertyDescriptor, PropertyInfo, PropertyUsage, Setter, SignalDescriptor,
};
pub use registry::{ClassDef, ClassInfo, RegistryError, TypeRegistry, TypeRegistryBuilder};
pub use value::{Value, ValueKind};
