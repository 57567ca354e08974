//! Engine-side state of an object
//!
//! [`ObjectBase`] is what the type's accessors, notification hooks and the
//! attached behavior operate on. It never reaches into the tree directly;
//! emissions and tree commands go into an outbox that the tree drains.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::command::{Outgoing, TreeCommand};
use super::error::ObjectError;
use super::services::Services;
use super::signal::SignalBus;
use crate::foundation::collections::NodeId;
use crate::meta::{ClassInfo, SignalDescriptor, Value};

/// Identity, type, storage and signal state of one object
#[derive(Debug)]
pub struct ObjectBase {
    id: NodeId,
    class: Arc<ClassInfo>,
    name: String,
    storage: HashMap<String, Value>,
    metadata: BTreeMap<String, Value>,
    signals: SignalBus,
    extra_signals: Vec<SignalDescriptor>,
    outbox: Vec<Outgoing>,
    services: Arc<Services>,
    inside_tree: bool,
    child_count: usize,
}

impl ObjectBase {
    /// Create the base of a freshly constructed object
    pub fn new(id: NodeId, class: Arc<ClassInfo>, name: impl Into<String>, services: Arc<Services>) -> Self {
        Self {
            id,
            class,
            name: name.into(),
            storage: HashMap::new(),
            metadata: BTreeMap::new(),
            signals: SignalBus::new(),
            extra_signals: Vec::new(),
            outbox: Vec::new(),
            services,
            inside_tree: false,
            child_count: 0,
        }
    }

    /// Handle of this object
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Frozen type of this object
    pub fn class(&self) -> &Arc<ClassInfo> {
        &self.class
    }

    /// Type name of this object
    pub fn type_name(&self) -> &str {
        self.class.name()
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the node name without validation or signals
    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Whether the node is currently part of the active tree
    pub fn is_inside_tree(&self) -> bool {
        self.inside_tree
    }

    /// Number of children, mirrored by the tree
    pub fn child_count(&self) -> usize {
        self.child_count
    }

    pub(crate) fn set_inside_tree(&mut self, inside: bool) {
        self.inside_tree = inside;
    }

    pub(crate) fn set_child_count(&mut self, count: usize) {
        self.child_count = count;
    }

    /// Stored value of a storage-backed property
    pub fn stored(&self, property: &str) -> Option<&Value> {
        self.storage.get(property)
    }

    /// Write a storage-backed property without schema checks
    pub fn store(&mut self, property: impl Into<String>, value: Value) {
        self.storage.insert(property.into(), value);
    }

    /// Metadata entry
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata entry
    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Remove a metadata entry
    pub fn remove_meta(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// Metadata keys, sorted
    pub fn meta_keys(&self) -> impl Iterator<Item = &str> {
        self.metadata.keys().map(String::as_str)
    }

    /// Subscriptions of this object's signals
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    /// Mutable subscriptions of this object's signals
    pub fn signals_mut(&mut self) -> &mut SignalBus {
        &mut self.signals
    }

    /// Declared signal, looked up on the type chain, then the behavior
    pub fn signal_descriptor(&self, signal: &str) -> Option<&SignalDescriptor> {
        self.class
            .lookup_signal(signal)
            .or_else(|| self.extra_signals.iter().find(|s| s.name == signal))
    }

    /// Whether the type or the attached behavior declares the signal
    pub fn has_signal(&self, signal: &str) -> bool {
        self.signal_descriptor(signal).is_some()
    }

    /// Replace the behavior-declared signals
    ///
    /// Subscriptions on a dropped signal go with it unless the type chain
    /// declares the same name.
    pub(crate) fn set_extra_signals(&mut self, signals: Vec<SignalDescriptor>) {
        let dropped = std::mem::replace(&mut self.extra_signals, signals);
        for signal in dropped {
            let still_declared = self.class.lookup_signal(&signal.name).is_some()
                || self.extra_signals.iter().any(|s| s.name == signal.name);
            if !still_declared {
                let removed = self.signals.clear_signal(&signal.name);
                if removed > 0 {
                    log::debug!("Dropped {removed} subscription(s) of '{}' on {:?}", signal.name, self.id);
                }
            }
        }
    }

    /// Emit a declared signal
    ///
    /// Arguments are checked against the signal's schema now; subscribers run
    /// as soon as the current handler returns control to the tree.
    pub fn emit_signal(&mut self, signal: &str, args: Vec<Value>) -> Result<(), ObjectError> {
        let descriptor = self.signal_descriptor(signal).ok_or_else(|| ObjectError::UnknownSignal {
            class: self.type_name().to_string(),
            signal: signal.to_string(),
        })?;
        descriptor.check_args(self.class.name(), &args)?;
        self.outbox.push(Outgoing::Emit {
            signal: signal.to_string(),
            args,
        });
        Ok(())
    }

    /// Ask the tree to apply a command once the current handler returns
    pub fn request(&mut self, command: TreeCommand) {
        self.outbox.push(Outgoing::Request(command));
    }

    /// Ask the tree to apply a command after the current tree operation
    pub fn defer(&mut self, command: TreeCommand) {
        self.outbox.push(Outgoing::Defer(command));
    }

    /// Shorthand for a deferred method call on this object
    pub fn call_deferred(&mut self, method: impl Into<String>, args: Vec<Value>) {
        let target = self.id;
        self.defer(TreeCommand::Call {
            target,
            method: method.into(),
            args,
        });
    }

    /// Shared services injected into the tree
    pub fn services(&self) -> &Services {
        &self.services
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::NodeArena;
    use crate::meta::TypeRegistryBuilder;
    use crate::object::ConnectFlags;

    fn node_base() -> ObjectBase {
        let registry = TypeRegistryBuilder::with_core_types().unwrap().build().unwrap();
        let mut arena: NodeArena<()> = NodeArena::with_key();
        let class = Arc::clone(registry.class("Node").unwrap());
        ObjectBase::new(arena.insert(()), class, "Player", Arc::new(Services::new()))
    }

    #[test]
    fn test_emit_checks_declaration() {
        let mut base = node_base();
        base.emit_signal("ready", Vec::new()).unwrap();
        assert!(matches!(
            base.emit_signal("exploded", Vec::new()),
            Err(ObjectError::UnknownSignal { .. })
        ));
        assert!(matches!(
            base.emit_signal("ready", vec![Value::Int(1)]),
            Err(ObjectError::ArgumentCount { .. })
        ));
        assert_eq!(base.take_outbox().len(), 1);
        assert!(base.take_outbox().is_empty());
    }

    #[test]
    fn test_extra_signals_are_declared() {
        let mut base = node_base();
        base.set_extra_signals(vec![SignalDescriptor::new("died")]);
        assert!(base.has_signal("died"));
        base.emit_signal("died", Vec::new()).unwrap();
    }

    #[test]
    fn test_dropped_extra_signal_loses_subscriptions() {
        let mut base = node_base();
        let me = base.id();
        base.set_extra_signals(vec![SignalDescriptor::new("died")]);
        base.signals_mut().connect("died", me, "mourn", ConnectFlags::empty()).unwrap();
        base.signals_mut().connect("ready", me, "greet", ConnectFlags::empty()).unwrap();

        base.set_extra_signals(Vec::new());
        assert!(!base.has_signal("died"));
        assert!(base.signals().connections("died").is_empty());
        assert_eq!(base.signals().connections("ready").len(), 1);
    }

    #[test]
    fn test_outbox_order() {
        let mut base = node_base();
        let id = base.id();
        base.request(TreeCommand::Free(id));
        base.call_deferred("queue", Vec::new());
        let outbox = base.take_outbox();
        assert!(matches!(outbox[0], Outgoing::Request(TreeCommand::Free(_))));
        assert!(matches!(outbox[1], Outgoing::Defer(TreeCommand::Call { .. })));
    }
}
