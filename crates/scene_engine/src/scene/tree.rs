//! Scene tree: arena of nodes, lifecycle state machine and public API
//!
//! Nodes live in a generational arena and are addressed by [`NodeId`]. A
//! node's parent is a handle, its children an ordered handle list. Every
//! structural operation runs its notification cascades to completion before
//! returning, and reports isolated handler failures in a [`DispatchReport`].

use std::collections::VecDeque;
use std::sync::Arc;

use super::error::SceneError;
use super::notification::{CascadeOrder, DispatchReport, Notification};
use crate::assets::ResourceLoader;
use crate::core::config::{EngineConfig, SceneConfig};
use crate::foundation::collections::{NodeArena, NodeId, OrderedHandles};
use crate::meta::core_types::validate_node_name;
use crate::meta::{PropertyInfo, TypeRegistry, Value};
use crate::object::{
    Behavior, ConnectFlags, DisconnectMode, ObjectBase, ObjectInstance, Services, TreeCommand,
};

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created, never part of the active tree
    Constructed,
    /// Part of the active tree
    InTree,
    /// Left the active tree and was not destroyed
    Removed,
    /// Storage reclaimed; the handle is stale
    Destroyed,
}

/// Arena slot: an object plus its tree relations
pub(super) struct TreeNode {
    pub(super) object: ObjectInstance,
    pub(super) parent: Option<NodeId>,
    pub(super) children: OrderedHandles,
    pub(super) state: NodeState,
    pub(super) ready_fired: bool,
}

impl TreeNode {
    fn new(object: ObjectInstance) -> Self {
        Self {
            object,
            parent: None,
            children: OrderedHandles::new(),
            state: NodeState::Constructed,
            ready_fired: false,
        }
    }

    pub(super) fn name(&self) -> &str {
        self.object.base().name()
    }
}

/// Hierarchical container of objects driving their lifecycle
pub struct SceneTree {
    pub(super) registry: Arc<TypeRegistry>,
    pub(super) services: Arc<Services>,
    pub(super) config: SceneConfig,
    pub(super) nodes: NodeArena<TreeNode>,
    pub(super) root: NodeId,
    /// Roots of subtrees currently being cascaded, innermost last
    pub(super) cascading: Vec<NodeId>,
    /// Commands waiting for the current operation to finish, with requester
    pub(super) deferred: VecDeque<(NodeId, TreeCommand)>,
    pub(super) depth: usize,
    pub(super) dispatch_depth: usize,
    pub(super) report: DispatchReport,
}

impl SceneTree {
    /// Create a tree with default services
    pub fn new(registry: Arc<TypeRegistry>, config: SceneConfig) -> Result<Self, SceneError> {
        Self::with_services(registry, config, Services::new())
    }

    /// Create a tree from engine-wide configuration
    ///
    /// The resource loader is built from the engine's resource settings.
    pub fn from_engine_config(registry: Arc<TypeRegistry>, config: &EngineConfig) -> Result<Self, SceneError> {
        config.validate()?;
        let services = Services::new().with(ResourceLoader::new(config.resources.clone()));
        Self::with_services(registry, config.scene.clone(), services)
    }

    /// Create a tree with explicitly injected services
    ///
    /// A [`ResourceLoader`] with default settings is registered unless the
    /// container already holds one. The root node is constructed from the
    /// configured type and immediately enters the tree.
    pub fn with_services(registry: Arc<TypeRegistry>, config: SceneConfig, mut services: Services) -> Result<Self, SceneError> {
        config.validate()?;
        if !services.contains::<ResourceLoader>() {
            services.insert(Arc::new(ResourceLoader::default()));
        }
        let services = Arc::new(services);

        let class = registry
            .get(&config.root_type)
            .cloned()
            .ok_or_else(|| SceneError::UnknownType(config.root_type.clone()))?;

        let mut nodes = NodeArena::with_key();
        let root = nodes.insert_with_key(|id| {
            TreeNode::new(ObjectInstance::new(ObjectBase::new(
                id,
                class,
                config.root_name.clone(),
                Arc::clone(&services),
            )))
        });

        let mut tree = Self {
            registry,
            services,
            config,
            nodes,
            root,
            cascading: Vec::new(),
            deferred: VecDeque::new(),
            depth: 0,
            dispatch_depth: 0,
            report: DispatchReport::new(),
        };

        log::info!(
            "Scene tree created with root '{}' ({})",
            tree.config.root_name,
            tree.config.root_type
        );
        tree.operation(|tree| {
            tree.cascading.push(root);
            tree.enter_subtree(root);
            tree.cascading.pop();
            Ok(())
        })?;
        Ok(tree)
    }

    /// Root node; always in the tree
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Type registry the tree constructs from
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Injected services
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Tree configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    /// Construct a detached node of a registered type
    ///
    /// The node receives no notification until it is attached.
    pub fn create(&mut self, type_name: &str, name: &str) -> Result<NodeId, SceneError> {
        let class = self
            .registry
            .get(type_name)
            .cloned()
            .ok_or_else(|| SceneError::UnknownType(type_name.to_string()))?;
        validate_node_name(name)?;

        let services = Arc::clone(&self.services);
        let id = self.nodes.insert_with_key(|id| {
            TreeNode::new(ObjectInstance::new(ObjectBase::new(id, class, name, services)))
        });
        log::debug!("Created {type_name} '{name}' as {id:?}");
        Ok(id)
    }

    /// Construct a detached node and attach a behavior to it
    pub fn create_with_behavior(&mut self, type_name: &str, name: &str, behavior: Box<dyn Behavior>) -> Result<NodeId, SceneError> {
        let id = self.create(type_name, name)?;
        self.set_behavior(id, Some(behavior))?;
        Ok(id)
    }

    /// Attach, replace or remove a node's behavior
    ///
    /// The previous behavior is torn down and returned.
    pub fn set_behavior(&mut self, node: NodeId, behavior: Option<Box<dyn Behavior>>) -> Result<Option<Box<dyn Behavior>>, SceneError> {
        self.operation(|tree| {
            let previous = tree.node_mut(node)?.object.set_behavior(behavior);
            tree.drain_outbox(node);
            Ok(previous)
        })
    }

    // ---------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------

    /// Attach `child` as the last child of `parent`
    ///
    /// Delivers `PARENTED` to the child; if `parent` is in the tree, cascades
    /// `ENTER_TREE` pre-order over the child's subtree, then `READY`
    /// post-order to every node of it that has not had `READY` yet.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<DispatchReport, SceneError> {
        self.operation(|tree| tree.attach_inner(parent, child))?;
        Ok(self.take_report())
    }

    /// Detach `child` from `parent`
    ///
    /// If the child was in the tree, cascades `EXIT_TREE` pre-order over its
    /// subtree first. Delivers `UNPARENTED` to the child last.
    pub fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<DispatchReport, SceneError> {
        self.operation(|tree| tree.detach_inner(parent, child))?;
        Ok(self.take_report())
    }

    /// Move `child` to position `index` among its siblings
    pub fn move_child(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<DispatchReport, SceneError> {
        self.operation(|tree| tree.move_child_inner(parent, child, index))?;
        Ok(self.take_report())
    }

    /// Destroy a node that has no parent and no children
    ///
    /// Delivers `PREDELETE` to the node only, tears down its behavior and
    /// reclaims its storage. Connections targeting it are removed.
    pub fn destroy(&mut self, node: NodeId) -> Result<DispatchReport, SceneError> {
        self.operation(|tree| tree.destroy_inner(node))?;
        Ok(self.take_report())
    }

    /// Detach a node, free its children last-to-first, then destroy it
    pub fn free(&mut self, node: NodeId) -> Result<DispatchReport, SceneError> {
        self.operation(|tree| tree.free_inner(node))?;
        Ok(self.take_report())
    }

    /// Re-arm `READY` for the node's next tree entry
    pub fn request_ready(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.node_mut(node)?.ready_fired = false;
        Ok(())
    }

    /// Free every node, root included
    ///
    /// Root children are freed last-to-first, then detached leftovers, then
    /// the root leaves the tree and is destroyed. Every handle is stale
    /// afterwards.
    pub fn shutdown(&mut self) -> DispatchReport {
        let root = self.root;
        let result = self.operation(|tree| {
            let children: Vec<_> = tree.node(root)?.children.iter().rev().collect();
            for child in children {
                if tree.nodes.contains_key(child) {
                    tree.free_inner(child)?;
                }
            }
            let orphans: Vec<_> = tree
                .nodes
                .iter()
                .filter(|(id, node)| *id != root && node.parent.is_none())
                .map(|(id, _)| id)
                .collect();
            for orphan in orphans {
                if tree.nodes.contains_key(orphan) {
                    tree.free_inner(orphan)?;
                }
            }
            tree.cascading.push(root);
            tree.exit_subtree(root);
            tree.cascading.pop();
            tree.reclaim(root);
            Ok(())
        });
        if let Err(error) = result {
            log::warn!("Scene tree shutdown incomplete: {error}");
        }
        log::info!("Scene tree shut down");
        self.take_report()
    }

    // ---------------------------------------------------------------------
    // Member access
    // ---------------------------------------------------------------------

    /// Read a property through the node's resolution chain
    pub fn get(&self, node: NodeId, name: &str) -> Result<Value, SceneError> {
        Ok(self.node(node)?.object.get(name)?)
    }

    /// Write a property through the node's resolution chain
    ///
    /// Failures of side effects (signal handlers, requested commands) are
    /// kept for [`SceneTree::take_report`].
    pub fn set(&mut self, node: NodeId, name: &str, value: impl Into<Value>) -> Result<(), SceneError> {
        let value = value.into();
        self.operation(|tree| tree.set_inner(node, name, value))
    }

    /// Call a method through the node's resolution chain
    pub fn call(&mut self, node: NodeId, method: &str, args: &[Value]) -> Result<Value, SceneError> {
        self.operation(|tree| tree.call_inner(node, method, args))
    }

    // ---------------------------------------------------------------------
    // Signals
    // ---------------------------------------------------------------------

    /// Subscribe `target.method` to `signal` of `source`
    pub fn connect(&mut self, source: NodeId, signal: &str, target: NodeId, method: &str, flags: ConnectFlags) -> Result<(), SceneError> {
        self.connect_inner(source, signal, target, method, flags)
    }

    /// Remove a subscription; see [`DisconnectMode`]
    pub fn disconnect(&mut self, source: NodeId, signal: &str, target: NodeId, method: &str, mode: DisconnectMode) -> Result<bool, SceneError> {
        self.disconnect_inner(source, signal, target, method, mode)
    }

    /// Whether `target.method` is subscribed to `signal` of `source`
    pub fn is_connected(&self, source: NodeId, signal: &str, target: NodeId, method: &str) -> Result<bool, SceneError> {
        Ok(self.node(source)?.object.base().signals().is_connected(signal, target, method))
    }

    /// Emit a declared signal of `source` and run its handlers
    pub fn emit_signal(&mut self, source: NodeId, signal: &str, args: Vec<Value>) -> Result<DispatchReport, SceneError> {
        self.node_mut(source)?.object.base_mut().emit_signal(signal, args)?;
        self.operation(|tree| {
            tree.drain_outbox(source);
            Ok(())
        })?;
        Ok(self.take_report())
    }

    // ---------------------------------------------------------------------
    // Notifications and queued work
    // ---------------------------------------------------------------------

    /// Deliver a notification to one node
    ///
    /// Lifecycle state is not changed; use the structural operations for
    /// that.
    pub fn notify(&mut self, node: NodeId, what: Notification) -> Result<DispatchReport, SceneError> {
        self.ensure_alive(node)?;
        self.operation(|tree| {
            tree.notify_node(node, what);
            Ok(())
        })?;
        Ok(self.take_report())
    }

    /// Deliver a notification to every node of a subtree in the given order
    pub fn cascade(&mut self, top: NodeId, what: Notification, order: CascadeOrder) -> Result<DispatchReport, SceneError> {
        self.ensure_alive(top)?;
        self.operation(|tree| {
            tree.cascade_inner(top, what, order);
            Ok(())
        })?;
        Ok(self.take_report())
    }

    /// Apply a command now, as if requested by a handler outside any cascade
    pub fn apply(&mut self, command: TreeCommand) -> Result<DispatchReport, SceneError> {
        self.operation(|tree| tree.execute_command(command, false))?;
        Ok(self.take_report())
    }

    /// Queue a command for the next deferred flush
    pub fn defer(&mut self, command: TreeCommand) {
        let requester = command.subject();
        self.deferred.push_back((requester, command));
    }

    /// Number of queued deferred commands
    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Apply queued deferred commands, for example once per frame
    pub fn flush_deferred(&mut self) -> DispatchReport {
        self.flush_deferred_inner();
        self.take_report()
    }

    /// Failures accumulated since the last report was handed out
    pub fn take_report(&mut self) -> DispatchReport {
        std::mem::take(&mut self.report)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Whether the handle refers to a live node
    pub fn is_instance_valid(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Lifecycle state; [`NodeState::Destroyed`] for stale handles
    pub fn state(&self, node: NodeId) -> NodeState {
        self.nodes.get(node).map_or(NodeState::Destroyed, |n| n.state)
    }

    /// Whether the node is part of the active tree
    pub fn is_inside_tree(&self, node: NodeId) -> bool {
        self.state(node) == NodeState::InTree
    }

    /// Whether the node already received `READY`
    pub fn is_ready(&self, node: NodeId) -> Result<bool, SceneError> {
        Ok(self.node(node)?.ready_fired)
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node's object
    pub fn object(&self, node: NodeId) -> Result<&ObjectInstance, SceneError> {
        Ok(&self.node(node)?.object)
    }

    /// Node name
    pub fn name(&self, node: NodeId) -> Result<&str, SceneError> {
        Ok(self.node(node)?.name())
    }

    /// Type name of the node
    pub fn type_name(&self, node: NodeId) -> Result<&str, SceneError> {
        Ok(self.node(node)?.object.base().type_name())
    }

    /// Parent of the node
    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, SceneError> {
        Ok(self.node(node)?.parent)
    }

    /// Children of the node, in order
    pub fn children(&self, node: NodeId) -> Result<&[NodeId], SceneError> {
        Ok(self.node(node)?.children.as_slice())
    }

    /// Child at a position
    pub fn child(&self, parent: NodeId, index: usize) -> Result<NodeId, SceneError> {
        let children = self.children(parent)?;
        children.get(index).copied().ok_or(SceneError::IndexOutOfRange {
            index,
            len: children.len(),
        })
    }

    /// Child with the given name
    pub fn find_child(&self, parent: NodeId, name: &str) -> Result<Option<NodeId>, SceneError> {
        Ok(self
            .node(parent)?
            .children
            .iter()
            .find(|&child| self.nodes.get(child).is_some_and(|n| n.name() == name)))
    }

    /// Resolve a node path
    ///
    /// Relative paths (`Enemies/Boss`, `../Hud`) start at `from`; absolute
    /// paths (`/root/Enemies`) start at the root, whose name must match.
    pub fn get_node(&self, from: NodeId, path: &str) -> Result<NodeId, SceneError> {
        self.ensure_alive(from)?;
        let not_found = || SceneError::NodeNotFound(path.to_string());

        let (mut current, relative) = match path.strip_prefix('/') {
            Some(absolute) => {
                let (first, rest) = absolute.split_once('/').unwrap_or((absolute, ""));
                if first != self.node(self.root)?.name() {
                    return Err(not_found());
                }
                (self.root, rest)
            }
            None => (from, path),
        };

        for part in relative.split('/') {
            current = match part {
                "" | "." => current,
                ".." => self.node(current)?.parent.ok_or_else(not_found)?,
                name => self.find_child(current, name)?.ok_or_else(not_found)?,
            };
        }
        Ok(current)
    }

    /// Path of the node; absolute (`/root/A/B`) when it hangs below the root
    pub fn get_path(&self, node: NodeId) -> Result<String, SceneError> {
        let mut names = Vec::new();
        let mut current = Some(node);
        let mut top = node;
        while let Some(id) = current {
            let entry = self.node(id)?;
            names.push(entry.name());
            top = id;
            current = entry.parent;
        }
        names.reverse();
        let joined = names.join("/");
        Ok(if top == self.root { format!("/{joined}") } else { joined })
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Properties of the node: behavior first, then the type chain
    pub fn property_list(&self, node: NodeId) -> Result<Vec<PropertyInfo>, SceneError> {
        Ok(self.node(node)?.object.property_list())
    }

    /// Whether the node's behavior or type declares the method
    pub fn has_method(&self, node: NodeId, method: &str) -> Result<bool, SceneError> {
        Ok(self.node(node)?.object.has_method(method))
    }

    /// Whether the node's type or behavior declares the signal
    pub fn has_signal(&self, node: NodeId, signal: &str) -> Result<bool, SceneError> {
        Ok(self.node(node)?.object.has_signal(signal))
    }

    /// Whether the node's type is `type_name` or derives from it
    pub fn is_class(&self, node: NodeId, type_name: &str) -> Result<bool, SceneError> {
        Ok(self.node(node)?.object.is_class(type_name))
    }

    /// Advisory configuration warning of the node's behavior
    pub fn configuration_warning(&self, node: NodeId) -> Result<String, SceneError> {
        Ok(self.node(node)?.object.configuration_warning())
    }

    // ---------------------------------------------------------------------
    // Arena access
    // ---------------------------------------------------------------------

    pub(super) fn node(&self, id: NodeId) -> Result<&TreeNode, SceneError> {
        self.nodes.get(id).ok_or(SceneError::StaleReference(id))
    }

    pub(super) fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode, SceneError> {
        self.nodes.get_mut(id).ok_or(SceneError::StaleReference(id))
    }

    pub(super) fn ensure_alive(&self, id: NodeId) -> Result<(), SceneError> {
        self.node(id).map(|_| ())
    }
}

impl std::fmt::Debug for SceneTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneTree")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("pending_deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}
