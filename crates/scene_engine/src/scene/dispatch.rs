//! Notification cascades, outbox processing and tree commands
//!
//! Everything here runs on the tree's single thread of control. Handlers
//! never hold a borrow of the tree; after each handler returns the tree
//! drains the object's outbox, running signal handlers synchronously,
//! applying requested commands, and queueing deferred ones until the
//! outermost operation completes.

use super::error::SceneError;
use super::notification::{CascadeOrder, FailureOrigin, Notification};
use super::tree::{NodeState, SceneTree};
use crate::foundation::collections::NodeId;
use crate::meta::Value;
use crate::object::{ConnectFlags, DisconnectMode, Outgoing, TreeCommand};

/// Maximum nesting of handler invocations (signal chains, command chains)
pub const MAX_DISPATCH_DEPTH: usize = 128;

impl SceneTree {
    /// Run a public operation; flushes deferred work when the outermost one ends
    pub(super) fn operation<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T, SceneError>) -> Result<T, SceneError> {
        self.depth += 1;
        let result = op(self);
        self.depth -= 1;
        if self.depth == 0 {
            self.flush_deferred_inner();
        }
        result
    }

    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T, SceneError>) -> Result<T, SceneError> {
        if self.dispatch_depth >= MAX_DISPATCH_DEPTH {
            return Err(SceneError::RecursionLimit(MAX_DISPATCH_DEPTH));
        }
        self.dispatch_depth += 1;
        let result = op(self);
        self.dispatch_depth -= 1;
        result
    }

    // ---------------------------------------------------------------------
    // Structural operations
    // ---------------------------------------------------------------------

    pub(super) fn attach_inner(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.ensure_alive(parent)?;
        self.ensure_alive(child)?;
        if parent == child || self.is_ancestor_or_self(child, parent) {
            return Err(SceneError::CycleRejected { parent, child });
        }
        if child == self.root {
            return Err(SceneError::RootLocked);
        }
        if self.node(child)?.parent.is_some() {
            return Err(SceneError::AlreadyParented(child));
        }

        self.make_unique_name(parent, child);
        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(child);
        let count = parent_node.children.len();
        parent_node.object.base_mut().set_child_count(count);
        self.node_mut(child)?.parent = Some(parent);
        log::debug!("Attached {child:?} under {parent:?}");

        self.cascading.push(child);
        self.notify_node(child, Notification::Parented);
        if self.state(parent) == NodeState::InTree {
            self.enter_subtree(child);
        }
        self.cascading.pop();
        Ok(())
    }

    pub(super) fn detach_inner(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.ensure_alive(parent)?;
        if child == self.root {
            return Err(SceneError::RootLocked);
        }
        if self.node(child)?.parent != Some(parent) {
            return Err(SceneError::NotAChild { parent, child });
        }

        self.cascading.push(child);
        if self.state(child) == NodeState::InTree {
            self.exit_subtree(child);
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.remove(child);
            let count = parent_node.children.len();
            parent_node.object.base_mut().set_child_count(count);
        }
        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = None;
        }
        log::debug!("Detached {child:?} from {parent:?}");
        self.notify_node(child, Notification::Unparented);
        self.cascading.pop();
        Ok(())
    }

    pub(super) fn move_child_inner(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<(), SceneError> {
        let parent_node = self.node(parent)?;
        if !parent_node.children.contains(child) {
            return Err(SceneError::NotAChild { parent, child });
        }
        let len = parent_node.children.len();
        if index >= len {
            return Err(SceneError::IndexOutOfRange { index, len });
        }
        if parent_node.children.position(child) == Some(index) {
            return Ok(());
        }

        self.node_mut(parent)?.children.move_to(child, index);
        log::debug!("Moved {child:?} to index {index} under {parent:?}");
        self.cascading.push(child);
        self.notify_node(child, Notification::MovedInParent);
        self.cascading.pop();
        Ok(())
    }

    pub(super) fn destroy_inner(&mut self, node: NodeId) -> Result<(), SceneError> {
        let entry = self.node(node)?;
        if node == self.root {
            return Err(SceneError::RootLocked);
        }
        if entry.parent.is_some() {
            return Err(SceneError::StillAttached(node));
        }
        if !entry.children.is_empty() {
            return Err(SceneError::HasChildren(node));
        }
        self.reclaim(node);
        Ok(())
    }

    /// `PREDELETE`, behavior teardown, storage reclaim, inbound connection purge
    pub(super) fn reclaim(&mut self, node: NodeId) {
        self.cascading.push(node);
        self.notify_node(node, Notification::Predelete);
        if let Some(entry) = self.nodes.get_mut(node) {
            entry.object.teardown();
        }
        self.drain_outbox(node);
        self.cascading.pop();

        if self.nodes.remove(node).is_some() {
            let purged: usize = self
                .nodes
                .values_mut()
                .map(|other| other.object.base_mut().signals_mut().disconnect_target(node))
                .sum();
            log::debug!("Destroyed {node:?}, purged {purged} inbound connection(s)");
        }
    }

    pub(super) fn free_inner(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.ensure_alive(node)?;
        if node == self.root {
            return Err(SceneError::RootLocked);
        }
        if let Some(parent) = self.node(node)?.parent {
            self.detach_inner(parent, node)?;
        }

        self.cascading.push(node);
        let result = self.free_children(node);
        self.cascading.pop();
        result?;

        self.destroy_inner(node)
    }

    fn free_children(&mut self, node: NodeId) -> Result<(), SceneError> {
        let children: Vec<_> = self.node(node)?.children.iter().rev().collect();
        for child in children {
            if self.nodes.contains_key(child) {
                self.free_inner(child)?;
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Cascades
    // ---------------------------------------------------------------------

    /// `ENTER_TREE` pre-order, then `READY` post-order where not yet fired
    pub(super) fn enter_subtree(&mut self, top: NodeId) {
        for id in self.pre_order(top) {
            let Some(entry) = self.nodes.get_mut(id) else {
                continue;
            };
            entry.state = NodeState::InTree;
            entry.object.base_mut().set_inside_tree(true);
            self.notify_node(id, Notification::EnterTree);
        }

        for id in self.post_order(top) {
            let Some(entry) = self.nodes.get_mut(id) else {
                continue;
            };
            if entry.ready_fired || entry.state != NodeState::InTree {
                continue;
            }
            entry.ready_fired = true;
            self.notify_node(id, Notification::Ready);
        }
    }

    /// `EXIT_TREE` pre-order while still inside, then mark the subtree removed
    pub(super) fn exit_subtree(&mut self, top: NodeId) {
        let nodes = self.pre_order(top);
        for &id in &nodes {
            self.notify_node(id, Notification::ExitTree);
        }
        for id in nodes {
            if let Some(entry) = self.nodes.get_mut(id) {
                if entry.state == NodeState::InTree {
                    entry.state = NodeState::Removed;
                    entry.object.base_mut().set_inside_tree(false);
                }
            }
        }
    }

    pub(super) fn cascade_inner(&mut self, top: NodeId, what: Notification, order: CascadeOrder) {
        let nodes = match order {
            CascadeOrder::PreOrder => self.pre_order(top),
            CascadeOrder::PostOrder => self.post_order(top),
        };
        log::debug!("Cascading {what} over {} node(s) from {top:?} ({order:?})", nodes.len());
        self.cascading.push(top);
        for id in nodes {
            self.notify_node(id, what);
        }
        self.cascading.pop();
    }

    /// Deliver one notification and drain what its handlers produced
    pub(super) fn notify_node(&mut self, id: NodeId, what: Notification) {
        let result = self.guarded(|tree| {
            let Some(entry) = tree.nodes.get_mut(id) else {
                return Ok(());
            };
            log::trace!("{what} -> {id:?} '{}'", entry.name());
            let errors = entry.object.notify(what);
            for error in errors {
                tree.report.push(id, FailureOrigin::Notification(what), error.into());
            }
            tree.drain_outbox(id);
            Ok(())
        });
        if let Err(error) = result {
            self.report.push(id, FailureOrigin::Notification(what), error);
        }
    }

    pub(super) fn pre_order(&self, top: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            let Some(entry) = self.nodes.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(entry.children.iter().rev());
        }
        order
    }

    pub(super) fn post_order(&self, top: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![(top, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            let Some(entry) = self.nodes.get(id) else {
                continue;
            };
            stack.push((id, true));
            stack.extend(entry.children.iter().rev().map(|child| (child, false)));
        }
        order
    }

    pub(super) fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    fn make_unique_name(&mut self, parent: NodeId, child: NodeId) {
        let Some(name) = self.nodes.get(child).map(|n| n.name().to_string()) else {
            return;
        };
        let Some(unique) = self.unique_sibling_name(parent, child, &name) else {
            return;
        };
        log::debug!("Renamed {child:?} from '{name}' to '{unique}' to keep sibling names unique");
        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.object.base_mut().set_name(unique);
        }
    }

    /// Suffixed variant of `name` when a sibling of `child` already uses it
    fn unique_sibling_name(&self, parent: NodeId, child: NodeId, name: &str) -> Option<String> {
        if !self.config.unique_names {
            return None;
        }
        let parent_node = self.nodes.get(parent)?;
        let taken: Vec<&str> = parent_node
            .children
            .iter()
            .filter(|&sibling| sibling != child)
            .filter_map(|sibling| self.nodes.get(sibling).map(|n| n.name()))
            .collect();
        if !taken.contains(&name) {
            return None;
        }
        let unique = (2..)
            .map(|n| format!("{name}{n}"))
            .find(|candidate| !taken.contains(&candidate.as_str()))
            .unwrap_or_else(|| format!("{name}{}", taken.len() + 2));
        Some(unique)
    }

    // ---------------------------------------------------------------------
    // Member access and signals
    // ---------------------------------------------------------------------

    pub(super) fn set_inner(&mut self, target: NodeId, property: &str, value: Value) -> Result<(), SceneError> {
        self.guarded(|tree| {
            // Suffix a colliding name before the setter so `renamed` sees the final one
            let value = match (property, value) {
                ("name", Value::Str(requested)) => {
                    let unique = tree
                        .nodes
                        .get(target)
                        .and_then(|n| n.parent)
                        .and_then(|parent| tree.unique_sibling_name(parent, target, &requested));
                    Value::Str(unique.unwrap_or(requested))
                }
                (_, value) => value,
            };
            let result = tree.node_mut(target)?.object.set(property, value);
            tree.drain_outbox(target);
            Ok(result?)
        })
    }

    pub(super) fn call_inner(&mut self, target: NodeId, method: &str, args: &[Value]) -> Result<Value, SceneError> {
        self.guarded(|tree| {
            let result = tree.node_mut(target)?.object.call(method, args);
            tree.drain_outbox(target);
            Ok(result?)
        })
    }

    pub(super) fn connect_inner(
        &mut self,
        source: NodeId,
        signal: &str,
        target: NodeId,
        method: &str,
        flags: ConnectFlags,
    ) -> Result<(), SceneError> {
        self.ensure_alive(target)?;
        self.node_mut(source)?.object.connect(signal, target, method, flags)?;
        log::debug!("Connected {source:?}.{signal} -> {target:?}.{method} ({flags:?})");
        Ok(())
    }

    pub(super) fn disconnect_inner(
        &mut self,
        source: NodeId,
        signal: &str,
        target: NodeId,
        method: &str,
        mode: DisconnectMode,
    ) -> Result<bool, SceneError> {
        Ok(self.node_mut(source)?.object.disconnect(signal, target, method, mode)?)
    }

    /// Run handlers of one emission against a snapshot of the connections
    fn emit_inner(&mut self, source: NodeId, signal: &str, args: &[Value]) {
        let Some(entry) = self.nodes.get_mut(source) else {
            return;
        };
        let connections = entry.object.base_mut().signals_mut().snapshot(signal);
        log::trace!("{source:?} emits '{signal}' to {} handler(s)", connections.len());

        for connection in connections {
            if connection.flags.contains(ConnectFlags::DEFERRED) {
                self.deferred.push_back((
                    connection.target,
                    TreeCommand::Call {
                        target: connection.target,
                        method: connection.method,
                        args: args.to_vec(),
                    },
                ));
                continue;
            }
            if !self.nodes.contains_key(connection.target) {
                log::warn!("Dropping '{signal}' for destroyed target {:?}", connection.target);
                continue;
            }
            if let Err(error) = self.call_inner(connection.target, &connection.method, args) {
                self.report.push(
                    connection.target,
                    FailureOrigin::Signal {
                        signal: signal.to_string(),
                        method: connection.method.clone(),
                    },
                    error,
                );
            }
        }
    }

    /// Process everything a node's handlers produced, until its outbox stays empty
    pub(super) fn drain_outbox(&mut self, node: NodeId) {
        loop {
            let Some(entry) = self.nodes.get_mut(node) else {
                return;
            };
            let outbox = entry.object.base_mut().take_outbox();
            if outbox.is_empty() {
                return;
            }
            for outgoing in outbox {
                match outgoing {
                    Outgoing::Emit { signal, args } => self.emit_inner(node, &signal, &args),
                    Outgoing::Request(command) => {
                        if let Err(error) = self.execute_command(command, true) {
                            self.report.push(node, FailureOrigin::Command, error);
                        }
                    }
                    Outgoing::Defer(command) => self.deferred.push_back((node, command)),
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Apply a command; `from_handler` enables the reentrancy guard
    pub(super) fn execute_command(&mut self, command: TreeCommand, from_handler: bool) -> Result<(), SceneError> {
        if from_handler {
            self.check_reentrancy(&command)?;
        }
        match command {
            TreeCommand::Attach { parent, child } => self.attach_inner(parent, child),
            TreeCommand::Detach { parent, child } => self.detach_inner(parent, child),
            TreeCommand::Free(node) => self.free_inner(node),
            TreeCommand::MoveChild { parent, child, index } => self.move_child_inner(parent, child, index),
            TreeCommand::Connect { source, signal, target, method, flags } => {
                self.connect_inner(source, &signal, target, &method, flags)
            }
            TreeCommand::Disconnect { source, signal, target, method } => self
                .disconnect_inner(source, &signal, target, &method, DisconnectMode::Lenient)
                .map(|_| ()),
            TreeCommand::Call { target, method, args } => self.call_inner(target, &method, &args).map(|_| ()),
            TreeCommand::Set { target, property, value } => self.set_inner(target, &property, value),
        }
    }

    /// Reject structural commands that would reshape a subtree mid-cascade
    fn check_reentrancy(&self, command: &TreeCommand) -> Result<(), SceneError> {
        if self.cascading.is_empty() {
            return Ok(());
        }
        let rejected = match *command {
            TreeCommand::Attach { parent, child } => {
                [parent, child].into_iter().find(|&n| self.within_cascade(n) || self.encloses_cascade(n))
            }
            TreeCommand::Detach { child, .. } | TreeCommand::Free(child) => {
                Some(child).filter(|&n| self.within_cascade(n) || self.encloses_cascade(n))
            }
            TreeCommand::MoveChild { child, .. } => Some(child).filter(|&n| self.within_cascade(n)),
            _ => None,
        };
        match rejected {
            Some(node) => {
                log::warn!("Rejected reentrant {command:?}: {node:?} is part of a running cascade");
                Err(SceneError::ReentrantMutation(node))
            }
            None => Ok(()),
        }
    }

    fn within_cascade(&self, node: NodeId) -> bool {
        self.cascading.iter().any(|&top| self.is_ancestor_or_self(top, node))
    }

    fn encloses_cascade(&self, node: NodeId) -> bool {
        self.cascading.iter().any(|&top| self.is_ancestor_or_self(node, top))
    }

    /// Apply queued commands FIFO; commands queued meanwhile run in the next pass
    pub(super) fn flush_deferred_inner(&mut self) {
        let limit = self.config.deferred_flush_limit.max(1);
        self.depth += 1;
        for pass in 1..=limit {
            if self.deferred.is_empty() {
                break;
            }
            let batch = std::mem::take(&mut self.deferred);
            log::debug!("Flushing {} deferred command(s), pass {pass}", batch.len());
            for (requester, command) in batch {
                if let Err(error) = self.execute_command(command, false) {
                    self.report.push(requester, FailureOrigin::Deferred, error);
                }
            }
        }
        self.depth -= 1;
        if !self.deferred.is_empty() {
            log::warn!(
                "{} deferred command(s) still queued after {limit} pass(es)",
                self.deferred.len()
            );
        }
    }
}
