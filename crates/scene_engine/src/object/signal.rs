//! Per-object signal subscriptions
//!
//! The bus only stores connections. Emission is driven by the scene tree,
//! which takes a [`SignalBus::snapshot`] at emission start and invokes the
//! handlers from that copy. Handlers that connect or disconnect during the
//! pass change the live list, never the copy being iterated.

use std::collections::HashMap;

use bitflags::bitflags;

use super::error::ObjectError;
use crate::foundation::collections::NodeId;

bitflags! {
    /// Connection options
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConnectFlags: u32 {
        /// Permit the same (target, method) pair more than once
        const ALLOW_DUPLICATES = 1 << 0;
        /// Disconnect automatically after the first delivery
        const ONE_SHOT = 1 << 1;
        /// Deliver through the deferred queue instead of synchronously
        const DEFERRED = 1 << 2;
    }
}

/// How [`SignalBus::disconnect`] treats a missing connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectMode {
    /// Missing connection is a no-op
    #[default]
    Lenient,
    /// Missing connection is [`ObjectError::NotConnected`]
    Strict,
}

/// One subscription of a signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// Node whose method handles the signal
    pub target: NodeId,
    /// Handler method name on the target
    pub method: String,
    /// Connection options
    pub flags: ConnectFlags,
    serial: u64,
}

impl Connection {
    fn matches(&self, target: NodeId, method: &str) -> bool {
        self.target == target && self.method == method
    }
}

/// Connections of every signal on one object, in connection order
#[derive(Debug, Default)]
pub struct SignalBus {
    connections: HashMap<String, Vec<Connection>>,
    next_serial: u64,
}

impl SignalBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `target.method` to `signal`
    ///
    /// The caller has already checked that the signal is declared.
    pub fn connect(&mut self, signal: &str, target: NodeId, method: &str, flags: ConnectFlags) -> Result<(), ObjectError> {
        let list = self.connections.entry(signal.to_string()).or_default();
        if !flags.contains(ConnectFlags::ALLOW_DUPLICATES) && list.iter().any(|c| c.matches(target, method)) {
            return Err(ObjectError::DuplicateConnection {
                signal: signal.to_string(),
                method: method.to_string(),
            });
        }
        list.push(Connection {
            target,
            method: method.to_string(),
            flags,
            serial: self.next_serial,
        });
        self.next_serial += 1;
        Ok(())
    }

    /// Remove one matching subscription
    ///
    /// Returns whether a connection was removed.
    pub fn disconnect(&mut self, signal: &str, target: NodeId, method: &str, mode: DisconnectMode) -> Result<bool, ObjectError> {
        let removed = self
            .connections
            .get_mut(signal)
            .and_then(|list| {
                let index = list.iter().position(|c| c.matches(target, method))?;
                list.remove(index);
                Some(())
            })
            .is_some();

        if !removed && mode == DisconnectMode::Strict {
            return Err(ObjectError::NotConnected {
                signal: signal.to_string(),
                method: method.to_string(),
            });
        }
        Ok(removed)
    }

    /// Whether `target.method` is subscribed to `signal`
    pub fn is_connected(&self, signal: &str, target: NodeId, method: &str) -> bool {
        self.connections
            .get(signal)
            .is_some_and(|list| list.iter().any(|c| c.matches(target, method)))
    }

    /// Live subscriptions of a signal
    pub fn connections(&self, signal: &str) -> &[Connection] {
        self.connections.get(signal).map_or(&[], Vec::as_slice)
    }

    /// Copy of the subscriptions for one emission pass
    ///
    /// One-shot connections are removed from the live list here, so they are
    /// delivered by this pass and never again.
    pub fn snapshot(&mut self, signal: &str) -> Vec<Connection> {
        let Some(list) = self.connections.get_mut(signal) else {
            return Vec::new();
        };
        let snapshot = list.clone();
        list.retain(|c| !c.flags.contains(ConnectFlags::ONE_SHOT));
        snapshot
    }

    /// Drop every subscription whose handler lives on `target`
    pub fn disconnect_target(&mut self, target: NodeId) -> usize {
        let mut removed = 0;
        for list in self.connections.values_mut() {
            let before = list.len();
            list.retain(|c| c.target != target);
            removed += before - list.len();
        }
        removed
    }

    /// Drop every subscription of a signal
    pub fn clear_signal(&mut self, signal: &str) -> usize {
        self.connections.remove(signal).map_or(0, |list| list.len())
    }

    /// Total number of subscriptions
    pub fn connection_count(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }
}
