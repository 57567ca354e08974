//! Specialized collection types

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Generational handle of a node in a [`SceneTree`](crate::scene::SceneTree).
    ///
    /// A handle stays valid until the node is destroyed. Afterwards the slot
    /// may be reused, but the generation differs, so the old handle never
    /// aliases the new occupant.
    pub struct NodeId;
}

/// Arena of nodes addressed by [`NodeId`]
pub type NodeArena<T> = SlotMap<NodeId, T>;

/// Ordered, duplicate-free list of handles
///
/// Child lists need stable order plus cheap membership checks; scene trees
/// are shallow enough that a linear scan beats hashing here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHandles {
    items: Vec<NodeId>,
}

impl OrderedHandles {
    /// Create an empty list
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a handle; returns false if it was already present
    pub fn push(&mut self, id: NodeId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.items.push(id);
        true
    }

    /// Remove a handle, preserving the order of the rest
    pub fn remove(&mut self, id: NodeId) -> Option<usize> {
        let index = self.position(id)?;
        self.items.remove(index);
        Some(index)
    }

    /// Move an existing handle to `index`
    pub fn move_to(&mut self, id: NodeId, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        match self.remove(id) {
            Some(_) => {
                self.items.insert(index, id);
                true
            }
            None => false,
        }
    }

    /// Position of a handle
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.items.iter().position(|item| *item == id)
    }

    /// Whether the handle is present
    pub fn contains(&self, id: NodeId) -> bool {
        self.items.contains(&id)
    }

    /// Number of handles
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow as a slice
    pub fn as_slice(&self) -> &[NodeId] {
        &self.items
    }

    /// Iterate in order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.items.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_handles_keep_order() {
        let mut arena: NodeArena<()> = NodeArena::with_key();
        let a = arena.insert(());
        let b = arena.insert(());
        let c = arena.insert(());

        let mut list = OrderedHandles::new();
        assert!(list.push(a));
        assert!(list.push(b));
        assert!(list.push(c));
        assert!(!list.push(b));

        assert_eq!(list.remove(b), Some(1));
        assert_eq!(list.as_slice(), &[a, c]);

        assert!(list.move_to(c, 0));
        assert_eq!(list.as_slice(), &[c, a]);
        assert!(!list.move_to(c, 5));
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut arena: NodeArena<u32> = NodeArena::with_key();
        let first = arena.insert(1);
        arena.remove(first);
        let second = arena.insert(2);

        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&2));
    }
}
