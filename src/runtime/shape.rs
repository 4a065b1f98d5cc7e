//! Property shapes (hidden classes)
//!
//! Objects that performed the same sequence of property additions share
//! a shape. Shapes are immutable nodes in an arena-allocated transition
//! tree: each node records its parent, the key it adds, that key's
//! attribute bits and the slot index the value lands in. The arena and
//! the transition table live for the VM's lifetime.

use rustc_hash::FxHashMap;

use crate::runtime::property::{PropertyAttributes, PropertyKey};

/// Index of a shape in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(pub u32);

/// One node of the transition tree.
#[derive(Debug)]
pub struct Shape {
    /// Parent shape; `None` only for the root.
    pub parent: Option<ShapeId>,
    /// Transition label: the property this shape adds over its parent.
    pub key: PropertyKey,
    pub attributes: PropertyAttributes,
    /// Slot index of `key` in the owning object's slot vector.
    pub slot: u32,
    /// Total number of named slots an object with this shape has.
    pub slot_count: u32,
}

/// The VM-wide shape arena plus its transition table.
///
/// Shapes are published once and never mutated afterwards; the table is
/// only written while holding `&mut self`, which the single-writer
/// discipline of a VM instance guarantees.
pub struct ShapeTree {
    shapes: Vec<Shape>,
    transitions: FxHashMap<(ShapeId, PropertyKey, PropertyAttributes), ShapeId>,
    root: ShapeId,
}

impl ShapeTree {
    pub fn new() -> Self {
        let root = Shape {
            parent: None,
            // The root adds nothing; the label is never inspected.
            key: PropertyKey::Index(0),
            attributes: PropertyAttributes::empty(),
            slot: 0,
            slot_count: 0,
        };
        ShapeTree {
            shapes: vec![root],
            transitions: FxHashMap::default(),
            root: ShapeId(0),
        }
    }

    #[inline]
    pub fn root(&self) -> ShapeId {
        self.root
    }

    #[inline]
    pub fn shape(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.0 as usize]
    }

    #[inline]
    pub fn slot_count(&self, id: ShapeId) -> u32 {
        self.shape(id).slot_count
    }

    /// Follow (or create) the transition that adds `key` with `attrs`.
    pub fn transition(
        &mut self,
        from: ShapeId,
        key: PropertyKey,
        attrs: PropertyAttributes,
    ) -> ShapeId {
        if let Some(&existing) = self.transitions.get(&(from, key, attrs)) {
            return existing;
        }
        let slot_count = self.slot_count(from);
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(Shape {
            parent: Some(from),
            key,
            attributes: attrs,
            slot: slot_count,
            slot_count: slot_count + 1,
        });
        self.transitions.insert((from, key, attrs), id);
        id
    }

    /// Find `key` on the shape chain: slot index and attributes.
    pub fn lookup(&self, mut id: ShapeId, key: &PropertyKey) -> Option<(u32, PropertyAttributes)> {
        while let Some(parent) = self.shape(id).parent {
            let shape = self.shape(id);
            if shape.key == *key {
                return Some((shape.slot, shape.attributes));
            }
            id = parent;
        }
        None
    }

    /// All keys of a shape in insertion order with their attributes.
    pub fn keys_in_order(&self, mut id: ShapeId) -> Vec<(PropertyKey, PropertyAttributes)> {
        let mut keys = Vec::with_capacity(self.slot_count(id) as usize);
        while let Some(parent) = self.shape(id).parent {
            let shape = self.shape(id);
            keys.push((shape.key, shape.attributes));
            id = parent;
        }
        keys.reverse();
        keys
    }

    /// Rebuild the chain with `key`'s attributes replaced.
    ///
    /// Slot order is preserved, so the owning object's slot vector does
    /// not move.
    pub fn reconfigure(
        &mut self,
        id: ShapeId,
        key: &PropertyKey,
        new_attrs: PropertyAttributes,
    ) -> ShapeId {
        let keys = self.keys_in_order(id);
        let mut shape = self.root;
        for (k, attrs) in keys {
            let attrs = if k == *key { new_attrs } else { attrs };
            shape = self.transition(shape, k, attrs);
        }
        shape
    }

    /// Rebuild the chain without `key`. Returns the new shape and the
    /// vacated slot index so the owner can splice its slot vector.
    pub fn remove(&mut self, id: ShapeId, key: &PropertyKey) -> Option<(ShapeId, u32)> {
        let (slot, _) = self.lookup(id, key)?;
        let keys = self.keys_in_order(id);
        let mut shape = self.root;
        for (k, attrs) in keys {
            if k == *key {
                continue;
            }
            shape = self.transition(shape, k, attrs);
        }
        Some((shape, slot))
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;

    fn key(n: u32) -> PropertyKey {
        PropertyKey::Atom(Atom(n))
    }

    #[test]
    fn same_history_shares_shape() {
        let mut tree = ShapeTree::new();
        let a = PropertyAttributes::ALL_PRESENT;

        let s1 = tree.transition(tree.root(), key(1), a);
        let s2 = tree.transition(s1, key(2), a);

        let t1 = tree.transition(tree.root(), key(1), a);
        let t2 = tree.transition(t1, key(2), a);

        assert_eq!(s2, t2);
        assert_eq!(tree.slot_count(s2), 2);
    }

    #[test]
    fn different_attributes_fork() {
        let mut tree = ShapeTree::new();
        let s1 = tree.transition(tree.root(), key(1), PropertyAttributes::ALL_PRESENT);
        let s2 = tree.transition(tree.root(), key(1), PropertyAttributes::ENUMERABLE);
        assert_ne!(s1, s2);
    }

    #[test]
    fn lookup_walks_chain() {
        let mut tree = ShapeTree::new();
        let a = PropertyAttributes::ALL_PRESENT;
        let s1 = tree.transition(tree.root(), key(1), a);
        let s2 = tree.transition(s1, key(2), a);

        assert_eq!(tree.lookup(s2, &key(1)), Some((0, a)));
        assert_eq!(tree.lookup(s2, &key(2)), Some((1, a)));
        assert_eq!(tree.lookup(s2, &key(3)), None);
    }

    #[test]
    fn keys_in_insertion_order() {
        let mut tree = ShapeTree::new();
        let a = PropertyAttributes::ALL_PRESENT;
        let s1 = tree.transition(tree.root(), key(10), a);
        let s2 = tree.transition(s1, key(20), a);
        let keys: Vec<_> = tree.keys_in_order(s2).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![key(10), key(20)]);
    }

    #[test]
    fn reconfigure_keeps_slots() {
        let mut tree = ShapeTree::new();
        let a = PropertyAttributes::ALL_PRESENT;
        let s1 = tree.transition(tree.root(), key(1), a);
        let s2 = tree.transition(s1, key(2), a);

        let frozen = tree.reconfigure(s2, &key(1), PropertyAttributes::ENUMERABLE);
        assert_eq!(
            tree.lookup(frozen, &key(1)),
            Some((0, PropertyAttributes::ENUMERABLE))
        );
        assert_eq!(tree.lookup(frozen, &key(2)), Some((1, a)));
    }

    #[test]
    fn remove_reports_vacated_slot() {
        let mut tree = ShapeTree::new();
        let a = PropertyAttributes::ALL_PRESENT;
        let s1 = tree.transition(tree.root(), key(1), a);
        let s2 = tree.transition(s1, key(2), a);
        let s3 = tree.transition(s2, key(3), a);

        let (after, slot) = tree.remove(s3, &key(2)).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(tree.lookup(after, &key(1)), Some((0, a)));
        assert_eq!(tree.lookup(after, &key(3)), Some((1, a)));
        assert_eq!(tree.lookup(after, &key(2)), None);
    }
}
