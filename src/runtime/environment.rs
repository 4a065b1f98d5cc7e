//! Heap environment records
//!
//! A code block whose bindings are captured by a closure (or addressable
//! only by name) activates with a chain of heap records, one per
//! captured lexical block. Three record kinds exist:
//!
//! - `Declarative`: indexed slots, addressed by `(upper, slot)` pairs
//!   the resolver computed at compile time.
//! - `Named`: string-keyed bindings for code that lost indexed storage
//!   (direct eval, non-simple parameters, module top level).
//! - `Object`: a `with`-scope or module-namespace backing object.
//!
//! Uninitialized lexical bindings hold the `empty` sentinel; loads that
//! observe it raise the ReferenceError kind (temporal dead zone).

use rustc_hash::FxHashMap;

use crate::atom::Atom;
use crate::value::{EnvRef, ObjectRef, Value};

/// A string-keyed binding in a named record.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
    /// Lexical bindings are TDZ-checked and shadow the backing object
    /// in global/module scopes.
    pub lexical: bool,
}

/// One heap environment record.
#[derive(Debug)]
pub enum EnvRecord {
    Declarative {
        slots: Vec<Value>,
        parent: Option<EnvRef>,
    },
    Named {
        bindings: FxHashMap<Atom, Binding>,
        parent: Option<EnvRef>,
    },
    Object {
        object: ObjectRef,
        parent: Option<EnvRef>,
    },
}

impl EnvRecord {
    pub fn declarative(slot_count: u32, parent: Option<EnvRef>) -> Self {
        EnvRecord::Declarative {
            slots: vec![Value::empty(); slot_count as usize],
            parent,
        }
    }

    pub fn named(parent: Option<EnvRef>) -> Self {
        EnvRecord::Named {
            bindings: FxHashMap::default(),
            parent,
        }
    }

    pub fn object(object: ObjectRef, parent: Option<EnvRef>) -> Self {
        EnvRecord::Object { object, parent }
    }

    #[inline]
    pub fn parent(&self) -> Option<EnvRef> {
        match self {
            EnvRecord::Declarative { parent, .. }
            | EnvRecord::Named { parent, .. }
            | EnvRecord::Object { parent, .. } => *parent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarative_slots_start_empty() {
        let rec = EnvRecord::declarative(3, None);
        match rec {
            EnvRecord::Declarative { slots, parent } => {
                assert_eq!(slots.len(), 3);
                assert!(slots.iter().all(|v| v.is_empty()));
                assert!(parent.is_none());
            }
            _ => panic!("wrong record kind"),
        }
    }

    #[test]
    fn parent_chain() {
        let rec = EnvRecord::named(Some(EnvRef(4)));
        assert_eq!(rec.parent(), Some(EnvRef(4)));
    }
}
