//! JavaScript object representation
//!
//! Every object carries a shape id describing its named-slot layout, the
//! slot values themselves, a prototype handle, the extensible flag and a
//! kind tag for builtin internal slots. Arrays additionally own a dense
//! element vector while they remain in fast mode; any attribute or
//! accessor violation demotes the indexed entries to shape storage for
//! the rest of the object's lifetime.

use crate::context::VmInstance;
use crate::runtime::function::FunctionData;
use crate::runtime::property::{
    PropertyAttributes, PropertyDescriptor, PropertyKey, PropertySlot,
};
use crate::value::{ObjectRef, StringRef, SymbolRef, Value};

/// How far past the current length an indexed write may land before the
/// array is demoted to shape storage instead of filling with holes.
const FAST_ARRAY_GAP_LIMIT: u32 = 1024;

/// Maximum fast-array length; larger lengths force shape storage.
pub const MAX_FAST_ARRAY_LENGTH: u32 = (1 << 27) - 1;

/// Error kinds of the builtin error hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
    UriError,
    EvalError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::UriError => "URIError",
            ErrorKind::EvalError => "EvalError",
        }
    }
}

/// Dense indexed storage of an array.
///
/// While `fast` is `Some`, the vector's length equals the array's
/// logical length and holes are the `empty` sentinel. Once demoted the
/// indexed entries live in the shape as `PropertyKey::Index` properties
/// and `fast` never becomes `Some` again.
#[derive(Debug)]
pub struct ArrayData {
    pub fast: Option<Vec<Value>>,
    pub length: u32,
}

/// Iteration kind of keys/values/entries iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationKind {
    Key,
    Value,
    KeyValue,
}

/// State of an array iterator object.
#[derive(Debug)]
pub struct ArrayIteratorData {
    pub target: ObjectRef,
    pub kind: IterationKind,
    pub next_index: u32,
    pub done: bool,
}

/// State of a for-in enumerator.
#[derive(Debug)]
pub struct EnumerateData {
    pub object: ObjectRef,
    pub keys: Vec<PropertyKey>,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// A queued `then` registration: run `handler` with the settlement
/// value, settle `derived` with the outcome.
#[derive(Debug, Clone, Copy)]
pub struct PromiseReaction {
    pub handler: Option<ObjectRef>,
    pub derived: Option<ObjectRef>,
}

#[derive(Debug)]
pub struct PromiseData {
    pub state: PromiseState,
    pub result: Value,
    pub fulfill_reactions: Vec<PromiseReaction>,
    pub reject_reactions: Vec<PromiseReaction>,
}

/// Internal-slot record of builtin wrappers, stored as a tag on the
/// object instead of a class hierarchy.
#[derive(Debug)]
pub enum ObjectKind {
    Plain,
    Array(ArrayData),
    Function(Box<FunctionData>),
    NumberWrapper(f64),
    BooleanWrapper(bool),
    StringWrapper(StringRef),
    SymbolWrapper(SymbolRef),
    Error {
        kind: ErrorKind,
        /// Captured at construction; surfaced to the embedder.
        stack: Vec<crate::context::StackEntry>,
    },
    ArrayIterator(Box<ArrayIteratorData>),
    StringIterator {
        string: StringRef,
        next: u32,
    },
    Enumerator(Box<EnumerateData>),
    Promise(Box<PromiseData>),
}

/// A JavaScript object.
#[derive(Debug)]
pub struct JsObject {
    pub shape: crate::runtime::shape::ShapeId,
    pub slots: Vec<PropertySlot>,
    pub prototype: Option<ObjectRef>,
    pub extensible: bool,
    pub kind: ObjectKind,
}

impl JsObject {
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn function_data(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl VmInstance {
    /// Allocate an object with the root shape.
    pub fn alloc_object(&mut self, prototype: Option<ObjectRef>, kind: ObjectKind) -> ObjectRef {
        let shape = self.shapes.root();
        self.heap.alloc_object(JsObject {
            shape,
            slots: Vec::new(),
            prototype,
            extensible: true,
            kind,
        })
    }

    /// Allocate a fast-mode array of `length` holes.
    pub fn alloc_array(&mut self, prototype: Option<ObjectRef>, length: u32) -> ObjectRef {
        let kind = if length <= MAX_FAST_ARRAY_LENGTH {
            ObjectKind::Array(ArrayData {
                fast: Some(vec![Value::empty(); length as usize]),
                length,
            })
        } else {
            ObjectKind::Array(ArrayData { fast: None, length })
        };
        self.alloc_object(prototype, kind)
    }

    /// Allocate a fast-mode array from elements (holes as `empty`).
    pub fn alloc_array_from(&mut self, prototype: Option<ObjectRef>, values: Vec<Value>) -> ObjectRef {
        let length = values.len() as u32;
        self.alloc_object(
            prototype,
            ObjectKind::Array(ArrayData {
                fast: Some(values),
                length,
            }),
        )
    }

    // Own-property access

    /// Look up an own property. Returns its slot content and attributes.
    pub fn get_own_property(
        &mut self,
        obj: ObjectRef,
        key: &PropertyKey,
    ) -> Option<(PropertySlot, PropertyAttributes)> {
        // Virtual properties of arrays and string wrappers come first.
        match (&self.heap.object(obj).kind, key) {
            (ObjectKind::Array(data), PropertyKey::Index(i)) => {
                if let Some(fast) = &data.fast {
                    return if *i < data.length && !fast[*i as usize].is_empty() {
                        Some((
                            PropertySlot::Data(fast[*i as usize]),
                            PropertyAttributes::ALL_PRESENT,
                        ))
                    } else {
                        None
                    };
                }
                // fall through to shape storage
            }
            (ObjectKind::Array(data), PropertyKey::Atom(a)) if *a == self.wk.length => {
                return Some((
                    PropertySlot::Data(Value::number(data.length as f64)),
                    PropertyAttributes::WRITABLE,
                ));
            }
            (ObjectKind::StringWrapper(s), PropertyKey::Atom(a)) if *a == self.wk.length => {
                let len = self.heap.string(*s).len();
                return Some((
                    PropertySlot::Data(Value::number(len as f64)),
                    PropertyAttributes::empty(),
                ));
            }
            (ObjectKind::StringWrapper(s), PropertyKey::Index(i)) => {
                let s = *s;
                let i = *i;
                if i < self.heap.string(s).len() {
                    self.heap.flatten(s);
                    let unit = self.heap.string(s).code_unit(i);
                    let char_str = self.heap.alloc_string_from_units(vec![unit]);
                    return Some((
                        PropertySlot::Data(Value::string(char_str)),
                        PropertyAttributes::ENUMERABLE,
                    ));
                }
                // fall through: expando index on a wrapper lives in the shape
            }
            _ => {}
        }

        let shape = self.heap.object(obj).shape;
        let (slot, attrs) = self.shapes.lookup(shape, key)?;
        Some((self.heap.object(obj).slots[slot as usize], attrs))
    }

    pub fn has_own_property(&mut self, obj: ObjectRef, key: &PropertyKey) -> bool {
        self.get_own_property(obj, key).is_some()
    }

    /// OrdinaryDefineOwnProperty (ES2017 9.1.6) plus the array length
    /// and fast-element special cases. Returns false when the
    /// definition is rejected; the object is unchanged in that case.
    pub fn define_own_property(
        &mut self,
        obj: ObjectRef,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> bool {
        // Array `length` assignment.
        if let ObjectKind::Array(_) = self.heap.object(obj).kind {
            if let PropertyKey::Atom(a) = key {
                if a == self.wk.length {
                    if desc.is_accessor_descriptor() || desc.configurable == Some(true) {
                        return false;
                    }
                    let Some(value) = desc.value else { return true };
                    let Some(n) = value.as_number() else {
                        return false;
                    };
                    let Some(new_len) = crate::value::array_index_f64(n) else {
                        return false;
                    };
                    return self.set_array_length(obj, new_len);
                }
            }
            if let PropertyKey::Index(i) = key {
                if self.array_is_fast(obj) {
                    if let Some(value) = desc.as_fast_data() {
                        // Plain data write stays on the fast path.
                        return self.fast_array_set(obj, i, value);
                    }
                    // Attribute or accessor definition: leave fast mode.
                    self.demote_array_storage(obj);
                }
            }
        }

        let existing = self.get_shape_property(obj, &key);
        match existing {
            None => {
                if !self.heap.object(obj).extensible {
                    return false;
                }
                let desc = desc.complete();
                let attrs = desc.attributes();
                let shape = self.heap.object(obj).shape;
                let new_shape = self.shapes.transition(shape, key, attrs);
                let slot = match desc {
                    d if d.is_accessor_descriptor() => PropertySlot::Accessor {
                        get: d.get.unwrap_or(None),
                        set: d.set.unwrap_or(None),
                    },
                    d => PropertySlot::Data(d.value.unwrap_or(Value::undefined())),
                };
                let object = self.heap.object_mut(obj);
                object.shape = new_shape;
                object.slots.push(slot);
                self.grow_array_length_for_index(obj, &key);
                true
            }
            Some((slot_idx, attrs)) => self.redefine_property(obj, key, slot_idx, attrs, desc),
        }
    }

    /// Defining an index at or past the current length grows a
    /// slow-mode array's length, matching ArraySetLength interplay.
    fn grow_array_length_for_index(&mut self, obj: ObjectRef, key: &PropertyKey) {
        if let PropertyKey::Index(i) = key {
            if let ObjectKind::Array(data) = &mut self.heap.object_mut(obj).kind {
                if data.fast.is_none() && *i >= data.length {
                    data.length = *i + 1;
                }
            }
        }
    }

    /// Validate and apply a redefinition of an existing shape property.
    fn redefine_property(
        &mut self,
        obj: ObjectRef,
        key: PropertyKey,
        slot_idx: u32,
        attrs: PropertyAttributes,
        desc: PropertyDescriptor,
    ) -> bool {
        let current = self.heap.object(obj).slots[slot_idx as usize];
        if !attrs.is_configurable() {
            if desc.configurable == Some(true) {
                return false;
            }
            if let Some(e) = desc.enumerable {
                if e != attrs.is_enumerable() {
                    return false;
                }
            }
            if desc.is_accessor_descriptor() && !attrs.is_accessor() {
                return false;
            }
            if desc.is_data_descriptor() && attrs.is_accessor() {
                return false;
            }
            if !attrs.is_accessor() && !attrs.is_writable() {
                if desc.writable == Some(true) {
                    return false;
                }
                if let (Some(new), PropertySlot::Data(old)) = (desc.value, current) {
                    if !self.same_value(new, old) {
                        return false;
                    }
                }
            }
            if attrs.is_accessor() {
                if let PropertySlot::Accessor { get, set } = current {
                    if let Some(new_get) = desc.get {
                        if new_get != get {
                            return false;
                        }
                    }
                    if let Some(new_set) = desc.set {
                        if new_set != set {
                            return false;
                        }
                    }
                }
            }
        }

        // Compute the resulting attributes and slot content.
        let becomes_accessor = desc.is_accessor_descriptor()
            || (attrs.is_accessor() && !desc.is_data_descriptor());
        let mut new_attrs = PropertyAttributes::empty();
        if becomes_accessor {
            new_attrs |= PropertyAttributes::ACCESSOR;
        } else if desc.writable.unwrap_or_else(|| {
            if attrs.is_accessor() {
                false
            } else {
                attrs.is_writable()
            }
        }) {
            new_attrs |= PropertyAttributes::WRITABLE;
        }
        if desc.enumerable.unwrap_or(attrs.is_enumerable()) {
            new_attrs |= PropertyAttributes::ENUMERABLE;
        }
        if desc.configurable.unwrap_or(attrs.is_configurable()) {
            new_attrs |= PropertyAttributes::CONFIGURABLE;
        }

        let new_slot = if becomes_accessor {
            let (old_get, old_set) = match current {
                PropertySlot::Accessor { get, set } => (get, set),
                PropertySlot::Data(_) => (None, None),
            };
            PropertySlot::Accessor {
                get: desc.get.unwrap_or(old_get),
                set: desc.set.unwrap_or(old_set),
            }
        } else {
            let old_value = match current {
                PropertySlot::Data(v) => v,
                PropertySlot::Accessor { .. } => Value::undefined(),
            };
            PropertySlot::Data(desc.value.unwrap_or(old_value))
        };

        if new_attrs != attrs {
            let shape = self.heap.object(obj).shape;
            let new_shape = self.shapes.reconfigure(shape, &key, new_attrs);
            self.heap.object_mut(obj).shape = new_shape;
        }
        self.heap.object_mut(obj).slots[slot_idx as usize] = new_slot;
        true
    }

    /// Shape-stored property only (skips the virtual/fast paths).
    fn get_shape_property(
        &self,
        obj: ObjectRef,
        key: &PropertyKey,
    ) -> Option<(u32, PropertyAttributes)> {
        let shape = self.heap.object(obj).shape;
        self.shapes.lookup(shape, key)
    }

    /// Delete an own property. Returns false when the property exists
    /// and is non-configurable.
    pub fn delete_own_property(&mut self, obj: ObjectRef, key: &PropertyKey) -> bool {
        if let ObjectKind::Array(data) = &mut self.heap.object_mut(obj).kind {
            if let PropertyKey::Index(i) = key {
                if let Some(fast) = &mut data.fast {
                    if *i < data.length {
                        fast[*i as usize] = Value::empty();
                    }
                    return true;
                }
            }
            if let PropertyKey::Atom(a) = key {
                if *a == self.wk.length {
                    return false;
                }
            }
        }

        let shape = self.heap.object(obj).shape;
        match self.shapes.lookup(shape, key) {
            None => true,
            Some((_, attrs)) => {
                if !attrs.is_configurable() {
                    return false;
                }
                if let Some((new_shape, slot)) = self.shapes.remove(shape, key) {
                    let object = self.heap.object_mut(obj);
                    object.shape = new_shape;
                    object.slots.remove(slot as usize);
                }
                true
            }
        }
    }

    /// Own keys: integer indices ascending, then string keys in
    /// insertion order, then symbol keys in insertion order.
    pub fn own_keys(&mut self, obj: ObjectRef) -> Vec<PropertyKey> {
        let mut indices: Vec<u32> = Vec::new();
        let mut virtual_length = false;

        match &self.heap.object(obj).kind {
            ObjectKind::Array(data) => {
                virtual_length = true;
                if let Some(fast) = &data.fast {
                    for (i, v) in fast.iter().enumerate() {
                        if !v.is_empty() {
                            indices.push(i as u32);
                        }
                    }
                }
            }
            ObjectKind::StringWrapper(s) => {
                virtual_length = true;
                for i in 0..self.heap.string(*s).len() {
                    indices.push(i);
                }
            }
            _ => {}
        }

        let shape = self.heap.object(obj).shape;
        let mut atoms = Vec::new();
        let mut symbols = Vec::new();
        for (key, _) in self.shapes.keys_in_order(shape) {
            match key {
                PropertyKey::Index(i) => indices.push(i),
                PropertyKey::Atom(_) => atoms.push(key),
                PropertyKey::Symbol(_) => symbols.push(key),
            }
        }
        indices.sort_unstable();

        let mut keys: Vec<PropertyKey> =
            indices.into_iter().map(PropertyKey::Index).collect();
        if virtual_length {
            keys.push(PropertyKey::Atom(self.wk.length));
        }
        keys.extend(atoms);
        keys.extend(symbols);
        keys
    }

    /// Keys for for-in: own and inherited enumerable string-keyed
    /// properties, shadowed names reported once.
    pub fn enumerate_keys(&mut self, obj: ObjectRef) -> Vec<PropertyKey> {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut keys = Vec::new();
        let mut cursor = Some(obj);
        while let Some(o) = cursor {
            for key in self.own_keys(o) {
                if matches!(key, PropertyKey::Symbol(_)) {
                    continue;
                }
                if !seen.insert(key) {
                    continue;
                }
                if let Some((_, attrs)) = self.get_own_property(o, &key) {
                    if attrs.is_enumerable() {
                        keys.push(key);
                    }
                }
            }
            cursor = self.heap.object(o).prototype;
        }
        keys
    }

    // Prototype

    pub fn get_prototype(&self, obj: ObjectRef) -> Option<ObjectRef> {
        self.heap.object(obj).prototype
    }

    /// Set the prototype; fails on non-extensible targets and cycles.
    pub fn set_prototype(&mut self, obj: ObjectRef, proto: Option<ObjectRef>) -> bool {
        if self.heap.object(obj).prototype == proto {
            return true;
        }
        if !self.heap.object(obj).extensible {
            return false;
        }
        let mut cursor = proto;
        while let Some(p) = cursor {
            if p == obj {
                return false;
            }
            cursor = self.heap.object(p).prototype;
        }
        self.heap.object_mut(obj).prototype = proto;
        true
    }

    // Array fast-mode plumbing

    pub fn array_is_fast(&self, obj: ObjectRef) -> bool {
        matches!(
            &self.heap.object(obj).kind,
            ObjectKind::Array(ArrayData { fast: Some(_), .. })
        )
    }

    pub fn array_length(&self, obj: ObjectRef) -> u32 {
        match &self.heap.object(obj).kind {
            ObjectKind::Array(data) => data.length,
            _ => 0,
        }
    }

    /// Plain-assignment write of an array index; keeps fast mode when
    /// the write is dense enough, demotes otherwise.
    pub fn fast_array_set(&mut self, obj: ObjectRef, index: u32, value: Value) -> bool {
        let mut demote = false;
        match &mut self.heap.object_mut(obj).kind {
            ObjectKind::Array(data) => match &mut data.fast {
                Some(fast) => {
                    if index < data.length {
                        fast[index as usize] = value;
                        return true;
                    }
                    if index < MAX_FAST_ARRAY_LENGTH
                        && index - data.length <= FAST_ARRAY_GAP_LIMIT
                    {
                        fast.resize(index as usize + 1, Value::empty());
                        fast[index as usize] = value;
                        data.length = index + 1;
                        return true;
                    }
                    demote = true;
                }
                None => {}
            },
            _ => return false,
        }
        if demote {
            self.demote_array_storage(obj);
        }
        self.define_own_property(
            obj,
            PropertyKey::Index(index),
            PropertyDescriptor::data(value, PropertyAttributes::ALL_PRESENT),
        )
    }

    /// Truncate or extend the logical length. Returns false when a
    /// non-configurable indexed property blocks the truncation.
    pub fn set_array_length(&mut self, obj: ObjectRef, new_len: u32) -> bool {
        match &mut self.heap.object_mut(obj).kind {
            ObjectKind::Array(data) => {
                if let Some(fast) = &mut data.fast {
                    if new_len <= MAX_FAST_ARRAY_LENGTH {
                        fast.resize(new_len as usize, Value::empty());
                        data.length = new_len;
                        return true;
                    }
                    // Oversized length leaves fast mode.
                } else if new_len >= data.length {
                    data.length = new_len;
                    return true;
                }
            }
            _ => return false,
        }
        if self.array_is_fast(obj) {
            self.demote_array_storage(obj);
            if let ObjectKind::Array(data) = &mut self.heap.object_mut(obj).kind {
                data.length = new_len;
            }
            return true;
        }
        // Delete indexed shape properties from the top down; stop at the
        // first non-configurable one.
        let shape = self.heap.object(obj).shape;
        let mut doomed: Vec<u32> = self
            .shapes
            .keys_in_order(shape)
            .into_iter()
            .filter_map(|(k, _)| k.as_index())
            .filter(|&i| i >= new_len)
            .collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for i in doomed {
            if !self.delete_own_property(obj, &PropertyKey::Index(i)) {
                if let ObjectKind::Array(data) = &mut self.heap.object_mut(obj).kind {
                    data.length = i + 1;
                }
                return false;
            }
        }
        if let ObjectKind::Array(data) = &mut self.heap.object_mut(obj).kind {
            data.length = new_len;
        }
        true
    }

    /// Move dense elements into shape storage. Irreversible.
    pub fn demote_array_storage(&mut self, obj: ObjectRef) {
        let elements = {
            let ObjectKind::Array(data) = &mut self.heap.object_mut(obj).kind else {
                return;
            };
            match data.fast.take() {
                Some(e) => e,
                None => return,
            }
        };
        for (i, v) in elements.into_iter().enumerate() {
            if !v.is_empty() {
                self.define_own_property(
                    obj,
                    PropertyKey::Index(i as u32),
                    PropertyDescriptor::data(v, PropertyAttributes::ALL_PRESENT),
                );
            }
        }
    }
}

impl PropertyDescriptor {
    /// When defining an array index, a descriptor that is exactly a
    /// fully-present data property may use the dense vector. Returns
    /// the value in that case.
    fn as_fast_data(&self) -> Option<Value> {
        if self.is_accessor_descriptor() {
            return None;
        }
        let all = self.writable != Some(false)
            && self.enumerable != Some(false)
            && self.configurable != Some(false);
        if all {
            Some(self.value.unwrap_or(Value::undefined()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VmInstance;

    fn vm() -> VmInstance {
        VmInstance::new_bare()
    }

    #[test]
    fn define_then_read_round_trips() {
        let mut vm = vm();
        let obj = vm.alloc_object(None, ObjectKind::Plain);
        let key = PropertyKey::Atom(vm.atoms.intern("x"));

        assert!(vm.define_own_property(
            obj,
            key,
            PropertyDescriptor::data(Value::int32(7), PropertyAttributes::ALL_PRESENT),
        ));
        let (slot, attrs) = vm.get_own_property(obj, &key).unwrap();
        assert_eq!(slot.data(), Some(Value::int32(7)));
        assert_eq!(attrs, PropertyAttributes::ALL_PRESENT);
    }

    #[test]
    fn same_transition_history_shares_shape() {
        let mut vm = vm();
        let a = vm.alloc_object(None, ObjectKind::Plain);
        let b = vm.alloc_object(None, ObjectKind::Plain);
        let kx = PropertyKey::Atom(vm.atoms.intern("x"));
        let ky = PropertyKey::Atom(vm.atoms.intern("y"));
        for obj in [a, b] {
            vm.define_own_property(
                obj,
                kx,
                PropertyDescriptor::data(Value::int32(1), PropertyAttributes::ALL_PRESENT),
            );
            vm.define_own_property(
                obj,
                ky,
                PropertyDescriptor::data(Value::int32(2), PropertyAttributes::ALL_PRESENT),
            );
        }
        assert_eq!(vm.heap.object(a).shape, vm.heap.object(b).shape);
    }

    #[test]
    fn non_configurable_redefinition_fails_unchanged() {
        let mut vm = vm();
        let obj = vm.alloc_object(None, ObjectKind::Plain);
        let key = PropertyKey::Atom(vm.atoms.intern("x"));
        vm.define_own_property(
            obj,
            key,
            PropertyDescriptor::data(Value::int32(1), PropertyAttributes::empty()),
        );
        // Upgrading configurable must fail.
        let mut desc = PropertyDescriptor::default();
        desc.configurable = Some(true);
        assert!(!vm.define_own_property(obj, key, desc));
        // Changing the value of a non-writable property must fail.
        let mut desc = PropertyDescriptor::default();
        desc.value = Some(Value::int32(2));
        assert!(!vm.define_own_property(obj, key, desc));
        let (slot, _) = vm.get_own_property(obj, &key).unwrap();
        assert_eq!(slot.data(), Some(Value::int32(1)));
    }

    #[test]
    fn fast_array_set_and_holes() {
        let mut vm = vm();
        let arr = vm.alloc_array(None, 0);
        assert!(vm.fast_array_set(arr, 0, Value::int32(10)));
        assert!(vm.fast_array_set(arr, 2, Value::int32(30)));
        assert!(vm.array_is_fast(arr));
        assert_eq!(vm.array_length(arr), 3);

        assert!(vm
            .get_own_property(arr, &PropertyKey::Index(1))
            .is_none());
        let (slot, _) = vm.get_own_property(arr, &PropertyKey::Index(2)).unwrap();
        assert_eq!(slot.data(), Some(Value::int32(30)));
    }

    #[test]
    fn sparse_write_demotes() {
        let mut vm = vm();
        let arr = vm.alloc_array(None, 0);
        vm.fast_array_set(arr, 0, Value::int32(1));
        vm.fast_array_set(arr, 100_000, Value::int32(2));
        assert!(!vm.array_is_fast(arr));
        assert_eq!(vm.array_length(arr), 100_001);
        let (slot, _) = vm
            .get_own_property(arr, &PropertyKey::Index(100_000))
            .unwrap();
        assert_eq!(slot.data(), Some(Value::int32(2)));
        // Demotion is permanent.
        vm.fast_array_set(arr, 1, Value::int32(3));
        assert!(!vm.array_is_fast(arr));
    }

    #[test]
    fn accessor_definition_demotes() {
        let mut vm = vm();
        let arr = vm.alloc_array(None, 0);
        vm.fast_array_set(arr, 0, Value::int32(1));
        let desc = PropertyDescriptor::accessor(None, None, PropertyAttributes::CONFIGURABLE);
        assert!(vm.define_own_property(arr, PropertyKey::Index(0), desc));
        assert!(!vm.array_is_fast(arr));
    }

    #[test]
    fn length_truncation_frees_elements() {
        let mut vm = vm();
        let arr = vm.alloc_array_from(
            None,
            vec![Value::int32(1), Value::int32(2), Value::int32(3)],
        );
        assert!(vm.set_array_length(arr, 1));
        assert_eq!(vm.array_length(arr), 1);
        assert!(vm.get_own_property(arr, &PropertyKey::Index(2)).is_none());
    }

    #[test]
    fn own_keys_ordering() {
        let mut vm = vm();
        let obj = vm.alloc_object(None, ObjectKind::Plain);
        let kb = PropertyKey::Atom(vm.atoms.intern("b"));
        let ka = PropertyKey::Atom(vm.atoms.intern("a"));
        vm.define_own_property(
            obj,
            kb,
            PropertyDescriptor::data(Value::int32(0), PropertyAttributes::ALL_PRESENT),
        );
        vm.define_own_property(
            obj,
            PropertyKey::Index(10),
            PropertyDescriptor::data(Value::int32(0), PropertyAttributes::ALL_PRESENT),
        );
        vm.define_own_property(
            obj,
            ka,
            PropertyDescriptor::data(Value::int32(0), PropertyAttributes::ALL_PRESENT),
        );
        vm.define_own_property(
            obj,
            PropertyKey::Index(2),
            PropertyDescriptor::data(Value::int32(0), PropertyAttributes::ALL_PRESENT),
        );
        let keys = vm.own_keys(obj);
        assert_eq!(
            keys,
            vec![
                PropertyKey::Index(2),
                PropertyKey::Index(10),
                kb,
                ka,
            ]
        );
    }

    #[test]
    fn prototype_cycle_rejected() {
        let mut vm = vm();
        let a = vm.alloc_object(None, ObjectKind::Plain);
        let b = vm.alloc_object(Some(a), ObjectKind::Plain);
        assert!(!vm.set_prototype(a, Some(b)));
        assert!(vm.set_prototype(a, None));
    }

    #[test]
    fn non_extensible_blocks_new_properties() {
        let mut vm = vm();
        let obj = vm.alloc_object(None, ObjectKind::Plain);
        vm.heap.object_mut(obj).extensible = false;
        let key = PropertyKey::Atom(vm.atoms.intern("x"));
        assert!(!vm.define_own_property(
            obj,
            key,
            PropertyDescriptor::data(Value::int32(1), PropertyAttributes::ALL_PRESENT),
        ));
    }

    #[test]
    fn delete_respects_configurability() {
        let mut vm = vm();
        let obj = vm.alloc_object(None, ObjectKind::Plain);
        let ka = PropertyKey::Atom(vm.atoms.intern("a"));
        let kb = PropertyKey::Atom(vm.atoms.intern("b"));
        vm.define_own_property(
            obj,
            ka,
            PropertyDescriptor::data(Value::int32(1), PropertyAttributes::ALL_PRESENT),
        );
        vm.define_own_property(
            obj,
            kb,
            PropertyDescriptor::data(Value::int32(2), PropertyAttributes::WRITABLE),
        );
        assert!(vm.delete_own_property(obj, &ka));
        assert!(vm.get_own_property(obj, &ka).is_none());
        assert!(!vm.delete_own_property(obj, &kb));
        let (slot, _) = vm.get_own_property(obj, &kb).unwrap();
        assert_eq!(slot.data(), Some(Value::int32(2)));
    }
}
