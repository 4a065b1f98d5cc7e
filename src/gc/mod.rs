//! Traced heap
//!
//! Objects, strings and environment records live in handle arenas; a
//! `Value` refers to them by index. Collection is mark-and-sweep over
//! the arenas with the roots supplied by the caller: the collector has
//! no view of frames or realms, so whoever calls `collect` is
//! responsible for rooting everything it still needs (global objects,
//! active frame registers, environment chains, scripts' constant pools,
//! pending jobs).
//!
//! Shapes and atoms are not collected; they live for the VM's lifetime.

use crate::runtime::environment::EnvRecord;
use crate::runtime::function::Callable;
use crate::runtime::object::{JsObject, ObjectKind};
use crate::runtime::property::PropertySlot;
use crate::runtime::string::{JsString, StringData, ROPE_MIN_LENGTH, STRING_MAX_LENGTH};
use crate::value::{EnvRef, ObjectRef, StringRef, Value};

/// Roots for one collection cycle.
#[derive(Default)]
pub struct RootSet {
    pub values: Vec<Value>,
    pub objects: Vec<ObjectRef>,
    pub strings: Vec<StringRef>,
    pub envs: Vec<EnvRef>,
}

impl RootSet {
    pub fn push_value(&mut self, v: Value) {
        self.values.push(v);
    }
}

/// Heap statistics as reported by the shell's dump flag.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub objects: usize,
    pub strings: usize,
    pub environments: usize,
}

/// The traced heap: handle arenas plus free lists.
pub struct Heap {
    objects: Vec<Option<JsObject>>,
    strings: Vec<Option<JsString>>,
    envs: Vec<Option<EnvRecord>>,
    object_free: Vec<u32>,
    string_free: Vec<u32>,
    env_free: Vec<u32>,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: Vec::new(),
            strings: Vec::new(),
            envs: Vec::new(),
            object_free: Vec::new(),
            string_free: Vec::new(),
            env_free: Vec::new(),
        }
    }

    // Allocation

    pub fn alloc_object(&mut self, obj: JsObject) -> ObjectRef {
        match self.object_free.pop() {
            Some(idx) => {
                self.objects[idx as usize] = Some(obj);
                ObjectRef(idx)
            }
            None => {
                self.objects.push(Some(obj));
                ObjectRef((self.objects.len() - 1) as u32)
            }
        }
    }

    pub fn alloc_string(&mut self, s: JsString) -> StringRef {
        match self.string_free.pop() {
            Some(idx) => {
                self.strings[idx as usize] = Some(s);
                StringRef(idx)
            }
            None => {
                self.strings.push(Some(s));
                StringRef((self.strings.len() - 1) as u32)
            }
        }
    }

    pub fn alloc_str(&mut self, s: &str) -> StringRef {
        self.alloc_string(JsString::from_str(s))
    }

    pub fn alloc_string_from_units(&mut self, units: Vec<u16>) -> StringRef {
        self.alloc_string(JsString::from_units(units))
    }

    pub fn alloc_env(&mut self, env: EnvRecord) -> EnvRef {
        match self.env_free.pop() {
            Some(idx) => {
                self.envs[idx as usize] = Some(env);
                EnvRef(idx)
            }
            None => {
                self.envs.push(Some(env));
                EnvRef((self.envs.len() - 1) as u32)
            }
        }
    }

    // Access

    #[inline]
    pub fn object(&self, r: ObjectRef) -> &JsObject {
        self.objects[r.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling object handle #{}", r.0))
    }

    #[inline]
    pub fn object_mut(&mut self, r: ObjectRef) -> &mut JsObject {
        self.objects[r.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling object handle #{}", r.0))
    }

    #[inline]
    pub fn string(&self, r: StringRef) -> &JsString {
        self.strings[r.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling string handle #{}", r.0))
    }

    #[inline]
    pub fn string_mut(&mut self, r: StringRef) -> &mut JsString {
        self.strings[r.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling string handle #{}", r.0))
    }

    #[inline]
    pub fn env(&self, r: EnvRef) -> &EnvRecord {
        self.envs[r.0 as usize]
            .as_ref()
            .unwrap_or_else(|| panic!("dangling environment handle #{}", r.0))
    }

    #[inline]
    pub fn env_mut(&mut self, r: EnvRef) -> &mut EnvRecord {
        self.envs[r.0 as usize]
            .as_mut()
            .unwrap_or_else(|| panic!("dangling environment handle #{}", r.0))
    }

    // Strings

    /// Collapse a rope into flat storage. No-op on flat strings.
    pub fn flatten(&mut self, s: StringRef) {
        if self.string(s).is_flat() {
            return;
        }
        let mut units = Vec::with_capacity(self.string(s).len() as usize);
        let mut stack = vec![s];
        while let Some(r) = stack.pop() {
            match &self.string(r).data {
                StringData::Rope { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
                StringData::Latin1(b) => units.extend(b.iter().map(|&u| u as u16)),
                StringData::Utf16(u) => units.extend_from_slice(u),
            }
        }
        *self.string_mut(s) = JsString::from_units(units);
    }

    /// Concatenate two strings. Short results are copied eagerly, long
    /// ones become a rope node. `None` when the combined length exceeds
    /// the engine maximum.
    pub fn concat_strings(&mut self, left: StringRef, right: StringRef) -> Option<StringRef> {
        let llen = self.string(left).len();
        let rlen = self.string(right).len();
        let len = llen.checked_add(rlen)?;
        if len > STRING_MAX_LENGTH {
            return None;
        }
        if llen == 0 {
            return Some(right);
        }
        if rlen == 0 {
            return Some(left);
        }
        if len < ROPE_MIN_LENGTH {
            self.flatten(left);
            self.flatten(right);
            let mut units = self.string(left).units();
            units.extend(self.string(right).units());
            return Some(self.alloc_string_from_units(units));
        }
        Some(self.alloc_string(JsString {
            data: StringData::Rope { left, right, len },
        }))
    }

    /// Flat-aware equality; flattens ropes first.
    pub fn string_equals(&mut self, a: StringRef, b: StringRef) -> bool {
        if a == b {
            return true;
        }
        if self.string(a).len() != self.string(b).len() {
            return false;
        }
        self.flatten(a);
        self.flatten(b);
        self.string(a).eq_flat(self.string(b))
    }

    pub fn string_to_rust(&mut self, s: StringRef) -> String {
        self.flatten(s);
        self.string(s).to_rust_string()
    }

    // Collection

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            objects: self.objects.iter().flatten().count(),
            strings: self.strings.iter().flatten().count(),
            environments: self.envs.iter().flatten().count(),
        }
    }

    /// Mark from `roots` and sweep everything unreached.
    pub fn collect(&mut self, roots: &RootSet) {
        let mut marks = Marks {
            objects: vec![false; self.objects.len()],
            strings: vec![false; self.strings.len()],
            envs: vec![false; self.envs.len()],
        };
        let mut work = Worklist::default();

        for &v in &roots.values {
            work.push_value(v);
        }
        for &o in &roots.objects {
            work.objects.push(o);
        }
        for &s in &roots.strings {
            work.strings.push(s);
        }
        for &e in &roots.envs {
            work.envs.push(e);
        }

        loop {
            if let Some(o) = work.objects.pop() {
                if !marks.mark_object(o) {
                    self.trace_object(o, &mut work);
                }
                continue;
            }
            if let Some(s) = work.strings.pop() {
                if !marks.mark_string(s) {
                    if let StringData::Rope { left, right, .. } = self.string(s).data {
                        work.strings.push(left);
                        work.strings.push(right);
                    }
                }
                continue;
            }
            if let Some(e) = work.envs.pop() {
                if !marks.mark_env(e) {
                    self.trace_env(e, &mut work);
                }
                continue;
            }
            break;
        }

        for (i, slot) in self.objects.iter_mut().enumerate() {
            if slot.is_some() && !marks.objects[i] {
                *slot = None;
                self.object_free.push(i as u32);
            }
        }
        for (i, slot) in self.strings.iter_mut().enumerate() {
            if slot.is_some() && !marks.strings[i] {
                *slot = None;
                self.string_free.push(i as u32);
            }
        }
        for (i, slot) in self.envs.iter_mut().enumerate() {
            if slot.is_some() && !marks.envs[i] {
                *slot = None;
                self.env_free.push(i as u32);
            }
        }
    }

    fn trace_object(&self, r: ObjectRef, work: &mut Worklist) {
        let obj = self.object(r);
        if let Some(p) = obj.prototype {
            work.objects.push(p);
        }
        for slot in &obj.slots {
            match slot {
                PropertySlot::Data(v) => work.push_value(*v),
                PropertySlot::Accessor { get, set } => {
                    if let Some(g) = get {
                        work.objects.push(*g);
                    }
                    if let Some(s) = set {
                        work.objects.push(*s);
                    }
                }
            }
        }
        match &obj.kind {
            ObjectKind::Plain => {}
            ObjectKind::Array(data) => {
                if let Some(fast) = &data.fast {
                    for v in fast {
                        work.push_value(*v);
                    }
                }
            }
            ObjectKind::Function(f) => match &f.callable {
                Callable::Native { payload, .. } => {
                    for v in payload {
                        work.push_value(*v);
                    }
                }
                Callable::Interpreted {
                    block,
                    env,
                    captured_this,
                    parent_constructor,
                } => {
                    for v in &block.constants {
                        work.push_value(*v);
                    }
                    if let Some(e) = env {
                        work.envs.push(*e);
                    }
                    if let Some(t) = captured_this {
                        work.push_value(*t);
                    }
                    if let Some(p) = parent_constructor {
                        work.objects.push(*p);
                    }
                }
                Callable::Bound {
                    target,
                    bound_this,
                    bound_args,
                } => {
                    work.objects.push(*target);
                    work.push_value(*bound_this);
                    for v in bound_args {
                        work.push_value(*v);
                    }
                }
            },
            ObjectKind::NumberWrapper(_)
            | ObjectKind::BooleanWrapper(_)
            | ObjectKind::SymbolWrapper(_)
            | ObjectKind::Error { .. } => {}
            ObjectKind::StringWrapper(s) => work.strings.push(*s),
            ObjectKind::ArrayIterator(it) => work.objects.push(it.target),
            ObjectKind::StringIterator { string, .. } => work.strings.push(*string),
            ObjectKind::Enumerator(e) => work.objects.push(e.object),
            ObjectKind::Promise(p) => {
                work.push_value(p.result);
                for r in p.fulfill_reactions.iter().chain(&p.reject_reactions) {
                    if let Some(h) = r.handler {
                        work.objects.push(h);
                    }
                    if let Some(d) = r.derived {
                        work.objects.push(d);
                    }
                }
            }
        }
    }

    fn trace_env(&self, r: EnvRef, work: &mut Worklist) {
        match self.env(r) {
            EnvRecord::Declarative { slots, parent } => {
                for v in slots {
                    work.push_value(*v);
                }
                if let Some(p) = parent {
                    work.envs.push(*p);
                }
            }
            EnvRecord::Named { bindings, parent } => {
                for b in bindings.values() {
                    work.push_value(b.value);
                }
                if let Some(p) = parent {
                    work.envs.push(*p);
                }
            }
            EnvRecord::Object { object, parent } => {
                work.objects.push(*object);
                if let Some(p) = parent {
                    work.envs.push(*p);
                }
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

struct Marks {
    objects: Vec<bool>,
    strings: Vec<bool>,
    envs: Vec<bool>,
}

impl Marks {
    /// Mark and report whether the handle was already marked.
    fn mark_object(&mut self, r: ObjectRef) -> bool {
        std::mem::replace(&mut self.objects[r.0 as usize], true)
    }

    fn mark_string(&mut self, r: StringRef) -> bool {
        std::mem::replace(&mut self.strings[r.0 as usize], true)
    }

    fn mark_env(&mut self, r: EnvRef) -> bool {
        std::mem::replace(&mut self.envs[r.0 as usize], true)
    }
}

#[derive(Default)]
struct Worklist {
    objects: Vec<ObjectRef>,
    strings: Vec<StringRef>,
    envs: Vec<EnvRef>,
}

impl Worklist {
    fn push_value(&mut self, v: Value) {
        if let Some(o) = v.as_object() {
            self.objects.push(o);
        } else if let Some(s) = v.as_string() {
            self.strings.push(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object::ObjectKind;
    use crate::runtime::shape::ShapeTree;

    fn plain(shapes: &ShapeTree, prototype: Option<ObjectRef>) -> JsObject {
        JsObject {
            shape: shapes.root(),
            slots: Vec::new(),
            prototype,
            extensible: true,
            kind: ObjectKind::Plain,
        }
    }

    #[test]
    fn unreachable_objects_are_swept() {
        let shapes = ShapeTree::new();
        let mut heap = Heap::new();
        let kept = heap.alloc_object(plain(&shapes, None));
        let _dropped = heap.alloc_object(plain(&shapes, None));

        let roots = RootSet {
            objects: vec![kept],
            ..Default::default()
        };
        heap.collect(&roots);
        assert_eq!(heap.stats().objects, 1);
        assert!(heap.object(kept).extensible);
    }

    #[test]
    fn prototypes_keep_objects_alive() {
        let shapes = ShapeTree::new();
        let mut heap = Heap::new();
        let proto = heap.alloc_object(plain(&shapes, None));
        let obj = heap.alloc_object(plain(&shapes, Some(proto)));

        let roots = RootSet {
            objects: vec![obj],
            ..Default::default()
        };
        heap.collect(&roots);
        assert_eq!(heap.stats().objects, 2);
    }

    #[test]
    fn rope_children_survive_until_flatten() {
        let mut heap = Heap::new();
        let a = heap.alloc_str("hello hello hello ");
        let b = heap.alloc_str("world world world");
        let rope = heap.concat_strings(a, b).unwrap();
        assert!(!heap.string(rope).is_flat());

        let roots = RootSet {
            strings: vec![rope],
            ..Default::default()
        };
        heap.collect(&roots);
        assert_eq!(heap.stats().strings, 3);

        heap.flatten(rope);
        assert_eq!(
            heap.string(rope).to_rust_string(),
            "hello hello hello world world world"
        );
        heap.collect(&roots);
        assert_eq!(heap.stats().strings, 1);
    }

    #[test]
    fn short_concat_is_eager() {
        let mut heap = Heap::new();
        let a = heap.alloc_str("ab");
        let b = heap.alloc_str("cd");
        let c = heap.concat_strings(a, b).unwrap();
        assert!(heap.string(c).is_flat());
        assert_eq!(heap.string(c).to_rust_string(), "abcd");
    }

    #[test]
    fn free_slots_are_reused() {
        let shapes = ShapeTree::new();
        let mut heap = Heap::new();
        let a = heap.alloc_object(plain(&shapes, None));
        heap.collect(&RootSet::default());
        let b = heap.alloc_object(plain(&shapes, None));
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn string_equality_across_ropes() {
        let mut heap = Heap::new();
        let a1 = heap.alloc_str("abcdefghijklm");
        let a2 = heap.alloc_str("nopqrstuvwxyz");
        let rope = heap.concat_strings(a1, a2).unwrap();
        let flat = heap.alloc_str("abcdefghijklmnopqrstuvwxyz");
        assert!(heap.string_equals(rope, flat));
    }
}
