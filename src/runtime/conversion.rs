//! Abstract operations (ES2017 7.1-7.3) and property access
//!
//! Everything here that can run script (getters, `@@toPrimitive`,
//! `valueOf`/`toString`) takes an `ExecState`; the equality flavors and
//! cheap coercions that only need the heap hang off `VmInstance`.

use crate::context::{ExecState, VmInstance};
use crate::runtime::object::{ErrorKind, ObjectKind};
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey, PropertySlot};
use crate::runtime::string::parse_array_index;
use crate::value::{
    array_index_f64, to_int32_f64, to_integer_f64, to_length_f64, to_uint32_f64, ObjectRef,
    StringRef, Value,
};
use crate::vm::interpreter::call_function;

/// ToPrimitive hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveHint {
    Default,
    Number,
    String,
}

impl VmInstance {
    /// `typeof` tag of a value.
    pub fn typeof_str(&self, v: Value) -> &'static str {
        if v.is_undefined() {
            "undefined"
        } else if v.is_null() {
            // Historical quirk.
            "object"
        } else if v.is_bool() {
            "boolean"
        } else if v.is_number() {
            "number"
        } else if v.is_string() {
            "string"
        } else if v.is_symbol() {
            "symbol"
        } else if let Some(o) = v.as_object() {
            if self.heap.object(o).is_callable() {
                "function"
            } else {
                "object"
            }
        } else {
            "undefined"
        }
    }

    /// Strict equality: `+0 === -0`, `NaN !== NaN`, int32 and double
    /// encodings of the same real compare equal.
    pub fn strict_equals(&mut self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return x == y;
        }
        if let (Some(x), Some(y)) = (a.as_string(), b.as_string()) {
            return self.string_equals(x, y);
        }
        a == b
    }

    /// SameValue: like strict equality but NaN equals NaN and +0 is
    /// distinguished from -0.
    pub fn same_value(&mut self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            if x.is_nan() && y.is_nan() {
                return true;
            }
            return x.to_bits() == y.to_bits();
        }
        if let (Some(x), Some(y)) = (a.as_string(), b.as_string()) {
            return self.string_equals(x, y);
        }
        a == b
    }

    /// SameValueZero: NaN equals NaN, +0 equals -0.
    pub fn same_value_zero(&mut self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            if x.is_nan() && y.is_nan() {
                return true;
            }
            return x == y;
        }
        if let (Some(x), Some(y)) = (a.as_string(), b.as_string()) {
            return self.string_equals(x, y);
        }
        a == b
    }

    pub fn to_boolean(&self, v: Value) -> bool {
        if let Some(b) = v.as_bool() {
            return b;
        }
        if let Some(n) = v.as_number() {
            return n != 0.0 && !n.is_nan();
        }
        if let Some(s) = v.as_string() {
            return !self.heap.string(s).is_empty();
        }
        !(v.is_undefined() || v.is_null() || v.is_empty())
    }

    pub fn string_equals(&mut self, a: StringRef, b: StringRef) -> bool {
        self.heap.string_equals(a, b)
    }

    /// HasProperty: own or inherited, no getters invoked.
    pub fn has_property(&mut self, obj: ObjectRef, key: &PropertyKey) -> bool {
        let mut cursor = Some(obj);
        while let Some(o) = cursor {
            if self.get_own_property(o, key).is_some() {
                return true;
            }
            cursor = self.heap.object(o).prototype;
        }
        false
    }

    pub fn number_to_string_ref(&mut self, n: f64) -> StringRef {
        let text = crate::util::number_to_string(n);
        self.heap.alloc_str(&text)
    }

    /// The canonical property key of a string.
    pub fn key_from_str(&mut self, s: &str) -> PropertyKey {
        match parse_array_index(s) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::Atom(self.atoms.intern(s)),
        }
    }

    /// Render a property key back to text.
    pub fn key_to_string(&mut self, key: &PropertyKey) -> String {
        match key {
            PropertyKey::Index(i) => i.to_string(),
            PropertyKey::Atom(a) => self.atoms.name(*a).to_string(),
            PropertyKey::Symbol(s) => format!(
                "Symbol({})",
                self.symbols.description(*s).unwrap_or("")
            ),
        }
    }
}

// Script-running coercions

pub fn to_primitive(st: &mut ExecState<'_>, v: Value, hint: PrimitiveHint) -> Result<Value, Value> {
    let Some(obj) = v.as_object() else {
        return Ok(v);
    };
    // @@toPrimitive first.
    let sym = PropertyKey::Symbol(st.vm.wk_symbols.to_primitive);
    if let Some(method) = get_method(st, v, &sym)? {
        let hint_str = match hint {
            PrimitiveHint::Default => "default",
            PrimitiveHint::Number => "number",
            PrimitiveHint::String => "string",
        };
        let hint_ref = st.vm.heap.alloc_str(hint_str);
        let result = call_function(st, method, v, &[Value::string(hint_ref)])?;
        if !result.is_object() {
            return Ok(result);
        }
        return Err(st.throw_type_error("Cannot convert object to primitive value"));
    }

    let names: [&str; 2] = if hint == PrimitiveHint::String {
        ["toString", "valueOf"]
    } else {
        ["valueOf", "toString"]
    };
    for name in names {
        let key = {
            let atom = st.vm.atoms.intern(name);
            PropertyKey::Atom(atom)
        };
        let candidate = get_object_property(st, obj, &key, v)?;
        if let Some(f) = candidate.as_object() {
            if st.vm.heap.object(f).is_callable() {
                let result = call_function(st, f, v, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
    }
    Err(st.throw_type_error("Cannot convert object to primitive value"))
}

pub fn to_number(st: &mut ExecState<'_>, v: Value) -> Result<f64, Value> {
    if let Some(n) = v.as_number() {
        return Ok(n);
    }
    if v.is_undefined() {
        return Ok(f64::NAN);
    }
    if v.is_null() {
        return Ok(0.0);
    }
    if let Some(b) = v.as_bool() {
        return Ok(if b { 1.0 } else { 0.0 });
    }
    if let Some(s) = v.as_string() {
        let text = st.vm.heap.string_to_rust(s);
        return Ok(crate::util::string_to_number(&text));
    }
    if v.is_symbol() {
        return Err(st.throw_type_error("Cannot convert a Symbol value to a number"));
    }
    let prim = to_primitive(st, v, PrimitiveHint::Number)?;
    to_number(st, prim)
}

pub fn to_numeric(st: &mut ExecState<'_>, v: Value) -> Result<Value, Value> {
    Ok(Value::number(to_number(st, v)?))
}

pub fn to_integer(st: &mut ExecState<'_>, v: Value) -> Result<f64, Value> {
    Ok(to_integer_f64(to_number(st, v)?))
}

pub fn to_length(st: &mut ExecState<'_>, v: Value) -> Result<u64, Value> {
    Ok(to_length_f64(to_number(st, v)?))
}

pub fn to_int32(st: &mut ExecState<'_>, v: Value) -> Result<i32, Value> {
    Ok(to_int32_f64(to_number(st, v)?))
}

pub fn to_uint32(st: &mut ExecState<'_>, v: Value) -> Result<u32, Value> {
    Ok(to_uint32_f64(to_number(st, v)?))
}

pub fn to_string_ref(st: &mut ExecState<'_>, v: Value) -> Result<StringRef, Value> {
    if let Some(s) = v.as_string() {
        return Ok(s);
    }
    if v.is_undefined() {
        return Ok(st.vm.heap.alloc_str("undefined"));
    }
    if v.is_null() {
        return Ok(st.vm.heap.alloc_str("null"));
    }
    if let Some(b) = v.as_bool() {
        return Ok(st.vm.heap.alloc_str(if b { "true" } else { "false" }));
    }
    if let Some(n) = v.as_number() {
        return Ok(st.vm.number_to_string_ref(n));
    }
    if v.is_symbol() {
        return Err(st.throw_type_error("Cannot convert a Symbol value to a string"));
    }
    let prim = to_primitive(st, v, PrimitiveHint::String)?;
    to_string_ref(st, prim)
}

pub fn to_string_rust(st: &mut ExecState<'_>, v: Value) -> Result<String, Value> {
    let s = to_string_ref(st, v)?;
    Ok(st.vm.heap.string_to_rust(s))
}

/// ToObject: wrap scalars in their object wrapper; fail on nullish.
pub fn to_object(st: &mut ExecState<'_>, v: Value) -> Result<ObjectRef, Value> {
    if let Some(o) = v.as_object() {
        return Ok(o);
    }
    let (proto, kind) = if let Some(n) = v.as_number() {
        (st.realm.number_prototype, ObjectKind::NumberWrapper(n))
    } else if let Some(b) = v.as_bool() {
        (st.realm.boolean_prototype, ObjectKind::BooleanWrapper(b))
    } else if let Some(s) = v.as_string() {
        (st.realm.string_prototype, ObjectKind::StringWrapper(s))
    } else if let Some(s) = v.as_symbol() {
        (st.realm.symbol_prototype, ObjectKind::SymbolWrapper(s))
    } else {
        return Err(st.throw_type_error("Cannot convert undefined or null to object"));
    };
    Ok(st.vm.alloc_object(Some(proto), kind))
}

pub fn to_property_key(st: &mut ExecState<'_>, v: Value) -> Result<PropertyKey, Value> {
    if let Some(s) = v.as_symbol() {
        return Ok(PropertyKey::Symbol(s));
    }
    if let Some(n) = v.as_number() {
        if let Some(i) = array_index_f64(n) {
            return Ok(PropertyKey::Index(i));
        }
    }
    let prim = to_primitive(st, v, PrimitiveHint::String)?;
    if let Some(s) = prim.as_symbol() {
        return Ok(PropertyKey::Symbol(s));
    }
    let text = to_string_rust(st, prim)?;
    Ok(st.vm.key_from_str(&text))
}

// Property access

/// GetMethod: undefined/null yield None; non-callable is a TypeError.
pub fn get_method(
    st: &mut ExecState<'_>,
    v: Value,
    key: &PropertyKey,
) -> Result<Option<ObjectRef>, Value> {
    let func = get_value_property(st, v, key)?;
    if func.is_nullish() {
        return Ok(None);
    }
    match func.as_object() {
        Some(f) if st.vm.heap.object(f).is_callable() => Ok(Some(f)),
        _ => Err(st.throw_type_error("value is not a function")),
    }
}

/// GetV: property read from any base value.
pub fn get_value_property(
    st: &mut ExecState<'_>,
    base: Value,
    key: &PropertyKey,
) -> Result<Value, Value> {
    if let Some(obj) = base.as_object() {
        return get_object_property(st, obj, key, base);
    }
    if base.is_nullish() {
        let key_text = st.vm.key_to_string(key);
        return Err(st.throw_type_error(&format!(
            "Cannot read property '{}' of {}",
            key_text,
            if base.is_null() { "null" } else { "undefined" }
        )));
    }
    // Primitive receivers: virtual string properties, then the wrapper
    // prototype chain with the primitive as `this`.
    if let Some(s) = base.as_string() {
        if let PropertyKey::Atom(a) = key {
            if *a == st.vm.wk.length {
                return Ok(Value::number(st.vm.heap.string(s).len() as f64));
            }
        }
        if let PropertyKey::Index(i) = key {
            if *i < st.vm.heap.string(s).len() {
                st.vm.heap.flatten(s);
                let unit = st.vm.heap.string(s).code_unit(*i);
                let one = st.vm.heap.alloc_string_from_units(vec![unit]);
                return Ok(Value::string(one));
            }
        }
    }
    let proto = if base.is_string() {
        st.realm.string_prototype
    } else if base.is_number() {
        st.realm.number_prototype
    } else if base.is_bool() {
        st.realm.boolean_prototype
    } else {
        st.realm.symbol_prototype
    };
    get_object_property(st, proto, key, base)
}

/// Ordinary [[Get]] with receiver, walking the prototype chain and
/// invoking getters.
pub fn get_object_property(
    st: &mut ExecState<'_>,
    obj: ObjectRef,
    key: &PropertyKey,
    receiver: Value,
) -> Result<Value, Value> {
    let mut cursor = Some(obj);
    while let Some(o) = cursor {
        if let Some((slot, _)) = st.vm.get_own_property(o, key) {
            return match slot {
                PropertySlot::Data(v) => Ok(v),
                PropertySlot::Accessor { get: Some(g), .. } => {
                    call_function(st, g, receiver, &[])
                }
                PropertySlot::Accessor { get: None, .. } => Ok(Value::undefined()),
            };
        }
        cursor = st.vm.heap.object(o).prototype;
    }
    Ok(Value::undefined())
}

/// PutValue on any base.
pub fn set_value_property(
    st: &mut ExecState<'_>,
    base: Value,
    key: &PropertyKey,
    value: Value,
    strict: bool,
) -> Result<(), Value> {
    if let Some(obj) = base.as_object() {
        return set_object_property(st, obj, key, value, strict);
    }
    if base.is_nullish() {
        let key_text = st.vm.key_to_string(key);
        return Err(st.throw_type_error(&format!(
            "Cannot set property '{}' of {}",
            key_text,
            if base.is_null() { "null" } else { "undefined" }
        )));
    }
    // Primitive receiver: a prototype setter may run; otherwise the
    // write silently vanishes (throws when strict).
    let proto = if base.is_string() {
        st.realm.string_prototype
    } else if base.is_number() {
        st.realm.number_prototype
    } else if base.is_bool() {
        st.realm.boolean_prototype
    } else {
        st.realm.symbol_prototype
    };
    let mut cursor = Some(proto);
    while let Some(o) = cursor {
        if let Some((slot, _)) = st.vm.get_own_property(o, key) {
            if let PropertySlot::Accessor { set, .. } = slot {
                return match set {
                    Some(s) => call_function(st, s, base, &[value]).map(|_| ()),
                    None if strict => {
                        Err(st.throw_type_error("Cannot set property which has only a getter"))
                    }
                    None => Ok(()),
                };
            }
            break;
        }
        cursor = st.vm.heap.object(o).prototype;
    }
    if strict {
        return Err(st.throw_type_error("Cannot create property on primitive value"));
    }
    Ok(())
}

/// OrdinarySet (ES2017 9.1.9): own property first, then the prototype
/// chain for accessors and read-only conflicts, then creation on the
/// receiver.
pub fn set_object_property(
    st: &mut ExecState<'_>,
    obj: ObjectRef,
    key: &PropertyKey,
    value: Value,
    strict: bool,
) -> Result<(), Value> {
    // Array length is a write with its own semantics.
    if st.vm.heap.object(obj).is_array() {
        if let PropertyKey::Atom(a) = key {
            if *a == st.vm.wk.length {
                let n = to_number(st, value)?;
                let Some(new_len) = array_index_f64(n) else {
                    return Err(st.throw_range_error("Invalid array length"));
                };
                if !st.vm.set_array_length(obj, new_len) && strict {
                    return Err(st.throw_type_error("Cannot truncate array"));
                }
                return Ok(());
            }
        }
    }

    let mut cursor = Some(obj);
    while let Some(o) = cursor {
        if let Some((slot, attrs)) = st.vm.get_own_property(o, key) {
            match slot {
                PropertySlot::Accessor { set, .. } => {
                    return match set {
                        Some(s) => {
                            call_function(st, s, Value::object(obj), &[value]).map(|_| ())
                        }
                        None if strict => Err(st.throw_type_error(
                            "Cannot set property which has only a getter",
                        )),
                        None => Ok(()),
                    };
                }
                PropertySlot::Data(_) => {
                    if !attrs.is_writable() {
                        return if strict {
                            let key_text = st.vm.key_to_string(key);
                            Err(st.throw_type_error(&format!(
                                "Cannot assign to read only property '{}'",
                                key_text
                            )))
                        } else {
                            Ok(())
                        };
                    }
                    if o == obj {
                        // Ordinary same-object data write.
                        return write_own_data(st, obj, key, value, strict);
                    }
                    // Writable data on the prototype: create on the
                    // receiver.
                    break;
                }
            }
        }
        cursor = st.vm.heap.object(o).prototype;
    }
    create_data_property(st, obj, key, value, strict)
}

fn write_own_data(
    st: &mut ExecState<'_>,
    obj: ObjectRef,
    key: &PropertyKey,
    value: Value,
    strict: bool,
) -> Result<(), Value> {
    let ok = if let (true, PropertyKey::Index(i)) = (st.vm.heap.object(obj).is_array(), key) {
        st.vm.fast_array_set(obj, *i, value)
    } else {
        let mut desc = PropertyDescriptor::default();
        desc.value = Some(value);
        st.vm.define_own_property(obj, *key, desc)
    };
    if !ok && strict {
        let key_text = st.vm.key_to_string(key);
        return Err(st.throw_type_error(&format!("Cannot assign to property '{}'", key_text)));
    }
    Ok(())
}

pub fn create_data_property(
    st: &mut ExecState<'_>,
    obj: ObjectRef,
    key: &PropertyKey,
    value: Value,
    strict: bool,
) -> Result<(), Value> {
    let ok = if let (true, PropertyKey::Index(i)) = (st.vm.heap.object(obj).is_array(), key) {
        st.vm.fast_array_set(obj, *i, value)
    } else {
        st.vm.define_own_property(
            obj,
            *key,
            PropertyDescriptor::data(value, PropertyAttributes::ALL_PRESENT),
        )
    };
    if !ok && strict {
        let key_text = st.vm.key_to_string(key);
        return Err(st.throw_type_error(&format!("Cannot add property {}", key_text)));
    }
    Ok(())
}

// Operators

/// Loose equality (ES2017 7.2.12).
pub fn loose_equals(st: &mut ExecState<'_>, a: Value, b: Value) -> Result<bool, Value> {
    if a.is_nullish() && b.is_nullish() {
        return Ok(true);
    }
    if a.is_nullish() || b.is_nullish() {
        return Ok(false);
    }
    if a.is_number() && b.is_number() {
        return Ok(st.vm.strict_equals(a, b));
    }
    if a.is_string() && b.is_string() {
        return Ok(st.vm.strict_equals(a, b));
    }
    if a.is_symbol() && b.is_symbol() || a.is_object() && b.is_object() {
        return Ok(a == b);
    }
    if a.is_bool() {
        let n = to_number(st, a)?;
        return loose_equals(st, Value::number(n), b);
    }
    if b.is_bool() {
        let n = to_number(st, b)?;
        return loose_equals(st, a, Value::number(n));
    }
    if a.is_number() && b.is_string() {
        let n = to_number(st, b)?;
        return Ok(a.as_number().is_some_and(|x| x == n));
    }
    if a.is_string() && b.is_number() {
        let n = to_number(st, a)?;
        return Ok(b.as_number().is_some_and(|x| x == n));
    }
    if a.is_object() {
        let prim = to_primitive(st, a, PrimitiveHint::Default)?;
        return loose_equals(st, prim, b);
    }
    if b.is_object() {
        let prim = to_primitive(st, b, PrimitiveHint::Default)?;
        return loose_equals(st, a, prim);
    }
    Ok(false)
}

/// The abstract relational comparison. `None` means "undefined"
/// (a NaN was involved); callers map it to false.
pub fn abstract_relational(
    st: &mut ExecState<'_>,
    a: Value,
    b: Value,
) -> Result<Option<bool>, Value> {
    let pa = to_primitive(st, a, PrimitiveHint::Number)?;
    let pb = to_primitive(st, b, PrimitiveHint::Number)?;
    if let (Some(sa), Some(sb)) = (pa.as_string(), pb.as_string()) {
        st.vm.heap.flatten(sa);
        st.vm.heap.flatten(sb);
        let ord = st.vm.heap.string(sa).compare_flat(st.vm.heap.string(sb));
        return Ok(Some(ord == std::cmp::Ordering::Less));
    }
    let na = to_number(st, pa)?;
    let nb = to_number(st, pb)?;
    if na.is_nan() || nb.is_nan() {
        return Ok(None);
    }
    Ok(Some(na < nb))
}

/// The `+` operator: string concatenation or numeric addition after
/// ToPrimitive.
pub fn add_values(st: &mut ExecState<'_>, a: Value, b: Value) -> Result<Value, Value> {
    let pa = to_primitive(st, a, PrimitiveHint::Default)?;
    let pb = to_primitive(st, b, PrimitiveHint::Default)?;
    if pa.is_string() || pb.is_string() {
        let sa = to_string_ref(st, pa)?;
        let sb = to_string_ref(st, pb)?;
        let Some(out) = st.vm.heap.concat_strings(sa, sb) else {
            return Err(st.throw_range_error("Invalid string length"));
        };
        return Ok(Value::string(out));
    }
    let na = to_number(st, pa)?;
    let nb = to_number(st, pb)?;
    Ok(Value::number(na + nb))
}

/// OrdinaryHasInstance.
pub fn instance_of(st: &mut ExecState<'_>, value: Value, ctor: Value) -> Result<bool, Value> {
    let Some(c) = ctor.as_object() else {
        return Err(st.throw_type_error("Right-hand side of 'instanceof' is not callable"));
    };
    if !st.vm.heap.object(c).is_callable() {
        return Err(st.throw_type_error("Right-hand side of 'instanceof' is not callable"));
    }
    let proto_key = PropertyKey::Atom(st.vm.wk.prototype);
    let proto = get_object_property(st, c, &proto_key, ctor)?;
    let Some(proto) = proto.as_object() else {
        return Err(st.throw_type_error("Function has non-object prototype in instanceof"));
    };
    let Some(mut cursor) = value.as_object() else {
        return Ok(false);
    };
    while let Some(p) = st.vm.heap.object(cursor).prototype {
        if p == proto {
            return Ok(true);
        }
        cursor = p;
    }
    Ok(false)
}

// Display helpers for the shell and error reporting.

/// Render a value for shell output without running script.
pub fn value_to_display(st: &mut ExecState<'_>, v: Value) -> String {
    display_inner(st, v, 0)
}

fn display_inner(st: &mut ExecState<'_>, v: Value, depth: usize) -> String {
    if let Some(s) = v.as_string() {
        return st.vm.heap.string_to_rust(s);
    }
    if let Some(n) = v.as_number() {
        return crate::util::number_to_string(n);
    }
    if v.is_undefined() {
        return "undefined".into();
    }
    if v.is_null() {
        return "null".into();
    }
    if let Some(b) = v.as_bool() {
        return b.to_string();
    }
    if let Some(s) = v.as_symbol() {
        return format!(
            "Symbol({})",
            st.vm.symbols.description(s).unwrap_or("").to_string()
        );
    }
    let Some(obj) = v.as_object() else {
        return "undefined".into();
    };
    match &st.vm.heap.object(obj).kind {
        ObjectKind::Error { kind, .. } => {
            let kind = *kind;
            let msg_key = PropertyKey::Atom(st.vm.wk.message);
            let message = st
                .vm
                .get_own_property(obj, &msg_key)
                .and_then(|(slot, _)| slot.data());
            match message.and_then(|m| m.as_string()) {
                Some(m) => {
                    let text = st.vm.heap.string_to_rust(m);
                    format!("{}: {}", kind.name(), text)
                }
                None => kind.name().to_string(),
            }
        }
        ObjectKind::Function(_) => {
            let name = st
                .vm
                .get_own_property(obj, &PropertyKey::Atom(st.vm.wk.name))
                .and_then(|(slot, _)| slot.data())
                .and_then(|v| v.as_string())
                .map(|s| st.vm.heap.string_to_rust(s))
                .unwrap_or_default();
            format!("function {}() {{ ... }}", name)
        }
        ObjectKind::Array(_) => {
            if depth >= 2 {
                return "[...]".into();
            }
            let len = st.vm.array_length(obj);
            let mut parts = Vec::new();
            for i in 0..len.min(32) {
                let element = st
                    .vm
                    .get_own_property(obj, &PropertyKey::Index(i))
                    .and_then(|(slot, _)| slot.data());
                parts.push(match element {
                    Some(e) => display_inner(st, e, depth + 1),
                    None => String::new(),
                });
            }
            if len > 32 {
                parts.push(format!("... {} more", len - 32));
            }
            format!("[{}]", parts.join(", "))
        }
        _ => "[object Object]".into(),
    }
}

/// Error text for the embedder result arm: `Name: message` for error
/// objects, display text otherwise.
pub fn describe_error_value(st: &mut ExecState<'_>, v: Value) -> String {
    value_to_display(st, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VmInstance;

    #[test]
    fn strict_equality_numeric_encodings() {
        let mut vm = VmInstance::new_bare();
        assert!(vm.strict_equals(Value::int32(3), Value::double(3.0)));
        assert!(vm.strict_equals(Value::double(0.0), Value::double(-0.0)));
        assert!(!vm.strict_equals(Value::double(f64::NAN), Value::double(f64::NAN)));
        assert!(!vm.strict_equals(Value::int32(0), Value::bool(false)));
    }

    #[test]
    fn same_value_distinguishes_zeros() {
        let mut vm = VmInstance::new_bare();
        assert!(!vm.same_value(Value::double(0.0), Value::double(-0.0)));
        assert!(vm.same_value(Value::double(f64::NAN), Value::double(f64::NAN)));
    }

    #[test]
    fn same_value_zero_merges_zeros() {
        let mut vm = VmInstance::new_bare();
        assert!(vm.same_value_zero(Value::double(0.0), Value::double(-0.0)));
        assert!(vm.same_value_zero(Value::double(f64::NAN), Value::double(f64::NAN)));
    }

    #[test]
    fn string_equality_is_content_based() {
        let mut vm = VmInstance::new_bare();
        let a = vm.heap.alloc_str("hello");
        let b = vm.heap.alloc_str("hello");
        assert!(vm.strict_equals(Value::string(a), Value::string(b)));
    }

    #[test]
    fn to_boolean_table() {
        let mut vm = VmInstance::new_bare();
        assert!(!vm.to_boolean(Value::undefined()));
        assert!(!vm.to_boolean(Value::null()));
        assert!(!vm.to_boolean(Value::int32(0)));
        assert!(!vm.to_boolean(Value::double(f64::NAN)));
        assert!(vm.to_boolean(Value::int32(1)));
        let empty = vm.heap.alloc_str("");
        let full = vm.heap.alloc_str("x");
        assert!(!vm.to_boolean(Value::string(empty)));
        assert!(vm.to_boolean(Value::string(full)));
    }

    #[test]
    fn key_canonicalization() {
        let mut vm = VmInstance::new_bare();
        assert_eq!(vm.key_from_str("10"), PropertyKey::Index(10));
        assert!(matches!(vm.key_from_str("10.5"), PropertyKey::Atom(_)));
        assert!(matches!(vm.key_from_str("01"), PropertyKey::Atom(_)));
    }
}
