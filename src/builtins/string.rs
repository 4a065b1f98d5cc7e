//! String constructor and prototype
//!
//! Positions and lengths are in UTF-16 code units. `replace` implements
//! the `$`-substitution table including the two-digit capture lookup
//! that falls back to one digit; `split` respects a user-provided
//! `@@split` method on the separator.

use crate::builtins::{define_method, define_value, link_constructor, native_function};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::{
    get_method, to_integer, to_number, to_string_ref, to_string_rust,
};
use crate::runtime::object::ObjectKind;
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::runtime::string::STRING_MAX_LENGTH;
use crate::value::{ObjectRef, StringRef, Value};
use crate::vm::interpreter::{call_function, call_value};

pub fn constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let s = match args.first() {
        None => st.vm.heap.alloc_str(""),
        Some(v) => to_string_ref(st, *v)?,
    };
    if this.is_object() {
        let proto = st.realm.string_prototype;
        let obj = st.vm.alloc_object(Some(proto), ObjectKind::StringWrapper(s));
        return Ok(Value::object(obj));
    }
    Ok(Value::string(s))
}

/// thisStringValue for toString/valueOf: string or wrapper only.
fn this_string_value(st: &mut ExecState<'_>, this: Value) -> Result<StringRef, Value> {
    if let Some(s) = this.as_string() {
        return Ok(s);
    }
    if let Some(obj) = this.as_object() {
        if let ObjectKind::StringWrapper(s) = st.vm.heap.object(obj).kind {
            return Ok(s);
        }
    }
    Err(st.throw_type_error("receiver is not a String"))
}

/// RequireObjectCoercible + ToString for the generic methods.
fn coerce_this(st: &mut ExecState<'_>, this: Value, method: &str) -> Result<Vec<u16>, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error(&format!(
            "String.prototype.{} called on null or undefined",
            method
        )));
    }
    let s = to_string_ref(st, this)?;
    st.vm.heap.flatten(s);
    Ok(st.vm.heap.string(s).units())
}

fn make_string(st: &mut ExecState<'_>, units: Vec<u16>) -> Value {
    Value::string(st.vm.heap.alloc_string_from_units(units))
}

fn arg_or_undefined(args: &[Value], i: usize) -> Value {
    args.get(i).copied().unwrap_or(Value::undefined())
}

/// Clamp a relative position into [0, len].
fn clamp_position(pos: f64, len: usize) -> usize {
    if pos.is_nan() || pos < 0.0 {
        0
    } else if pos > len as f64 {
        len
    } else {
        pos as usize
    }
}

fn find_sub(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len().saturating_sub(needle.len()))
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn rfind_sub(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    let last = from.min(haystack.len() - needle.len());
    (0..=last)
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

// Methods

fn to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    Ok(Value::string(this_string_value(st, this)?))
}

fn char_at(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "charAt")?;
    let pos = to_integer(st, arg_or_undefined(args, 0))?;
    if pos < 0.0 || pos >= units.len() as f64 {
        return Ok(make_string(st, Vec::new()));
    }
    Ok(make_string(st, vec![units[pos as usize]]))
}

fn char_code_at(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "charCodeAt")?;
    let pos = to_integer(st, arg_or_undefined(args, 0))?;
    if pos < 0.0 || pos >= units.len() as f64 {
        return Ok(Value::double(f64::NAN));
    }
    Ok(Value::number(units[pos as usize] as f64))
}

fn code_point_at(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "codePointAt")?;
    let pos = to_integer(st, arg_or_undefined(args, 0))?;
    if pos < 0.0 || pos >= units.len() as f64 {
        return Ok(Value::undefined());
    }
    let i = pos as usize;
    let first = units[i];
    let cp = if (0xD800..0xDC00).contains(&first) && i + 1 < units.len() {
        let second = units[i + 1];
        if (0xDC00..0xE000).contains(&second) {
            0x10000 + ((first as u32 - 0xD800) << 10) + (second as u32 - 0xDC00)
        } else {
            first as u32
        }
    } else {
        first as u32
    };
    Ok(Value::number(cp as f64))
}

fn index_of(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "indexOf")?;
    let needle = to_string_ref(st, arg_or_undefined(args, 0))?;
    st.vm.heap.flatten(needle);
    let needle = st.vm.heap.string(needle).units();
    let from = clamp_position(to_integer(st, arg_or_undefined(args, 1))?, units.len());
    Ok(match find_sub(&units, &needle, from) {
        Some(i) => Value::number(i as f64),
        None => Value::int32(-1),
    })
}

fn last_index_of(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "lastIndexOf")?;
    let needle = to_string_ref(st, arg_or_undefined(args, 0))?;
    st.vm.heap.flatten(needle);
    let needle = st.vm.heap.string(needle).units();
    let pos = to_number(st, arg_or_undefined(args, 1))?;
    let from = if pos.is_nan() {
        units.len()
    } else {
        clamp_position(pos, units.len())
    };
    Ok(match rfind_sub(&units, &needle, from) {
        Some(i) => Value::number(i as f64),
        None => Value::int32(-1),
    })
}

fn includes(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "includes")?;
    let needle = to_string_ref(st, arg_or_undefined(args, 0))?;
    st.vm.heap.flatten(needle);
    let needle = st.vm.heap.string(needle).units();
    let from = clamp_position(to_integer(st, arg_or_undefined(args, 1))?, units.len());
    Ok(Value::bool(find_sub(&units, &needle, from).is_some()))
}

fn starts_with(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "startsWith")?;
    let needle = to_string_ref(st, arg_or_undefined(args, 0))?;
    st.vm.heap.flatten(needle);
    let needle = st.vm.heap.string(needle).units();
    let from = clamp_position(to_integer(st, arg_or_undefined(args, 1))?, units.len());
    let result = units.len() >= from + needle.len() && units[from..from + needle.len()] == *needle;
    Ok(Value::bool(result))
}

fn ends_with(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "endsWith")?;
    let needle = to_string_ref(st, arg_or_undefined(args, 0))?;
    st.vm.heap.flatten(needle);
    let needle = st.vm.heap.string(needle).units();
    let end = match args.get(1) {
        Some(v) if !v.is_undefined() => clamp_position(to_integer(st, *v)?, units.len()),
        _ => units.len(),
    };
    if needle.len() > end {
        return Ok(Value::bool(false));
    }
    let start = end - needle.len();
    Ok(Value::bool(units[start..end] == *needle))
}

fn slice(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "slice")?;
    let len = units.len() as f64;
    let start = to_integer(st, arg_or_undefined(args, 0))?;
    let end = match args.get(1) {
        Some(v) if !v.is_undefined() => to_integer(st, *v)?,
        _ => len,
    };
    let from = if start < 0.0 {
        (len + start).max(0.0)
    } else {
        start.min(len)
    } as usize;
    let to = if end < 0.0 {
        (len + end).max(0.0)
    } else {
        end.min(len)
    } as usize;
    let out = if from < to {
        units[from..to].to_vec()
    } else {
        Vec::new()
    };
    Ok(make_string(st, out))
}

fn substring(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "substring")?;
    let len = units.len();
    // Negative and NaN clamp to 0; start > end swaps silently.
    let mut start = clamp_position(to_integer(st, arg_or_undefined(args, 0))?, len);
    let mut end = match args.get(1) {
        Some(v) if !v.is_undefined() => clamp_position(to_integer(st, *v)?, len),
        _ => len,
    };
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    Ok(make_string(st, units[start..end].to_vec()))
}

fn substr(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "substr")?;
    let len = units.len() as f64;
    let mut start = to_integer(st, arg_or_undefined(args, 0))?;
    // Negative start counts from the end, clamped to 0.
    if start < 0.0 {
        start = (len + start).max(0.0);
    }
    // Missing length means "to the end".
    let length = match args.get(1) {
        Some(v) if !v.is_undefined() => to_integer(st, *v)?,
        _ => f64::INFINITY,
    };
    let take = length.max(0.0).min(len - start.min(len));
    if take <= 0.0 {
        return Ok(make_string(st, Vec::new()));
    }
    let from = start as usize;
    let to = from + take as usize;
    Ok(make_string(st, units[from..to].to_vec()))
}

fn concat(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error("String.prototype.concat called on null or undefined"));
    }
    let mut acc = to_string_ref(st, this)?;
    for &arg in args {
        let next = to_string_ref(st, arg)?;
        let Some(combined) = st.vm.heap.concat_strings(acc, next) else {
            return Err(st.throw_range_error("Invalid string length"));
        };
        acc = combined;
    }
    Ok(Value::string(acc))
}

fn repeat(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "repeat")?;
    let count = to_integer(st, arg_or_undefined(args, 0))?;
    if count < 0.0 || count.is_infinite() {
        return Err(st.throw_range_error("Invalid count value"));
    }
    let total = units.len() as f64 * count;
    if total > STRING_MAX_LENGTH as f64 {
        return Err(st.throw_range_error("Invalid string length"));
    }
    let mut out = Vec::with_capacity(total as usize);
    for _ in 0..count as usize {
        out.extend_from_slice(&units);
    }
    Ok(make_string(st, out))
}

fn trim(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let units = coerce_this(st, this, "trim")?;
    let is_ws = |u: u16| {
        char::from_u32(u as u32).is_some_and(|c| c.is_whitespace() || c == '\u{FEFF}')
    };
    let start = units.iter().position(|&u| !is_ws(u)).unwrap_or(units.len());
    let end = units.iter().rposition(|&u| !is_ws(u)).map_or(start, |i| i + 1);
    Ok(make_string(st, units[start..end].to_vec()))
}

fn to_lower_case(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error("String.prototype.toLowerCase called on null or undefined"));
    }
    let text = to_string_rust(st, this)?;
    let s = st.vm.heap.alloc_str(&text.to_lowercase());
    Ok(Value::string(s))
}

fn to_upper_case(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error("String.prototype.toUpperCase called on null or undefined"));
    }
    let text = to_string_rust(st, this)?;
    let s = st.vm.heap.alloc_str(&text.to_uppercase());
    Ok(Value::string(s))
}

fn split(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error("String.prototype.split called on null or undefined"));
    }
    let separator = arg_or_undefined(args, 0);
    let limit_arg = arg_or_undefined(args, 1);

    // A separator carrying @@split handles the operation itself.
    if separator.is_object() {
        let split_key = PropertyKey::Symbol(st.vm.wk_symbols.split);
        if let Some(method) = get_method(st, separator, &split_key)? {
            return call_function(st, method, separator, &[this, limit_arg]);
        }
    }

    let units = coerce_this(st, this, "split")?;
    let limit = if limit_arg.is_undefined() {
        u32::MAX
    } else {
        crate::runtime::conversion::to_uint32(st, limit_arg)?
    };
    let proto = st.realm.array_prototype;
    if limit == 0 {
        return Ok(Value::object(st.vm.alloc_array(Some(proto), 0)));
    }
    if separator.is_undefined() {
        let whole = make_string(st, units);
        let arr = st.vm.alloc_array_from(Some(proto), vec![whole]);
        return Ok(Value::object(arr));
    }

    let sep = to_string_ref(st, separator)?;
    st.vm.heap.flatten(sep);
    let sep = st.vm.heap.string(sep).units();
    let mut parts: Vec<Value> = Vec::new();

    if sep.is_empty() {
        for &u in units.iter().take(limit as usize) {
            parts.push(make_string(st, vec![u]));
        }
    } else if units.is_empty() {
        parts.push(make_string(st, Vec::new()));
    } else {
        let mut start = 0usize;
        let mut cursor = 0usize;
        while cursor + sep.len() <= units.len() {
            if units[cursor..cursor + sep.len()] == *sep {
                parts.push(make_string(st, units[start..cursor].to_vec()));
                if parts.len() as u32 >= limit {
                    let arr = st.vm.alloc_array_from(Some(proto), parts);
                    return Ok(Value::object(arr));
                }
                cursor += sep.len();
                start = cursor;
            } else {
                cursor += 1;
            }
        }
        parts.push(make_string(st, units[start..].to_vec()));
    }
    if parts.len() as u32 > limit {
        parts.truncate(limit as usize);
    }
    let arr = st.vm.alloc_array_from(Some(proto), parts);
    Ok(Value::object(arr))
}

fn replace(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error("String.prototype.replace called on null or undefined"));
    }
    let search = arg_or_undefined(args, 0);
    let replacement = arg_or_undefined(args, 1);

    let units = coerce_this(st, this, "replace")?;
    let search_ref = to_string_ref(st, search)?;
    st.vm.heap.flatten(search_ref);
    let needle = st.vm.heap.string(search_ref).units();

    let Some(pos) = find_sub(&units, &needle, 0) else {
        return Ok(make_string(st, units));
    };
    let matched = &units[pos..pos + needle.len()];

    let replacement_units = match replacement.as_object() {
        Some(f) if st.vm.heap.object(f).is_callable() => {
            let matched_v = make_string(st, matched.to_vec());
            let this_str = make_string(st, units.clone());
            let result = call_value(
                st,
                Value::object(f),
                Value::undefined(),
                &[matched_v, Value::number(pos as f64), this_str],
            )?;
            let s = to_string_ref(st, result)?;
            st.vm.heap.flatten(s);
            st.vm.heap.string(s).units()
        }
        _ => {
            let template = to_string_ref(st, replacement)?;
            st.vm.heap.flatten(template);
            let template = st.vm.heap.string(template).units();
            substitute(&template, matched, &units, pos)
        }
    };

    let mut out = units[..pos].to_vec();
    out.extend_from_slice(&replacement_units);
    out.extend_from_slice(&units[pos + needle.len()..]);
    Ok(make_string(st, out))
}

/// GetSubstitution for string searches: `$$`, `$&`, `` $` ``, `$'`;
/// capture references try two digits, fall back to one, and stay
/// literal when the group does not exist (string search has none).
fn substitute(template: &[u16], matched: &[u16], s: &[u16], position: usize) -> Vec<u16> {
    let mut out = Vec::with_capacity(template.len());
    let mut i = 0;
    while i < template.len() {
        let u = template[i];
        if u != b'$' as u16 || i + 1 >= template.len() {
            out.push(u);
            i += 1;
            continue;
        }
        let next = template[i + 1];
        match next {
            u if u == b'$' as u16 => {
                out.push(b'$' as u16);
                i += 2;
            }
            u if u == b'&' as u16 => {
                out.extend_from_slice(matched);
                i += 2;
            }
            u if u == b'`' as u16 => {
                out.extend_from_slice(&s[..position]);
                i += 2;
            }
            u if u == b'\'' as u16 => {
                out.extend_from_slice(&s[position + matched.len()..]);
                i += 2;
            }
            u if (b'0' as u16..=b'9' as u16).contains(&u) => {
                // No capture groups exist for a string search, so both
                // the two-digit and one-digit lookups miss and the
                // text passes through untouched.
                out.push(template[i]);
                out.push(next);
                i += 2;
            }
            _ => {
                out.push(u);
                i += 1;
            }
        }
    }
    out
}

fn string_iterator(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if this.is_nullish() {
        return Err(st.throw_type_error("String iterator called on null or undefined"));
    }
    let s = to_string_ref(st, this)?;
    Ok(crate::builtins::iterator::create_string_iterator(st, s))
}

fn from_char_code(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let mut units = Vec::with_capacity(args.len());
    for &arg in args {
        let n = to_number(st, arg)?;
        units.push(crate::value::to_uint32_f64(n) as u16);
    }
    Ok(make_string(st, units))
}

fn from_code_point(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let mut units = Vec::with_capacity(args.len());
    for &arg in args {
        let n = to_number(st, arg)?;
        if n.trunc() != n || !(0.0..=0x10FFFF as f64).contains(&n) {
            return Err(st.throw_range_error("Invalid code point"));
        }
        let cp = n as u32;
        if cp < 0x10000 {
            units.push(cp as u16);
        } else {
            let v = cp - 0x10000;
            units.push(0xD800 + (v >> 10) as u16);
            units.push(0xDC00 + (v & 0x3FF) as u16);
        }
    }
    Ok(make_string(st, units))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = native_function(vm, realm.function_prototype, constructor, "String", 1);
    link_constructor(vm, realm, ctor, realm.string_prototype, "String");
    define_method(vm, realm, ctor, "fromCharCode", 1, from_char_code);
    define_method(vm, realm, ctor, "fromCodePoint", 1, from_code_point);

    let proto = realm.string_prototype;
    define_method(vm, realm, proto, "toString", 0, to_string);
    define_method(vm, realm, proto, "valueOf", 0, to_string);
    define_method(vm, realm, proto, "charAt", 1, char_at);
    define_method(vm, realm, proto, "charCodeAt", 1, char_code_at);
    define_method(vm, realm, proto, "codePointAt", 1, code_point_at);
    define_method(vm, realm, proto, "indexOf", 1, index_of);
    define_method(vm, realm, proto, "lastIndexOf", 1, last_index_of);
    define_method(vm, realm, proto, "includes", 1, includes);
    define_method(vm, realm, proto, "startsWith", 1, starts_with);
    define_method(vm, realm, proto, "endsWith", 1, ends_with);
    define_method(vm, realm, proto, "slice", 2, slice);
    define_method(vm, realm, proto, "substring", 2, substring);
    define_method(vm, realm, proto, "substr", 2, substr);
    define_method(vm, realm, proto, "concat", 1, concat);
    define_method(vm, realm, proto, "repeat", 1, repeat);
    define_method(vm, realm, proto, "trim", 0, trim);
    define_method(vm, realm, proto, "toLowerCase", 0, to_lower_case);
    define_method(vm, realm, proto, "toUpperCase", 0, to_upper_case);
    define_method(vm, realm, proto, "split", 2, split);
    define_method(vm, realm, proto, "replace", 2, replace);

    let iterator_fn = native_function(
        vm,
        realm.function_prototype,
        string_iterator,
        "[Symbol.iterator]",
        0,
    );
    vm.define_own_property(
        proto,
        PropertyKey::Symbol(vm.wk_symbols.iterator),
        PropertyDescriptor::data(Value::object(iterator_fn), PropertyAttributes::BUILTIN),
    );
    define_value(
        vm,
        proto,
        "length",
        Value::int32(0),
        PropertyAttributes::empty(),
    );
}
