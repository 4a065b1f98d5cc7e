//! Array constructor and prototype
//!
//! The methods run the observable algorithms of ES2017 22.1.3 against
//! generic receivers: every element access goes through HasProperty /
//! Get / Set, so holes are skipped where the spec skips them and
//! prototype-chain mutations performed by callbacks are observed.
//! Derived construction goes through ArraySpeciesCreate; every write is
//! length-checked against 2^53 - 1.

use crate::builtins::{define_method, link_constructor};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::{
    create_data_property, get_object_property, set_object_property, to_integer, to_number,
    to_object, to_string_rust,
};
use crate::runtime::object::IterationKind;
use crate::runtime::property::{PropertyAttributes, PropertyKey};
use crate::value::{array_index_f64, ObjectRef, Value, MAX_SAFE_INTEGER};
use crate::vm::interpreter::{call_function, construct};

const MAX_LENGTH: u64 = MAX_SAFE_INTEGER as u64;

// Element plumbing

fn index_key(st: &mut ExecState<'_>, i: u64) -> PropertyKey {
    if i < u32::MAX as u64 {
        PropertyKey::Index(i as u32)
    } else {
        let text = i.to_string();
        PropertyKey::Atom(st.vm.atoms.intern(&text))
    }
}

fn length_of(st: &mut ExecState<'_>, obj: ObjectRef) -> Result<u64, Value> {
    let key = PropertyKey::Atom(st.vm.wk.length);
    let v = get_object_property(st, obj, &key, Value::object(obj))?;
    crate::runtime::conversion::to_length(st, v)
}

fn set_length(st: &mut ExecState<'_>, obj: ObjectRef, len: u64) -> Result<(), Value> {
    let key = PropertyKey::Atom(st.vm.wk.length);
    set_object_property(st, obj, &key, Value::number(len as f64), true)
}

fn has_element(st: &mut ExecState<'_>, obj: ObjectRef, i: u64) -> bool {
    let key = index_key(st, i);
    st.vm.has_property(obj, &key)
}

fn get_element(st: &mut ExecState<'_>, obj: ObjectRef, i: u64) -> Result<Value, Value> {
    let key = index_key(st, i);
    get_object_property(st, obj, &key, Value::object(obj))
}

fn set_element(st: &mut ExecState<'_>, obj: ObjectRef, i: u64, v: Value) -> Result<(), Value> {
    let key = index_key(st, i);
    set_object_property(st, obj, &key, v, true)
}

fn define_element(st: &mut ExecState<'_>, obj: ObjectRef, i: u64, v: Value) -> Result<(), Value> {
    let key = index_key(st, i);
    create_data_property(st, obj, &key, v, true)
}

fn delete_element(st: &mut ExecState<'_>, obj: ObjectRef, i: u64) -> Result<(), Value> {
    let key = index_key(st, i);
    if !st.vm.delete_own_property(obj, &key) {
        let text = st.vm.key_to_string(&key);
        return Err(st.throw_type_error(&format!("Cannot delete property '{}'", text)));
    }
    Ok(())
}

/// Relative index clamping used by slice/splice/fill/indexOf.
fn relative_index(idx: f64, len: u64) -> u64 {
    if idx < 0.0 {
        let adjusted = len as f64 + idx;
        if adjusted < 0.0 {
            0
        } else {
            adjusted as u64
        }
    } else if idx as u64 > len {
        len
    } else {
        idx as u64
    }
}

fn default_array(st: &mut ExecState<'_>, len: u64) -> Result<ObjectRef, Value> {
    if len >= u32::MAX as u64 {
        return Err(st.throw_range_error("Invalid array length"));
    }
    let proto = st.realm.array_prototype;
    Ok(st.vm.alloc_array(Some(proto), len as u32))
}

/// ArraySpeciesCreate: honor `constructor[@@species]` of the receiver,
/// falling back to the default array for undefined/null.
fn array_species_create(
    st: &mut ExecState<'_>,
    original: ObjectRef,
    length: u64,
) -> Result<ObjectRef, Value> {
    if !st.vm.heap.object(original).is_array() {
        return default_array(st, length);
    }
    let ctor_key = PropertyKey::Atom(st.vm.wk.constructor);
    let mut ctor = get_object_property(st, original, &ctor_key, Value::object(original))?;
    if let Some(c) = ctor.as_object() {
        let species_key = PropertyKey::Symbol(st.vm.wk_symbols.species);
        ctor = get_object_property(st, c, &species_key, Value::object(c))?;
        if ctor.is_null() {
            ctor = Value::undefined();
        }
    }
    if ctor.is_undefined() {
        return default_array(st, length);
    }
    if ctor.as_object() == Some(st.realm.array_constructor) {
        return default_array(st, length);
    }
    let result = construct(st, ctor, &[Value::number(length as f64)])?;
    result
        .as_object()
        .ok_or_else(|| st.throw_type_error("constructor returned a non-object"))
}

// Constructor and statics

pub fn constructor(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let proto = st.realm.array_prototype;
    match args {
        [] => Ok(Value::object(st.vm.alloc_array(Some(proto), 0))),
        [len] if len.is_number() => {
            let n = len.as_number().expect("checked as number");
            let Some(len) = array_index_f64(n) else {
                return Err(st.throw_range_error("Invalid array length"));
            };
            Ok(Value::object(st.vm.alloc_array(Some(proto), len)))
        }
        [single] => Ok(Value::object(
            st.vm.alloc_array_from(Some(proto), vec![*single]),
        )),
        items => Ok(Value::object(
            st.vm.alloc_array_from(Some(proto), items.to_vec()),
        )),
    }
}

fn is_array(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let result = args
        .first()
        .and_then(|v| v.as_object())
        .is_some_and(|o| st.vm.heap.object(o).is_array());
    Ok(Value::bool(result))
}

fn array_of(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let proto = st.realm.array_prototype;
    Ok(Value::object(
        st.vm.alloc_array_from(Some(proto), args.to_vec()),
    ))
}

// Mutators

fn push(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let mut len = length_of(st, obj)?;
    if len + args.len() as u64 > MAX_LENGTH {
        return Err(st.throw_type_error("Pushing would exceed the maximum array length"));
    }
    for &arg in args {
        set_element(st, obj, len, arg)?;
        len += 1;
    }
    set_length(st, obj, len)?;
    Ok(Value::number(len as f64))
}

fn pop(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    if len == 0 {
        set_length(st, obj, 0)?;
        return Ok(Value::undefined());
    }
    let value = get_element(st, obj, len - 1)?;
    delete_element(st, obj, len - 1)?;
    set_length(st, obj, len - 1)?;
    Ok(value)
}

fn shift(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    if len == 0 {
        set_length(st, obj, 0)?;
        return Ok(Value::undefined());
    }
    let first = get_element(st, obj, 0)?;
    for k in 1..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            set_element(st, obj, k - 1, v)?;
        } else {
            delete_element(st, obj, k - 1)?;
        }
    }
    delete_element(st, obj, len - 1)?;
    set_length(st, obj, len - 1)?;
    Ok(first)
}

fn unshift(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let count = args.len() as u64;
    if len + count > MAX_LENGTH {
        return Err(st.throw_type_error("Unshifting would exceed the maximum array length"));
    }
    if count > 0 {
        // Move the tail up, scanning only present indices.
        let mut k = len;
        while k > 0 {
            if has_element(st, obj, k - 1) {
                let v = get_element(st, obj, k - 1)?;
                set_element(st, obj, k + count - 1, v)?;
            } else {
                delete_element(st, obj, k + count - 1)?;
            }
            k -= 1;
        }
        for (i, &arg) in args.iter().enumerate() {
            set_element(st, obj, i as u64, arg)?;
        }
    }
    set_length(st, obj, len + count)?;
    Ok(Value::number((len + count) as f64))
}

fn reverse(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let middle = len / 2;
    let mut lower = 0u64;
    while lower != middle {
        let upper = len - lower - 1;
        let lower_exists = has_element(st, obj, lower);
        let upper_exists = has_element(st, obj, upper);
        match (lower_exists, upper_exists) {
            (true, true) => {
                let a = get_element(st, obj, lower)?;
                let b = get_element(st, obj, upper)?;
                set_element(st, obj, lower, b)?;
                set_element(st, obj, upper, a)?;
            }
            (false, true) => {
                let b = get_element(st, obj, upper)?;
                set_element(st, obj, lower, b)?;
                delete_element(st, obj, upper)?;
            }
            (true, false) => {
                let a = get_element(st, obj, lower)?;
                delete_element(st, obj, lower)?;
                set_element(st, obj, upper, a)?;
            }
            (false, false) => {}
        }
        lower += 1;
    }
    Ok(this)
}

fn splice(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let start = match args.first() {
        Some(v) => relative_index(to_integer(st, *v)?, len),
        None => 0,
    };
    let insert_count = args.len().saturating_sub(2) as u64;
    let delete_count = match args.len() {
        0 => 0,
        1 => len - start,
        _ => {
            let dc = to_integer(st, args[1])?;
            (dc.max(0.0) as u64).min(len - start)
        }
    };
    if len + insert_count - delete_count > MAX_LENGTH {
        return Err(st.throw_type_error("Splicing would exceed the maximum array length"));
    }

    let removed = array_species_create(st, obj, delete_count)?;
    for k in 0..delete_count {
        if has_element(st, obj, start + k) {
            let v = get_element(st, obj, start + k)?;
            define_element(st, removed, k, v)?;
        }
    }
    set_length(st, removed, delete_count)?;

    let items: Vec<Value> = args.iter().skip(2).copied().collect();
    let item_count = items.len() as u64;
    if item_count < delete_count {
        // Shrink: walk forward over present indices.
        for k in start..(len - delete_count) {
            let from = k + delete_count;
            let to = k + item_count;
            if has_element(st, obj, from) {
                let v = get_element(st, obj, from)?;
                set_element(st, obj, to, v)?;
            } else {
                delete_element(st, obj, to)?;
            }
        }
        for k in ((len - delete_count + item_count)..len).rev() {
            delete_element(st, obj, k)?;
        }
    } else if item_count > delete_count {
        // Grow: walk backward so nothing is clobbered.
        for k in (start..(len - delete_count)).rev() {
            let from = k + delete_count;
            let to = k + item_count;
            if has_element(st, obj, from) {
                let v = get_element(st, obj, from)?;
                set_element(st, obj, to, v)?;
            } else {
                delete_element(st, obj, to)?;
            }
        }
    }
    for (i, &item) in items.iter().enumerate() {
        set_element(st, obj, start + i as u64, item)?;
    }
    set_length(st, obj, len - delete_count + item_count)?;
    Ok(Value::object(removed))
}

fn fill(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let value = args.first().copied().unwrap_or(Value::undefined());
    let start = match args.get(1) {
        Some(v) if !v.is_undefined() => relative_index(to_integer(st, *v)?, len),
        _ => 0,
    };
    let end = match args.get(2) {
        Some(v) if !v.is_undefined() => relative_index(to_integer(st, *v)?, len),
        _ => len,
    };
    for k in start..end {
        set_element(st, obj, k, value)?;
    }
    Ok(this)
}

fn sort(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let comparator = match args.first() {
        None => None,
        Some(v) if v.is_undefined() => None,
        Some(v) => match v.as_object() {
            Some(f) if st.vm.heap.object(f).is_callable() => Some(f),
            _ => {
                return Err(st.throw_type_error("The comparison function must be callable"))
            }
        },
    };
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;

    // Partition: present defined values, then undefined, then holes.
    let mut items: Vec<Value> = Vec::new();
    let mut undefined_count = 0u64;
    for k in 0..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            if v.is_undefined() {
                undefined_count += 1;
            } else {
                items.push(v);
            }
        }
    }

    let sorted = merge_sort(st, items, comparator)?;
    let mut k = 0u64;
    for v in sorted {
        set_element(st, obj, k, v)?;
        k += 1;
    }
    for _ in 0..undefined_count {
        set_element(st, obj, k, Value::undefined())?;
        k += 1;
    }
    while k < len {
        delete_element(st, obj, k)?;
        k += 1;
    }
    Ok(this)
}

/// Stable merge sort with a fallible comparator.
fn merge_sort(
    st: &mut ExecState<'_>,
    mut items: Vec<Value>,
    comparator: Option<ObjectRef>,
) -> Result<Vec<Value>, Value> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(st, items, comparator)?;
    let right = merge_sort(st, right, comparator)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut li = 0;
    let mut ri = 0;
    while li < left.len() && ri < right.len() {
        if compare_elements(st, left[li], right[ri], comparator)? <= 0.0 {
            out.push(left[li]);
            li += 1;
        } else {
            out.push(right[ri]);
            ri += 1;
        }
    }
    out.extend_from_slice(&left[li..]);
    out.extend_from_slice(&right[ri..]);
    Ok(out)
}

fn compare_elements(
    st: &mut ExecState<'_>,
    a: Value,
    b: Value,
    comparator: Option<ObjectRef>,
) -> Result<f64, Value> {
    match comparator {
        Some(f) => {
            let r = call_function(st, f, Value::undefined(), &[a, b])?;
            let n = to_number(st, r)?;
            Ok(if n.is_nan() { 0.0 } else { n })
        }
        None => {
            let sa = to_string_rust(st, a)?;
            let sb = to_string_rust(st, b)?;
            Ok(match sa.cmp(&sb) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            })
        }
    }
}

// Accessors

fn slice(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let start = match args.first() {
        Some(v) if !v.is_undefined() => relative_index(to_integer(st, *v)?, len),
        _ => 0,
    };
    let end = match args.get(1) {
        Some(v) if !v.is_undefined() => relative_index(to_integer(st, *v)?, len),
        _ => len,
    };
    let count = end.saturating_sub(start);
    let result = array_species_create(st, obj, count)?;
    let mut n = 0u64;
    for k in start..end {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            define_element(st, result, n, v)?;
        }
        n += 1;
    }
    set_length(st, result, count)?;
    Ok(Value::object(result))
}

/// IsConcatSpreadable.
fn is_spreadable(st: &mut ExecState<'_>, v: Value) -> Result<bool, Value> {
    let Some(obj) = v.as_object() else {
        return Ok(false);
    };
    let key = PropertyKey::Symbol(st.vm.wk_symbols.is_concat_spreadable);
    let flag = get_object_property(st, obj, &key, v)?;
    if !flag.is_undefined() {
        return Ok(st.vm.to_boolean(flag));
    }
    Ok(st.vm.heap.object(obj).is_array())
}

fn concat(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let result = array_species_create(st, obj, 0)?;
    let mut n = 0u64;
    let mut sources = vec![Value::object(obj)];
    sources.extend_from_slice(args);
    for source in sources {
        if is_spreadable(st, source)? {
            let source_obj = source.as_object().expect("spreadable implies object");
            let len = length_of(st, source_obj)?;
            if n + len > MAX_LENGTH {
                return Err(st.throw_type_error("Concatenation exceeds the maximum array length"));
            }
            for k in 0..len {
                if has_element(st, source_obj, k) {
                    let v = get_element(st, source_obj, k)?;
                    define_element(st, result, n, v)?;
                }
                n += 1;
            }
        } else {
            if n >= MAX_LENGTH {
                return Err(st.throw_type_error("Concatenation exceeds the maximum array length"));
            }
            define_element(st, result, n, source)?;
            n += 1;
        }
    }
    set_length(st, result, n)?;
    Ok(Value::object(result))
}

fn join(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    // Self-referential receivers yield the empty string; the guard is
    // released on every exit path.
    if st.recursion_guard.contains(&obj) {
        let s = st.vm.heap.alloc_str("");
        return Ok(Value::string(s));
    }
    st.recursion_guard.push(obj);
    let result = join_inner(st, obj, args);
    st.recursion_guard.pop();
    result
}

fn join_inner(
    st: &mut ExecState<'_>,
    obj: ObjectRef,
    args: &[Value],
) -> Result<Value, Value> {
    let len = length_of(st, obj)?;
    let separator = match args.first() {
        Some(v) if !v.is_undefined() => to_string_rust(st, *v)?,
        _ => ",".to_string(),
    };
    let mut out = String::new();
    for k in 0..len {
        if k > 0 {
            out.push_str(&separator);
        }
        let element = get_element(st, obj, k)?;
        if !element.is_nullish() {
            out.push_str(&to_string_rust(st, element)?);
        }
    }
    let s = st.vm.heap.alloc_str(&out);
    Ok(Value::string(s))
}

fn array_to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let join_key = st.vm.key_from_str("join");
    let func = get_object_property(st, obj, &join_key, this)?;
    match func.as_object() {
        Some(f) if st.vm.heap.object(f).is_callable() => call_function(st, f, this, &[]),
        _ => {
            let s = st.vm.heap.alloc_str("[object Array]");
            Ok(Value::string(s))
        }
    }
}

// Searches

fn index_of(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let target = args.first().copied().unwrap_or(Value::undefined());
    if len == 0 {
        return Ok(Value::int32(-1));
    }
    let from = match args.get(1) {
        Some(v) => to_integer(st, *v)?,
        None => 0.0,
    };
    if from >= len as f64 {
        return Ok(Value::int32(-1));
    }
    let start = relative_index(from, len);
    for k in start..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            if st.vm.strict_equals(v, target) {
                return Ok(Value::number(k as f64));
            }
        }
    }
    Ok(Value::int32(-1))
}

fn last_index_of(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let target = args.first().copied().unwrap_or(Value::undefined());
    if len == 0 {
        return Ok(Value::int32(-1));
    }
    let from = match args.get(1) {
        Some(v) => to_integer(st, *v)?,
        None => (len - 1) as f64,
    };
    let mut k = if from >= 0.0 {
        from.min((len - 1) as f64) as i64
    } else {
        len as i64 + from as i64
    };
    while k >= 0 {
        if has_element(st, obj, k as u64) {
            let v = get_element(st, obj, k as u64)?;
            if st.vm.strict_equals(v, target) {
                return Ok(Value::number(k as f64));
            }
        }
        k -= 1;
    }
    Ok(Value::int32(-1))
}

fn includes(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let target = args.first().copied().unwrap_or(Value::undefined());
    let from = match args.get(1) {
        Some(v) => to_integer(st, *v)?,
        None => 0.0,
    };
    let start = relative_index(from, len);
    for k in start..len {
        // Holes read as undefined; includes does not skip them.
        let v = get_element(st, obj, k)?;
        if st.vm.same_value_zero(v, target) {
            return Ok(Value::bool(true));
        }
    }
    Ok(Value::bool(false))
}

// Callback iteration; the callback runs only for present indices.

fn callback_of(st: &mut ExecState<'_>, args: &[Value], name: &str) -> Result<ObjectRef, Value> {
    match args.first().and_then(|v| v.as_object()) {
        Some(f) if st.vm.heap.object(f).is_callable() => Ok(f),
        _ => Err(st.throw_type_error(&format!("{} requires a callback function", name))),
    }
}

fn for_each(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "forEach")?;
    let this_arg = args.get(1).copied().unwrap_or(Value::undefined());
    for k in 0..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            call_function(
                st,
                callback,
                this_arg,
                &[v, Value::number(k as f64), Value::object(obj)],
            )?;
        }
    }
    Ok(Value::undefined())
}

fn map(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "map")?;
    let this_arg = args.get(1).copied().unwrap_or(Value::undefined());
    let result = array_species_create(st, obj, len)?;
    for k in 0..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            let mapped = call_function(
                st,
                callback,
                this_arg,
                &[v, Value::number(k as f64), Value::object(obj)],
            )?;
            define_element(st, result, k, mapped)?;
        }
    }
    Ok(Value::object(result))
}

fn filter(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "filter")?;
    let this_arg = args.get(1).copied().unwrap_or(Value::undefined());
    let result = array_species_create(st, obj, 0)?;
    let mut n = 0u64;
    for k in 0..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            let keep = call_function(
                st,
                callback,
                this_arg,
                &[v, Value::number(k as f64), Value::object(obj)],
            )?;
            if st.vm.to_boolean(keep) {
                define_element(st, result, n, v)?;
                n += 1;
            }
        }
    }
    Ok(Value::object(result))
}

fn every(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "every")?;
    let this_arg = args.get(1).copied().unwrap_or(Value::undefined());
    for k in 0..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            let r = call_function(
                st,
                callback,
                this_arg,
                &[v, Value::number(k as f64), Value::object(obj)],
            )?;
            if !st.vm.to_boolean(r) {
                return Ok(Value::bool(false));
            }
        }
    }
    Ok(Value::bool(true))
}

fn some(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "some")?;
    let this_arg = args.get(1).copied().unwrap_or(Value::undefined());
    for k in 0..len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            let r = call_function(
                st,
                callback,
                this_arg,
                &[v, Value::number(k as f64), Value::object(obj)],
            )?;
            if st.vm.to_boolean(r) {
                return Ok(Value::bool(true));
            }
        }
    }
    Ok(Value::bool(false))
}

fn reduce(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "reduce")?;
    let mut k = 0u64;
    let mut accumulator = match args.get(1) {
        Some(v) => *v,
        None => {
            // Seek the first present element.
            loop {
                if k >= len {
                    return Err(
                        st.throw_type_error("Reduce of empty array with no initial value")
                    );
                }
                if has_element(st, obj, k) {
                    let v = get_element(st, obj, k)?;
                    k += 1;
                    break v;
                }
                k += 1;
            }
        }
    };
    while k < len {
        if has_element(st, obj, k) {
            let v = get_element(st, obj, k)?;
            accumulator = call_function(
                st,
                callback,
                Value::undefined(),
                &[accumulator, v, Value::number(k as f64), Value::object(obj)],
            )?;
        }
        k += 1;
    }
    Ok(accumulator)
}

fn reduce_right(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    let len = length_of(st, obj)?;
    let callback = callback_of(st, args, "reduceRight")?;
    let mut k = len as i64 - 1;
    let mut accumulator = match args.get(1) {
        Some(v) => *v,
        None => loop {
            if k < 0 {
                return Err(st.throw_type_error("Reduce of empty array with no initial value"));
            }
            if has_element(st, obj, k as u64) {
                let v = get_element(st, obj, k as u64)?;
                k -= 1;
                break v;
            }
            k -= 1;
        },
    };
    while k >= 0 {
        if has_element(st, obj, k as u64) {
            let v = get_element(st, obj, k as u64)?;
            accumulator = call_function(
                st,
                callback,
                Value::undefined(),
                &[accumulator, v, Value::number(k as f64), Value::object(obj)],
            )?;
        }
        k -= 1;
    }
    Ok(accumulator)
}

// Iteration

fn keys(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    Ok(crate::builtins::iterator::create_array_iterator(
        st,
        obj,
        IterationKind::Key,
    ))
}

fn values(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    Ok(crate::builtins::iterator::create_array_iterator(
        st,
        obj,
        IterationKind::Value,
    ))
}

fn entries(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, this)?;
    Ok(crate::builtins::iterator::create_array_iterator(
        st,
        obj,
        IterationKind::KeyValue,
    ))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = realm.array_constructor;
    link_constructor(vm, realm, ctor, realm.array_prototype, "Array");
    define_method(vm, realm, ctor, "isArray", 1, is_array);
    define_method(vm, realm, ctor, "of", 0, array_of);

    // Array[@@species] is the constructor itself.
    let species = vm.wk_symbols.species;
    define_value_symbol(vm, ctor, species, Value::object(ctor));

    let proto = realm.array_prototype;
    define_method(vm, realm, proto, "push", 1, push);
    define_method(vm, realm, proto, "pop", 0, pop);
    define_method(vm, realm, proto, "shift", 0, shift);
    define_method(vm, realm, proto, "unshift", 1, unshift);
    define_method(vm, realm, proto, "reverse", 0, reverse);
    define_method(vm, realm, proto, "splice", 2, splice);
    define_method(vm, realm, proto, "fill", 1, fill);
    define_method(vm, realm, proto, "sort", 1, sort);
    define_method(vm, realm, proto, "slice", 2, slice);
    define_method(vm, realm, proto, "concat", 1, concat);
    define_method(vm, realm, proto, "join", 1, join);
    define_method(vm, realm, proto, "toString", 0, array_to_string);
    define_method(vm, realm, proto, "indexOf", 1, index_of);
    define_method(vm, realm, proto, "lastIndexOf", 1, last_index_of);
    define_method(vm, realm, proto, "includes", 1, includes);
    define_method(vm, realm, proto, "forEach", 1, for_each);
    define_method(vm, realm, proto, "map", 1, map);
    define_method(vm, realm, proto, "filter", 1, filter);
    define_method(vm, realm, proto, "every", 1, every);
    define_method(vm, realm, proto, "some", 1, some);
    define_method(vm, realm, proto, "reduce", 1, reduce);
    define_method(vm, realm, proto, "reduceRight", 1, reduce_right);
    define_method(vm, realm, proto, "keys", 0, keys);
    let values_fn = define_method(vm, realm, proto, "values", 0, values);
    define_method(vm, realm, proto, "entries", 0, entries);

    // @@iterator is the values intrinsic.
    let iterator = vm.wk_symbols.iterator;
    define_value_symbol(vm, proto, iterator, Value::object(values_fn));
}

fn define_value_symbol(
    vm: &mut VmInstance,
    target: ObjectRef,
    sym: crate::value::SymbolRef,
    value: Value,
) {
    vm.define_own_property(
        target,
        PropertyKey::Symbol(sym),
        crate::runtime::property::PropertyDescriptor::data(value, PropertyAttributes::BUILTIN),
    );
}
