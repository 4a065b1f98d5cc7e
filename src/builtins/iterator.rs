//! Iterator prototypes
//!
//! `%IteratorPrototype%` plus the array and string iterator objects.
//! An iterator carries its immutable receiver, a mutable cursor, and a
//! kind tag; `next` yields `{value, done}` pairs.

use crate::builtins::{define_method, define_symbol_method};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::{get_object_property, to_length};
use crate::runtime::object::{ArrayIteratorData, IterationKind, ObjectKind};
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::{ObjectRef, StringRef, Value};

/// Allocate a `{value, done}` result object.
pub fn create_iter_result(st: &mut ExecState<'_>, value: Value, done: bool) -> Value {
    let proto = st.realm.object_prototype;
    let obj = st.vm.alloc_object(Some(proto), ObjectKind::Plain);
    let value_key = PropertyKey::Atom(st.vm.wk.value);
    st.vm.define_own_property(
        obj,
        value_key,
        PropertyDescriptor::data(value, PropertyAttributes::ALL_PRESENT),
    );
    let done_key = PropertyKey::Atom(st.vm.wk.done);
    st.vm.define_own_property(
        obj,
        done_key,
        PropertyDescriptor::data(Value::bool(done), PropertyAttributes::ALL_PRESENT),
    );
    Value::object(obj)
}

/// Allocate an array iterator over `target`.
pub fn create_array_iterator(
    st: &mut ExecState<'_>,
    target: ObjectRef,
    kind: IterationKind,
) -> Value {
    let proto = st.realm.array_iterator_prototype;
    let obj = st.vm.alloc_object(
        Some(proto),
        ObjectKind::ArrayIterator(Box::new(ArrayIteratorData {
            target,
            kind,
            next_index: 0,
            done: false,
        })),
    );
    Value::object(obj)
}

pub fn create_string_iterator(st: &mut ExecState<'_>, string: StringRef) -> Value {
    let proto = st.realm.string_iterator_prototype;
    let obj = st
        .vm
        .alloc_object(Some(proto), ObjectKind::StringIterator { string, next: 0 });
    Value::object(obj)
}

fn iterator_identity(
    _st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    Ok(this)
}

fn array_iterator_next(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(obj) = this.as_object() else {
        return Err(st.throw_type_error("next called on a non-iterator"));
    };
    let (target, kind, index, done) = match &st.vm.heap.object(obj).kind {
        ObjectKind::ArrayIterator(data) => {
            (data.target, data.kind, data.next_index, data.done)
        }
        _ => return Err(st.throw_type_error("next called on a non-iterator")),
    };
    if done {
        return Ok(create_iter_result(st, Value::undefined(), true));
    }

    // Length is re-read through the receiver so callback mutations of
    // the array (and its prototype chain) are observed.
    let len_key = PropertyKey::Atom(st.vm.wk.length);
    let len_v = get_object_property(st, target, &len_key, Value::object(target))?;
    let len = to_length(st, len_v)?;
    if index as u64 >= len {
        if let ObjectKind::ArrayIterator(data) = &mut st.vm.heap.object_mut(obj).kind {
            data.done = true;
        }
        return Ok(create_iter_result(st, Value::undefined(), true));
    }
    if let ObjectKind::ArrayIterator(data) = &mut st.vm.heap.object_mut(obj).kind {
        data.next_index = index + 1;
    }

    let result = match kind {
        IterationKind::Key => Value::number(index as f64),
        IterationKind::Value => get_object_property(
            st,
            target,
            &PropertyKey::Index(index),
            Value::object(target),
        )?,
        IterationKind::KeyValue => {
            let value = get_object_property(
                st,
                target,
                &PropertyKey::Index(index),
                Value::object(target),
            )?;
            let proto = st.realm.array_prototype;
            let pair = st
                .vm
                .alloc_array_from(Some(proto), vec![Value::number(index as f64), value]);
            Value::object(pair)
        }
    };
    Ok(create_iter_result(st, result, false))
}

fn string_iterator_next(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(obj) = this.as_object() else {
        return Err(st.throw_type_error("next called on a non-iterator"));
    };
    let (string, index) = match st.vm.heap.object(obj).kind {
        ObjectKind::StringIterator { string, next } => (string, next),
        _ => return Err(st.throw_type_error("next called on a non-iterator")),
    };
    let len = st.vm.heap.string(string).len();
    if index >= len {
        return Ok(create_iter_result(st, Value::undefined(), true));
    }
    st.vm.heap.flatten(string);
    let first = st.vm.heap.string(string).code_unit(index);
    let mut units = vec![first];
    let mut advance = 1;
    if (0xD800..0xDC00).contains(&first) && index + 1 < len {
        let second = st.vm.heap.string(string).code_unit(index + 1);
        if (0xDC00..0xE000).contains(&second) {
            units.push(second);
            advance = 2;
        }
    }
    if let ObjectKind::StringIterator { next, .. } = &mut st.vm.heap.object_mut(obj).kind {
        *next = index + advance;
    }
    let s = st.vm.heap.alloc_string_from_units(units);
    Ok(create_iter_result(st, Value::string(s), false))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let iterator_sym = vm.wk_symbols.iterator;
    define_symbol_method(
        vm,
        realm,
        realm.iterator_prototype,
        iterator_sym,
        "[Symbol.iterator]",
        0,
        iterator_identity,
    );
    define_method(
        vm,
        realm,
        realm.array_iterator_prototype,
        "next",
        0,
        array_iterator_next,
    );
    define_method(
        vm,
        realm,
        realm.string_iterator_prototype,
        "next",
        0,
        string_iterator_next,
    );
}
