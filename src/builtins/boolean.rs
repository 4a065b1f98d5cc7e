//! Boolean wrapper

use crate::builtins::{define_method, link_constructor, native_function};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::object::ObjectKind;
use crate::value::{ObjectRef, Value};

fn constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let b = st
        .vm
        .to_boolean(args.first().copied().unwrap_or(Value::undefined()));
    // `new Boolean(x)` yields a wrapper; a plain call yields the
    // primitive. The construct path keeps an object result.
    if this.is_object() {
        let proto = st.realm.boolean_prototype;
        let obj = st
            .vm
            .alloc_object(Some(proto), ObjectKind::BooleanWrapper(b));
        return Ok(Value::object(obj));
    }
    Ok(Value::bool(b))
}

/// thisBooleanValue: primitive or wrapper.
fn this_boolean(st: &mut ExecState<'_>, this: Value) -> Result<bool, Value> {
    if let Some(b) = this.as_bool() {
        return Ok(b);
    }
    if let Some(obj) = this.as_object() {
        if let ObjectKind::BooleanWrapper(b) = st.vm.heap.object(obj).kind {
            return Ok(b);
        }
    }
    Err(st.throw_type_error("receiver is not a Boolean"))
}

fn to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let b = this_boolean(st, this)?;
    let s = st.vm.heap.alloc_str(if b { "true" } else { "false" });
    Ok(Value::string(s))
}

fn value_of(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    Ok(Value::bool(this_boolean(st, this)?))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = native_function(vm, realm.function_prototype, constructor, "Boolean", 1);
    link_constructor(vm, realm, ctor, realm.boolean_prototype, "Boolean");
    define_method(vm, realm, realm.boolean_prototype, "toString", 0, to_string);
    define_method(vm, realm, realm.boolean_prototype, "valueOf", 0, value_of);
}
