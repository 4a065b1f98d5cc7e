//! Function.prototype

use crate::builtins::define_method;
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::{get_value_property, to_length};
use crate::runtime::function::{Callable, FunctionData, FunctionKind};
use crate::runtime::object::ObjectKind;
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::{ObjectRef, Value};
use crate::vm::interpreter::call_value;

/// Function.prototype is itself callable and returns undefined.
pub fn prototype_itself(
    _st: &mut ExecState<'_>,
    _this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    Ok(Value::undefined())
}

fn function_call(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let bound_this = args.first().copied().unwrap_or(Value::undefined());
    let rest = if args.is_empty() { &[] } else { &args[1..] };
    call_value(st, this, bound_this, rest)
}

fn function_apply(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let bound_this = args.first().copied().unwrap_or(Value::undefined());
    let arg_list = match args.get(1) {
        None => Vec::new(),
        Some(v) if v.is_nullish() => Vec::new(),
        Some(v) => create_list_from_array_like(st, *v)?,
    };
    call_value(st, this, bound_this, &arg_list)
}

fn create_list_from_array_like(st: &mut ExecState<'_>, v: Value) -> Result<Vec<Value>, Value> {
    if !v.is_object() {
        return Err(st.throw_type_error("CreateListFromArrayLike called on non-object"));
    }
    let len_key = PropertyKey::Atom(st.vm.wk.length);
    let len_v = get_value_property(st, v, &len_key)?;
    let len = to_length(st, len_v)?;
    let mut out = Vec::with_capacity(len.min(4096) as usize);
    for i in 0..len {
        let element = get_value_property(st, v, &PropertyKey::Index(i as u32))?;
        out.push(element);
    }
    Ok(out)
}

fn function_bind(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(target) = this.as_object() else {
        return Err(st.throw_type_error("Bind must be called on a function"));
    };
    if !st.vm.heap.object(target).is_callable() {
        return Err(st.throw_type_error("Bind must be called on a function"));
    }
    let bound_this = args.first().copied().unwrap_or(Value::undefined());
    let bound_args = if args.is_empty() {
        Vec::new()
    } else {
        args[1..].to_vec()
    };
    let data = FunctionData {
        kind: FunctionKind::Normal,
        callable: Callable::Bound {
            target,
            bound_this,
            bound_args,
        },
    };
    let proto = st.realm.function_prototype;
    let bound = st
        .vm
        .alloc_object(Some(proto), ObjectKind::Function(Box::new(data)));

    let name_key = PropertyKey::Atom(st.vm.wk.name);
    let target_name = st
        .vm
        .get_own_property(target, &name_key)
        .and_then(|(slot, _)| slot.data())
        .and_then(|v| v.as_string())
        .map(|s| st.vm.heap.string_to_rust(s))
        .unwrap_or_default();
    let bound_name = st.vm.heap.alloc_str(&format!("bound {}", target_name));
    st.vm.define_own_property(
        bound,
        name_key,
        PropertyDescriptor::data(Value::string(bound_name), PropertyAttributes::CONFIGURABLE),
    );
    Ok(Value::object(bound))
}

fn function_to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(obj) = this.as_object() else {
        return Err(st.throw_type_error("Function.prototype.toString requires a function"));
    };
    if !st.vm.heap.object(obj).is_callable() {
        return Err(st.throw_type_error("Function.prototype.toString requires a function"));
    }
    let name_key = PropertyKey::Atom(st.vm.wk.name);
    let name = st
        .vm
        .get_own_property(obj, &name_key)
        .and_then(|(slot, _)| slot.data())
        .and_then(|v| v.as_string())
        .map(|s| st.vm.heap.string_to_rust(s))
        .unwrap_or_default();
    let text = format!("function {}() {{ [native code] }}", name);
    let s = st.vm.heap.alloc_str(&text);
    Ok(Value::string(s))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let proto = realm.function_prototype;
    define_method(vm, realm, proto, "call", 1, function_call);
    define_method(vm, realm, proto, "apply", 2, function_apply);
    define_method(vm, realm, proto, "bind", 1, function_bind);
    define_method(vm, realm, proto, "toString", 0, function_to_string);
}
