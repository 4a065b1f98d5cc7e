//! Error constructors and prototypes
//!
//! Errors are first-class values carrying a prototype, a message and
//! the stack captured at construction time.

use crate::builtins::{define_method, define_value, link_constructor, ERROR_KINDS};
use crate::context::{ExecState, Realm, StackEntry, VmInstance};
use crate::runtime::conversion::to_string_rust;
use crate::runtime::function::FunctionData;
use crate::runtime::object::{ErrorKind, ObjectKind};
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey};
use crate::value::{ObjectRef, Value};

/// Construct an error object of `kind` with a captured stack.
pub fn create_error(
    st: &mut ExecState<'_>,
    kind: ErrorKind,
    message: &str,
    stack: Vec<StackEntry>,
) -> Value {
    let proto = st.realm.error_prototype(kind);
    let obj = st
        .vm
        .alloc_object(Some(proto), ObjectKind::Error { kind, stack });
    set_error_properties(st.vm, obj, message);
    Value::object(obj)
}

fn set_error_properties(vm: &mut VmInstance, obj: ObjectRef, message: &str) {
    let msg_ref = vm.heap.alloc_str(message);
    let msg_key = PropertyKey::Atom(vm.wk.message);
    vm.define_own_property(
        obj,
        msg_key,
        PropertyDescriptor::data(Value::string(msg_ref), PropertyAttributes::BUILTIN),
    );
    let stack_text = {
        let stack = match &vm.heap.object(obj).kind {
            ObjectKind::Error { stack, .. } => stack.clone(),
            _ => Vec::new(),
        };
        let mut out = String::new();
        for entry in &stack {
            out.push_str(&format!("    at {}:{}:{}\n", entry.src, entry.line, entry.column));
        }
        out
    };
    let stack_ref = vm.heap.alloc_str(stack_text.trim_end());
    let stack_key = PropertyKey::Atom(vm.wk.stack);
    vm.define_own_property(
        obj,
        stack_key,
        PropertyDescriptor::data(Value::string(stack_ref), PropertyAttributes::BUILTIN),
    );
}

/// The structured stack of a thrown error object, if it is one.
pub fn stack_of(st: &mut ExecState<'_>, v: Value) -> Option<Vec<StackEntry>> {
    let obj = v.as_object()?;
    match &st.vm.heap.object(obj).kind {
        ObjectKind::Error { stack, .. } => Some(stack.clone()),
        _ => None,
    }
}

fn error_constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    func: ObjectRef,
) -> Result<Value, Value> {
    let _ = this;
    let kind_idx = st
        .vm
        .heap
        .object(func)
        .function_data()
        .and_then(|d| match &d.callable {
            crate::runtime::function::Callable::Native { payload, .. } => {
                payload.first().and_then(|v| v.as_int32())
            }
            _ => None,
        })
        .unwrap_or(0) as usize;
    let kind = ERROR_KINDS[kind_idx.min(ERROR_KINDS.len() - 1)];
    let message = match args.first() {
        Some(m) if !m.is_undefined() => to_string_rust(st, *m)?,
        _ => String::new(),
    };
    let stack = st.capture_stack();
    Ok(create_error(st, kind, &message, stack))
}

fn error_to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(obj) = this.as_object() else {
        return Err(st.throw_type_error("Error.prototype.toString called on non-object"));
    };
    let name_key = st.vm.key_from_str("name");
    let name = crate::runtime::conversion::get_object_property(st, obj, &name_key, this)?;
    let name = if name.is_undefined() {
        "Error".to_string()
    } else {
        to_string_rust(st, name)?
    };
    let msg_key = PropertyKey::Atom(st.vm.wk.message);
    let message = crate::runtime::conversion::get_object_property(st, obj, &msg_key, this)?;
    let message = if message.is_undefined() {
        String::new()
    } else {
        to_string_rust(st, message)?
    };
    let text = if message.is_empty() {
        name
    } else if name.is_empty() {
        message
    } else {
        format!("{}: {}", name, message)
    };
    let s = st.vm.heap.alloc_str(&text);
    Ok(Value::string(s))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    for (idx, kind) in ERROR_KINDS.iter().enumerate() {
        let proto = realm.error_prototypes[idx];
        let data = FunctionData::native_with_payload(
            error_constructor,
            vec![Value::int32(idx as i32)],
        );
        let ctor = vm.alloc_object(
            Some(realm.function_prototype),
            ObjectKind::Function(Box::new(data)),
        );
        let name_ref = vm.heap.alloc_str(kind.name());
        let name_key = PropertyKey::Atom(vm.wk.name);
        vm.define_own_property(
            ctor,
            name_key,
            PropertyDescriptor::data(Value::string(name_ref), PropertyAttributes::CONFIGURABLE),
        );
        link_constructor(vm, realm, ctor, proto, kind.name());

        let proto_name = vm.heap.alloc_str(kind.name());
        define_value(
            vm,
            proto,
            "name",
            Value::string(proto_name),
            PropertyAttributes::BUILTIN,
        );
        let empty = vm.heap.alloc_str("");
        define_value(
            vm,
            proto,
            "message",
            Value::string(empty),
            PropertyAttributes::BUILTIN,
        );
    }
    define_method(vm, realm, realm.error_prototypes[0], "toString", 0, error_to_string);
}
