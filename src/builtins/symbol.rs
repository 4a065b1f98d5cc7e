//! Symbol

use crate::builtins::{define_method, define_value, link_constructor, native_function};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::to_string_rust;
use crate::runtime::object::ObjectKind;
use crate::runtime::property::PropertyAttributes;
use crate::value::{ObjectRef, Value};

fn constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    // Symbol is callable but not constructible; the construct path
    // arrives with a freshly allocated `this`.
    if this.is_object() {
        return Err(st.throw_type_error("Symbol is not a constructor"));
    }
    let description = match args.first() {
        Some(d) if !d.is_undefined() => Some(to_string_rust(st, *d)?),
        _ => None,
    };
    let sym = st.vm.symbols.create(description);
    Ok(Value::symbol(sym))
}

fn this_symbol(st: &mut ExecState<'_>, this: Value) -> Result<crate::value::SymbolRef, Value> {
    if let Some(s) = this.as_symbol() {
        return Ok(s);
    }
    if let Some(obj) = this.as_object() {
        if let ObjectKind::SymbolWrapper(s) = st.vm.heap.object(obj).kind {
            return Ok(s);
        }
    }
    Err(st.throw_type_error("receiver is not a Symbol"))
}

fn to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let sym = this_symbol(st, this)?;
    let text = format!("Symbol({})", st.vm.symbols.description(sym).unwrap_or(""));
    let s = st.vm.heap.alloc_str(&text);
    Ok(Value::string(s))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = native_function(vm, realm.function_prototype, constructor, "Symbol", 0);
    link_constructor(vm, realm, ctor, realm.symbol_prototype, "Symbol");
    define_method(vm, realm, realm.symbol_prototype, "toString", 0, to_string);

    let attrs = PropertyAttributes::empty();
    let wks = [
        ("iterator", vm.wk_symbols.iterator),
        ("toPrimitive", vm.wk_symbols.to_primitive),
        ("species", vm.wk_symbols.species),
        ("isConcatSpreadable", vm.wk_symbols.is_concat_spreadable),
        ("toStringTag", vm.wk_symbols.to_string_tag),
        ("split", vm.wk_symbols.split),
    ];
    for (name, sym) in wks {
        define_value(vm, ctor, name, Value::symbol(sym), attrs);
    }
}
