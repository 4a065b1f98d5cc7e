//! Object constructor and prototype

use crate::builtins::{define_method, link_constructor};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::{
    get_object_property, to_object, to_property_key, to_string_rust,
};
use crate::runtime::object::ObjectKind;
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey, PropertySlot};
use crate::value::{ObjectRef, Value};

pub fn constructor(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    match args.first() {
        None => {
            let proto = st.realm.object_prototype;
            Ok(Value::object(st.vm.alloc_object(Some(proto), ObjectKind::Plain)))
        }
        Some(v) if v.is_nullish() => {
            let proto = st.realm.object_prototype;
            Ok(Value::object(st.vm.alloc_object(Some(proto), ObjectKind::Plain)))
        }
        Some(v) => Ok(Value::object(to_object(st, *v)?)),
    }
}

fn object_keys(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let mut out = Vec::new();
    for key in st.vm.own_keys(obj) {
        if matches!(key, PropertyKey::Symbol(_)) {
            continue;
        }
        if let Some((_, attrs)) = st.vm.get_own_property(obj, &key) {
            if attrs.is_enumerable() {
                let text = st.vm.key_to_string(&key);
                let s = st.vm.heap.alloc_str(&text);
                out.push(Value::string(s));
            }
        }
    }
    let proto = st.realm.array_prototype;
    Ok(Value::object(st.vm.alloc_array_from(Some(proto), out)))
}

fn object_values(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let mut out = Vec::new();
    for key in st.vm.own_keys(obj) {
        if matches!(key, PropertyKey::Symbol(_)) {
            continue;
        }
        if let Some((_, attrs)) = st.vm.get_own_property(obj, &key) {
            if attrs.is_enumerable() {
                let v = get_object_property(st, obj, &key, Value::object(obj))?;
                out.push(v);
            }
        }
    }
    let proto = st.realm.array_prototype;
    Ok(Value::object(st.vm.alloc_array_from(Some(proto), out)))
}

fn get_own_property_names(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let mut out = Vec::new();
    for key in st.vm.own_keys(obj) {
        if matches!(key, PropertyKey::Symbol(_)) {
            continue;
        }
        let text = st.vm.key_to_string(&key);
        let s = st.vm.heap.alloc_str(&text);
        out.push(Value::string(s));
    }
    let proto = st.realm.array_prototype;
    Ok(Value::object(st.vm.alloc_array_from(Some(proto), out)))
}

/// Read a descriptor object into the engine representation.
fn to_property_descriptor(
    st: &mut ExecState<'_>,
    v: Value,
) -> Result<PropertyDescriptor, Value> {
    let Some(obj) = v.as_object() else {
        return Err(st.throw_type_error("Property description must be an object"));
    };
    let mut desc = PropertyDescriptor::default();
    let fields = ["value", "get", "set", "writable", "enumerable", "configurable"];
    for field in fields {
        let key = st.vm.key_from_str(field);
        if !st.vm.has_own_property(obj, &key) {
            continue;
        }
        let field_v = get_object_property(st, obj, &key, v)?;
        match field {
            "value" => desc.value = Some(field_v),
            "writable" => desc.writable = Some(st.vm.to_boolean(field_v)),
            "enumerable" => desc.enumerable = Some(st.vm.to_boolean(field_v)),
            "configurable" => desc.configurable = Some(st.vm.to_boolean(field_v)),
            "get" => {
                if field_v.is_undefined() {
                    desc.get = Some(None);
                } else {
                    match field_v.as_object() {
                        Some(f) if st.vm.heap.object(f).is_callable() => {
                            desc.get = Some(Some(f))
                        }
                        _ => return Err(st.throw_type_error("Getter must be a function")),
                    }
                }
            }
            "set" => {
                if field_v.is_undefined() {
                    desc.set = Some(None);
                } else {
                    match field_v.as_object() {
                        Some(f) if st.vm.heap.object(f).is_callable() => {
                            desc.set = Some(Some(f))
                        }
                        _ => return Err(st.throw_type_error("Setter must be a function")),
                    }
                }
            }
            _ => unreachable!(),
        }
    }
    if desc.is_accessor_descriptor() && desc.is_data_descriptor() {
        return Err(st.throw_type_error(
            "Invalid property descriptor. Cannot both specify accessors and a value or writable attribute",
        ));
    }
    Ok(desc)
}

fn define_property(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(obj) = args.first().copied().unwrap_or(Value::undefined()).as_object() else {
        return Err(st.throw_type_error("Object.defineProperty called on non-object"));
    };
    let key = to_property_key(st, args.get(1).copied().unwrap_or(Value::undefined()))?;
    let desc = to_property_descriptor(st, args.get(2).copied().unwrap_or(Value::undefined()))?;
    if !st.vm.define_own_property(obj, key, desc) {
        let text = st.vm.key_to_string(&key);
        return Err(st.throw_type_error(&format!("Cannot redefine property: {}", text)));
    }
    Ok(Value::object(obj))
}

fn get_own_property_descriptor(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let key = to_property_key(st, args.get(1).copied().unwrap_or(Value::undefined()))?;
    let Some((slot, attrs)) = st.vm.get_own_property(obj, &key) else {
        return Ok(Value::undefined());
    };
    let proto = st.realm.object_prototype;
    let out = st.vm.alloc_object(Some(proto), ObjectKind::Plain);
    let all = PropertyAttributes::ALL_PRESENT;
    match slot {
        PropertySlot::Data(v) => {
            let value_key = PropertyKey::Atom(st.vm.wk.value);
            st.vm
                .define_own_property(out, value_key, PropertyDescriptor::data(v, all));
            let writable_key = PropertyKey::Atom(st.vm.wk.writable);
            st.vm.define_own_property(
                out,
                writable_key,
                PropertyDescriptor::data(Value::bool(attrs.is_writable()), all),
            );
        }
        PropertySlot::Accessor { get, set } => {
            let get_v = get.map(Value::object).unwrap_or(Value::undefined());
            let set_v = set.map(Value::object).unwrap_or(Value::undefined());
            let get_key = PropertyKey::Atom(st.vm.wk.get);
            st.vm
                .define_own_property(out, get_key, PropertyDescriptor::data(get_v, all));
            let set_key = PropertyKey::Atom(st.vm.wk.set);
            st.vm
                .define_own_property(out, set_key, PropertyDescriptor::data(set_v, all));
        }
    }
    let enum_key = PropertyKey::Atom(st.vm.wk.enumerable);
    st.vm.define_own_property(
        out,
        enum_key,
        PropertyDescriptor::data(Value::bool(attrs.is_enumerable()), all),
    );
    let conf_key = PropertyKey::Atom(st.vm.wk.configurable);
    st.vm.define_own_property(
        out,
        conf_key,
        PropertyDescriptor::data(Value::bool(attrs.is_configurable()), all),
    );
    Ok(Value::object(out))
}

fn get_prototype_of(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let obj = to_object(st, args.first().copied().unwrap_or(Value::undefined()))?;
    Ok(match st.vm.get_prototype(obj) {
        Some(p) => Value::object(p),
        None => Value::null(),
    })
}

fn set_prototype_of(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let target = args.first().copied().unwrap_or(Value::undefined());
    let Some(obj) = target.as_object() else {
        return Err(st.throw_type_error("Object.setPrototypeOf called on non-object"));
    };
    let proto_v = args.get(1).copied().unwrap_or(Value::undefined());
    let proto = if proto_v.is_null() {
        None
    } else {
        match proto_v.as_object() {
            Some(p) => Some(p),
            None => return Err(st.throw_type_error("Object prototype may only be an Object or null")),
        }
    };
    if !st.vm.set_prototype(obj, proto) {
        return Err(st.throw_type_error("Cannot set prototype of this object"));
    }
    Ok(target)
}

fn object_create(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let proto_v = args.first().copied().unwrap_or(Value::undefined());
    let proto = if proto_v.is_null() {
        None
    } else {
        match proto_v.as_object() {
            Some(p) => Some(p),
            None => return Err(st.throw_type_error("Object prototype may only be an Object or null")),
        }
    };
    Ok(Value::object(st.vm.alloc_object(proto, ObjectKind::Plain)))
}

fn object_assign(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let target = to_object(st, args.first().copied().unwrap_or(Value::undefined()))?;
    for source in args.iter().skip(1) {
        if source.is_nullish() {
            continue;
        }
        let from = to_object(st, *source)?;
        for key in st.vm.own_keys(from) {
            if let Some((_, attrs)) = st.vm.get_own_property(from, &key) {
                if attrs.is_enumerable() {
                    let v = get_object_property(st, from, &key, *source)?;
                    crate::runtime::conversion::set_object_property(st, target, &key, v, true)?;
                }
            }
        }
    }
    Ok(Value::object(target))
}

fn object_freeze(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let arg = args.first().copied().unwrap_or(Value::undefined());
    let Some(obj) = arg.as_object() else {
        return Ok(arg);
    };
    st.vm.heap.object_mut(obj).extensible = false;
    if st.vm.array_is_fast(obj) {
        st.vm.demote_array_storage(obj);
    }
    for key in st.vm.own_keys(obj) {
        let mut desc = PropertyDescriptor::default();
        desc.configurable = Some(false);
        if let Some((PropertySlot::Data(_), _)) = st.vm.get_own_property(obj, &key) {
            desc.writable = Some(false);
        }
        st.vm.define_own_property(obj, key, desc);
    }
    Ok(arg)
}

fn has_own_property(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let key = to_property_key(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let obj = to_object(st, this)?;
    Ok(Value::bool(st.vm.has_own_property(obj, &key)))
}

fn object_to_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let tag = if this.is_undefined() {
        "Undefined"
    } else if this.is_null() {
        "Null"
    } else {
        let obj = to_object(st, this)?;
        match &st.vm.heap.object(obj).kind {
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error { .. } => "Error",
            ObjectKind::NumberWrapper(_) => "Number",
            ObjectKind::StringWrapper(_) => "String",
            ObjectKind::BooleanWrapper(_) => "Boolean",
            _ => "Object",
        }
    };
    let s = st.vm.heap.alloc_str(&format!("[object {}]", tag));
    Ok(Value::string(s))
}

fn object_value_of(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    Ok(Value::object(to_object(st, this)?))
}

fn is_prototype_of(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(mut cursor) = args.first().and_then(|v| v.as_object()) else {
        return Ok(Value::bool(false));
    };
    let this_obj = to_object(st, this)?;
    while let Some(p) = st.vm.heap.object(cursor).prototype {
        if p == this_obj {
            return Ok(Value::bool(true));
        }
        cursor = p;
    }
    Ok(Value::bool(false))
}

fn property_is_enumerable(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let key = to_property_key(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let obj = to_object(st, this)?;
    let result = st
        .vm
        .get_own_property(obj, &key)
        .is_some_and(|(_, attrs)| attrs.is_enumerable());
    Ok(Value::bool(result))
}

fn to_locale_string(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let text = to_string_rust(st, this)?;
    let s = st.vm.heap.alloc_str(&text);
    Ok(Value::string(s))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = realm.object_constructor;
    link_constructor(vm, realm, ctor, realm.object_prototype, "Object");
    define_method(vm, realm, ctor, "keys", 1, object_keys);
    define_method(vm, realm, ctor, "values", 1, object_values);
    define_method(vm, realm, ctor, "getOwnPropertyNames", 1, get_own_property_names);
    define_method(vm, realm, ctor, "defineProperty", 3, define_property);
    define_method(
        vm,
        realm,
        ctor,
        "getOwnPropertyDescriptor",
        2,
        get_own_property_descriptor,
    );
    define_method(vm, realm, ctor, "getPrototypeOf", 1, get_prototype_of);
    define_method(vm, realm, ctor, "setPrototypeOf", 2, set_prototype_of);
    define_method(vm, realm, ctor, "create", 2, object_create);
    define_method(vm, realm, ctor, "assign", 2, object_assign);
    define_method(vm, realm, ctor, "freeze", 1, object_freeze);

    let proto = realm.object_prototype;
    define_method(vm, realm, proto, "hasOwnProperty", 1, has_own_property);
    define_method(vm, realm, proto, "toString", 0, object_to_string);
    define_method(vm, realm, proto, "toLocaleString", 0, to_locale_string);
    define_method(vm, realm, proto, "valueOf", 0, object_value_of);
    define_method(vm, realm, proto, "isPrototypeOf", 1, is_prototype_of);
    define_method(
        vm,
        realm,
        proto,
        "propertyIsEnumerable",
        1,
        property_is_enumerable,
    );
}
