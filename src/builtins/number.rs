//! Number wrapper and numeric globals

use crate::builtins::{define_method, define_value, link_constructor, native_function};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::{to_integer, to_number, to_string_rust};
use crate::runtime::object::ObjectKind;
use crate::runtime::property::PropertyAttributes;
use crate::util::{number_to_string, number_to_string_radix, parse_float_str, parse_int_str};
use crate::value::{ObjectRef, Value, MAX_SAFE_INTEGER};

pub fn constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let n = match args.first() {
        Some(v) => to_number(st, *v)?,
        None => 0.0,
    };
    if this.is_object() {
        let proto = st.realm.number_prototype;
        let obj = st.vm.alloc_object(Some(proto), ObjectKind::NumberWrapper(n));
        return Ok(Value::object(obj));
    }
    Ok(Value::number(n))
}

fn this_number(st: &mut ExecState<'_>, this: Value) -> Result<f64, Value> {
    if let Some(n) = this.as_number() {
        return Ok(n);
    }
    if let Some(obj) = this.as_object() {
        if let ObjectKind::NumberWrapper(n) = st.vm.heap.object(obj).kind {
            return Ok(n);
        }
    }
    Err(st.throw_type_error("receiver is not a Number"))
}

fn to_string(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let n = this_number(st, this)?;
    let radix = match args.first() {
        None => 10,
        Some(v) if v.is_undefined() => 10,
        Some(v) => {
            let r = to_integer(st, *v)?;
            if !(2.0..=36.0).contains(&r) {
                return Err(st.throw_range_error("toString() radix must be between 2 and 36"));
            }
            r as u32
        }
    };
    let text = if radix == 10 {
        number_to_string(n)
    } else {
        number_to_string_radix(n, radix)
    };
    let s = st.vm.heap.alloc_str(&text);
    Ok(Value::string(s))
}

fn value_of(
    st: &mut ExecState<'_>,
    this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    Ok(Value::number(this_number(st, this)?))
}

fn to_fixed(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let n = this_number(st, this)?;
    let digits = match args.first() {
        None => 0.0,
        Some(v) => to_integer(st, *v)?,
    };
    if !(0.0..=100.0).contains(&digits) {
        return Err(st.throw_range_error("toFixed() digits argument must be between 0 and 100"));
    }
    let text = if n.is_nan() {
        "NaN".to_string()
    } else if n.abs() >= 1e21 {
        number_to_string(n)
    } else {
        format!("{:.*}", digits as usize, n)
    };
    let s = st.vm.heap.alloc_str(&text);
    Ok(Value::string(s))
}

fn is_nan(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let _ = st;
    let v = args.first().copied().unwrap_or(Value::undefined());
    Ok(Value::bool(v.as_number().is_some_and(f64::is_nan)))
}

fn is_finite(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let _ = st;
    let v = args.first().copied().unwrap_or(Value::undefined());
    Ok(Value::bool(v.as_number().is_some_and(f64::is_finite)))
}

fn is_integer(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let _ = st;
    let v = args.first().copied().unwrap_or(Value::undefined());
    Ok(Value::bool(
        v.as_number().is_some_and(|n| n.is_finite() && n.trunc() == n),
    ))
}

fn is_safe_integer(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let _ = st;
    let v = args.first().copied().unwrap_or(Value::undefined());
    Ok(Value::bool(v.as_number().is_some_and(|n| {
        n.is_finite() && n.trunc() == n && n.abs() <= MAX_SAFE_INTEGER
    })))
}

pub fn parse_int(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let text = to_string_rust(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let radix = match args.get(1) {
        None => 0,
        Some(v) if v.is_undefined() => 0,
        Some(v) => to_integer(st, *v)? as i32,
    };
    Ok(Value::number(parse_int_str(&text, radix)))
}

pub fn parse_float(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let text = to_string_rust(st, args.first().copied().unwrap_or(Value::undefined()))?;
    Ok(Value::number(parse_float_str(&text)))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = native_function(vm, realm.function_prototype, constructor, "Number", 1);
    link_constructor(vm, realm, ctor, realm.number_prototype, "Number");

    let proto = realm.number_prototype;
    define_method(vm, realm, proto, "toString", 1, to_string);
    define_method(vm, realm, proto, "toLocaleString", 0, to_string);
    define_method(vm, realm, proto, "valueOf", 0, value_of);
    define_method(vm, realm, proto, "toFixed", 1, to_fixed);

    define_method(vm, realm, ctor, "isNaN", 1, is_nan);
    define_method(vm, realm, ctor, "isFinite", 1, is_finite);
    define_method(vm, realm, ctor, "isInteger", 1, is_integer);
    define_method(vm, realm, ctor, "isSafeInteger", 1, is_safe_integer);
    define_method(vm, realm, ctor, "parseInt", 2, parse_int);
    define_method(vm, realm, ctor, "parseFloat", 1, parse_float);

    let none = PropertyAttributes::empty();
    define_value(vm, ctor, "MAX_SAFE_INTEGER", Value::double(MAX_SAFE_INTEGER), none);
    define_value(vm, ctor, "MIN_SAFE_INTEGER", Value::double(-MAX_SAFE_INTEGER), none);
    define_value(vm, ctor, "MAX_VALUE", Value::double(f64::MAX), none);
    define_value(vm, ctor, "MIN_VALUE", Value::double(f64::MIN_POSITIVE), none);
    define_value(vm, ctor, "EPSILON", Value::double(f64::EPSILON), none);
    define_value(vm, ctor, "NaN", Value::double(f64::NAN), none);
    define_value(vm, ctor, "POSITIVE_INFINITY", Value::double(f64::INFINITY), none);
    define_value(vm, ctor, "NEGATIVE_INFINITY", Value::double(f64::NEG_INFINITY), none);
}
