//! Math

use crate::builtins::{define_method, define_value};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::to_number;
use crate::runtime::object::ObjectKind;
use crate::runtime::property::PropertyAttributes;
use crate::value::{ObjectRef, Value};

fn unary(
    st: &mut ExecState<'_>,
    args: &[Value],
    f: impl Fn(f64) -> f64,
) -> Result<Value, Value> {
    let n = to_number(st, args.first().copied().unwrap_or(Value::undefined()))?;
    Ok(Value::number(f(n)))
}

fn math_floor(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    unary(st, args, f64::floor)
}

fn math_ceil(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    unary(st, args, f64::ceil)
}

fn math_round(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    // JS rounds .5 toward +Infinity.
    unary(st, args, |n| (n + 0.5).floor())
}

fn math_trunc(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    unary(st, args, f64::trunc)
}

fn math_abs(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    unary(st, args, f64::abs)
}

fn math_sqrt(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    unary(st, args, f64::sqrt)
}

fn math_pow(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    let x = to_number(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let y = to_number(st, args.get(1).copied().unwrap_or(Value::undefined()))?;
    Ok(Value::number(x.powf(y)))
}

fn math_min(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    let mut best = f64::INFINITY;
    for &a in args {
        let n = to_number(st, a)?;
        if n.is_nan() {
            return Ok(Value::double(f64::NAN));
        }
        if n < best || (n == 0.0 && best == 0.0 && n.is_sign_negative()) {
            best = n;
        }
    }
    Ok(Value::number(best))
}

fn math_max(st: &mut ExecState<'_>, _t: Value, args: &[Value], _f: ObjectRef) -> Result<Value, Value> {
    let mut best = f64::NEG_INFINITY;
    for &a in args {
        let n = to_number(st, a)?;
        if n.is_nan() {
            return Ok(Value::double(f64::NAN));
        }
        if n > best || (n == 0.0 && best == 0.0 && best.is_sign_negative()) {
            best = n;
        }
    }
    Ok(Value::number(best))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let math = vm.alloc_object(Some(realm.object_prototype), ObjectKind::Plain);
    define_method(vm, realm, math, "floor", 1, math_floor);
    define_method(vm, realm, math, "ceil", 1, math_ceil);
    define_method(vm, realm, math, "round", 1, math_round);
    define_method(vm, realm, math, "trunc", 1, math_trunc);
    define_method(vm, realm, math, "abs", 1, math_abs);
    define_method(vm, realm, math, "sqrt", 1, math_sqrt);
    define_method(vm, realm, math, "pow", 2, math_pow);
    define_method(vm, realm, math, "min", 2, math_min);
    define_method(vm, realm, math, "max", 2, math_max);
    define_value(
        vm,
        math,
        "PI",
        Value::double(std::f64::consts::PI),
        PropertyAttributes::empty(),
    );
    define_value(
        vm,
        math,
        "E",
        Value::double(std::f64::consts::E),
        PropertyAttributes::empty(),
    );
    define_value(
        vm,
        realm.global,
        "Math",
        Value::object(math),
        PropertyAttributes::BUILTIN,
    );
}
