//! Global object properties and the shell surface
//!
//! The language globals (`parseInt`, `isNaN`, `eval`, constants) are
//! installed for every realm; `install_shell_globals` adds the
//! reference host's `print`/`read`/`load`/`run`/`gc` on top.

use std::rc::Rc;

use crate::builtins::{define_method, define_value, native_function};
use crate::context::{Context, ExecState, Realm, VmInstance};
use crate::runtime::conversion::{to_number, to_string_rust, value_to_display};
use crate::runtime::object::ErrorKind;
use crate::runtime::property::PropertyAttributes;
use crate::value::{ObjectRef, Value};

/// Indirect eval: evaluates in the global scope.
pub fn eval(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(first) = args.first().copied() else {
        return Ok(Value::undefined());
    };
    let Some(src) = first.as_string() else {
        return Ok(first);
    };
    let source = st.vm.heap.string_to_rust(src);
    eval_source(st, &source, "<eval>")
}

fn eval_source(st: &mut ExecState<'_>, source: &str, name: &str) -> Result<Value, Value> {
    let program = crate::parser::parser::Parser::new(source, false)
        .parse_program()
        .map_err(|e| st.make_error(ErrorKind::SyntaxError, &e.message))?;
    let block = crate::bytecode::emitter::compile(
        st.vm,
        &program,
        name.into(),
        Rc::from(source),
        crate::bytecode::emitter::CompileGoal::Script,
    )
    .map_err(|e| st.make_error(ErrorKind::SyntaxError, &e.message))?;
    crate::vm::interpreter::run_program(st, block)
}

fn global_is_nan(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let n = to_number(st, args.first().copied().unwrap_or(Value::undefined()))?;
    Ok(Value::bool(n.is_nan()))
}

fn global_is_finite(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let n = to_number(st, args.first().copied().unwrap_or(Value::undefined()))?;
    Ok(Value::bool(n.is_finite()))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let global = realm.global;
    define_value(
        vm,
        global,
        "globalThis",
        Value::object(global),
        PropertyAttributes::BUILTIN,
    );
    define_value(
        vm,
        global,
        "undefined",
        Value::undefined(),
        PropertyAttributes::empty(),
    );
    define_value(
        vm,
        global,
        "NaN",
        Value::double(f64::NAN),
        PropertyAttributes::empty(),
    );
    define_value(
        vm,
        global,
        "Infinity",
        Value::double(f64::INFINITY),
        PropertyAttributes::empty(),
    );
    define_value(
        vm,
        global,
        "eval",
        Value::object(realm.eval_function),
        PropertyAttributes::BUILTIN,
    );
    define_method(vm, realm, global, "parseInt", 2, crate::builtins::number::parse_int);
    define_method(
        vm,
        realm,
        global,
        "parseFloat",
        1,
        crate::builtins::number::parse_float,
    );
    define_method(vm, realm, global, "isNaN", 1, global_is_nan);
    define_method(vm, realm, global, "isFinite", 1, global_is_finite);
}

// Shell surface

fn shell_print(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let mut parts = Vec::with_capacity(args.len());
    for &arg in args {
        parts.push(value_to_display(st, arg));
    }
    println!("{}", parts.join(" "));
    Ok(Value::undefined())
}

fn shell_read(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let path = to_string_rust(st, args.first().copied().unwrap_or(Value::undefined()))?;
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let s = st.vm.heap.alloc_str(&text);
            Ok(Value::string(s))
        }
        Err(e) => Err(st.make_error(
            ErrorKind::Error,
            &format!("cannot read file '{}': {}", path, e),
        )),
    }
}

fn shell_load(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let path = to_string_rust(st, args.first().copied().unwrap_or(Value::undefined()))?;
    let source = std::fs::read_to_string(&path).map_err(|e| {
        st.make_error(
            ErrorKind::Error,
            &format!("cannot read file '{}': {}", path, e),
        )
    })?;
    eval_source(st, &source, &path)
}

fn shell_run(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    func: ObjectRef,
) -> Result<Value, Value> {
    let started = std::time::Instant::now();
    shell_load(st, this, args, func)?;
    Ok(Value::number(started.elapsed().as_secs_f64() * 1000.0))
}

fn shell_gc(
    st: &mut ExecState<'_>,
    _this: Value,
    _args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    st.collect_garbage();
    Ok(Value::undefined())
}

/// Install the reference shell's globals on a context.
pub fn install_shell_globals(ctx: &mut Context) {
    let vm = ctx.vm.clone();
    let vm = &mut *vm.borrow_mut();
    let realm = &ctx.realm;
    let functions: [(&str, u8, crate::runtime::function::NativeFn); 5] = [
        ("print", 1, shell_print),
        ("read", 1, shell_read),
        ("load", 1, shell_load),
        ("run", 1, shell_run),
        ("gc", 0, shell_gc),
    ];
    for (name, length, f) in functions {
        let func = native_function(vm, realm.function_prototype, f, name, length);
        define_value(
            vm,
            realm.global,
            name,
            Value::object(func),
            PropertyAttributes::BUILTIN,
        );
    }
}
