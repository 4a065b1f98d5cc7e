//! Bytecode interpreter
//!
//! Dispatches opcodes over a register file per frame plus a chain of
//! heap environment records. Frames are engine-owned data: script-level
//! throws travel as `Err(Value)` results, never as host unwinding, and
//! unwind frames until a handler installed by `TryStart` is found.
//!
//! The interpreter trusts the emitter's register allocation and does
//! not re-check liveness.

use std::rc::Rc;

use crate::bytecode::codeblock::{CodeBlock, CodeBlockFlags, ParamBinding};
use crate::bytecode::opcode::{Opcode, REGULAR_REGISTER_LIMIT, REG_NONE};
use crate::context::{ExecState, ModuleRecord, ModuleState, MAX_CALL_DEPTH};
use crate::parser::parser::Parser;
use crate::atom::Atom;
use crate::runtime::conversion::{
    self, abstract_relational, add_values, get_method, get_object_property, get_value_property,
    instance_of, loose_equals, set_object_property, set_value_property, to_number, to_object,
    to_property_key,
};
use crate::runtime::environment::{Binding, EnvRecord};
use crate::runtime::function::{Callable, FunctionData, FunctionKind};
use crate::runtime::object::{EnumerateData, ErrorKind, ObjectKind};
use crate::runtime::property::{PropertyAttributes, PropertyDescriptor, PropertyKey, PropertySlot};
use crate::value::{to_int32_f64, to_uint32_f64, EnvRef, ObjectRef, Value};

/// Exception handler installed by `TryStart`.
#[derive(Debug, Clone, Copy)]
pub struct Handler {
    /// Instruction index of the catch code.
    pub pc: usize,
    /// Register receiving the thrown value.
    pub dst: u16,
    /// Environment chain to restore.
    pub env: Option<EnvRef>,
}

/// One activation: register file, environment chain head, and the
/// handler stack.
pub struct Frame {
    pub block: Rc<CodeBlock>,
    pub temps: Vec<Value>,
    pub locals: Vec<Value>,
    pub pc: usize,
    pub this: Value,
    pub env: Option<EnvRef>,
    pub function: Option<ObjectRef>,
    pub args: Vec<Value>,
    pub arguments_object: Option<ObjectRef>,
    pub handlers: Vec<Handler>,
}

impl Frame {
    #[inline]
    pub fn reg(&self, i: u16) -> Value {
        if i < REGULAR_REGISTER_LIMIT {
            self.temps[i as usize]
        } else {
            self.locals[(i - REGULAR_REGISTER_LIMIT) as usize]
        }
    }

    #[inline]
    pub fn set_reg(&mut self, i: u16, v: Value) {
        if i < REGULAR_REGISTER_LIMIT {
            self.temps[i as usize] = v;
        } else {
            self.locals[(i - REGULAR_REGISTER_LIMIT) as usize] = v;
        }
    }
}

enum Step {
    Continue,
    Return(Value),
}

#[inline]
fn top<'s, 'a>(st: &'s ExecState<'a>) -> &'s Frame {
    st.frames.last().expect("no active frame")
}

#[inline]
fn top_mut<'s, 'a>(st: &'s mut ExecState<'a>) -> &'s mut Frame {
    st.frames.last_mut().expect("no active frame")
}

// Entry points

/// Run a program (script or eval chunk) code block.
pub fn run_program(st: &mut ExecState<'_>, block: Rc<CodeBlock>) -> Result<Value, Value> {
    let global = Value::object(st.realm.global);
    let frame = activate(st, block, None, global, Vec::new(), None)?;
    st.frames.push(frame);
    let result = run_frame(st);
    st.frames.pop();
    result
}

/// Link and evaluate a module; returns its namespace object. A module
/// already evaluating returns its (partially initialized) namespace.
pub fn evaluate_module(
    st: &mut ExecState<'_>,
    name: &str,
    block: Rc<CodeBlock>,
) -> Result<ObjectRef, Value> {
    if let Some(&idx) = st.modules.by_name.get(name) {
        return Ok(st.modules.records[idx].namespace);
    }

    // The namespace is created with every export pre-defined so cyclic
    // importers observe the partially-initialized exports object.
    let namespace = st.vm.alloc_object(None, ObjectKind::Plain);
    for &export in &block.export_names {
        st.vm.define_own_property(
            namespace,
            PropertyKey::Atom(export),
            PropertyDescriptor::data(
                Value::undefined(),
                PropertyAttributes::WRITABLE | PropertyAttributes::ENUMERABLE,
            ),
        );
    }
    let idx = st.modules.records.len();
    st.modules.records.push(ModuleRecord {
        name: name.into(),
        block: block.clone(),
        namespace,
        env: None,
        state: ModuleState::Evaluating,
    });
    st.modules.by_name.insert(name.to_string(), idx);

    // Load and evaluate dependencies depth-first.
    let mut dependency_namespaces = Vec::with_capacity(block.module_requests.len());
    for request in &block.module_requests {
        let Some(platform) = st.vm.platform.clone() else {
            return Err(st.throw_type_error("module loading is not supported by this host"));
        };
        let loaded = match platform.on_load_module(Some(name), request) {
            Ok(l) => l,
            Err(e) => {
                return Err(st.make_error(
                    ErrorKind::SyntaxError,
                    &format!("cannot load module '{}': {}", request, e.message),
                ))
            }
        };
        let program = Parser::new(&loaded.source, true)
            .parse_program()
            .map_err(|e| st.make_error(ErrorKind::SyntaxError, &e.message))?;
        let dep_block = crate::bytecode::emitter::compile(
            st.vm,
            &program,
            loaded.name.as_str().into(),
            loaded.source.as_str().into(),
            crate::bytecode::emitter::CompileGoal::Module,
        )
        .map_err(|e| st.make_error(ErrorKind::SyntaxError, &e.message))?;
        platform.did_load_module(Some(name), &loaded.name);
        let ns = evaluate_module(st, &loaded.name, dep_block)?;
        dependency_namespaces.push(ns);
    }

    // Module environment: locals over an object record on the
    // namespace, so exported bindings stay live through it.
    let object_record = st
        .vm
        .heap
        .alloc_env(EnvRecord::object(namespace, None));
    let mut locals = EnvRecord::named(Some(object_record));
    if let EnvRecord::Named { bindings, .. } = &mut locals {
        for &atom in &block.hoisted_names {
            bindings.insert(
                atom,
                Binding {
                    value: Value::undefined(),
                    mutable: true,
                    lexical: false,
                },
            );
        }
    }
    let locals = st.vm.heap.alloc_env(locals);
    for import in &block.imports {
        let dep = dependency_namespaces[import.request as usize];
        let value = get_object_property(
            st,
            dep,
            &PropertyKey::Atom(import.imported),
            Value::object(dep),
        )?;
        if let EnvRecord::Named { bindings, .. } = st.vm.heap.env_mut(locals) {
            bindings.insert(
                import.local,
                Binding {
                    value,
                    mutable: false,
                    lexical: true,
                },
            );
        }
    }
    st.modules.records[idx].env = Some(locals);

    let frame = activate(st, block, Some(locals), Value::undefined(), Vec::new(), None)?;
    st.frames.push(frame);
    let result = run_frame(st);
    st.frames.pop();
    st.modules.records[idx].state = ModuleState::Evaluated;
    result?;
    Ok(namespace)
}

// Call protocol

/// Call a function object: native, interpreted, or bound.
pub fn call_function(
    st: &mut ExecState<'_>,
    callee: ObjectRef,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    if st.call_depth >= MAX_CALL_DEPTH {
        return Err(st.throw_range_error("Maximum call stack size exceeded"));
    }
    st.call_depth += 1;
    let result = call_inner(st, callee, this, args);
    st.call_depth -= 1;
    result
}

fn call_inner(
    st: &mut ExecState<'_>,
    callee: ObjectRef,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    let Some(data) = st.vm.heap.object(callee).function_data() else {
        return Err(st.throw_type_error("value is not a function"));
    };
    match &data.callable {
        Callable::Native { f, .. } => {
            let f = *f;
            f(st, this, args, callee)
        }
        Callable::Interpreted { block, env, .. } => {
            let block = block.clone();
            let env = *env;
            let frame = activate(st, block, env, this, args.to_vec(), Some(callee))?;
            st.frames.push(frame);
            let result = run_frame(st);
            st.frames.pop();
            result
        }
        Callable::Bound {
            target,
            bound_this,
            bound_args,
        } => {
            let target = *target;
            let bound_this = *bound_this;
            let mut all = bound_args.clone();
            all.extend_from_slice(args);
            call_function(st, target, bound_this, &all)
        }
    }
}

/// Call any value; non-callables raise the TypeError kind.
pub fn call_value(
    st: &mut ExecState<'_>,
    callee: Value,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    match callee.as_object() {
        Some(o) if st.vm.heap.object(o).is_callable() => call_function(st, o, this, args),
        _ => {
            let text = conversion::value_to_display(st, callee);
            Err(st.throw_type_error(&format!("{} is not a function", text)))
        }
    }
}

/// Construct: allocate `this` from `callee.prototype`, run, keep an
/// explicit object result over the allocated `this`.
pub fn construct(st: &mut ExecState<'_>, callee: Value, args: &[Value]) -> Result<Value, Value> {
    let Some(f) = callee.as_object() else {
        let text = conversion::value_to_display(st, callee);
        return Err(st.throw_type_error(&format!("{} is not a constructor", text)));
    };
    let Some(data) = st.vm.heap.object(f).function_data() else {
        let text = conversion::value_to_display(st, callee);
        return Err(st.throw_type_error(&format!("{} is not a constructor", text)));
    };
    if !data.is_constructor() {
        return Err(st.throw_type_error("callee is not a constructor"));
    }
    if let Callable::Bound { target, .. } = &data.callable {
        let target = *target;
        return construct(st, Value::object(target), args);
    }

    let proto_key = PropertyKey::Atom(st.vm.wk.prototype);
    let proto = get_object_property(st, f, &proto_key, callee)?;
    let proto = proto.as_object().unwrap_or(st.realm.object_prototype);
    let this_obj = st.vm.alloc_object(Some(proto), ObjectKind::Plain);
    let result = call_function(st, f, Value::object(this_obj), args)?;
    Ok(if result.is_object() {
        result
    } else {
        Value::object(this_obj)
    })
}

/// Activate a code block: resolve `this`, allocate the register file
/// and the body environment record, and bind parameters per the scope
/// descriptor.
fn activate(
    st: &mut ExecState<'_>,
    block: Rc<CodeBlock>,
    closure_env: Option<EnvRef>,
    this: Value,
    args: Vec<Value>,
    function: Option<ObjectRef>,
) -> Result<Frame, Value> {
    // Environment record for captured or name-addressed bindings.
    let mut env = closure_env;
    if block.flags.contains(CodeBlockFlags::NEEDS_BODY_ENV) {
        let record = if block.can_use_indexed_storage() {
            EnvRecord::declarative(block.body_env_slot_count as u32, env)
        } else {
            let mut record = EnvRecord::named(env);
            if let EnvRecord::Named { bindings, .. } = &mut record {
                for &atom in &block.hoisted_names {
                    bindings.insert(
                        atom,
                        Binding {
                            value: Value::undefined(),
                            mutable: true,
                            lexical: false,
                        },
                    );
                }
            }
            record
        };
        env = Some(st.vm.heap.alloc_env(record));
    }

    // `this` per function kind.
    let this = if block.is_arrow() {
        function
            .and_then(|f| match st.vm.heap.object(f).function_data() {
                Some(FunctionData {
                    callable: Callable::Interpreted { captured_this, .. },
                    ..
                }) => *captured_this,
                _ => None,
            })
            .unwrap_or(Value::undefined())
    } else if block.is_strict() {
        this
    } else if this.is_nullish() {
        Value::object(st.realm.global)
    } else if !this.is_object() {
        Value::object(to_object(st, this)?)
    } else {
        this
    };

    let mut frame = Frame {
        temps: vec![Value::undefined(); block.temp_register_count as usize],
        locals: vec![Value::undefined(); block.stack_slot_count as usize],
        pc: 0,
        this,
        env,
        function,
        arguments_object: None,
        handlers: Vec::new(),
        args,
        block,
    };

    // Parameters land where the resolver assigned them.
    for (i, binding) in frame.block.param_bindings.clone().iter().enumerate() {
        let value = frame.args.get(i).copied().unwrap_or(Value::undefined());
        bind_activation_value(st, &mut frame, *binding, value);
    }

    // Eagerly materialized arguments object (captured or named).
    if let Some(binding) = frame.block.arguments_binding {
        let obj = create_arguments_object(st, &frame.args.clone(), frame.function);
        frame.arguments_object = Some(obj);
        bind_activation_value(st, &mut frame, binding, Value::object(obj));
    }
    Ok(frame)
}

fn bind_activation_value(
    st: &mut ExecState<'_>,
    frame: &mut Frame,
    binding: ParamBinding,
    value: Value,
) {
    match binding {
        ParamBinding::Stack { reg } => frame.set_reg(reg, value),
        ParamBinding::BodyEnv { slot } => {
            let env = frame.env.expect("body environment missing");
            if let EnvRecord::Declarative { slots, .. } = st.vm.heap.env_mut(env) {
                slots[slot as usize] = value;
            }
        }
        ParamBinding::Named { atom } => {
            let env = frame.env.expect("named environment missing");
            if let EnvRecord::Named { bindings, .. } = st.vm.heap.env_mut(env) {
                bindings.insert(
                    atom,
                    Binding {
                        value,
                        mutable: true,
                        lexical: false,
                    },
                );
            }
        }
    }
}

/// Unmapped arguments object: indexed properties, `length`, `callee`.
fn create_arguments_object(
    st: &mut ExecState<'_>,
    args: &[Value],
    function: Option<ObjectRef>,
) -> ObjectRef {
    let proto = st.realm.object_prototype;
    let obj = st.vm.alloc_object(Some(proto), ObjectKind::Plain);
    for (i, v) in args.iter().enumerate() {
        st.vm.define_own_property(
            obj,
            PropertyKey::Index(i as u32),
            PropertyDescriptor::data(*v, PropertyAttributes::ALL_PRESENT),
        );
    }
    let len = Value::number(args.len() as f64);
    let length_key = PropertyKey::Atom(st.vm.wk.length);
    st.vm.define_own_property(
        obj,
        length_key,
        PropertyDescriptor::data(
            len,
            PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE,
        ),
    );
    if let Some(f) = function {
        let callee_key = PropertyKey::Atom(st.vm.wk.callee);
        st.vm.define_own_property(
            obj,
            callee_key,
            PropertyDescriptor::data(
                Value::object(f),
                PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE,
            ),
        );
    }
    obj
}

/// Create a closure over `block` in the current environment.
pub fn create_closure(
    st: &mut ExecState<'_>,
    block: Rc<CodeBlock>,
    env: Option<EnvRef>,
    captured_this: Option<Value>,
) -> ObjectRef {
    let kind = if block.is_arrow() {
        FunctionKind::Arrow
    } else if block.flags.contains(CodeBlockFlags::DERIVED_CLASS_CONSTRUCTOR) {
        FunctionKind::DerivedClassConstructor
    } else if block.flags.contains(CodeBlockFlags::CLASS_CONSTRUCTOR) {
        FunctionKind::ClassConstructor
    } else if block.flags.contains(CodeBlockFlags::GETTER_OR_SETTER) {
        FunctionKind::Getter
    } else {
        FunctionKind::Normal
    };
    let name = block.name;
    let param_count = block.param_count;
    let data = FunctionData {
        kind,
        callable: Callable::Interpreted {
            block,
            env,
            captured_this,
            parent_constructor: None,
        },
    };
    let proto = st.realm.function_prototype;
    let func = st
        .vm
        .alloc_object(Some(proto), ObjectKind::Function(Box::new(data)));

    // name and length properties.
    let name_text = name
        .map(|a| st.vm.atoms.name(a).to_string())
        .unwrap_or_default();
    let name_ref = st.vm.heap.alloc_str(&name_text);
    let name_key = PropertyKey::Atom(st.vm.wk.name);
    st.vm.define_own_property(
        func,
        name_key,
        PropertyDescriptor::data(Value::string(name_ref), PropertyAttributes::CONFIGURABLE),
    );
    let length_key = PropertyKey::Atom(st.vm.wk.length);
    st.vm.define_own_property(
        func,
        length_key,
        PropertyDescriptor::data(
            Value::number(param_count as f64),
            PropertyAttributes::CONFIGURABLE,
        ),
    );

    // Ordinary functions get a fresh prototype object.
    if kind == FunctionKind::Normal {
        let proto_obj = st
            .vm
            .alloc_object(Some(st.realm.object_prototype), ObjectKind::Plain);
        let ctor_key = PropertyKey::Atom(st.vm.wk.constructor);
        st.vm.define_own_property(
            proto_obj,
            ctor_key,
            PropertyDescriptor::data(
                Value::object(func),
                PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE,
            ),
        );
        let proto_key = PropertyKey::Atom(st.vm.wk.prototype);
        st.vm.define_own_property(
            func,
            proto_key,
            PropertyDescriptor::data(Value::object(proto_obj), PropertyAttributes::WRITABLE),
        );
    }
    func
}

// Dispatch loop

fn run_frame(st: &mut ExecState<'_>) -> Result<Value, Value> {
    loop {
        match step(st) {
            Ok(Step::Continue) => {}
            Ok(Step::Return(v)) => return Ok(v),
            Err(thrown) => {
                let frame = top_mut(st);
                match frame.handlers.pop() {
                    Some(handler) => {
                        frame.pc = handler.pc;
                        frame.env = handler.env;
                        frame.set_reg(handler.dst, thrown);
                    }
                    None => return Err(thrown),
                }
            }
        }
    }
}

fn step(st: &mut ExecState<'_>) -> Result<Step, Value> {
    let op = {
        let frame = top_mut(st);
        let op = frame.block.code[frame.pc];
        frame.pc += 1;
        op
    };
    match op {
        Opcode::Move { src, dst } => {
            let frame = top_mut(st);
            let v = frame.reg(src);
            frame.set_reg(dst, v);
        }
        Opcode::LoadLiteral { index, dst } => {
            let frame = top_mut(st);
            let v = frame.block.constants[index as usize];
            frame.set_reg(dst, v);
        }
        Opcode::LoadUndefined { dst } => top_mut(st).set_reg(dst, Value::undefined()),
        Opcode::LoadNull { dst } => top_mut(st).set_reg(dst, Value::null()),
        Opcode::LoadTrue { dst } => top_mut(st).set_reg(dst, Value::bool(true)),
        Opcode::LoadFalse { dst } => top_mut(st).set_reg(dst, Value::bool(false)),
        Opcode::LoadInt { value, dst } => top_mut(st).set_reg(dst, Value::int32(value)),
        Opcode::LoadEmpty { dst } => top_mut(st).set_reg(dst, Value::empty()),
        Opcode::LoadThis { dst } => {
            let frame = top_mut(st);
            let this = frame.this;
            frame.set_reg(dst, this);
        }

        Opcode::LoadByName { name, dst } => {
            let v = load_by_name(st, name)?;
            top_mut(st).set_reg(dst, v);
        }
        Opcode::StoreByName { name, src } => {
            let v = top(st).reg(src);
            store_by_name(st, name, v)?;
        }
        Opcode::StoreByNameWithAddress { addr, name, src } => {
            let v = top(st).reg(src);
            let address = top(st).reg(addr).as_int32().unwrap_or(-1);
            store_by_name_at(st, name, v, address)?;
        }
        Opcode::InitializeByName {
            name,
            src,
            is_lexical,
        } => {
            let v = top(st).reg(src);
            initialize_by_name(st, name, v, is_lexical)?;
        }
        Opcode::ResolveNameAddress { name, dst } => {
            let address = resolve_name_address(st, name);
            top_mut(st).set_reg(dst, Value::int32(address));
        }
        Opcode::TypeofByName { name, dst } => {
            let v = match try_load_by_name(st, name)? {
                Some(v) => v,
                None => Value::undefined(),
            };
            let tag = st.vm.typeof_str(v);
            let s = st.vm.heap.alloc_str(tag);
            top_mut(st).set_reg(dst, Value::string(s));
        }
        Opcode::DeleteByName { name, dst } => {
            let deleted = delete_by_name(st, name);
            top_mut(st).set_reg(dst, Value::bool(deleted));
        }

        Opcode::LoadByHeapIndex { upper, slot, dst } => {
            let v = heap_slot(st, upper, slot)?;
            if v.is_empty() {
                return Err(
                    st.throw_reference_error("Cannot access variable before initialization")
                );
            }
            top_mut(st).set_reg(dst, v);
        }
        Opcode::StoreByHeapIndex { upper, slot, src } => {
            let v = top(st).reg(src);
            let current = heap_slot(st, upper, slot)?;
            if current.is_empty() {
                return Err(
                    st.throw_reference_error("Cannot access variable before initialization")
                );
            }
            set_heap_slot(st, upper, slot, v);
        }
        Opcode::InitializeByHeapIndex { slot, src } => {
            let v = top(st).reg(src);
            set_heap_slot(st, 0, slot, v);
        }

        Opcode::GetGlobalVariable { cache, dst } => {
            let v = get_global_variable(st, cache)?;
            top_mut(st).set_reg(dst, v);
        }
        Opcode::SetGlobalVariable { cache, src } => {
            let v = top(st).reg(src);
            set_global_variable(st, cache, v)?;
        }
        Opcode::InitializeGlobalVariable { name, src } => {
            let v = top(st).reg(src);
            initialize_global_variable(st, name, v);
        }

        Opcode::ThrowIfHole { reg, name } => {
            if top(st).reg(reg).is_empty() {
                let text = st.vm.atoms.name(name).to_string();
                return Err(st.throw_reference_error(&format!(
                    "Cannot access '{}' before initialization",
                    text
                )));
            }
        }

        Opcode::GetByProperty { obj, key, dst } => {
            let (base, key_v) = {
                let frame = top(st);
                (frame.reg(obj), frame.reg(key))
            };
            let key = to_property_key(st, key_v)?;
            let v = get_value_property(st, base, &key)?;
            top_mut(st).set_reg(dst, v);
        }
        Opcode::SetByProperty { obj, key, src } => {
            let (base, key_v, v, strict) = {
                let frame = top(st);
                (
                    frame.reg(obj),
                    frame.reg(key),
                    frame.reg(src),
                    frame.block.is_strict(),
                )
            };
            let key = to_property_key(st, key_v)?;
            set_value_property(st, base, &key, v, strict)?;
        }
        Opcode::DeleteProperty { obj, key, dst } => {
            let (base, key_v, strict) = {
                let frame = top(st);
                (frame.reg(obj), frame.reg(key), frame.block.is_strict())
            };
            let key = to_property_key(st, key_v)?;
            let result = match base.as_object() {
                Some(o) => {
                    let ok = st.vm.delete_own_property(o, &key);
                    if !ok && strict {
                        let text = st.vm.key_to_string(&key);
                        return Err(st.throw_type_error(&format!(
                            "Cannot delete property '{}'",
                            text
                        )));
                    }
                    ok
                }
                None => true,
            };
            top_mut(st).set_reg(dst, Value::bool(result));
        }
        Opcode::DefineDataProperty {
            obj,
            key,
            src,
            enumerable,
        } => {
            let (target, key_v, v) = {
                let frame = top(st);
                (frame.reg(obj), frame.reg(key), frame.reg(src))
            };
            let key = to_property_key(st, key_v)?;
            let target = target.as_object().expect("literal target is an object");
            let mut attrs = PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE;
            if enumerable {
                attrs |= PropertyAttributes::ENUMERABLE;
            }
            if st.vm.heap.object(target).is_array() {
                if let PropertyKey::Index(i) = key {
                    if enumerable {
                        st.vm.fast_array_set(target, i, v);
                        return Ok(Step::Continue);
                    }
                }
            }
            st.vm
                .define_own_property(target, key, PropertyDescriptor::data(v, attrs));
        }
        Opcode::DefineGetter {
            obj,
            key,
            func,
            enumerable,
        } => {
            define_accessor(st, obj, key, func, enumerable, true)?;
        }
        Opcode::DefineSetter {
            obj,
            key,
            func,
            enumerable,
        } => {
            define_accessor(st, obj, key, func, enumerable, false)?;
        }

        Opcode::NewObject { dst } => {
            let proto = st.realm.object_prototype;
            let obj = st.vm.alloc_object(Some(proto), ObjectKind::Plain);
            top_mut(st).set_reg(dst, Value::object(obj));
        }
        Opcode::NewArray { argv, argc, dst } => {
            let values: Vec<Value> = {
                let frame = top(st);
                (0..argc).map(|i| frame.reg(argv + i)).collect()
            };
            let proto = st.realm.array_prototype;
            let arr = st.vm.alloc_array_from(Some(proto), values);
            top_mut(st).set_reg(dst, Value::object(arr));
        }
        Opcode::CreateFunction { index, dst } => {
            let (block, env, this) = {
                let frame = top(st);
                (
                    frame.block.inner[index as usize].clone(),
                    frame.env,
                    frame.this,
                )
            };
            let captured_this = if block.is_arrow() { Some(this) } else { None };
            let func = create_closure(st, block, env, captured_this);
            top_mut(st).set_reg(dst, Value::object(func));
        }
        Opcode::CreateClass {
            ctor_index,
            parent,
            dst,
        } => {
            let v = create_class(st, ctor_index, parent)?;
            top_mut(st).set_reg(dst, v);
        }

        Opcode::PushLexicalEnv { slot_count } => {
            let parent = top(st).env;
            let env = st
                .vm
                .heap
                .alloc_env(EnvRecord::declarative(slot_count as u32, parent));
            top_mut(st).env = Some(env);
        }
        Opcode::PushNamedEnv => {
            let parent = top(st).env;
            let env = st.vm.heap.alloc_env(EnvRecord::named(parent));
            top_mut(st).env = Some(env);
        }
        Opcode::PushWithEnv { obj } => {
            let v = top(st).reg(obj);
            let obj = to_object(st, v)?;
            let parent = top(st).env;
            let env = st.vm.heap.alloc_env(EnvRecord::object(obj, parent));
            top_mut(st).env = Some(env);
        }
        Opcode::PopEnv => {
            let env = top(st).env.expect("environment chain underflow");
            top_mut(st).env = st.vm.heap.env(env).parent();
        }
        Opcode::RenewLexicalEnv { slot_count } => {
            let env = top(st).env.expect("environment chain underflow");
            let (slots, parent) = match st.vm.heap.env(env) {
                EnvRecord::Declarative { slots, parent } => (slots.clone(), *parent),
                _ => (vec![Value::empty(); slot_count as usize], None),
            };
            let fresh = st
                .vm
                .heap
                .alloc_env(EnvRecord::Declarative { slots, parent });
            top_mut(st).env = Some(fresh);
        }

        Opcode::EnsureArgumentsObject { dst } => {
            if top(st).arguments_object.is_none() {
                let (args, function) = {
                    let frame = top(st);
                    (frame.args.clone(), frame.function)
                };
                let obj = create_arguments_object(st, &args, function);
                let frame = top_mut(st);
                frame.arguments_object = Some(obj);
                frame.set_reg(dst, Value::object(obj));
            }
        }
        Opcode::LoadRestArguments { start, dst } => {
            let rest: Vec<Value> = top(st).args.iter().skip(start as usize).copied().collect();
            let proto = st.realm.array_prototype;
            let arr = st.vm.alloc_array_from(Some(proto), rest);
            top_mut(st).set_reg(dst, Value::object(arr));
        }

        Opcode::Jump { offset } => {
            let frame = top_mut(st);
            frame.pc = (frame.pc as i64 + offset as i64) as usize;
        }
        Opcode::JumpIfTrue { cond, offset } => {
            let v = top(st).reg(cond);
            if st.vm.to_boolean(v) {
                let frame = top_mut(st);
                frame.pc = (frame.pc as i64 + offset as i64) as usize;
            }
        }
        Opcode::JumpIfFalse { cond, offset } => {
            let v = top(st).reg(cond);
            if !st.vm.to_boolean(v) {
                let frame = top_mut(st);
                frame.pc = (frame.pc as i64 + offset as i64) as usize;
            }
        }
        Opcode::Call {
            callee,
            this_reg,
            argv,
            argc,
            dst,
        } => {
            let (callee_v, this, args) = {
                let frame = top(st);
                let this = if this_reg == REG_NONE {
                    Value::undefined()
                } else {
                    frame.reg(this_reg)
                };
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(argv + i)).collect();
                (frame.reg(callee), this, args)
            };
            let result = call_value(st, callee_v, this, &args)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Construct {
            callee,
            argv,
            argc,
            dst,
        } => {
            let (callee_v, args) = {
                let frame = top(st);
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(argv + i)).collect();
                (frame.reg(callee), args)
            };
            let result = construct(st, callee_v, &args)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::SuperCall { argv, argc, dst } => {
            let (args, this, function) = {
                let frame = top(st);
                let args: Vec<Value> = (0..argc).map(|i| frame.reg(argv + i)).collect();
                (args, frame.this, frame.function)
            };
            let parent = function
                .and_then(|f| match st.vm.heap.object(f).function_data() {
                    Some(FunctionData {
                        callable: Callable::Interpreted {
                            parent_constructor, ..
                        },
                        ..
                    }) => *parent_constructor,
                    _ => None,
                });
            let Some(parent) = parent else {
                return Err(st.throw_type_error("'super' called outside a derived constructor"));
            };
            call_function(st, parent, this, &args)?;
            top_mut(st).set_reg(dst, Value::undefined());
        }
        Opcode::CallEval { argv, argc, dst } => {
            let result = call_eval(st, argv, argc)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Return { src } => {
            let v = top(st).reg(src);
            return Ok(Step::Return(v));
        }
        Opcode::Throw { src } => {
            return Err(top(st).reg(src));
        }
        Opcode::ThrowStaticError { kind, message } => {
            let msg = {
                let frame = top(st);
                frame.block.constants[message as usize]
            };
            let text = msg
                .as_string()
                .map(|s| st.vm.heap.string_to_rust(s))
                .unwrap_or_default();
            return Err(st.make_error(kind, &text));
        }
        Opcode::TryStart { offset, dst } => {
            let frame = top_mut(st);
            let pc = (frame.pc as i64 + offset as i64) as usize;
            let env = frame.env;
            frame.handlers.push(Handler { pc, dst, env });
        }
        Opcode::TryEnd => {
            top_mut(st).handlers.pop();
        }

        Opcode::CreateEnumerator { obj, dst } => {
            let v = top(st).reg(obj);
            let (keys, target) = match v.as_object() {
                Some(o) => (st.vm.enumerate_keys(o), o),
                // for-in over null/undefined runs zero iterations.
                None if v.is_nullish() => (Vec::new(), st.realm.object_prototype),
                None => {
                    let o = to_object(st, v)?;
                    (st.vm.enumerate_keys(o), o)
                }
            };
            let iter = st.vm.alloc_object(
                None,
                ObjectKind::Enumerator(Box::new(EnumerateData {
                    object: target,
                    keys,
                    index: 0,
                })),
            );
            top_mut(st).set_reg(dst, Value::object(iter));
        }
        Opcode::EnumeratorNext { iter, dst, offset } => {
            let iter_obj = top(st).reg(iter).as_object().expect("enumerator register");
            loop {
                let next = {
                    let ObjectKind::Enumerator(data) = &mut st.vm.heap.object_mut(iter_obj).kind
                    else {
                        break None;
                    };
                    if data.index >= data.keys.len() {
                        None
                    } else {
                        let key = data.keys[data.index];
                        data.index += 1;
                        Some((data.object, key))
                    }
                };
                match next {
                    None => {
                        let frame = top_mut(st);
                        frame.pc = (frame.pc as i64 + offset as i64) as usize;
                        break None;
                    }
                    Some((target, key)) => {
                        // Deleted properties are skipped; the chain is
                        // re-queried so callback mutations are seen.
                        if st.vm.has_property(target, &key) {
                            let text = st.vm.key_to_string(&key);
                            let s = st.vm.heap.alloc_str(&text);
                            top_mut(st).set_reg(dst, Value::string(s));
                            break Some(());
                        }
                    }
                }
            };
        }
        Opcode::GetIterator { obj, dst } => {
            let v = top(st).reg(obj);
            let sym = PropertyKey::Symbol(st.vm.wk_symbols.iterator);
            let Some(method) = get_method(st, v, &sym)? else {
                let text = conversion::value_to_display(st, v);
                return Err(st.throw_type_error(&format!("{} is not iterable", text)));
            };
            let iter = call_function(st, method, v, &[])?;
            if !iter.is_object() {
                return Err(st.throw_type_error("iterator result is not an object"));
            }
            top_mut(st).set_reg(dst, iter);
        }
        Opcode::IteratorStep { iter, dst, offset } => {
            let iter_v = top(st).reg(iter);
            let next_key = PropertyKey::Atom(st.vm.wk.next);
            let next = get_value_property(st, iter_v, &next_key)?;
            let result = call_value(st, next, iter_v, &[])?;
            if !result.is_object() {
                return Err(st.throw_type_error("iterator result is not an object"));
            }
            let done_key = PropertyKey::Atom(st.vm.wk.done);
            let done = get_value_property(st, result, &done_key)?;
            if st.vm.to_boolean(done) {
                let frame = top_mut(st);
                frame.pc = (frame.pc as i64 + offset as i64) as usize;
            } else {
                let value_key = PropertyKey::Atom(st.vm.wk.value);
                let value = get_value_property(st, result, &value_key)?;
                top_mut(st).set_reg(dst, value);
            }
        }
        Opcode::IteratorClose { iter } => {
            let iter_v = top(st).reg(iter);
            let return_key = {
                let atom = st.vm.atoms.intern("return");
                PropertyKey::Atom(atom)
            };
            if let Some(method) = get_method(st, iter_v, &return_key)? {
                let _ = call_function(st, method, iter_v, &[])?;
            }
        }

        Opcode::Negate { src, dst } => {
            let v = top(st).reg(src);
            let n = to_number(st, v)?;
            top_mut(st).set_reg(dst, Value::number(-n));
        }
        Opcode::ToNumber { src, dst } => {
            let v = top(st).reg(src);
            let n = to_number(st, v)?;
            top_mut(st).set_reg(dst, Value::number(n));
        }
        Opcode::LogicalNot { src, dst } => {
            let v = top(st).reg(src);
            let b = st.vm.to_boolean(v);
            top_mut(st).set_reg(dst, Value::bool(!b));
        }
        Opcode::BitNot { src, dst } => {
            let v = top(st).reg(src);
            let n = to_number(st, v)?;
            top_mut(st).set_reg(dst, Value::number(!to_int32_f64(n) as f64));
        }
        Opcode::TypeofValue { src, dst } => {
            let v = top(st).reg(src);
            let tag = st.vm.typeof_str(v);
            let s = st.vm.heap.alloc_str(tag);
            top_mut(st).set_reg(dst, Value::string(s));
        }
        Opcode::Increment { src, dst } => {
            let v = top(st).reg(src);
            let n = v.as_number().unwrap_or(f64::NAN);
            top_mut(st).set_reg(dst, Value::number(n + 1.0));
        }
        Opcode::Decrement { src, dst } => {
            let v = top(st).reg(src);
            let n = v.as_number().unwrap_or(f64::NAN);
            top_mut(st).set_reg(dst, Value::number(n - 1.0));
        }

        Opcode::Add { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let result = if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
                Value::number(x + y)
            } else {
                add_values(st, a, b)?
            };
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Sub { lhs, rhs, dst } => {
            let result = numeric_binop(st, lhs, rhs, |x, y| x - y)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Mul { lhs, rhs, dst } => {
            let result = numeric_binop(st, lhs, rhs, |x, y| x * y)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Div { lhs, rhs, dst } => {
            let result = numeric_binop(st, lhs, rhs, |x, y| x / y)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Mod { lhs, rhs, dst } => {
            let result = numeric_binop(st, lhs, rhs, |x, y| x % y)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Pow { lhs, rhs, dst } => {
            let result = numeric_binop(st, lhs, rhs, f64::powf)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Shl { lhs, rhs, dst } => {
            let result = int_binop(st, lhs, rhs, |x, y| x.wrapping_shl(y & 31))?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Sar { lhs, rhs, dst } => {
            let result = int_binop(st, lhs, rhs, |x, y| x.wrapping_shr(y & 31))?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Shr { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let x = to_uint32_f64(to_number(st, a)?);
            let y = to_uint32_f64(to_number(st, b)?);
            top_mut(st).set_reg(dst, Value::number((x >> (y & 31)) as f64));
        }
        Opcode::BitAnd { lhs, rhs, dst } => {
            let result = int_binop(st, lhs, rhs, |x, y| x & y as i32)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::BitOr { lhs, rhs, dst } => {
            let result = int_binop(st, lhs, rhs, |x, y| x | y as i32)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::BitXor { lhs, rhs, dst } => {
            let result = int_binop(st, lhs, rhs, |x, y| x ^ y as i32)?;
            top_mut(st).set_reg(dst, result);
        }
        Opcode::Less { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = abstract_relational(st, a, b)?.unwrap_or(false);
            top_mut(st).set_reg(dst, Value::bool(r));
        }
        Opcode::Greater { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = abstract_relational(st, b, a)?.unwrap_or(false);
            top_mut(st).set_reg(dst, Value::bool(r));
        }
        Opcode::LessEq { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = abstract_relational(st, b, a)?;
            top_mut(st).set_reg(dst, Value::bool(r == Some(false)));
        }
        Opcode::GreaterEq { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = abstract_relational(st, a, b)?;
            top_mut(st).set_reg(dst, Value::bool(r == Some(false)));
        }
        Opcode::Eq { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = loose_equals(st, a, b)?;
            top_mut(st).set_reg(dst, Value::bool(r));
        }
        Opcode::NotEq { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = loose_equals(st, a, b)?;
            top_mut(st).set_reg(dst, Value::bool(!r));
        }
        Opcode::StrictEq { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = st.vm.strict_equals(a, b);
            top_mut(st).set_reg(dst, Value::bool(r));
        }
        Opcode::StrictNotEq { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = st.vm.strict_equals(a, b);
            top_mut(st).set_reg(dst, Value::bool(!r));
        }
        Opcode::In { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let Some(obj) = b.as_object() else {
                return Err(
                    st.throw_type_error("Cannot use 'in' operator to search in non-object")
                );
            };
            let key = to_property_key(st, a)?;
            let r = st.vm.has_property(obj, &key);
            top_mut(st).set_reg(dst, Value::bool(r));
        }
        Opcode::InstanceOf { lhs, rhs, dst } => {
            let (a, b) = regs2(st, lhs, rhs);
            let r = instance_of(st, a, b)?;
            top_mut(st).set_reg(dst, Value::bool(r));
        }
    }
    Ok(Step::Continue)
}

#[inline]
fn regs2(st: &ExecState<'_>, a: u16, b: u16) -> (Value, Value) {
    let frame = top(st);
    (frame.reg(a), frame.reg(b))
}

fn numeric_binop(
    st: &mut ExecState<'_>,
    lhs: u16,
    rhs: u16,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, Value> {
    let (a, b) = regs2(st, lhs, rhs);
    let x = to_number(st, a)?;
    let y = to_number(st, b)?;
    Ok(Value::number(f(x, y)))
}

fn int_binop(
    st: &mut ExecState<'_>,
    lhs: u16,
    rhs: u16,
    f: impl Fn(i32, u32) -> i32,
) -> Result<Value, Value> {
    let (a, b) = regs2(st, lhs, rhs);
    let x = to_int32_f64(to_number(st, a)?);
    let y = to_uint32_f64(to_number(st, b)?);
    Ok(Value::number(f(x, y) as f64))
}

fn define_accessor(
    st: &mut ExecState<'_>,
    obj: u16,
    key: u16,
    func: u16,
    enumerable: bool,
    is_getter: bool,
) -> Result<(), Value> {
    let (target, key_v, f) = {
        let frame = top(st);
        (frame.reg(obj), frame.reg(key), frame.reg(func))
    };
    let key = to_property_key(st, key_v)?;
    let target = target.as_object().expect("accessor target is an object");
    let f = f.as_object().expect("accessor is a function object");
    let desc = if is_getter {
        PropertyDescriptor {
            get: Some(Some(f)),
            enumerable: Some(enumerable),
            configurable: Some(true),
            ..Default::default()
        }
    } else {
        PropertyDescriptor {
            set: Some(Some(f)),
            enumerable: Some(enumerable),
            configurable: Some(true),
            ..Default::default()
        }
    };
    st.vm.define_own_property(target, key, desc);
    Ok(())
}

fn create_class(st: &mut ExecState<'_>, ctor_index: u16, parent: u16) -> Result<Value, Value> {
    let (parent_v, block, env) = {
        let frame = top(st);
        let parent_v = if parent == REG_NONE {
            None
        } else {
            Some(frame.reg(parent))
        };
        (parent_v, frame.block.clone(), frame.env)
    };

    let parent_ctor = match parent_v {
        Some(v) => {
            let Some(o) = v.as_object() else {
                return Err(st.throw_type_error("Class extends value is not a constructor"));
            };
            if !st.vm.heap.object(o).is_callable() {
                return Err(st.throw_type_error("Class extends value is not a constructor"));
            }
            Some(o)
        }
        None => None,
    };

    // Prototype object inherits from the parent's prototype.
    let proto_parent = match parent_ctor {
        Some(p) => {
            let key = PropertyKey::Atom(st.vm.wk.prototype);
            let v = get_object_property(st, p, &key, Value::object(p))?;
            match v.as_object() {
                Some(o) => Some(o),
                None => Some(st.realm.object_prototype),
            }
        }
        None => Some(st.realm.object_prototype),
    };
    let prototype = st.vm.alloc_object(proto_parent, ObjectKind::Plain);

    let ctor = if ctor_index == u16::MAX {
        // Default constructor; derived ones forward to the parent.
        let payload = match parent_ctor {
            Some(p) => vec![Value::object(p)],
            None => Vec::new(),
        };
        let data = FunctionData {
            kind: FunctionKind::ClassConstructor,
            callable: Callable::Native {
                f: default_class_constructor,
                payload,
            },
        };
        let proto = st.realm.function_prototype;
        st.vm
            .alloc_object(Some(proto), ObjectKind::Function(Box::new(data)))
    } else {
        let inner = block.inner[ctor_index as usize].clone();
        create_closure(st, inner, env, None)
    };

    // Wire the pair and remember the parent for super().
    if let ObjectKind::Function(data) = &mut st.vm.heap.object_mut(ctor).kind {
        if let Callable::Interpreted {
            parent_constructor, ..
        } = &mut data.callable
        {
            *parent_constructor = parent_ctor;
        }
    }
    if let Some(p) = parent_ctor {
        st.vm.set_prototype(ctor, Some(p));
    }
    let proto_key = PropertyKey::Atom(st.vm.wk.prototype);
    st.vm.define_own_property(
        ctor,
        proto_key,
        PropertyDescriptor::data(Value::object(prototype), PropertyAttributes::empty()),
    );
    let ctor_key = PropertyKey::Atom(st.vm.wk.constructor);
    st.vm.define_own_property(
        prototype,
        ctor_key,
        PropertyDescriptor::data(
            Value::object(ctor),
            PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE,
        ),
    );
    Ok(Value::object(ctor))
}

fn default_class_constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    func: ObjectRef,
) -> Result<Value, Value> {
    let parent = match st.vm.heap.object(func).function_data() {
        Some(FunctionData {
            callable: Callable::Native { payload, .. },
            ..
        }) => payload.first().and_then(|v| v.as_object()),
        _ => None,
    };
    if let Some(parent) = parent {
        call_function(st, parent, this, args)?;
    }
    Ok(Value::undefined())
}

// Direct eval

fn call_eval(st: &mut ExecState<'_>, argv: u16, argc: u16) -> Result<Value, Value> {
    let args: Vec<Value> = {
        let frame = top(st);
        (0..argc).map(|i| frame.reg(argv + i)).collect()
    };
    // Resolve `eval`; a rebound name degrades to an ordinary call.
    let eval_atom = st.vm.wk.eval;
    let callee = load_by_name(st, eval_atom)?;
    let is_builtin = callee.as_object() == Some(st.realm.eval_function);
    if !is_builtin {
        return call_value(st, callee, Value::undefined(), &args);
    }
    let Some(first) = args.first().copied() else {
        return Ok(Value::undefined());
    };
    let Some(src) = first.as_string() else {
        return Ok(first);
    };
    let source = st.vm.heap.string_to_rust(src);
    let program = Parser::new(&source, false)
        .parse_program()
        .map_err(|e| st.make_error(ErrorKind::SyntaxError, &e.message))?;
    let block = crate::bytecode::emitter::compile(
        st.vm,
        &program,
        "<eval>".into(),
        source.as_str().into(),
        crate::bytecode::emitter::CompileGoal::Eval,
    )
    .map_err(|e| st.make_error(ErrorKind::SyntaxError, &e.message))?;

    // Run against the caller's variable environment and `this`.
    let (env, this) = {
        let frame = top(st);
        (frame.env, frame.this)
    };
    let frame = activate(st, block, env, this, Vec::new(), None)?;
    st.frames.push(frame);
    let result = run_frame(st);
    st.frames.pop();
    result
}

// Name-keyed variable access

enum NameSlot {
    Env(EnvRef),
    WithObject(ObjectRef),
    GlobalLexical,
    Global,
}

fn find_name(st: &mut ExecState<'_>, name: Atom) -> Option<NameSlot> {
    let mut cursor = top(st).env;
    while let Some(env) = cursor {
        match st.vm.heap.env(env) {
            EnvRecord::Declarative { parent, .. } => cursor = *parent,
            EnvRecord::Named { bindings, parent } => {
                if bindings.contains_key(&name) {
                    return Some(NameSlot::Env(env));
                }
                cursor = *parent;
            }
            EnvRecord::Object { object, parent } => {
                let obj = *object;
                let parent = *parent;
                let key = PropertyKey::Atom(name);
                if st.vm.has_property(obj, &key) {
                    return Some(NameSlot::WithObject(obj));
                }
                cursor = parent;
            }
        }
    }
    let global_lexical = st.realm.global_lexical;
    if let EnvRecord::Named { bindings, .. } = st.vm.heap.env(global_lexical) {
        if bindings.contains_key(&name) {
            return Some(NameSlot::GlobalLexical);
        }
    }
    let key = PropertyKey::Atom(name);
    if st.vm.has_property(st.realm.global, &key) {
        return Some(NameSlot::Global);
    }
    None
}

fn try_load_by_name(st: &mut ExecState<'_>, name: Atom) -> Result<Option<Value>, Value> {
    match find_name(st, name) {
        None => Ok(None),
        Some(slot @ (NameSlot::Env(_) | NameSlot::GlobalLexical)) => {
            let env = match slot {
                NameSlot::Env(e) => e,
                _ => st.realm.global_lexical,
            };
            let EnvRecord::Named { bindings, .. } = st.vm.heap.env(env) else {
                return Ok(None);
            };
            let binding = bindings[&name];
            if binding.value.is_empty() {
                let text = st.vm.atoms.name(name).to_string();
                return Err(st.throw_reference_error(&format!(
                    "Cannot access '{}' before initialization",
                    text
                )));
            }
            Ok(Some(binding.value))
        }
        Some(NameSlot::WithObject(obj)) => {
            let key = PropertyKey::Atom(name);
            Ok(Some(get_object_property(st, obj, &key, Value::object(obj))?))
        }
        Some(NameSlot::Global) => {
            let key = PropertyKey::Atom(name);
            let global = st.realm.global;
            Ok(Some(get_object_property(
                st,
                global,
                &key,
                Value::object(global),
            )?))
        }
    }
}

fn load_by_name(st: &mut ExecState<'_>, name: Atom) -> Result<Value, Value> {
    match try_load_by_name(st, name)? {
        Some(v) => Ok(v),
        None => {
            let text = st.vm.atoms.name(name).to_string();
            Err(st.throw_reference_error(&format!("{} is not defined", text)))
        }
    }
}

fn store_by_name(st: &mut ExecState<'_>, name: Atom, value: Value) -> Result<(), Value> {
    let strict = top(st).block.is_strict();
    match find_name(st, name) {
        Some(NameSlot::Env(env)) => store_to_named_record(st, env, name, value),
        Some(NameSlot::GlobalLexical) => {
            let env = st.realm.global_lexical;
            store_to_named_record(st, env, name, value)
        }
        Some(NameSlot::WithObject(obj)) => {
            let key = PropertyKey::Atom(name);
            set_object_property(st, obj, &key, value, strict)
        }
        Some(NameSlot::Global) => {
            let key = PropertyKey::Atom(name);
            let global = st.realm.global;
            set_object_property(st, global, &key, value, strict)
        }
        None => {
            if strict {
                let text = st.vm.atoms.name(name).to_string();
                return Err(st.throw_reference_error(&format!("{} is not defined", text)));
            }
            let key = PropertyKey::Atom(name);
            let global = st.realm.global;
            set_object_property(st, global, &key, value, false)
        }
    }
}

fn store_to_named_record(
    st: &mut ExecState<'_>,
    env: EnvRef,
    name: Atom,
    value: Value,
) -> Result<(), Value> {
    let (mutable, initialized) = {
        let EnvRecord::Named { bindings, .. } = st.vm.heap.env(env) else {
            unreachable!("name slot points at a named record");
        };
        let b = bindings[&name];
        (b.mutable, !b.value.is_empty())
    };
    if !initialized {
        let text = st.vm.atoms.name(name).to_string();
        return Err(st.throw_reference_error(&format!(
            "Cannot access '{}' before initialization",
            text
        )));
    }
    if !mutable {
        return Err(st.throw_type_error("Assignment to constant variable."));
    }
    if let EnvRecord::Named { bindings, .. } = st.vm.heap.env_mut(env) {
        if let Some(b) = bindings.get_mut(&name) {
            b.value = value;
        }
    }
    Ok(())
}

fn store_by_name_at(
    st: &mut ExecState<'_>,
    name: Atom,
    value: Value,
    address: i32,
) -> Result<(), Value> {
    if address < 0 {
        return store_by_name(st, name, value);
    }
    // Walk `address` records from the innermost.
    let mut cursor = top(st).env;
    for _ in 0..address {
        cursor = cursor.and_then(|e| st.vm.heap.env(e).parent());
    }
    match cursor {
        Some(env) => match st.vm.heap.env(env) {
            EnvRecord::Named { .. } => store_to_named_record(st, env, name, value),
            EnvRecord::Object { object, .. } => {
                let obj = *object;
                let strict = top(st).block.is_strict();
                let key = PropertyKey::Atom(name);
                set_object_property(st, obj, &key, value, strict)
            }
            EnvRecord::Declarative { .. } => store_by_name(st, name, value),
        },
        None => store_by_name(st, name, value),
    }
}

fn resolve_name_address(st: &mut ExecState<'_>, name: Atom) -> i32 {
    let mut cursor = top(st).env;
    let mut depth = 0i32;
    while let Some(env) = cursor {
        match st.vm.heap.env(env) {
            EnvRecord::Named { bindings, parent } => {
                if bindings.contains_key(&name) {
                    return depth;
                }
                cursor = *parent;
            }
            EnvRecord::Object { object, parent } => {
                let obj = *object;
                let parent = *parent;
                let key = PropertyKey::Atom(name);
                if st.vm.has_property(obj, &key) {
                    return depth;
                }
                cursor = parent;
            }
            EnvRecord::Declarative { parent, .. } => cursor = *parent,
        }
        depth += 1;
    }
    -1
}

fn initialize_by_name(
    st: &mut ExecState<'_>,
    name: Atom,
    value: Value,
    is_lexical: bool,
) -> Result<(), Value> {
    // Find the innermost record that can host the binding.
    let mut cursor = top(st).env;
    while let Some(env) = cursor {
        match st.vm.heap.env(env) {
            EnvRecord::Named { .. } => {
                if let EnvRecord::Named { bindings, .. } = st.vm.heap.env_mut(env) {
                    bindings.insert(
                        name,
                        Binding {
                            value,
                            mutable: true,
                            lexical: is_lexical,
                        },
                    );
                }
                return Ok(());
            }
            EnvRecord::Object { object, parent } => {
                if is_lexical {
                    cursor = *parent;
                    continue;
                }
                // var-style initialization lands on the nearest object
                // record (module namespace, with target).
                let obj = *object;
                let key = PropertyKey::Atom(name);
                return set_object_property(st, obj, &key, value, false);
            }
            EnvRecord::Declarative { parent, .. } => cursor = *parent,
        }
    }
    if is_lexical {
        let env = st.realm.global_lexical;
        if let EnvRecord::Named { bindings, .. } = st.vm.heap.env_mut(env) {
            bindings.insert(
                name,
                Binding {
                    value,
                    mutable: true,
                    lexical: true,
                },
            );
        }
        Ok(())
    } else {
        initialize_global_variable(st, name, value);
        Ok(())
    }
}

fn delete_by_name(st: &mut ExecState<'_>, name: Atom) -> bool {
    match find_name(st, name) {
        Some(NameSlot::WithObject(obj)) => {
            let key = PropertyKey::Atom(name);
            st.vm.delete_own_property(obj, &key)
        }
        Some(NameSlot::Global) => {
            let key = PropertyKey::Atom(name);
            st.vm.delete_own_property(st.realm.global, &key)
        }
        Some(_) => false,
        None => true,
    }
}

// Global variable cache

fn get_global_variable(st: &mut ExecState<'_>, cache: u16) -> Result<Value, Value> {
    let (atom, cached) = {
        let frame = top(st);
        let atom = frame.block.global_cache_atoms[cache as usize];
        let cached = frame.block.global_caches.borrow()[cache as usize];
        (atom, cached)
    };
    // Script-level lexicals shadow the global object.
    let global_lexical = st.realm.global_lexical;
    if let EnvRecord::Named { bindings, .. } = st.vm.heap.env(global_lexical) {
        if let Some(b) = bindings.get(&atom) {
            if b.value.is_empty() {
                let text = st.vm.atoms.name(atom).to_string();
                return Err(st.throw_reference_error(&format!(
                    "Cannot access '{}' before initialization",
                    text
                )));
            }
            return Ok(b.value);
        }
    }

    let global = st.realm.global;
    if let Some(shape) = cached.shape {
        if st.vm.heap.object(global).shape == shape {
            if let PropertySlot::Data(v) = st.vm.heap.object(global).slots[cached.slot as usize] {
                return Ok(v);
            }
        }
    }
    // Generic lookup; refresh the cache on a plain data hit.
    let key = PropertyKey::Atom(atom);
    let shape = st.vm.heap.object(global).shape;
    if let Some((slot_idx, attrs)) = st.vm.shapes.lookup(shape, &key) {
        if !attrs.is_accessor() {
            let frame = top(st);
            let mut caches = frame.block.global_caches.borrow_mut();
            caches[cache as usize].shape = Some(shape);
            caches[cache as usize].slot = slot_idx;
            drop(caches);
            if let PropertySlot::Data(v) = st.vm.heap.object(global).slots[slot_idx as usize] {
                return Ok(v);
            }
        }
    }
    if st.vm.has_property(global, &key) {
        return get_object_property(st, global, &key, Value::object(global));
    }
    let text = st.vm.atoms.name(atom).to_string();
    Err(st.throw_reference_error(&format!("{} is not defined", text)))
}

fn set_global_variable(st: &mut ExecState<'_>, cache: u16, value: Value) -> Result<(), Value> {
    let (atom, cached, strict) = {
        let frame = top(st);
        (
            frame.block.global_cache_atoms[cache as usize],
            frame.block.global_caches.borrow()[cache as usize],
            frame.block.is_strict(),
        )
    };
    let global_lexical = st.realm.global_lexical;
    if let EnvRecord::Named { bindings, .. } = st.vm.heap.env(global_lexical) {
        if bindings.contains_key(&atom) {
            return store_to_named_record(st, global_lexical, atom, value);
        }
    }

    let global = st.realm.global;
    if let Some(shape) = cached.shape {
        if st.vm.heap.object(global).shape == shape {
            let attrs_writable = {
                let key = PropertyKey::Atom(atom);
                st.vm
                    .shapes
                    .lookup(shape, &key)
                    .map(|(_, a)| a.is_writable())
                    .unwrap_or(false)
            };
            if attrs_writable {
                st.vm.heap.object_mut(global).slots[cached.slot as usize] =
                    PropertySlot::Data(value);
                return Ok(());
            }
        }
    }
    let key = PropertyKey::Atom(atom);
    if !st.vm.has_property(global, &key) && strict {
        let text = st.vm.atoms.name(atom).to_string();
        return Err(st.throw_reference_error(&format!("{} is not defined", text)));
    }
    set_object_property(st, global, &key, value, strict)?;
    // Refresh for subsequent hits.
    let shape = st.vm.heap.object(global).shape;
    if let Some((slot_idx, attrs)) = st.vm.shapes.lookup(shape, &key) {
        if !attrs.is_accessor() {
            let frame = top(st);
            let mut caches = frame.block.global_caches.borrow_mut();
            caches[cache as usize].shape = Some(shape);
            caches[cache as usize].slot = slot_idx;
        }
    }
    Ok(())
}

/// Define-or-refresh a global var binding. A hoisting write of
/// `undefined` keeps an existing value (redeclaration across scripts);
/// a definite value (function declaration) overwrites.
fn initialize_global_variable(st: &mut ExecState<'_>, name: Atom, value: Value) {
    let global = st.realm.global;
    let key = PropertyKey::Atom(name);
    let exists = st.vm.get_own_property(global, &key).is_some();
    if !exists {
        st.vm.define_own_property(
            global,
            key,
            PropertyDescriptor::data(
                value,
                PropertyAttributes::WRITABLE | PropertyAttributes::ENUMERABLE,
            ),
        );
    } else if !value.is_undefined() {
        let mut desc = PropertyDescriptor::default();
        desc.value = Some(value);
        st.vm.define_own_property(global, key, desc);
    }
}

// Environment slot access

fn heap_slot(st: &mut ExecState<'_>, upper: u16, slot: u16) -> Result<Value, Value> {
    let mut cursor = top(st).env;
    for _ in 0..upper {
        cursor = cursor.and_then(|e| st.vm.heap.env(e).parent());
    }
    let env = cursor.expect("heap index out of range");
    match st.vm.heap.env(env) {
        EnvRecord::Declarative { slots, .. } => Ok(slots[slot as usize]),
        _ => unreachable!("heap-indexed access against a non-declarative record"),
    }
}

fn set_heap_slot(st: &mut ExecState<'_>, upper: u16, slot: u16, value: Value) {
    let mut cursor = top(st).env;
    for _ in 0..upper {
        cursor = cursor.and_then(|e| st.vm.heap.env(e).parent());
    }
    let env = cursor.expect("heap index out of range");
    if let EnvRecord::Declarative { slots, .. } = st.vm.heap.env_mut(env) {
        slots[slot as usize] = value;
    }
}
