//! Embedding surface
//!
//! - `Globals`: process-wide lifecycle hooks.
//! - `VmInstance`: a shareable engine instance owning the atom table,
//!   the shape tree, the symbol registry, the heap and the promise job
//!   queue.
//! - `Context`: a realm with its own global object and module registry.
//! - `Script`: a compiled chunk ready to execute.
//! - `Platform`: the host-provided module loader.
//!
//! During execution everything runs against an `ExecState`, which
//! borrows the instance and realm mutably and owns the frame stack.
//! Thrown script values travel as `Err(Value)` through the engine and
//! surface here with a captured stack trace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::atom::{Atom, AtomTable, WellKnown};
use crate::bytecode::codeblock::CodeBlock;
use crate::bytecode::emitter::{self, CompileGoal};
use crate::gc::{Heap, MemoryStats, RootSet};
use crate::parser::lexer::line_column;
use crate::parser::parser::Parser;
use crate::runtime::object::ErrorKind;
use crate::runtime::shape::ShapeTree;
use crate::value::{EnvRef, ObjectRef, SymbolRef, Value};
use crate::vm::interpreter::Frame;
use crate::vm::jobs::Job;

/// Process-wide lifecycle. The engine keeps no process-global state, so
/// these exist for embedder symmetry with instance/context creation.
pub struct Globals;

impl Globals {
    pub fn initialize() {}
    pub fn finalize() {}
}

/// Well-known symbols, registered at instance creation.
pub struct WellKnownSymbols {
    pub iterator: SymbolRef,
    pub to_primitive: SymbolRef,
    pub species: SymbolRef,
    pub is_concat_spreadable: SymbolRef,
    pub to_string_tag: SymbolRef,
    pub split: SymbolRef,
}

/// Symbol registry: descriptions live for the VM's lifetime.
pub struct SymbolRegistry {
    descriptions: Vec<Option<String>>,
}

impl SymbolRegistry {
    fn new() -> Self {
        SymbolRegistry {
            descriptions: Vec::new(),
        }
    }

    pub fn create(&mut self, description: Option<String>) -> SymbolRef {
        self.descriptions.push(description);
        SymbolRef((self.descriptions.len() - 1) as u32)
    }

    pub fn description(&self, s: SymbolRef) -> Option<&str> {
        self.descriptions[s.0 as usize].as_deref()
    }
}

/// A shareable engine instance: atom table, shape tree, symbols, heap,
/// and the promise job queue. Single-threaded; embedders serialize.
pub struct VmInstance {
    pub atoms: AtomTable,
    pub wk: WellKnown,
    pub shapes: ShapeTree,
    pub symbols: SymbolRegistry,
    pub wk_symbols: WellKnownSymbols,
    pub heap: Heap,
    pub jobs: VecDeque<Job>,
    pub platform: Option<Rc<dyn Platform>>,
}

impl VmInstance {
    pub fn new(platform: Rc<dyn Platform>) -> Self {
        let mut vm = Self::new_bare();
        vm.platform = Some(platform);
        vm
    }

    /// An instance without a platform; module loads fail.
    pub fn new_bare() -> Self {
        let (atoms, wk) = AtomTable::new();
        let mut symbols = SymbolRegistry::new();
        let wk_symbols = WellKnownSymbols {
            iterator: symbols.create(Some("Symbol.iterator".into())),
            to_primitive: symbols.create(Some("Symbol.toPrimitive".into())),
            species: symbols.create(Some("Symbol.species".into())),
            is_concat_spreadable: symbols.create(Some("Symbol.isConcatSpreadable".into())),
            to_string_tag: symbols.create(Some("Symbol.toStringTag".into())),
            split: symbols.create(Some("Symbol.split".into())),
        };
        VmInstance {
            atoms,
            wk,
            shapes: ShapeTree::new(),
            symbols,
            wk_symbols,
            heap: Heap::new(),
            jobs: VecDeque::new(),
            platform: None,
        }
    }

    pub fn has_pending_promise_job(&self) -> bool {
        !self.jobs.is_empty()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.heap.stats()
    }
}

/// Per-realm intrinsics. All handles point into the instance heap.
pub struct Realm {
    pub global: ObjectRef,
    /// Top-level `let`/`const` of scripts live here.
    pub global_lexical: EnvRef,

    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    pub number_prototype: ObjectRef,
    pub boolean_prototype: ObjectRef,
    pub symbol_prototype: ObjectRef,
    pub iterator_prototype: ObjectRef,
    pub array_iterator_prototype: ObjectRef,
    pub string_iterator_prototype: ObjectRef,
    pub promise_prototype: ObjectRef,
    pub error_prototypes: [ObjectRef; 7],

    pub object_constructor: ObjectRef,
    pub array_constructor: ObjectRef,
    pub promise_constructor: ObjectRef,
    pub eval_function: ObjectRef,
}

impl Realm {
    pub fn error_prototype(&self, kind: ErrorKind) -> ObjectRef {
        let idx = match kind {
            ErrorKind::Error => 0,
            ErrorKind::TypeError => 1,
            ErrorKind::RangeError => 2,
            ErrorKind::ReferenceError => 3,
            ErrorKind::SyntaxError => 4,
            ErrorKind::UriError => 5,
            ErrorKind::EvalError => 6,
        };
        self.error_prototypes[idx]
    }
}

// Modules

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Evaluating,
    Evaluated,
}

pub struct ModuleRecord {
    pub name: Rc<str>,
    pub block: Rc<CodeBlock>,
    pub namespace: ObjectRef,
    pub env: Option<EnvRef>,
    pub state: ModuleState,
}

/// Per-context module map, keyed by the name the platform resolved.
#[derive(Default)]
pub struct ModuleRegistry {
    pub by_name: FxHashMap<String, usize>,
    pub records: Vec<ModuleRecord>,
}

/// Host-provided module loading.
pub trait Platform {
    /// Resolve and read a module. The host is responsible for
    /// de-duplicating by absolute path; the returned `name` keys the
    /// context's module registry.
    fn on_load_module(
        &self,
        referrer: Option<&str>,
        specifier: &str,
    ) -> Result<ModuleSource, ModuleLoadError>;

    /// Post-load notification, e.g. for cache population.
    fn did_load_module(&self, _referrer: Option<&str>, _name: &str) {}
}

pub struct ModuleSource {
    pub source: String,
    pub name: String,
}

#[derive(Debug)]
pub struct ModuleLoadError {
    pub code: i32,
    pub message: String,
}

// Errors surfaced to the embedder

/// Parse or compile failure.
#[derive(Debug)]
pub struct ScriptError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxError: {} (line {})", self.message, self.line)
    }
}

impl std::error::Error for ScriptError {}

/// One frame of a captured stack trace.
#[derive(Debug, Clone)]
pub struct StackEntry {
    pub src: String,
    pub line: u32,
    pub column: u32,
}

/// A script-thrown value as seen by the embedder.
#[derive(Debug)]
pub struct ThrownError {
    pub value: Value,
    pub message: String,
    pub stack: Vec<StackEntry>,
}

impl std::fmt::Display for ThrownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ThrownError {}

/// A compiled chunk bound to its source.
#[derive(Debug)]
pub struct Script {
    pub block: Rc<CodeBlock>,
    pub name: Rc<str>,
    pub is_module: bool,
}

impl Script {
    pub fn execute(&self, ctx: &mut Context) -> Result<Value, ThrownError> {
        ctx.execute(self)
    }
}

/// Execution state: the instance and realm borrowed for the duration of
/// one evaluation, plus the engine-owned frame stack.
pub struct ExecState<'a> {
    pub vm: &'a mut VmInstance,
    pub realm: &'a mut Realm,
    pub modules: &'a mut ModuleRegistry,
    pub frames: Vec<Frame>,
    /// Receivers currently inside a known-recursive builtin
    /// (`join`/`toString` of self-referential collections).
    pub recursion_guard: Vec<ObjectRef>,
    /// Rust-side nesting of interpreter entries, bounded to keep native
    /// stack overflows as thrown RangeErrors.
    pub call_depth: usize,
    /// Extra roots builtins keep alive across allocations.
    pub scratch_roots: Vec<Value>,
}

pub const MAX_CALL_DEPTH: usize = 512;

impl<'a> ExecState<'a> {
    /// Construct an error object of `kind` and return it as a thrown
    /// value, with the current stack captured.
    pub fn make_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        let stack = self.capture_stack();
        crate::builtins::error::create_error(self, kind, message, stack)
    }

    pub fn throw_type_error(&mut self, message: &str) -> Value {
        self.make_error(ErrorKind::TypeError, message)
    }

    pub fn throw_range_error(&mut self, message: &str) -> Value {
        self.make_error(ErrorKind::RangeError, message)
    }

    pub fn throw_reference_error(&mut self, message: &str) -> Value {
        self.make_error(ErrorKind::ReferenceError, message)
    }

    pub fn capture_stack(&self) -> Vec<StackEntry> {
        let mut entries = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let offset = frame.block.source_map.resolve(frame.pc as u32);
            let (line, column) = line_column(&frame.block.source, offset);
            entries.push(StackEntry {
                src: frame.block.source_name.to_string(),
                line,
                column,
            });
        }
        entries
    }

    pub fn atom(&mut self, s: &str) -> Atom {
        self.vm.atoms.intern(s)
    }

    /// Run a collection cycle with every live engine root.
    pub fn collect_garbage(&mut self) {
        let mut roots = RootSet::default();
        collect_realm_roots(self.realm, &mut roots);
        for record in &self.modules.records {
            roots.objects.push(record.namespace);
            if let Some(env) = record.env {
                roots.envs.push(env);
            }
            collect_block_roots(&record.block, &mut roots);
        }
        for frame in &self.frames {
            for v in frame.temps.iter().chain(&frame.locals).chain(&frame.args) {
                roots.push_value(*v);
            }
            roots.push_value(frame.this);
            if let Some(env) = frame.env {
                roots.envs.push(env);
            }
            if let Some(f) = frame.function {
                roots.objects.push(f);
            }
            if let Some(a) = frame.arguments_object {
                roots.objects.push(a);
            }
            collect_block_roots(&frame.block, &mut roots);
        }
        for job in &self.vm.jobs {
            job.trace(&mut roots);
        }
        for obj in &self.recursion_guard {
            roots.objects.push(*obj);
        }
        for v in &self.scratch_roots {
            roots.push_value(*v);
        }
        self.vm.heap.collect(&roots);
    }
}

fn collect_realm_roots(realm: &Realm, roots: &mut RootSet) {
    roots.objects.push(realm.global);
    roots.envs.push(realm.global_lexical);
    roots.objects.extend([
        realm.object_prototype,
        realm.function_prototype,
        realm.array_prototype,
        realm.string_prototype,
        realm.number_prototype,
        realm.boolean_prototype,
        realm.symbol_prototype,
        realm.iterator_prototype,
        realm.array_iterator_prototype,
        realm.string_iterator_prototype,
        realm.promise_prototype,
        realm.object_constructor,
        realm.array_constructor,
        realm.promise_constructor,
        realm.eval_function,
    ]);
    roots.objects.extend(realm.error_prototypes);
}

fn collect_block_roots(block: &Rc<CodeBlock>, roots: &mut RootSet) {
    for v in &block.constants {
        roots.push_value(*v);
    }
    for inner in &block.inner {
        collect_block_roots(inner, roots);
    }
}

/// A realm: global object, intrinsics, and module registry, bound to a
/// shared instance.
pub struct Context {
    pub vm: Rc<RefCell<VmInstance>>,
    pub realm: Realm,
    pub modules: ModuleRegistry,
    /// Executed scripts, kept so their constant pools stay rooted.
    retained_scripts: Vec<Rc<CodeBlock>>,
}

impl Context {
    pub fn new(vm: Rc<RefCell<VmInstance>>) -> Self {
        let realm = {
            let vm = &mut *vm.borrow_mut();
            crate::builtins::install_realm(vm)
        };
        Context {
            vm,
            realm,
            modules: ModuleRegistry::default(),
            retained_scripts: Vec::new(),
        }
    }

    /// Parse and compile a chunk. Errors carry position information.
    pub fn initialize_script(
        &mut self,
        source: &str,
        name: &str,
        is_module: bool,
    ) -> Result<Script, ScriptError> {
        let program = Parser::new(source, is_module)
            .parse_program()
            .map_err(|e| {
                let (line, column) = line_column(source, e.pos);
                ScriptError {
                    message: e.message,
                    line,
                    column,
                }
            })?;
        let name_rc: Rc<str> = name.into();
        let source_rc: Rc<str> = source.into();
        let goal = if is_module {
            CompileGoal::Module
        } else {
            CompileGoal::Script
        };
        let vm = &mut *self.vm.borrow_mut();
        let block = emitter::compile(vm, &program, name_rc.clone(), source_rc, goal)
            .map_err(|e| {
                let (line, column) = line_column(source, e.pos);
                ScriptError {
                    message: e.message,
                    line,
                    column,
                }
            })?;
        Ok(Script {
            block,
            name: name_rc,
            is_module,
        })
    }

    pub fn execute(&mut self, script: &Script) -> Result<Value, ThrownError> {
        self.retained_scripts.push(script.block.clone());
        let vm = self.vm.clone();
        let vm = &mut *vm.borrow_mut();
        let mut st = ExecState {
            vm,
            realm: &mut self.realm,
            modules: &mut self.modules,
            frames: Vec::new(),
            recursion_guard: Vec::new(),
            call_depth: 0,
            scratch_roots: Vec::new(),
        };
        let result = if script.is_module {
            crate::vm::interpreter::evaluate_module(
                &mut st,
                &script.name,
                script.block.clone(),
            )
            .map(|_| Value::undefined())
        } else {
            crate::vm::interpreter::run_program(&mut st, script.block.clone())
        };
        result.map_err(|thrown| describe_thrown(&mut st, thrown))
    }

    /// Convenience: parse, compile and run in one step.
    pub fn eval(&mut self, source: &str) -> Result<Value, EvalError> {
        let script = self
            .initialize_script(source, "<eval>", false)
            .map_err(EvalError::Parse)?;
        self.execute(&script).map_err(EvalError::Thrown)
    }

    /// Drain one pending promise job. Returns false when idle.
    pub fn execute_pending_promise_job(&mut self) -> Result<bool, ThrownError> {
        let vm = self.vm.clone();
        let vm = &mut *vm.borrow_mut();
        let Some(job) = vm.jobs.pop_front() else {
            return Ok(false);
        };
        let mut st = ExecState {
            vm,
            realm: &mut self.realm,
            modules: &mut self.modules,
            frames: Vec::new(),
            recursion_guard: Vec::new(),
            call_depth: 0,
            scratch_roots: Vec::new(),
        };
        match crate::vm::jobs::run_job(&mut st, job) {
            Ok(()) => Ok(true),
            Err(thrown) => Err(describe_thrown(&mut st, thrown)),
        }
    }

    /// Run all queued jobs to completion, FIFO, never preempting.
    pub fn drain_job_queue(&mut self) -> Result<(), ThrownError> {
        while self.execute_pending_promise_job()? {}
        Ok(())
    }

    pub fn collect_garbage(&mut self) {
        let vm = self.vm.clone();
        let vm = &mut *vm.borrow_mut();
        // Retained scripts root their constant pools through the
        // scratch list.
        let mut script_roots = RootSet::default();
        for block in &self.retained_scripts {
            collect_block_roots(block, &mut script_roots);
        }
        let mut st = ExecState {
            vm,
            realm: &mut self.realm,
            modules: &mut self.modules,
            frames: Vec::new(),
            recursion_guard: Vec::new(),
            call_depth: 0,
            scratch_roots: script_roots.values,
        };
        st.collect_garbage();
    }

    /// Render a value the way the shell prints results.
    pub fn display_value(&mut self, value: Value) -> String {
        let vm = self.vm.clone();
        let vm = &mut *vm.borrow_mut();
        let mut st = ExecState {
            vm,
            realm: &mut self.realm,
            modules: &mut self.modules,
            frames: Vec::new(),
            recursion_guard: Vec::new(),
            call_depth: 0,
            scratch_roots: Vec::new(),
        };
        crate::runtime::conversion::value_to_display(&mut st, value)
    }
}

/// Result of `Context::eval`.
#[derive(Debug)]
pub enum EvalError {
    Parse(ScriptError),
    Thrown(ThrownError),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Parse(e) => write!(f, "{}", e),
            EvalError::Thrown(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EvalError {}

fn describe_thrown(st: &mut ExecState<'_>, thrown: Value) -> ThrownError {
    let message = crate::runtime::conversion::describe_error_value(st, thrown);
    let stack = crate::builtins::error::stack_of(st, thrown).unwrap_or_default();
    ThrownError {
        value: thrown,
        message,
        stack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn context() -> Context {
        Context::new(Rc::new(RefCell::new(VmInstance::new_bare())))
    }

    fn eval_num(ctx: &mut Context, src: &str) -> f64 {
        let v = ctx.eval(src).unwrap_or_else(|e| panic!("{}: {}", src, e));
        v.as_number().unwrap_or_else(|| panic!("{}: not a number: {:?}", src, v))
    }

    fn eval_bool(ctx: &mut Context, src: &str) -> bool {
        let v = ctx.eval(src).unwrap_or_else(|e| panic!("{}: {}", src, e));
        v.as_bool().unwrap_or_else(|| panic!("{}: not a boolean: {:?}", src, v))
    }

    fn eval_str(ctx: &mut Context, src: &str) -> String {
        let v = ctx.eval(src).unwrap_or_else(|e| panic!("{}: {}", src, e));
        assert!(v.is_string(), "{}: not a string: {:?}", src, v);
        ctx.display_value(v)
    }

    fn eval_err(ctx: &mut Context, src: &str) -> String {
        match ctx.eval(src) {
            Ok(v) => panic!("{}: expected throw, got {:?}", src, v),
            Err(EvalError::Thrown(e)) => e.message,
            Err(EvalError::Parse(e)) => format!("SyntaxError: {}", e.message),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        let mut ctx = context();
        assert_eq!(eval_num(&mut ctx, "2 + 3 * 4"), 14.0);
        assert_eq!(eval_num(&mut ctx, "(2 + 3) * 4"), 20.0);
        assert_eq!(eval_num(&mut ctx, "2 ** 3 ** 2"), 512.0);
        assert_eq!(eval_num(&mut ctx, "7 % 4"), 3.0);
        assert_eq!(eval_num(&mut ctx, "-3 >>> 0"), 4294967293.0);
    }

    #[test]
    fn variables_and_functions() {
        let mut ctx = context();
        assert_eq!(
            eval_num(&mut ctx, "function add(a, b) { return a + b; } add(10, 20)"),
            30.0
        );
        assert_eq!(
            eval_num(
                &mut ctx,
                "function fac(n) { return n < 2 ? 1 : n * fac(n - 1); } fac(5)"
            ),
            120.0
        );
    }

    #[test]
    fn closures_capture_by_reference() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "function counter() { var n = 0; return function () { n = n + 1; return n; }; }
                 var c = counter(); c(); c(); c()"
            ),
            3.0
        );
    }

    #[test]
    fn block_scoping_uses_distinct_slots() {
        let mut ctx = context();
        // The inner x has its own slot; the outer one is untouched.
        assert_eq!(
            eval_num(
                &mut ctx,
                "function f() { let x = 1; { let x = 2; return x; } } f()"
            ),
            2.0
        );
        assert_eq!(
            eval_num(
                &mut ctx,
                "function g() { let x = 1; { let x = 2; } return x; } g()"
            ),
            1.0
        );
    }

    #[test]
    fn const_assignment_is_a_static_type_error() {
        let mut ctx = context();
        let msg = eval_err(&mut ctx, "const c = 1; c = 2;");
        assert!(msg.contains("TypeError"), "{}", msg);
        assert!(msg.contains("constant"), "{}", msg);
    }

    #[test]
    fn tdz_read_is_a_reference_error() {
        let mut ctx = context();
        let msg = eval_err(&mut ctx, "function f() { x; let x = 1; } f()");
        assert!(msg.contains("ReferenceError"), "{}", msg);
    }

    #[test]
    fn sparse_write_grows_length_and_enumerates_in_order() {
        let mut ctx = context();
        assert_eq!(
            eval_num(&mut ctx, "var a = [1, 2, 3]; a[10] = 99; a.length"),
            11.0
        );
        assert_eq!(
            eval_str(
                &mut ctx,
                "var keys = []; for (var k in a) { keys.push(k); } keys.join(',')"
            ),
            "0,1,2,10"
        );
    }

    #[test]
    fn map_preserves_holes() {
        let mut ctx = context();
        assert_eq!(
            eval_num(&mut ctx, "var m = [1,,3].map(function (x) { return x * 2; }); m.length"),
            3.0
        );
        assert_eq!(eval_bool(&mut ctx, "0 in m"), true);
        assert_eq!(eval_bool(&mut ctx, "1 in m"), false);
        assert_eq!(eval_num(&mut ctx, "m[0]"), 2.0);
        assert_eq!(eval_num(&mut ctx, "m[2]"), 6.0);
    }

    #[test]
    fn replace_substitutions() {
        let mut ctx = context();
        assert_eq!(eval_str(&mut ctx, "'abc'.replace('b', '$&$&')"), "abbc");
        assert_eq!(
            eval_str(
                &mut ctx,
                "'abc'.replace('b', function (m) { return m + m; })"
            ),
            "abbc"
        );
        // No capture group 1 exists in a string search.
        assert_eq!(eval_str(&mut ctx, "'a'.replace('a', '$01')"), "$01");
        assert_eq!(eval_str(&mut ctx, "'abc'.replace('b', \"[$`|$']\")"), "a[a|c]c");
    }

    #[test]
    fn promise_jobs_drain_in_fifo_order() {
        let mut ctx = context();
        ctx.eval("var q; var p = new Promise(function (r) { r(1); }); p.then(function (v) { q = v; });")
            .unwrap();
        // Nothing runs until the queue drains.
        assert!(eval_bool(&mut ctx, "q === undefined"));
        ctx.drain_job_queue().unwrap();
        assert_eq!(eval_num(&mut ctx, "q"), 1.0);

        ctx.eval(
            "var order = []; \
             Promise.resolve('a').then(function (v) { order.push(v); }); \
             Promise.resolve('b').then(function (v) { order.push(v); });",
        )
        .unwrap();
        ctx.drain_job_queue().unwrap();
        assert_eq!(eval_str(&mut ctx, "order.join('')"), "ab");
    }

    #[test]
    fn try_catch_finally_ordering() {
        let mut ctx = context();
        assert_eq!(
            eval_str(
                &mut ctx,
                "var log = [];
                 function f() {
                   try { log.push('t'); throw new Error('x'); }
                   catch (e) { log.push('c'); }
                   finally { log.push('f'); }
                   return log.join('');
                 }
                 f()"
            ),
            "tcf"
        );
        assert_eq!(
            eval_num(
                &mut ctx,
                "function g() { try { return 1; } finally { h = 2; } } var h = 0; g() + h"
            ),
            3.0
        );
    }

    #[test]
    fn thrown_values_unwind_to_the_embedder() {
        let mut ctx = context();
        let msg = eval_err(&mut ctx, "throw new TypeError('boom')");
        assert!(msg.contains("TypeError"), "{}", msg);
        assert!(msg.contains("boom"), "{}", msg);
        let msg = eval_err(&mut ctx, "undefinedName");
        assert!(msg.contains("ReferenceError"), "{}", msg);
    }

    #[test]
    fn define_get_own_property_round_trip() {
        let mut ctx = context();
        assert_eq!(
            eval_str(
                &mut ctx,
                "var o = {};
                 Object.defineProperty(o, 'x', { value: 7, writable: false, enumerable: true });
                 var d = Object.getOwnPropertyDescriptor(o, 'x');
                 [d.value, d.writable, d.enumerable, d.configurable].join(',')"
            ),
            "7,false,true,false"
        );
    }

    #[test]
    fn non_writable_write_throws_only_in_strict_mode() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "var o = {}; Object.defineProperty(o, 'x', { value: 1 }); o.x = 5; o.x"
            ),
            1.0
        );
        let msg = eval_err(
            &mut ctx,
            "'use strict'; var p = {}; Object.defineProperty(p, 'x', { value: 1 }); p.x = 5;",
        );
        assert!(msg.contains("TypeError"), "{}", msg);
    }

    #[test]
    fn radix_to_string_round_trips_via_parse_int() {
        let mut ctx = context();
        assert!(eval_bool(
            &mut ctx,
            "var ok = true;
             var values = [0, 1, 7, 255, 4096, 123456789];
             var radixes = [2, 8, 16, 36];
             for (var i = 0; i < values.length; i++)
               for (var j = 0; j < radixes.length; j++)
                 if (parseInt(values[i].toString(radixes[j]), radixes[j]) !== values[i]) ok = false;
             ok"
        ));
        assert_eq!(eval_str(&mut ctx, "(255).toString(16)"), "ff");
    }

    #[test]
    fn slice_and_concat_produce_structural_copies() {
        let mut ctx = context();
        assert!(eval_bool(
            &mut ctx,
            "var a = [1, 2, 3];
             var b = a.slice(0, a.length);
             var c = a.concat();
             b !== a && c !== a && b.length === 3 && c.length === 3 &&
               b[0] === 1 && b[2] === 3 && c[0] === 1 && c[2] === 3"
        ));
    }

    #[test]
    fn array_methods_skip_holes() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "var calls = 0; [1,,3].forEach(function () { calls++; }); calls"
            ),
            2.0
        );
        assert_eq!(eval_num(&mut ctx, "[1,,3].reduce(function (a, b) { return a + b; })"), 4.0);
        assert_eq!(eval_str(&mut ctx, "[1,,3].join('-')"), "1--3");
    }

    #[test]
    fn sort_is_stable_with_undefined_last() {
        let mut ctx = context();
        assert_eq!(
            eval_str(&mut ctx, "[3, 1, 2].sort().join(',')"),
            "1,2,3"
        );
        assert_eq!(
            eval_str(&mut ctx, "[10, 9, 1].sort().join(',')"),
            "1,10,9"
        );
        assert_eq!(
            eval_str(
                &mut ctx,
                "var s = [undefined, 2, 1].sort(); [s[0], s[1], String(s[2])].join(',')"
            ),
            "1,2,undefined"
        );
        assert_eq!(
            eval_str(
                &mut ctx,
                "[5, 1, 4].sort(function (a, b) { return b - a; }).join(',')"
            ),
            "5,4,1"
        );
    }

    #[test]
    fn species_drives_derived_construction() {
        let mut ctx = context();
        assert!(eval_bool(
            &mut ctx,
            "var a = [1, 2]; a.constructor = null; \
             var threw = false; \
             try { a.map(function (x) { return x; }); } catch (e) { threw = true; } \
             threw"
        ));
    }

    #[test]
    fn concat_spreadable_protocol() {
        let mut ctx = context();
        assert_eq!(
            eval_str(&mut ctx, "[1].concat([2, 3], 4).join(',')"),
            "1,2,3,4"
        );
        assert_eq!(
            eval_num(
                &mut ctx,
                "var fake = { length: 2, 0: 'a', 1: 'b' };
                 fake[Symbol.isConcatSpreadable] = true;
                 [].concat(fake).length"
            ),
            2.0
        );
    }

    #[test]
    fn for_of_uses_the_iterator_protocol() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "var total = 0; for (var v of [1, 2, 3]) { total += v; } total"
            ),
            6.0
        );
        assert_eq!(
            eval_str(
                &mut ctx,
                "var out = []; for (var c of 'ab') { out.push(c); } out.join('|')"
            ),
            "a|b"
        );
    }

    #[test]
    fn string_clamping_rules() {
        let mut ctx = context();
        assert_eq!(eval_str(&mut ctx, "'hello'.substring(3, 1)"), "el");
        assert_eq!(eval_str(&mut ctx, "'hello'.substring(-5, 2)"), "he");
        assert_eq!(eval_str(&mut ctx, "'hello'.substr(-3)"), "llo");
        assert_eq!(eval_str(&mut ctx, "'hello'.substr(1, 2)"), "el");
        assert_eq!(eval_str(&mut ctx, "'a,b,,c'.split(',').join('|')"), "a|b||c");
    }

    #[test]
    fn getters_and_setters() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "var backing = 10;
                 var o = { get x() { return backing; }, set x(v) { backing = v * 2; } };
                 o.x = 5; o.x"
            ),
            10.0
        );
    }

    #[test]
    fn classes_with_inheritance() {
        let mut ctx = context();
        assert_eq!(
            eval_str(
                &mut ctx,
                "class Animal {
                   constructor(name) { this.name = name; }
                   speak() { return this.name + ' makes a sound'; }
                 }
                 class Dog extends Animal {
                   constructor(name) { super(name); }
                   speak() { return this.name + ' barks'; }
                 }
                 new Dog('rex').speak()"
            ),
            "rex barks"
        );
        assert!(eval_bool(&mut ctx, "new Dog('a') instanceof Animal"));
    }

    #[test]
    fn with_scope_shadows_dynamically() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "var x = 1; var o = { x: 2 }; var r; with (o) { r = x; } r"
            ),
            2.0
        );
    }

    #[test]
    fn direct_eval_reads_and_writes_the_caller_scope() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "function f() { var a = 5; return eval('a + 1'); } f()"
            ),
            6.0
        );
        assert_eq!(
            eval_num(
                &mut ctx,
                "function g() { eval('var b = 7;'); return b; } g()"
            ),
            7.0
        );
    }

    #[test]
    fn arguments_object_materializes_lazily() {
        let mut ctx = context();
        assert_eq!(
            eval_num(&mut ctx, "function f() { return arguments.length; } f(1, 2, 3)"),
            3.0
        );
        assert_eq!(
            eval_num(&mut ctx, "function g() { return arguments[1]; } g(5, 6)"),
            6.0
        );
    }

    #[test]
    fn default_and_rest_parameters_force_generic_records() {
        let mut ctx = context();
        assert_eq!(eval_num(&mut ctx, "function f(a, b = a + 1) { return b; } f(4)"), 5.0);
        assert_eq!(
            eval_num(&mut ctx, "function g(first, ...rest) { return rest.length; } g(1, 2, 3)"),
            2.0
        );
    }

    #[test]
    fn switch_matches_strictly() {
        let mut ctx = context();
        assert_eq!(
            eval_str(
                &mut ctx,
                "function kind(v) {
                   switch (v) {
                     case 1: return 'one';
                     case '1': return 'string one';
                     default: return 'other';
                   }
                 }
                 kind(1) + '/' + kind('1') + '/' + kind(2)"
            ),
            "one/string one/other"
        );
    }

    #[test]
    fn equality_flavors() {
        let mut ctx = context();
        assert!(eval_bool(&mut ctx, "0 === -0"));
        assert!(eval_bool(&mut ctx, "NaN !== NaN"));
        assert!(eval_bool(&mut ctx, "[NaN].includes(NaN)"));
        assert!(eval_bool(&mut ctx, "[NaN].indexOf(NaN) === -1"));
        assert!(eval_bool(&mut ctx, "1 == '1'"));
        assert!(eval_bool(&mut ctx, "null == undefined"));
        assert!(eval_bool(&mut ctx, "null !== undefined"));
    }

    #[test]
    fn typeof_table() {
        let mut ctx = context();
        assert_eq!(eval_str(&mut ctx, "typeof undefined"), "undefined");
        assert_eq!(eval_str(&mut ctx, "typeof null"), "object");
        assert_eq!(eval_str(&mut ctx, "typeof 1"), "number");
        assert_eq!(eval_str(&mut ctx, "typeof 'a'"), "string");
        assert_eq!(eval_str(&mut ctx, "typeof {}"), "object");
        assert_eq!(eval_str(&mut ctx, "typeof function () {}"), "function");
        assert_eq!(eval_str(&mut ctx, "typeof neverDeclared"), "undefined");
    }

    #[test]
    fn prototype_chain_mutation_is_observed() {
        let mut ctx = context();
        assert_eq!(
            eval_num(
                &mut ctx,
                "var proto = { y: 3 }; var o = Object.create(proto); o.y"
            ),
            3.0
        );
        assert_eq!(
            eval_num(&mut ctx, "proto.y = 4; o.y"),
            4.0
        );
    }

    // Modules

    struct MapPlatform {
        modules: FxHashMap<String, String>,
    }

    impl Platform for MapPlatform {
        fn on_load_module(
            &self,
            _referrer: Option<&str>,
            specifier: &str,
        ) -> Result<ModuleSource, ModuleLoadError> {
            match self.modules.get(specifier) {
                Some(source) => Ok(ModuleSource {
                    source: source.clone(),
                    name: specifier.to_string(),
                }),
                None => Err(ModuleLoadError {
                    code: 3,
                    message: format!("module not found: {}", specifier),
                }),
            }
        }
    }

    fn module_context(modules: &[(&str, &str)]) -> Context {
        let mut map = FxHashMap::default();
        for (name, source) in modules {
            map.insert(name.to_string(), source.to_string());
        }
        let platform: Rc<dyn Platform> = Rc::new(MapPlatform { modules: map });
        Context::new(Rc::new(RefCell::new(VmInstance::new(platform))))
    }

    #[test]
    fn module_imports_and_exports() {
        let mut ctx = module_context(&[(
            "math",
            "export const twice = 2; export function double(x) { return x * twice; }",
        )]);
        let script = ctx
            .initialize_script(
                "import { double } from 'math'; globalThis.result = double(21);",
                "main",
                true,
            )
            .unwrap();
        script.execute(&mut ctx).unwrap();
        assert_eq!(eval_num(&mut ctx, "result"), 42.0);
    }

    #[test]
    fn cyclic_imports_observe_partial_exports() {
        let mut ctx = module_context(&[
            (
                "a",
                "import { fromB } from 'b'; export const fromA = 1; globalThis.observedInA = fromB;",
            ),
            (
                "b",
                "import { fromA } from 'a'; export const fromB = 2; globalThis.observedInB = fromA;",
            ),
        ]);
        let script = ctx
            .initialize_script(
                "import { fromA } from 'a'; globalThis.finalA = fromA;",
                "main",
                true,
            )
            .unwrap();
        script.execute(&mut ctx).unwrap();
        // b ran while a was partially initialized, so it saw undefined.
        assert!(eval_bool(&mut ctx, "observedInB === undefined"));
        assert_eq!(eval_num(&mut ctx, "observedInA"), 2.0);
        assert_eq!(eval_num(&mut ctx, "finalA"), 1.0);
    }

    #[test]
    fn parse_errors_carry_positions() {
        let mut ctx = context();
        let err = ctx
            .initialize_script("var a = ;", "bad.js", false)
            .unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.column > 1);
    }

    #[test]
    fn stack_traces_have_entries() {
        let mut ctx = context();
        let script = ctx
            .initialize_script("function f() { throw new Error('deep'); }\nf();", "trace.js", false)
            .unwrap();
        let err = script.execute(&mut ctx).unwrap_err();
        assert!(err.message.contains("deep"));
        assert!(!err.stack.is_empty());
        assert_eq!(err.stack[0].src, "trace.js");
        assert_eq!(err.stack[0].line, 1);
    }

    #[test]
    fn gc_survives_live_data() {
        let mut ctx = context();
        ctx.eval("var keep = { list: [1, 2, 3], text: 'hello world hello world' };")
            .unwrap();
        ctx.collect_garbage();
        assert_eq!(eval_num(&mut ctx, "keep.list[2]"), 3.0);
        assert_eq!(eval_str(&mut ctx, "keep.text"), "hello world hello world");
    }
}
