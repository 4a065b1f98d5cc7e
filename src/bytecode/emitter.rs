//! Bytecode emitter
//!
//! Walks the AST of one program, module, eval chunk, or function body
//! and lowers it to register bytecode. The register file of a frame has
//! two zones: temporaries below `REGULAR_REGISTER_LIMIT`, obtained and
//! released through a register stack, and stack-allocated locals
//! addressed directly as `limit + slot`. A temporary is released only
//! after its consumer has read it.
//!
//! Identifier lowering follows the storage kind the resolver assigned:
//! stack slots move registers, captured bindings use the heap-indexed
//! family, program-level vars use the global cache family, and anything
//! under `eval`/`with` poisoning or non-simple parameters falls back to
//! the name-keyed family. Writes the resolver can prove must fail
//! (const assignment) emit `ThrowStaticError` instead of the store.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::atom::Atom;
use crate::bytecode::codeblock::{
    CodeBlock, CodeBlockFlags, ModuleImport, ParamBinding,
};
use crate::bytecode::opcode::{Opcode, SourceMap, REGULAR_REGISTER_LIMIT, REG_NONE};
use crate::context::VmInstance;
use crate::parser::ast::*;
use crate::parser::scope::{analyze_body, analyze_function};
use crate::runtime::object::ErrorKind;
use crate::runtime::string::JsString;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct EmitError {
    pub message: String,
    pub pos: u32,
}

impl std::fmt::Display for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

type EResult<T> = Result<T, EmitError>;

/// Compilation goal of a top-level chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileGoal {
    Script,
    Module,
    /// Direct eval: runs against the caller's variable environment.
    Eval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindKind {
    Var,
    Let,
    Const,
    Param,
    FunctionDecl,
    Import,
    Arguments,
}

impl BindKind {
    fn is_lexical(self) -> bool {
        matches!(self, BindKind::Let | BindKind::Const)
    }

    fn is_immutable(self) -> bool {
        matches!(self, BindKind::Const | BindKind::Import)
    }
}

#[derive(Debug, Clone, Copy)]
enum Storage {
    Stack { reg: u16 },
    Env { abs_depth: u16, slot: u16 },
    Named,
    Global,
}

#[derive(Debug, Clone, Copy)]
struct LocalBinding {
    kind: BindKind,
    storage: Storage,
    /// Module export: stores go to the namespace object by name.
    exported: bool,
}

#[derive(Debug)]
struct BlockCtx {
    bindings: FxHashMap<Atom, LocalBinding>,
    /// Lexical names initialized along the straight-line path, used to
    /// elide stack TDZ checks.
    initialized: FxHashSet<Atom>,
    needs_env: bool,
    env_abs_depth: u16,
    env_slot_count: u16,
}

impl BlockCtx {
    fn new() -> Self {
        BlockCtx {
            bindings: FxHashMap::default(),
            initialized: FxHashSet::default(),
            needs_env: false,
            env_abs_depth: 0,
            env_slot_count: 0,
        }
    }
}

struct LoopCtx {
    break_patches: Vec<usize>,
    continue_patches: Vec<usize>,
    /// Environment depth to pop back to on break/continue.
    env_depth: u16,
    /// Open try contexts at loop entry; finallys above are inlined.
    try_len: usize,
    /// for-of iterator to close when breaking out.
    iterator: Option<u16>,
    /// The loop installed its own exception handler (for-of close);
    /// break/continue must pop it.
    has_handler: bool,
    allow_continue: bool,
}

struct TryCtx<'ast> {
    finally: Option<&'ast [Stmt]>,
}

struct FnCtx<'ast> {
    code: Vec<Opcode>,
    map: SourceMap,
    constants: Vec<Value>,
    const_dedup: FxHashMap<u64, u16>,
    const_strings: FxHashMap<String, u16>,
    inner: Vec<Rc<CodeBlock>>,
    global_cache_atoms: Vec<Atom>,

    temp_next: u16,
    temp_max: u16,
    stack_slots: u16,
    blocks: Vec<BlockCtx>,
    loops: Vec<LoopCtx>,
    tries: Vec<TryCtx<'ast>>,

    flags: CodeBlockFlags,
    name: Option<Atom>,
    /// eval/with in this function or an ancestor: every unresolved
    /// name (and every binding of this function) is dynamic.
    dynamic_poison: bool,
    named_mode: bool,
    captured: FxHashSet<Atom>,
    with_depth: u16,

    param_count: u16,
    param_bindings: Vec<ParamBinding>,
    arguments_binding: Option<ParamBinding>,
    lazy_arguments: Option<u16>,
    body_env_slots: u16,
    hoisted_names: Vec<Atom>,

    module_requests: Vec<Rc<str>>,
    module_request_map: FxHashMap<String, u16>,
    imports: Vec<ModuleImport>,
    export_names: Vec<Atom>,
    export_aliases: Vec<(Atom, Atom)>,
}

impl<'ast> FnCtx<'ast> {
    fn new(flags: CodeBlockFlags, name: Option<Atom>) -> Self {
        FnCtx {
            code: Vec::new(),
            map: SourceMap::new(),
            constants: Vec::new(),
            const_dedup: FxHashMap::default(),
            const_strings: FxHashMap::default(),
            inner: Vec::new(),
            global_cache_atoms: Vec::new(),
            temp_next: 0,
            temp_max: 0,
            stack_slots: 0,
            blocks: Vec::new(),
            loops: Vec::new(),
            tries: Vec::new(),
            flags,
            name,
            dynamic_poison: false,
            named_mode: false,
            captured: FxHashSet::default(),
            with_depth: 0,
            param_count: 0,
            param_bindings: Vec::new(),
            arguments_binding: None,
            lazy_arguments: None,
            body_env_slots: 0,
            hoisted_names: Vec::new(),
            module_requests: Vec::new(),
            module_request_map: FxHashMap::default(),
            imports: Vec::new(),
            export_names: Vec::new(),
            export_aliases: Vec::new(),
        }
    }
}

/// Identifier classification at a use site.
enum Resolved {
    Stack {
        reg: u16,
        kind: BindKind,
        fn_idx: usize,
        block_idx: usize,
    },
    Heap {
        upper: u16,
        slot: u16,
        kind: BindKind,
        exported: bool,
    },
    Named {
        kind: BindKind,
        exported: bool,
    },
    /// Program-level var binding or unresolved name with no dynamic
    /// poisoning: the global cache family.
    Global,
    /// Unresolved under eval/with poisoning: dynamic name lookup.
    Dynamic,
}

/// How a store site relates to the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Plain,
    InitVar,
    InitLexical,
}

pub struct Emitter<'v, 'ast> {
    vm: &'v mut VmInstance,
    source_name: Rc<str>,
    source: Rc<str>,
    fns: Vec<FnCtx<'ast>>,
    /// Runtime environment records live at the current emit point,
    /// counted across the whole function nesting chain.
    abs_env_depth: u16,
    cur_pos: u32,
}

pub fn compile(
    vm: &mut VmInstance,
    program: &Program,
    source_name: Rc<str>,
    source: Rc<str>,
    goal: CompileGoal,
) -> Result<Rc<CodeBlock>, EmitError> {
    let mut emitter = Emitter {
        vm,
        source_name,
        source,
        fns: Vec::new(),
        abs_env_depth: 0,
        cur_pos: 0,
    };
    let block = emitter.compile_top_level(program, goal)?;
    block.link_children();
    Ok(block)
}

impl<'v, 'ast> Emitter<'v, 'ast> {
    // Small helpers

    fn f(&mut self) -> &mut FnCtx<'ast> {
        self.fns.last_mut().expect("no active function context")
    }

    fn atom(&mut self, s: &str) -> Atom {
        self.vm.atoms.intern(s)
    }

    fn emit(&mut self, op: Opcode) {
        let pos = self.cur_pos;
        let f = self.f();
        let idx = f.code.len() as u32;
        f.map.push(idx, pos);
        f.code.push(op);
    }

    fn here(&mut self) -> usize {
        self.f().code.len()
    }

    fn error(&self, message: impl Into<String>) -> EmitError {
        EmitError {
            message: message.into(),
            pos: self.cur_pos,
        }
    }

    // Register stack

    fn push_temp(&mut self) -> EResult<u16> {
        let f = self.f();
        if f.temp_next >= REGULAR_REGISTER_LIMIT {
            return Err(self.error("expression too complex"));
        }
        let reg = f.temp_next;
        f.temp_next += 1;
        if f.temp_next > f.temp_max {
            f.temp_max = f.temp_next;
        }
        Ok(reg)
    }

    fn pop_temp(&mut self, reg: u16) {
        let f = self.f();
        debug_assert_eq!(reg + 1, f.temp_next, "temporaries released out of order");
        f.temp_next -= 1;
    }

    /// Release a register returned by `expr_any`; stack-slot registers
    /// are not temporaries and stay put.
    fn release(&mut self, reg: u16) {
        if reg < REGULAR_REGISTER_LIMIT {
            self.pop_temp(reg);
        }
    }

    // Constants

    fn constant(&mut self, value: Value) -> EResult<u16> {
        let f = self.f();
        if let Some(&idx) = f.const_dedup.get(&value.raw()) {
            return Ok(idx);
        }
        if f.constants.len() >= u16::MAX as usize {
            return Err(self.error("too many constants"));
        }
        let idx = f.constants.len() as u16;
        f.constants.push(value);
        f.const_dedup.insert(value.raw(), idx);
        Ok(idx)
    }

    fn string_constant(&mut self, text: &str) -> EResult<u16> {
        if let Some(&idx) = self.f().const_strings.get(text) {
            return Ok(idx);
        }
        let sref = self.vm.heap.alloc_string(JsString::from_str(text));
        let idx = self.constant(Value::string(sref))?;
        self.f().const_strings.insert(text.to_string(), idx);
        Ok(idx)
    }

    fn emit_string_literal(&mut self, text: &str, dst: u16) -> EResult<()> {
        let index = self.string_constant(text)?;
        self.emit(Opcode::LoadLiteral { index, dst });
        Ok(())
    }

    fn emit_number(&mut self, n: f64, dst: u16) -> EResult<()> {
        let v = Value::number(n);
        if let Some(i) = v.as_int32() {
            self.emit(Opcode::LoadInt { value: i, dst });
        } else {
            let index = self.constant(v)?;
            self.emit(Opcode::LoadLiteral { index, dst });
        }
        Ok(())
    }

    fn emit_static_throw(&mut self, kind: ErrorKind, message: &str) -> EResult<()> {
        let message = self.string_constant(message)?;
        self.emit(Opcode::ThrowStaticError { kind, message });
        Ok(())
    }

    // Jump patching

    fn patch_jump(&mut self, at: usize) {
        let target = self.f().code.len();
        let offset = target as i32 - (at as i32 + 1);
        match &mut self.f().code[at] {
            Opcode::Jump { offset: o }
            | Opcode::JumpIfTrue { offset: o, .. }
            | Opcode::JumpIfFalse { offset: o, .. }
            | Opcode::TryStart { offset: o, .. }
            | Opcode::EnumeratorNext { offset: o, .. }
            | Opcode::IteratorStep { offset: o, .. } => *o = offset,
            other => unreachable!("patching non-jump opcode {:?}", other),
        }
    }

    fn jump_back(&mut self, target: usize) {
        let here = self.here();
        self.emit(Opcode::Jump {
            offset: target as i32 - (here as i32 + 1),
        });
    }

    // Top-level compilation

    fn compile_top_level(
        &mut self,
        program: &'ast Program,
        goal: CompileGoal,
    ) -> EResult<Rc<CodeBlock>> {
        let analysis = analyze_body(&program.body);
        let mut flags = CodeBlockFlags::empty();
        if program.strict {
            flags |= CodeBlockFlags::STRICT;
        }
        let mut ctx = FnCtx::new(flags, None);
        match goal {
            CompileGoal::Script => {
                ctx.flags |= CodeBlockFlags::PROGRAM;
                ctx.dynamic_poison = analysis.has_direct_eval || analysis.has_with;
                ctx.named_mode = ctx.dynamic_poison;
            }
            CompileGoal::Module => {
                ctx.flags |= CodeBlockFlags::MODULE | CodeBlockFlags::STRICT;
                ctx.named_mode = true;
            }
            CompileGoal::Eval => {
                ctx.flags |= CodeBlockFlags::PROGRAM;
                ctx.dynamic_poison = true;
                ctx.named_mode = true;
            }
        }
        if ctx.named_mode {
            ctx.flags.remove(CodeBlockFlags::CAN_USE_INDEXED_STORAGE);
        } else {
            ctx.flags |= CodeBlockFlags::CAN_USE_INDEXED_STORAGE;
        }
        for name in &analysis.nested_free {
            let atom = self.vm.atoms.intern(name);
            ctx.captured.insert(atom);
        }
        ctx.blocks.push(BlockCtx::new());
        self.fns.push(ctx);

        // Declare top-level bindings. Lexicals at the top level of a
        // script live in the realm's global-lexical record; everything
        // at the top of an eval chunk or module is name-addressed.
        match goal {
            CompileGoal::Script => {
                for name in &analysis.var_names {
                    let atom = self.atom(name);
                    self.declare_in_body(
                        atom,
                        BindKind::Var,
                        Storage::Global,
                        false,
                    );
                }
            }
            CompileGoal::Eval => {
                for name in &analysis.var_names {
                    let atom = self.atom(name);
                    self.declare_in_body(atom, BindKind::Var, Storage::Named, false);
                }
            }
            CompileGoal::Module => {
                self.declare_module_top_level(program)?;
                for name in &analysis.var_names.clone() {
                    let atom = self.atom(name);
                    if self.f().blocks[0].bindings.contains_key(&atom) {
                        continue; // exported var, already declared
                    }
                    self.declare_in_body(atom, BindKind::Var, Storage::Named, false);
                    self.f().hoisted_names.push(atom);
                }
            }
        }
        for (name, kind) in top_level_lexicals(&program.body) {
            let atom = self.atom(&name);
            self.declare_in_body(atom, kind, Storage::Named, false);
        }
        self.declare_block_lexicals(&program.body, 0, goal)?;

        // Hoisting prologue.
        match goal {
            CompileGoal::Script => {
                let t = self.push_temp()?;
                self.emit(Opcode::LoadUndefined { dst: t });
                for name in analysis.var_names.iter() {
                    let name = self.atom(name);
                    self.emit(Opcode::InitializeGlobalVariable { name, src: t });
                }
                self.pop_temp(t);
            }
            CompileGoal::Eval => {
                let t = self.push_temp()?;
                self.emit(Opcode::LoadUndefined { dst: t });
                for name in analysis.var_names.iter() {
                    let name = self.atom(name);
                    self.emit(Opcode::InitializeByName {
                        name,
                        src: t,
                        is_lexical: false,
                    });
                }
                self.pop_temp(t);
            }
            CompileGoal::Module => {}
        }
        self.emit_hoisted_functions(&program.body)?;
        if goal == CompileGoal::Eval {
            // Eval lexicals get their own record; vars were hoisted
            // into the caller's variable environment above.
            self.emit(Opcode::PushNamedEnv);
            self.abs_env_depth += 1;
        }

        // Completion value of the chunk.
        let result = self.push_temp()?;
        self.emit(Opcode::LoadUndefined { dst: result });
        for stmt in &program.body {
            if let StmtKind::Expr(e) = &stmt.kind {
                self.cur_pos = stmt.pos;
                self.expr(e, result)?;
            } else {
                self.statement(stmt)?;
            }
        }
        if goal == CompileGoal::Module {
            self.emit_export_aliases()?;
            self.emit(Opcode::LoadUndefined { dst: result });
        }
        self.emit(Opcode::Return { src: result });
        self.pop_temp(result);

        let ctx = self.fns.pop().expect("unbalanced function contexts");
        Ok(self.finish_block(ctx))
    }

    fn declare_module_top_level(&mut self, program: &'ast Program) -> EResult<()> {
        let default_atom = self.vm.wk.default_;
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Import {
                    specifiers,
                    source,
                } => {
                    let request = self.module_request(source);
                    for spec in specifiers {
                        let imported = self.atom(&spec.imported);
                        let local = self.atom(&spec.local);
                        self.declare_in_body(local, BindKind::Import, Storage::Named, false);
                        self.f().imports.push(ModuleImport {
                            request,
                            imported,
                            local,
                        });
                    }
                }
                StmtKind::ExportDefault(_) => {
                    self.f().export_names.push(default_atom);
                }
                StmtKind::ExportNamed { decl, specifiers } => {
                    for (local, exported) in specifiers {
                        let local = self.atom(local);
                        let exported = self.atom(exported);
                        self.f().export_names.push(exported);
                        self.f().export_aliases.push((local, exported));
                    }
                    if let Some(decl) = decl {
                        for name in declared_names(decl) {
                            let atom = self.atom(&name);
                            let kind = declared_kind(decl);
                            self.declare_in_body(atom, kind, Storage::Named, true);
                            self.f().export_names.push(atom);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn module_request(&mut self, specifier: &str) -> u16 {
        if let Some(&idx) = self.f().module_request_map.get(specifier) {
            return idx;
        }
        let idx = self.f().module_requests.len() as u16;
        let rc: Rc<str> = specifier.into();
        self.f().module_requests.push(rc);
        self.f()
            .module_request_map
            .insert(specifier.to_string(), idx);
        idx
    }

    fn declare_in_body(
        &mut self,
        atom: Atom,
        kind: BindKind,
        default_storage: Storage,
        exported: bool,
    ) {
        let f = self.fns.last_mut().expect("no function context");
        if f.blocks[0].bindings.contains_key(&atom) {
            return;
        }
        let storage = match default_storage {
            Storage::Named | Storage::Global => default_storage,
            _ => unreachable!("body declarations pick storage via declare_fn_binding"),
        };
        f.blocks[0].bindings.insert(
            atom,
            LocalBinding {
                kind,
                storage,
                exported,
            },
        );
    }

    /// Declare a function-scope binding with capture-aware storage.
    fn declare_fn_binding(&mut self, atom: Atom, kind: BindKind) -> EResult<Storage> {
        let f = self.fns.last_mut().expect("no function context");
        if let Some(existing) = f.blocks[0].bindings.get(&atom) {
            return Ok(existing.storage);
        }
        let storage = if f.named_mode {
            Storage::Named
        } else if f.captured.contains(&atom) {
            let slot = f.body_env_slots;
            f.body_env_slots += 1;
            // The body record's absolute depth is assigned at
            // activation; recorded when the body block is opened.
            Storage::Env {
                abs_depth: f.blocks[0].env_abs_depth,
                slot,
            }
        } else {
            if f.stack_slots as u32 + REGULAR_REGISTER_LIMIT as u32 >= u16::MAX as u32 {
                return Err(EmitError {
                    message: "too many local variables".into(),
                    pos: 0,
                });
            }
            let reg = REGULAR_REGISTER_LIMIT + f.stack_slots;
            f.stack_slots += 1;
            Storage::Stack { reg }
        };
        f.blocks[0].bindings.insert(
            atom,
            LocalBinding {
                kind,
                storage,
                exported: false,
            },
        );
        Ok(storage)
    }

    // Function compilation

    fn compile_function(
        &mut self,
        func: &'ast FunctionNode,
        extra_flags: CodeBlockFlags,
    ) -> EResult<u16> {
        self.cur_pos = func.pos;
        let analysis = analyze_function(func);
        let non_simple = func
            .params
            .iter()
            .any(|p| p.default.is_some() || p.rest);
        let parent_poison = self
            .fns
            .last()
            .map(|f| f.dynamic_poison || f.with_depth > 0)
            .unwrap_or(false);
        let dynamic_poison =
            analysis.has_direct_eval || analysis.has_with || parent_poison;
        let named_mode = dynamic_poison || non_simple;

        let mut flags = extra_flags;
        if func.strict {
            flags |= CodeBlockFlags::STRICT;
        }
        if func.is_arrow {
            flags |= CodeBlockFlags::ARROW;
        }
        if named_mode {
            flags.remove(CodeBlockFlags::CAN_USE_INDEXED_STORAGE);
        } else {
            flags |= CodeBlockFlags::CAN_USE_INDEXED_STORAGE;
        }
        if parent_poison {
            flags |= CodeBlockFlags::ANCESTOR_FORCES_NAME_LOOKUP;
        }
        let uses_arguments = analysis.uses_arguments && !func.is_arrow;
        if uses_arguments {
            flags |= CodeBlockFlags::USES_ARGUMENTS;
        }

        let name_atom = func.name.as_deref().map(|n| self.vm.atoms.intern(n));
        let mut ctx = FnCtx::new(flags, name_atom);
        ctx.dynamic_poison = dynamic_poison;
        ctx.named_mode = named_mode;
        for name in &analysis.nested_free {
            let atom = self.vm.atoms.intern(name);
            ctx.captured.insert(atom);
        }
        ctx.param_count = func.params.len() as u16;
        ctx.blocks.push(BlockCtx::new());

        let saved_env_depth = self.abs_env_depth;
        self.fns.push(ctx);

        // Parameters, vars, and the arguments binding.
        for param in &func.params {
            let atom = self.atom(&param.name);
            let storage = if self.f().named_mode {
                self.declare_in_body(atom, BindKind::Param, Storage::Named, false);
                ParamBinding::Named { atom }
            } else {
                match self.declare_fn_binding(atom, BindKind::Param)? {
                    Storage::Stack { reg } => ParamBinding::Stack { reg },
                    Storage::Env { slot, .. } => ParamBinding::BodyEnv { slot },
                    _ => unreachable!(),
                }
            };
            self.f().param_bindings.push(storage);
        }
        for name in &analysis.var_names {
            let atom = self.atom(name);
            if self.f().named_mode {
                self.declare_in_body(atom, BindKind::Var, Storage::Named, false);
                if !self.f().hoisted_names.contains(&atom) {
                    self.f().hoisted_names.push(atom);
                }
            } else {
                self.declare_fn_binding(atom, BindKind::Var)?;
            }
        }
        if uses_arguments {
            let atom = self.vm.wk.arguments;
            if self.f().named_mode {
                self.declare_in_body(atom, BindKind::Arguments, Storage::Named, false);
                self.f().arguments_binding = Some(ParamBinding::Named { atom });
            } else {
                match self.declare_fn_binding(atom, BindKind::Arguments)? {
                    Storage::Stack { reg } => self.f().lazy_arguments = Some(reg),
                    Storage::Env { slot, .. } => {
                        self.f().arguments_binding = Some(ParamBinding::BodyEnv { slot })
                    }
                    _ => unreachable!(),
                }
            }
        }

        // Body-level lexicals share the function scope block; they must
        // be declared before the environment decision so captured ones
        // land in the body record.
        self.declare_block_lexicals(&func.body, 0, CompileGoal::Script)?;

        // The body environment record is allocated at activation.
        if self.f().body_env_slots > 0 || self.f().named_mode {
            self.f().flags |= CodeBlockFlags::NEEDS_BODY_ENV;
            self.abs_env_depth += 1;
            let depth = self.abs_env_depth;
            self.f().blocks[0].env_abs_depth = depth;
            // Re-point env storages at the now-known depth.
            let f = self.fns.last_mut().expect("no function context");
            for binding in f.blocks[0].bindings.values_mut() {
                if let Storage::Env { abs_depth, .. } = &mut binding.storage {
                    *abs_depth = depth;
                }
            }
        }
        if self.f().captured.is_empty() && !self.f().named_mode {
            self.f().flags |= CodeBlockFlags::ENV_CAN_LIVE_ON_STACK;
        }

        // TDZ sentinels for stack-allocated body lexicals.
        let holes: Vec<u16> = self.f().blocks[0]
            .bindings
            .values()
            .filter_map(|b| match b.storage {
                Storage::Stack { reg } if b.kind.is_lexical() => Some(reg),
                _ => None,
            })
            .collect();
        for reg in holes {
            self.emit(Opcode::LoadEmpty { dst: reg });
        }

        // Parameter defaults and rest (named mode only; they are what
        // made the parameter list non-simple).
        for (i, param) in func.params.iter().enumerate() {
            if let Some(default) = &param.default {
                let atom = self.atom(&param.name);
                let cur = self.emit_load_identifier(atom, false)?;
                let t_undef = self.push_temp()?;
                self.emit(Opcode::LoadUndefined { dst: t_undef });
                let t_cmp = self.push_temp()?;
                self.emit(Opcode::StrictEq {
                    lhs: cur,
                    rhs: t_undef,
                    dst: t_cmp,
                });
                let skip = self.here();
                self.emit(Opcode::JumpIfFalse {
                    cond: t_cmp,
                    offset: 0,
                });
                let t_val = self.push_temp()?;
                self.expr(default, t_val)?;
                self.emit_store_identifier(atom, t_val, StoreKind::Plain)?;
                self.pop_temp(t_val);
                self.patch_jump(skip);
                self.pop_temp(t_cmp);
                self.pop_temp(t_undef);
                self.release(cur);
            }
            if param.rest {
                let atom = self.atom(&param.name);
                let t = self.push_temp()?;
                self.emit(Opcode::LoadRestArguments {
                    start: i as u16,
                    dst: t,
                });
                self.emit_store_identifier(atom, t, StoreKind::Plain)?;
                self.pop_temp(t);
            }
        }

        // Hoisted inner functions, then the body.
        self.emit_hoisted_functions(&func.body)?;
        for stmt in &func.body {
            self.statement(stmt)?;
        }
        let t = self.push_temp()?;
        self.emit(Opcode::LoadUndefined { dst: t });
        self.emit(Opcode::Return { src: t });
        self.pop_temp(t);

        self.abs_env_depth = saved_env_depth;
        let ctx = self.fns.pop().expect("unbalanced function contexts");
        let block = self.finish_block(ctx);
        let f = self.f();
        if f.inner.len() >= u16::MAX as usize {
            return Err(self.error("too many inner functions"));
        }
        f.inner.push(block);
        Ok((f.inner.len() - 1) as u16)
    }

    fn finish_block(&mut self, ctx: FnCtx<'ast>) -> Rc<CodeBlock> {
        Rc::new(CodeBlock {
            name: ctx.name,
            code: ctx.code,
            constants: ctx.constants,
            source_map: ctx.map,
            source_name: self.source_name.clone(),
            source: self.source.clone(),
            flags: ctx.flags,
            temp_register_count: ctx.temp_max,
            stack_slot_count: ctx.stack_slots,
            body_env_slot_count: ctx.body_env_slots,
            param_count: ctx.param_count,
            param_bindings: ctx.param_bindings,
            arguments_binding: ctx.arguments_binding,
            hoisted_names: ctx.hoisted_names,
            parent: RefCell::new(Weak::new()),
            inner: ctx.inner,
            module_requests: ctx.module_requests,
            imports: ctx.imports,
            export_names: ctx.export_names,
            export_aliases: ctx.export_aliases,
            global_cache_atoms: ctx.global_cache_atoms.clone(),
            global_caches: RefCell::new(vec![
                Default::default();
                ctx.global_cache_atoms.len()
            ]),
        })
    }

    // Identifier resolution

    fn resolve_identifier(&mut self, atom: Atom) -> Resolved {
        let poisoned = self
            .fns
            .iter()
            .any(|f| f.dynamic_poison || f.with_depth > 0);
        let top = self.fns.len() - 1;
        for fn_idx in (0..self.fns.len()).rev() {
            for block_idx in (0..self.fns[fn_idx].blocks.len()).rev() {
                if let Some(b) = self.fns[fn_idx].blocks[block_idx].bindings.get(&atom) {
                    let b = *b;
                    return match b.storage {
                        Storage::Stack { reg } if fn_idx == top => Resolved::Stack {
                            reg,
                            kind: b.kind,
                            fn_idx,
                            block_idx,
                        },
                        Storage::Stack { .. } => {
                            // A cross-function reference to a stack
                            // binding means the capture analysis missed
                            // it; fall back to the dynamic path.
                            debug_assert!(false, "uncaptured binding crossed a function");
                            Resolved::Dynamic
                        }
                        Storage::Env { abs_depth, slot } => Resolved::Heap {
                            upper: self.abs_env_depth - abs_depth,
                            slot,
                            kind: b.kind,
                            exported: b.exported,
                        },
                        Storage::Named => Resolved::Named {
                            kind: b.kind,
                            exported: b.exported,
                        },
                        // Under poisoning a live object scope may
                        // shadow even a known global binding.
                        Storage::Global if poisoned => Resolved::Dynamic,
                        Storage::Global => Resolved::Global,
                    };
                }
            }
        }
        if poisoned {
            Resolved::Dynamic
        } else {
            Resolved::Global
        }
    }

    fn global_cache(&mut self, atom: Atom) -> EResult<u16> {
        let f = self.f();
        if f.global_cache_atoms.len() >= u16::MAX as usize {
            return Err(self.error("too many global accesses"));
        }
        f.global_cache_atoms.push(atom);
        Ok((f.global_cache_atoms.len() - 1) as u16)
    }

    /// Whether a TDZ check is needed for a stack lexical at this point.
    fn needs_tdz_check(&self, fn_idx: usize, block_idx: usize, atom: Atom, kind: BindKind) -> bool {
        kind.is_lexical() && !self.fns[fn_idx].blocks[block_idx].initialized.contains(&atom)
    }

    /// Load an identifier; the returned register is either the binding's
    /// stack slot (no copy) or a fresh temporary the caller releases.
    fn emit_load_identifier(&mut self, atom: Atom, typeof_ctx: bool) -> EResult<u16> {
        match self.resolve_identifier(atom) {
            Resolved::Stack {
                reg,
                kind,
                fn_idx,
                block_idx,
            } => {
                if self.needs_tdz_check(fn_idx, block_idx, atom, kind) {
                    self.emit(Opcode::ThrowIfHole { reg, name: atom });
                }
                Ok(reg)
            }
            Resolved::Heap { upper, slot, .. } => {
                let dst = self.push_temp()?;
                self.emit(Opcode::LoadByHeapIndex { upper, slot, dst });
                Ok(dst)
            }
            Resolved::Named { .. } | Resolved::Dynamic => {
                let dst = self.push_temp()?;
                if typeof_ctx {
                    self.emit(Opcode::TypeofByName { name: atom, dst });
                } else {
                    self.emit(Opcode::LoadByName { name: atom, dst });
                }
                Ok(dst)
            }
            Resolved::Global => {
                let dst = self.push_temp()?;
                if typeof_ctx {
                    self.emit(Opcode::TypeofByName { name: atom, dst });
                } else {
                    let cache = self.global_cache(atom)?;
                    self.emit(Opcode::GetGlobalVariable { cache, dst });
                }
                Ok(dst)
            }
        }
    }

    /// Identifier store lowering.
    fn emit_store_identifier(&mut self, atom: Atom, src: u16, store: StoreKind) -> EResult<()> {
        match self.resolve_identifier(atom) {
            Resolved::Stack {
                reg,
                kind,
                fn_idx,
                block_idx,
            } => {
                if kind.is_immutable() && store != StoreKind::InitLexical {
                    return self
                        .emit_static_throw(ErrorKind::TypeError, "Assignment to constant variable.");
                }
                if store == StoreKind::Plain && self.needs_tdz_check(fn_idx, block_idx, atom, kind)
                {
                    self.emit(Opcode::ThrowIfHole { reg, name: atom });
                }
                if src != reg {
                    self.emit(Opcode::Move { src, dst: reg });
                }
                if store != StoreKind::Plain {
                    self.fns[fn_idx].blocks[block_idx].initialized.insert(atom);
                }
                Ok(())
            }
            Resolved::Heap {
                upper,
                slot,
                kind,
                exported,
            } => {
                if kind.is_immutable() && store != StoreKind::InitLexical {
                    return self
                        .emit_static_throw(ErrorKind::TypeError, "Assignment to constant variable.");
                }
                let _ = exported;
                if store == StoreKind::InitLexical {
                    self.emit(Opcode::InitializeByHeapIndex { slot, src });
                } else {
                    self.emit(Opcode::StoreByHeapIndex { upper, slot, src });
                }
                Ok(())
            }
            Resolved::Named { kind, exported } => {
                if kind.is_immutable() && store != StoreKind::InitLexical {
                    return self
                        .emit_static_throw(ErrorKind::TypeError, "Assignment to constant variable.");
                }
                if exported {
                    // Exported bindings live on the namespace object,
                    // pre-created by the linker.
                    self.emit(Opcode::StoreByName { name: atom, src });
                } else {
                    match store {
                        StoreKind::InitLexical => self.emit(Opcode::InitializeByName {
                            name: atom,
                            src,
                            is_lexical: true,
                        }),
                        StoreKind::InitVar => self.emit(Opcode::InitializeByName {
                            name: atom,
                            src,
                            is_lexical: false,
                        }),
                        StoreKind::Plain => self.emit(Opcode::StoreByName { name: atom, src }),
                    }
                }
                Ok(())
            }
            Resolved::Global => {
                if store == StoreKind::InitVar {
                    self.emit(Opcode::InitializeGlobalVariable { name: atom, src });
                } else {
                    let cache = self.global_cache(atom)?;
                    self.emit(Opcode::SetGlobalVariable { cache, src });
                }
                Ok(())
            }
            Resolved::Dynamic => {
                match store {
                    StoreKind::InitLexical => self.emit(Opcode::InitializeByName {
                        name: atom,
                        src,
                        is_lexical: true,
                    }),
                    StoreKind::InitVar => self.emit(Opcode::InitializeByName {
                        name: atom,
                        src,
                        is_lexical: false,
                    }),
                    StoreKind::Plain => self.emit(Opcode::StoreByName { name: atom, src }),
                }
                Ok(())
            }
        }
    }

    /// Emit `EnsureArgumentsObject` before any use of `arguments` when
    /// the binding is lazily materialized.
    fn ensure_arguments_if_needed(&mut self, atom: Atom) {
        if atom == self.vm.wk.arguments {
            if let Some(reg) = self.f().lazy_arguments {
                self.emit(Opcode::EnsureArgumentsObject { dst: reg });
            }
        }
    }

    // Blocks

    fn declare_block_lexicals(
        &mut self,
        stmts: &'ast [Stmt],
        block_idx: usize,
        goal: CompileGoal,
    ) -> EResult<()> {
        let top_level_module = goal == CompileGoal::Module && block_idx == 0;
        let mut names: Vec<(Atom, BindKind)> = Vec::new();
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::VarDecl { kind, decls } if kind.is_lexical() => {
                    let bk = if *kind == DeclKind::Const {
                        BindKind::Const
                    } else {
                        BindKind::Let
                    };
                    for (name, _) in decls {
                        names.push((self.atom(name), bk));
                    }
                }
                StmtKind::ClassDecl(class) => {
                    if let Some(name) = &class.name {
                        names.push((self.atom(name), BindKind::Let));
                    }
                }
                _ => {}
            }
        }
        for (atom, kind) in names {
            if top_level_module || self.fns[self.fns.len() - 1].blocks[block_idx].bindings.contains_key(&atom) {
                // Module top-level lexicals were declared (possibly as
                // exports) during module setup; keep that storage but
                // fix the kind for const checking.
                let f = self.fns.last_mut().expect("no function context");
                let entry = f.blocks[block_idx]
                    .bindings
                    .entry(atom)
                    .or_insert(LocalBinding {
                        kind,
                        storage: Storage::Named,
                        exported: false,
                    });
                if entry.kind == BindKind::Var || entry.kind == BindKind::Param {
                    entry.kind = kind;
                }
                continue;
            }
            let storage = self.alloc_block_storage(atom, block_idx)?;
            let f = self.fns.last_mut().expect("no function context");
            f.blocks[block_idx].bindings.insert(
                atom,
                LocalBinding {
                    kind,
                    storage,
                    exported: false,
                },
            );
        }
        Ok(())
    }

    fn alloc_block_storage(&mut self, atom: Atom, block_idx: usize) -> EResult<Storage> {
        let f = self.fns.last_mut().expect("no function context");
        if f.named_mode {
            f.blocks[block_idx].needs_env = true;
            return Ok(Storage::Named);
        }
        if f.captured.contains(&atom) {
            let block = &mut f.blocks[block_idx];
            block.needs_env = true;
            let slot = if block_idx == 0 {
                let slot = f.body_env_slots;
                f.body_env_slots += 1;
                slot
            } else {
                let slot = block.env_slot_count;
                block.env_slot_count += 1;
                slot
            };
            return Ok(Storage::Env {
                abs_depth: 0, // fixed when the block's record is pushed
                slot,
            });
        }
        if f.stack_slots as u32 + REGULAR_REGISTER_LIMIT as u32 >= u16::MAX as u32 {
            return Err(EmitError {
                message: "too many local variables".into(),
                pos: 0,
            });
        }
        let reg = REGULAR_REGISTER_LIMIT + f.stack_slots;
        f.stack_slots += 1;
        Ok(Storage::Stack { reg })
    }

    /// Open a nested lexical block, declaring its lexicals, pushing its
    /// environment record when one is needed, and emitting TDZ holes.
    /// `extra` declares an additional lexical binding (catch parameter)
    /// before the storage decision is made.
    fn enter_block(&mut self, stmts: &'ast [Stmt]) -> EResult<()> {
        self.enter_block_with(stmts, None)
    }

    fn enter_block_with(
        &mut self,
        stmts: &'ast [Stmt],
        extra: Option<Atom>,
    ) -> EResult<()> {
        self.f().blocks.push(BlockCtx::new());
        let block_idx = self.f().blocks.len() - 1;
        self.declare_block_lexicals(stmts, block_idx, CompileGoal::Script)?;
        if let Some(atom) = extra {
            let storage = self.alloc_block_storage(atom, block_idx)?;
            let f = self.fns.last_mut().expect("no function context");
            f.blocks[block_idx].bindings.insert(
                atom,
                LocalBinding {
                    kind: BindKind::Let,
                    storage,
                    exported: false,
                },
            );
        }

        let (needs_env, slot_count, named) = {
            let f = self.fns.last_mut().expect("no function context");
            let block = &f.blocks[block_idx];
            (block.needs_env, block.env_slot_count, f.named_mode)
        };
        if needs_env {
            if named {
                self.emit(Opcode::PushNamedEnv);
            } else {
                self.emit(Opcode::PushLexicalEnv { slot_count });
            }
            self.abs_env_depth += 1;
            let depth = self.abs_env_depth;
            let f = self.fns.last_mut().expect("no function context");
            f.blocks[block_idx].env_abs_depth = depth;
            for binding in f.blocks[block_idx].bindings.values_mut() {
                if let Storage::Env { abs_depth, .. } = &mut binding.storage {
                    *abs_depth = depth;
                }
            }
        }
        // TDZ sentinels for stack-allocated lexicals.
        let holes: Vec<u16> = self.f().blocks[block_idx]
            .bindings
            .values()
            .filter_map(|b| match b.storage {
                Storage::Stack { reg } if b.kind.is_lexical() => Some(reg),
                _ => None,
            })
            .collect();
        for reg in holes {
            self.emit(Opcode::LoadEmpty { dst: reg });
        }
        self.emit_hoisted_functions(stmts)?;
        Ok(())
    }

    fn exit_block(&mut self) {
        let block = self.f().blocks.pop().expect("unbalanced blocks");
        if block.needs_env {
            self.emit(Opcode::PopEnv);
            self.abs_env_depth -= 1;
        }
    }

    /// Hoisted function declarations: closures created and stored at
    /// scope entry.
    fn emit_hoisted_functions(&mut self, stmts: &'ast [Stmt]) -> EResult<()> {
        for stmt in stmts {
            let func = match &stmt.kind {
                StmtKind::FunctionDecl(f) => f,
                StmtKind::ExportNamed {
                    decl: Some(decl), ..
                } => match &decl.kind {
                    StmtKind::FunctionDecl(f) => f,
                    _ => continue,
                },
                _ => continue,
            };
            self.cur_pos = stmt.pos;
            let index = self.compile_function(func, CodeBlockFlags::empty())?;
            let t = self.push_temp()?;
            self.emit(Opcode::CreateFunction { index, dst: t });
            let atom = func
                .name
                .as_deref()
                .map(|n| self.vm.atoms.intern(n))
                .expect("function declarations are named");
            let store = if self.f().flags.contains(CodeBlockFlags::PROGRAM)
                && self.fn_is_top_level_block()
            {
                StoreKind::InitVar
            } else {
                StoreKind::Plain
            };
            self.emit_store_identifier(atom, t, store)?;
            self.pop_temp(t);
        }
        Ok(())
    }

    fn fn_is_top_level_block(&mut self) -> bool {
        self.f().blocks.len() == 1
    }

    // Statements

    fn statement(&mut self, stmt: &'ast Stmt) -> EResult<()> {
        self.cur_pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Expr(e) => {
                let t = self.push_temp()?;
                self.expr(e, t)?;
                self.pop_temp(t);
            }
            StmtKind::VarDecl { kind, decls } => self.var_declaration(*kind, decls)?,
            StmtKind::FunctionDecl(_) => {
                // Hoisted at block entry.
            }
            StmtKind::ClassDecl(class) => {
                let t = self.push_temp()?;
                self.class_expr(class, t)?;
                let atom = class
                    .name
                    .as_deref()
                    .map(|n| self.vm.atoms.intern(n))
                    .expect("class declarations are named");
                self.emit_store_identifier(atom, t, StoreKind::InitLexical)?;
                self.pop_temp(t);
            }
            StmtKind::Return(arg) => {
                let t = self.push_temp()?;
                match arg {
                    Some(e) => self.expr(e, t)?,
                    None => self.emit(Opcode::LoadUndefined { dst: t }),
                }
                self.emit_pending_finallys(0)?;
                self.emit(Opcode::Return { src: t });
                self.pop_temp(t);
            }
            StmtKind::If { cond, cons, alt } => {
                let t = self.push_temp()?;
                self.expr(cond, t)?;
                let to_else = self.here();
                self.emit(Opcode::JumpIfFalse { cond: t, offset: 0 });
                self.pop_temp(t);
                self.statement(cons)?;
                if let Some(alt) = alt {
                    let to_end = self.here();
                    self.emit(Opcode::Jump { offset: 0 });
                    self.patch_jump(to_else);
                    self.statement(alt)?;
                    self.patch_jump(to_end);
                } else {
                    self.patch_jump(to_else);
                }
            }
            StmtKind::Block(body) => {
                self.enter_block(body)?;
                for s in body {
                    self.statement(s)?;
                }
                self.exit_block();
            }
            StmtKind::While { test, body } => self.while_statement(test, body)?,
            StmtKind::DoWhile { body, test } => self.do_while_statement(body, test)?,
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.for_statement(init, test, update, body)?,
            StmtKind::ForIn { head, object, body } => {
                self.for_in_statement(head, object, body)?
            }
            StmtKind::ForOf { head, object, body } => {
                self.for_of_statement(head, object, body)?
            }
            StmtKind::Break => self.emit_break()?,
            StmtKind::Continue => self.emit_continue()?,
            StmtKind::Throw(e) => {
                let t = self.push_temp()?;
                self.expr(e, t)?;
                self.emit(Opcode::Throw { src: t });
                self.pop_temp(t);
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => self.try_statement(block, catch.as_ref(), finally.as_deref())?,
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.switch_statement(discriminant, cases)?,
            StmtKind::With { object, body } => {
                let t = self.push_temp()?;
                self.expr(object, t)?;
                self.emit(Opcode::PushWithEnv { obj: t });
                self.pop_temp(t);
                self.abs_env_depth += 1;
                self.f().with_depth += 1;
                self.statement(body)?;
                self.f().with_depth -= 1;
                self.abs_env_depth -= 1;
                self.emit(Opcode::PopEnv);
            }
            StmtKind::Empty => {}
            StmtKind::Import { .. } => {
                // Handled by module setup.
            }
            StmtKind::ExportNamed { decl, .. } => {
                if let Some(decl) = decl {
                    if !matches!(decl.kind, StmtKind::FunctionDecl(_)) {
                        self.statement(decl)?;
                    }
                }
            }
            StmtKind::ExportDefault(e) => {
                let t = self.push_temp()?;
                self.expr(e, t)?;
                let name = self.vm.wk.default_;
                self.emit(Opcode::StoreByName { name, src: t });
                self.pop_temp(t);
            }
        }
        Ok(())
    }

    fn var_declaration(
        &mut self,
        kind: DeclKind,
        decls: &'ast [(String, Option<Expr>)],
    ) -> EResult<()> {
        for (name, init) in decls {
            let atom = self.atom(name);
            match (kind, init) {
                (DeclKind::Var, None) => {
                    // Hoisting already created the binding; redeclaring
                    // does not reset it.
                }
                (DeclKind::Var, Some(e)) => {
                    let t = self.push_temp()?;
                    self.expr(e, t)?;
                    self.emit_store_identifier(atom, t, StoreKind::Plain)?;
                    self.pop_temp(t);
                }
                (_, init) => {
                    // `let x;` initializes to undefined; the synthesized
                    // literal drives the same lowering as `let x = e`.
                    let t = self.push_temp()?;
                    match init {
                        Some(e) => self.expr(e, t)?,
                        None => self.emit(Opcode::LoadUndefined { dst: t }),
                    }
                    self.emit_store_identifier(atom, t, StoreKind::InitLexical)?;
                    self.pop_temp(t);
                }
            }
        }
        Ok(())
    }

    fn while_statement(&mut self, test: &'ast Expr, body: &'ast Stmt) -> EResult<()> {
        let start = self.here();
        let t = self.push_temp()?;
        self.expr(test, t)?;
        let to_end = self.here();
        self.emit(Opcode::JumpIfFalse { cond: t, offset: 0 });
        self.pop_temp(t);

        self.push_loop(None);
        self.statement(body)?;
        let ctx = self.pop_loop();
        self.jump_back(start);
        self.patch_jump(to_end);
        self.finish_loop(ctx, start);
        Ok(())
    }

    fn do_while_statement(&mut self, body: &'ast Stmt, test: &'ast Expr) -> EResult<()> {
        let start = self.here();
        self.push_loop(None);
        self.statement(body)?;
        let ctx = self.pop_loop();
        let test_at = self.here();
        let t = self.push_temp()?;
        self.expr(test, t)?;
        let back = self.here();
        self.emit(Opcode::JumpIfTrue { cond: t, offset: 0 });
        self.pop_temp(t);
        // Jump back by rewriting the just-emitted offset.
        let offset = start as i32 - (back as i32 + 1);
        if let Opcode::JumpIfTrue { offset: o, .. } = &mut self.f().code[back] {
            *o = offset;
        }
        self.finish_loop(ctx, test_at);
        Ok(())
    }

    fn for_statement(
        &mut self,
        init: &'ast Option<Box<Stmt>>,
        test: &'ast Option<Expr>,
        update: &'ast Option<Expr>,
        body: &'ast Stmt,
    ) -> EResult<()> {
        // A lexical init gets a loop-enclosing block with per-iteration
        // environment renewal.
        let loop_block: Option<&[Stmt]> = match init {
            Some(s) if matches!(&s.kind, StmtKind::VarDecl { kind, .. } if kind.is_lexical()) => {
                Some(std::slice::from_ref(&**s))
            }
            _ => None,
        };
        if let Some(decl_stmts) = loop_block {
            self.enter_block(decl_stmts)?;
        }
        if let Some(init) = init {
            self.statement(init)?;
        }
        let start = self.here();
        let to_end = if let Some(test) = test {
            let t = self.push_temp()?;
            self.expr(test, t)?;
            let j = self.here();
            self.emit(Opcode::JumpIfFalse { cond: t, offset: 0 });
            self.pop_temp(t);
            Some(j)
        } else {
            None
        };

        self.push_loop(None);
        self.statement(body)?;
        let ctx = self.pop_loop();

        let update_at = self.here();
        if loop_block.is_some() {
            let (needs_env, slot_count) = {
                let f = self.fns.last_mut().expect("no function context");
                let block = f.blocks.last().expect("loop block missing");
                (block.needs_env, block.env_slot_count)
            };
            if needs_env {
                self.emit(Opcode::RenewLexicalEnv { slot_count });
            }
        }
        if let Some(update) = update {
            let t = self.push_temp()?;
            self.expr(update, t)?;
            self.pop_temp(t);
        }
        self.jump_back(start);
        if let Some(j) = to_end {
            self.patch_jump(j);
        }
        self.finish_loop(ctx, update_at);
        if loop_block.is_some() {
            self.exit_block();
        }
        Ok(())
    }

    fn for_in_statement(
        &mut self,
        head: &'ast ForHead,
        object: &'ast Expr,
        body: &'ast Stmt,
    ) -> EResult<()> {
        let t_obj = self.push_temp()?;
        self.expr(object, t_obj)?;
        let t_iter = self.push_temp()?;
        self.emit(Opcode::CreateEnumerator {
            obj: t_obj,
            dst: t_iter,
        });

        let start = self.here();
        let t_key = self.push_temp()?;
        let next_at = self.here();
        self.emit(Opcode::EnumeratorNext {
            iter: t_iter,
            dst: t_key,
            offset: 0,
        });
        self.push_loop(None);
        self.bind_for_head(head, t_key)?;
        self.statement(body)?;
        let ctx = self.pop_loop();
        self.unbind_for_head(head);
        self.jump_back(start);
        self.patch_jump(next_at);
        self.pop_temp(t_key);
        self.finish_loop(ctx, start);
        self.pop_temp(t_iter);
        self.pop_temp(t_obj);
        Ok(())
    }

    fn for_of_statement(
        &mut self,
        head: &'ast ForHead,
        object: &'ast Expr,
        body: &'ast Stmt,
    ) -> EResult<()> {
        let t_obj = self.push_temp()?;
        self.expr(object, t_obj)?;
        let t_iter = self.push_temp()?;
        self.emit(Opcode::GetIterator {
            obj: t_obj,
            dst: t_iter,
        });

        let start = self.here();
        let t_val = self.push_temp()?;
        let step_at = self.here();
        self.emit(Opcode::IteratorStep {
            iter: t_iter,
            dst: t_val,
            offset: 0,
        });

        self.push_loop(Some(t_iter));
        // Abrupt completions inside the body close the iterator.
        let t_exc = self.push_temp()?;
        let try_at = self.here();
        self.emit(Opcode::TryStart {
            offset: 0,
            dst: t_exc,
        });
        self.bind_for_head(head, t_val)?;
        self.statement(body)?;
        self.unbind_for_head(head);
        self.emit(Opcode::TryEnd);
        let ctx = self.pop_loop();
        self.jump_back(start);
        self.patch_jump(try_at);
        self.emit(Opcode::IteratorClose { iter: t_iter });
        self.emit(Opcode::Throw { src: t_exc });
        self.pop_temp(t_exc);
        self.patch_jump(step_at);
        self.pop_temp(t_val);
        self.finish_loop(ctx, start);
        self.pop_temp(t_iter);
        self.pop_temp(t_obj);
        Ok(())
    }

    /// Bind the loop value to the head target, opening the
    /// per-iteration block for lexical heads.
    fn bind_for_head(&mut self, head: &'ast ForHead, value: u16) -> EResult<()> {
        match head {
            ForHead::Decl { kind, name } => {
                let atom = self.atom(name);
                if kind.is_lexical() {
                    self.f().blocks.push(BlockCtx::new());
                    let block_idx = self.f().blocks.len() - 1;
                    let bk = if *kind == DeclKind::Const {
                        BindKind::Const
                    } else {
                        BindKind::Let
                    };
                    let storage = self.alloc_block_storage(atom, block_idx)?;
                    let (needs_env, slot_count, named) = {
                        let f = self.fns.last_mut().expect("no function context");
                        f.blocks[block_idx].bindings.insert(
                            atom,
                            LocalBinding {
                                kind: bk,
                                storage,
                                exported: false,
                            },
                        );
                        (
                            f.blocks[block_idx].needs_env,
                            f.blocks[block_idx].env_slot_count,
                            f.named_mode,
                        )
                    };
                    if needs_env {
                        if named {
                            self.emit(Opcode::PushNamedEnv);
                        } else {
                            self.emit(Opcode::PushLexicalEnv { slot_count });
                        }
                        self.abs_env_depth += 1;
                        let depth = self.abs_env_depth;
                        let f = self.fns.last_mut().expect("no function context");
                        f.blocks[block_idx].env_abs_depth = depth;
                        for binding in f.blocks[block_idx].bindings.values_mut() {
                            if let Storage::Env { abs_depth, .. } = &mut binding.storage {
                                *abs_depth = depth;
                            }
                        }
                    }
                    self.emit_store_identifier(atom, value, StoreKind::InitLexical)?;
                } else {
                    self.emit_store_identifier(atom, value, StoreKind::Plain)?;
                }
            }
            ForHead::Expr(target) => {
                self.assign_to_target(target, value)?;
            }
        }
        Ok(())
    }

    fn unbind_for_head(&mut self, head: &'ast ForHead) {
        if let ForHead::Decl { kind, .. } = head {
            if kind.is_lexical() {
                self.exit_block();
            }
        }
    }

    fn try_statement(
        &mut self,
        block: &'ast [Stmt],
        catch: Option<&'ast (Option<String>, Vec<Stmt>)>,
        finally: Option<&'ast [Stmt]>,
    ) -> EResult<()> {
        // try/catch/finally splits into try{ try/catch }finally.
        if let (Some(catch), Some(finally)) = (catch, finally) {
            self.f().tries.push(TryCtx {
                finally: Some(finally),
            });
            let t_exc = self.push_temp()?;
            let try_at = self.here();
            self.emit(Opcode::TryStart {
                offset: 0,
                dst: t_exc,
            });
            self.try_statement(block, Some(catch), None)?;
            self.emit(Opcode::TryEnd);
            self.f().tries.pop();
            // Normal path: run the finally inline.
            for s in finally {
                self.statement(s)?;
            }
            let to_end = self.here();
            self.emit(Opcode::Jump { offset: 0 });
            self.patch_jump(try_at);
            for s in finally {
                self.statement(s)?;
            }
            self.emit(Opcode::Throw { src: t_exc });
            self.patch_jump(to_end);
            self.pop_temp(t_exc);
            return Ok(());
        }

        let t_exc = self.push_temp()?;
        let try_at = self.here();
        self.emit(Opcode::TryStart {
            offset: 0,
            dst: t_exc,
        });
        self.f().tries.push(TryCtx { finally });
        for s in block {
            self.statement(s)?;
        }
        self.emit(Opcode::TryEnd);
        self.f().tries.pop();

        match (catch, finally) {
            (Some((param, body)), None) => {
                let to_end = self.here();
                self.emit(Opcode::Jump { offset: 0 });
                self.patch_jump(try_at);
                // Catch scope: the parameter is a lexical binding.
                let param_atom = param.as_deref().map(|p| self.vm.atoms.intern(p));
                self.enter_block_with(body, param_atom)?;
                if let Some(atom) = param_atom {
                    self.emit_store_identifier(atom, t_exc, StoreKind::InitLexical)?;
                }
                for s in body {
                    self.statement(s)?;
                }
                self.exit_block();
                self.patch_jump(to_end);
            }
            (None, Some(finally)) => {
                for s in finally {
                    self.statement(s)?;
                }
                let to_end = self.here();
                self.emit(Opcode::Jump { offset: 0 });
                self.patch_jump(try_at);
                for s in finally {
                    self.statement(s)?;
                }
                self.emit(Opcode::Throw { src: t_exc });
                self.patch_jump(to_end);
            }
            _ => unreachable!("parser requires catch or finally"),
        }
        self.pop_temp(t_exc);
        Ok(())
    }

    fn switch_statement(
        &mut self,
        discriminant: &'ast Expr,
        cases: &'ast [SwitchCase],
    ) -> EResult<()> {
        let t_disc = self.push_temp()?;
        self.expr(discriminant, t_disc)?;

        // Lexicals in any case body scope over the whole switch, so the
        // block is opened manually and every case body is scanned into
        // it before the env decision.
        self.f().blocks.push(BlockCtx::new());
        let block_idx = self.f().blocks.len() - 1;
        for case in cases {
            self.declare_block_lexicals(&case.body, block_idx, CompileGoal::Script)?;
        }
        let (needs_env, slot_count, named) = {
            let f = self.fns.last_mut().expect("no function context");
            let block = &f.blocks[block_idx];
            (block.needs_env, block.env_slot_count, f.named_mode)
        };
        if needs_env {
            if named {
                self.emit(Opcode::PushNamedEnv);
            } else {
                self.emit(Opcode::PushLexicalEnv { slot_count });
            }
            self.abs_env_depth += 1;
            let depth = self.abs_env_depth;
            let f = self.fns.last_mut().expect("no function context");
            f.blocks[block_idx].env_abs_depth = depth;
            for binding in f.blocks[block_idx].bindings.values_mut() {
                if let Storage::Env { abs_depth, .. } = &mut binding.storage {
                    *abs_depth = depth;
                }
            }
        }
        let holes: Vec<u16> = self.f().blocks[block_idx]
            .bindings
            .values()
            .filter_map(|b| match b.storage {
                Storage::Stack { reg } if b.kind.is_lexical() => Some(reg),
                _ => None,
            })
            .collect();
        for reg in holes {
            self.emit(Opcode::LoadEmpty { dst: reg });
        }

        self.push_loop_no_continue();
        // First pass: the case tests in order. The default clause emits
        // nothing here; it only becomes the fallback target.
        let mut body_patches: Vec<Option<usize>> = Vec::new();
        let t_cmp = self.push_temp()?;
        for case in cases {
            match &case.test {
                Some(test) => {
                    self.expr(test, t_cmp)?;
                    self.emit(Opcode::StrictEq {
                        lhs: t_disc,
                        rhs: t_cmp,
                        dst: t_cmp,
                    });
                    let j = self.here();
                    self.emit(Opcode::JumpIfTrue {
                        cond: t_cmp,
                        offset: 0,
                    });
                    body_patches.push(Some(j));
                }
                None => body_patches.push(None),
            }
        }
        self.pop_temp(t_cmp);
        // No test matched: jump to the default body, or past the bodies.
        let fallback = self.here();
        self.emit(Opcode::Jump { offset: 0 });

        let mut default_at: Option<usize> = None;
        for (i, case) in cases.iter().enumerate() {
            match body_patches[i] {
                Some(patch) => self.patch_jump(patch),
                None => default_at = Some(self.here()),
            }
            for s in &case.body {
                self.statement(s)?;
            }
        }
        match default_at {
            Some(target) => {
                let offset = target as i32 - (fallback as i32 + 1);
                if let Opcode::Jump { offset: o } = &mut self.f().code[fallback] {
                    *o = offset;
                }
            }
            None => self.patch_jump(fallback),
        }
        let ctx = self.pop_loop();
        for p in ctx.break_patches {
            self.patch_jump(p);
        }
        self.exit_block();
        self.pop_temp(t_disc);
        Ok(())
    }

    // Loops: break/continue bookkeeping

    fn push_loop(&mut self, iterator: Option<u16>) {
        let env_depth = self.abs_env_depth;
        let try_len = self.f().tries.len();
        self.f().loops.push(LoopCtx {
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
            env_depth,
            try_len,
            iterator,
            has_handler: iterator.is_some(),
            allow_continue: true,
        });
    }

    fn push_loop_no_continue(&mut self) {
        self.push_loop(None);
        self.f().loops.last_mut().expect("loop missing").allow_continue = false;
    }

    fn pop_loop(&mut self) -> LoopCtx {
        self.f().loops.pop().expect("unbalanced loops")
    }

    /// Patch break targets to here and continue targets to
    /// `continue_target`.
    fn finish_loop(&mut self, ctx: LoopCtx, continue_target: usize) {
        for p in ctx.break_patches {
            self.patch_jump(p);
        }
        for p in ctx.continue_patches {
            let offset = continue_target as i32 - (p as i32 + 1);
            if let Opcode::Jump { offset: o } = &mut self.f().code[p] {
                *o = offset;
            }
        }
    }

    /// Unwind try contexts entered after `down_to` on an early exit
    /// (break, continue, return): pop every handler, inlining the
    /// finally bodies along the way.
    fn emit_pending_finallys(&mut self, down_to: usize) -> EResult<()> {
        let pending: Vec<Option<&'ast [Stmt]>> = self.f().tries[down_to..]
            .iter()
            .rev()
            .map(|t| t.finally)
            .collect();
        for finally in pending {
            self.emit(Opcode::TryEnd);
            if let Some(stmts) = finally {
                for s in stmts {
                    self.statement(s)?;
                }
            }
        }
        Ok(())
    }

    fn emit_break(&mut self) -> EResult<()> {
        let Some(ctx) = self.f().loops.last() else {
            return Err(self.error("illegal break statement"));
        };
        let (env_depth, try_len, iterator, has_handler) =
            (ctx.env_depth, ctx.try_len, ctx.iterator, ctx.has_handler);
        self.emit_pending_finallys(try_len)?;
        if has_handler {
            self.emit(Opcode::TryEnd);
        }
        for _ in env_depth..self.abs_env_depth {
            self.emit(Opcode::PopEnv);
        }
        if let Some(iter) = iterator {
            self.emit(Opcode::IteratorClose { iter });
        }
        let j = self.here();
        self.emit(Opcode::Jump { offset: 0 });
        self.f()
            .loops
            .last_mut()
            .expect("loop missing")
            .break_patches
            .push(j);
        Ok(())
    }

    fn emit_continue(&mut self) -> EResult<()> {
        let Some(idx) = self
            .f()
            .loops
            .iter()
            .rposition(|l| l.allow_continue)
        else {
            return Err(self.error("illegal continue statement"));
        };
        let (env_depth, try_len, has_handler) = {
            let ctx = &self.f().loops[idx];
            (ctx.env_depth, ctx.try_len, ctx.has_handler)
        };
        self.emit_pending_finallys(try_len)?;
        if has_handler {
            self.emit(Opcode::TryEnd);
        }
        for _ in env_depth..self.abs_env_depth {
            self.emit(Opcode::PopEnv);
        }
        let j = self.here();
        self.emit(Opcode::Jump { offset: 0 });
        self.f().loops[idx].continue_patches.push(j);
        Ok(())
    }

    fn emit_export_aliases(&mut self) -> EResult<()> {
        let aliases = self.f().export_aliases.clone();
        for (local, exported) in aliases {
            let reg = self.emit_load_identifier(local, false)?;
            self.emit(Opcode::StoreByName {
                name: exported,
                src: reg,
            });
            self.release(reg);
        }
        Ok(())
    }

    // Expressions

    fn expr(&mut self, e: &'ast Expr, dst: u16) -> EResult<()> {
        self.cur_pos = e.pos;
        match &e.kind {
            ExprKind::Null => self.emit(Opcode::LoadNull { dst }),
            ExprKind::Undefined => self.emit(Opcode::LoadUndefined { dst }),
            ExprKind::Bool(true) => self.emit(Opcode::LoadTrue { dst }),
            ExprKind::Bool(false) => self.emit(Opcode::LoadFalse { dst }),
            ExprKind::Number(n) => self.emit_number(*n, dst)?,
            ExprKind::Str(s) => {
                let s = s.clone();
                self.emit_string_literal(&s, dst)?;
            }
            ExprKind::This => self.emit(Opcode::LoadThis { dst }),
            ExprKind::Ident(name) => {
                let atom = self.atom(name);
                self.ensure_arguments_if_needed(atom);
                let reg = self.emit_load_identifier(atom, false)?;
                if reg != dst {
                    self.emit(Opcode::Move { src: reg, dst });
                }
                self.release(reg);
            }
            ExprKind::Array(elements) => self.array_literal(elements, dst)?,
            ExprKind::Object(props) => self.object_literal(props, dst)?,
            ExprKind::Function(func) => {
                let index = self.compile_function(func, CodeBlockFlags::empty())?;
                self.emit(Opcode::CreateFunction { index, dst });
            }
            ExprKind::Class(class) => self.class_expr(class, dst)?,
            ExprKind::Unary { op, expr } => self.unary_expr(*op, expr, dst)?,
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => self.update_expr(*increment, *prefix, target, dst)?,
            ExprKind::Binary { op, left, right } => {
                let t_l = self.push_temp()?;
                self.expr(left, t_l)?;
                let t_r = self.push_temp()?;
                self.expr(right, t_r)?;
                self.emit(binary_opcode(*op, t_l, t_r, dst));
                self.pop_temp(t_r);
                self.pop_temp(t_l);
            }
            ExprKind::Logical { op, left, right } => {
                self.expr(left, dst)?;
                let j = self.here();
                match op {
                    LogicalOp::And => self.emit(Opcode::JumpIfFalse {
                        cond: dst,
                        offset: 0,
                    }),
                    LogicalOp::Or => self.emit(Opcode::JumpIfTrue {
                        cond: dst,
                        offset: 0,
                    }),
                }
                self.expr(right, dst)?;
                self.patch_jump(j);
            }
            ExprKind::Conditional { cond, cons, alt } => {
                let t = self.push_temp()?;
                self.expr(cond, t)?;
                let to_alt = self.here();
                self.emit(Opcode::JumpIfFalse { cond: t, offset: 0 });
                self.pop_temp(t);
                self.expr(cons, dst)?;
                let to_end = self.here();
                self.emit(Opcode::Jump { offset: 0 });
                self.patch_jump(to_alt);
                self.expr(alt, dst)?;
                self.patch_jump(to_end);
            }
            ExprKind::Assign { op, target, value } => {
                self.assignment_expr(*op, target, value, dst)?;
            }
            ExprKind::Call { callee, args } => self.call_expr(callee, args, dst)?,
            ExprKind::New { callee, args } => {
                let t_callee = self.push_temp()?;
                self.expr(callee, t_callee)?;
                let argv = self.emit_arguments(args)?;
                self.emit(Opcode::Construct {
                    callee: t_callee,
                    argv,
                    argc: args.len() as u16,
                    dst,
                });
                self.release_arguments(args.len());
                self.pop_temp(t_callee);
            }
            ExprKind::Member { object, property } => {
                let t_obj = self.push_temp()?;
                self.expr(object, t_obj)?;
                let t_key = self.push_temp()?;
                self.member_key(property, t_key)?;
                self.emit(Opcode::GetByProperty {
                    obj: t_obj,
                    key: t_key,
                    dst,
                });
                self.pop_temp(t_key);
                self.pop_temp(t_obj);
            }
            ExprKind::Sequence(exprs) => {
                for e in exprs {
                    self.expr(e, dst)?;
                }
            }
            ExprKind::SuperCall(args) => {
                if !self
                    .f()
                    .flags
                    .contains(CodeBlockFlags::DERIVED_CLASS_CONSTRUCTOR)
                {
                    return Err(self.error("'super' keyword unexpected here"));
                }
                let argv = self.emit_arguments(args)?;
                self.emit(Opcode::SuperCall {
                    argv,
                    argc: args.len() as u16,
                    dst,
                });
                self.release_arguments(args.len());
            }
        }
        Ok(())
    }

    fn member_key(&mut self, property: &'ast MemberProp, dst: u16) -> EResult<()> {
        match property {
            MemberProp::Ident(name) => {
                let name = name.clone();
                self.emit_string_literal(&name, dst)
            }
            MemberProp::Computed(e) => self.expr(e, dst),
        }
    }

    fn array_literal(&mut self, elements: &'ast [Option<Expr>], dst: u16) -> EResult<()> {
        if elements.len() <= 64 {
            let argv = self.f().temp_next;
            for element in elements {
                let t = self.push_temp()?;
                match element {
                    Some(e) => self.expr(e, t)?,
                    None => self.emit(Opcode::LoadEmpty { dst: t }),
                }
            }
            self.emit(Opcode::NewArray {
                argv,
                argc: elements.len() as u16,
                dst,
            });
            self.release_arguments(elements.len());
            return Ok(());
        }
        // Long literal: build empty then store element by element.
        self.emit(Opcode::NewArray {
            argv: 0,
            argc: 0,
            dst,
        });
        let t_key = self.push_temp()?;
        let t_val = self.push_temp()?;
        for (i, element) in elements.iter().enumerate() {
            let Some(e) = element else { continue };
            self.emit(Opcode::LoadInt {
                value: i as i32,
                dst: t_key,
            });
            self.expr(e, t_val)?;
            self.emit(Opcode::SetByProperty {
                obj: dst,
                key: t_key,
                src: t_val,
            });
        }
        self.emit_string_literal("length", t_key)?;
        self.emit(Opcode::LoadInt {
            value: elements.len() as i32,
            dst: t_val,
        });
        self.emit(Opcode::SetByProperty {
            obj: dst,
            key: t_key,
            src: t_val,
        });
        self.pop_temp(t_val);
        self.pop_temp(t_key);
        Ok(())
    }

    fn object_literal(&mut self, props: &'ast [ObjectProp], dst: u16) -> EResult<()> {
        self.emit(Opcode::NewObject { dst });
        for prop in props {
            let t_key = self.push_temp()?;
            match prop {
                ObjectProp::Init { name, value } => {
                    self.prop_name(name, t_key)?;
                    let t_val = self.push_temp()?;
                    self.expr(value, t_val)?;
                    self.emit(Opcode::DefineDataProperty {
                        obj: dst,
                        key: t_key,
                        src: t_val,
                        enumerable: true,
                    });
                    self.pop_temp(t_val);
                }
                ObjectProp::Getter { name, func } => {
                    self.prop_name(name, t_key)?;
                    let index =
                        self.compile_function(func, CodeBlockFlags::GETTER_OR_SETTER)?;
                    let t_fn = self.push_temp()?;
                    self.emit(Opcode::CreateFunction { index, dst: t_fn });
                    self.emit(Opcode::DefineGetter {
                        obj: dst,
                        key: t_key,
                        func: t_fn,
                        enumerable: true,
                    });
                    self.pop_temp(t_fn);
                }
                ObjectProp::Setter { name, func } => {
                    self.prop_name(name, t_key)?;
                    let index =
                        self.compile_function(func, CodeBlockFlags::GETTER_OR_SETTER)?;
                    let t_fn = self.push_temp()?;
                    self.emit(Opcode::CreateFunction { index, dst: t_fn });
                    self.emit(Opcode::DefineSetter {
                        obj: dst,
                        key: t_key,
                        func: t_fn,
                        enumerable: true,
                    });
                    self.pop_temp(t_fn);
                }
            }
            self.pop_temp(t_key);
        }
        Ok(())
    }

    fn prop_name(&mut self, name: &'ast PropName, dst: u16) -> EResult<()> {
        match name {
            PropName::Ident(s) | PropName::Str(s) => {
                let s = s.clone();
                self.emit_string_literal(&s, dst)
            }
            PropName::Num(n) => self.emit_number(*n, dst),
            PropName::Computed(e) => self.expr(e, dst),
        }
    }

    fn class_expr(&mut self, class: &'ast ClassNode, dst: u16) -> EResult<()> {
        let t_parent = if let Some(parent) = &class.parent {
            let t = self.push_temp()?;
            self.expr(parent, t)?;
            Some(t)
        } else {
            None
        };
        let ctor_index = match &class.constructor {
            Some(ctor) => {
                let mut flags = CodeBlockFlags::CLASS_CONSTRUCTOR;
                if class.parent.is_some() {
                    flags |= CodeBlockFlags::DERIVED_CLASS_CONSTRUCTOR;
                }
                self.compile_function(ctor, flags)?
            }
            None => u16::MAX,
        };
        self.emit(Opcode::CreateClass {
            ctor_index,
            parent: t_parent.unwrap_or(REG_NONE),
            dst,
        });

        if !class.methods.is_empty() {
            let t_proto = self.push_temp()?;
            let t_key = self.push_temp()?;
            self.emit_string_literal("prototype", t_key)?;
            self.emit(Opcode::GetByProperty {
                obj: dst,
                key: t_key,
                dst: t_proto,
            });
            for method in &class.methods {
                let target = if method.is_static { dst } else { t_proto };
                self.prop_name(&method.key, t_key)?;
                let flags = match method.kind {
                    MethodKind::Normal => CodeBlockFlags::empty(),
                    _ => CodeBlockFlags::GETTER_OR_SETTER,
                };
                let index = self.compile_function(&method.func, flags)?;
                let t_fn = self.push_temp()?;
                self.emit(Opcode::CreateFunction { index, dst: t_fn });
                match method.kind {
                    MethodKind::Normal => self.emit(Opcode::DefineDataProperty {
                        obj: target,
                        key: t_key,
                        src: t_fn,
                        enumerable: false,
                    }),
                    MethodKind::Getter => self.emit(Opcode::DefineGetter {
                        obj: target,
                        key: t_key,
                        func: t_fn,
                        enumerable: false,
                    }),
                    MethodKind::Setter => self.emit(Opcode::DefineSetter {
                        obj: target,
                        key: t_key,
                        func: t_fn,
                        enumerable: false,
                    }),
                }
                self.pop_temp(t_fn);
            }
            self.pop_temp(t_key);
            self.pop_temp(t_proto);
        }
        if let Some(t) = t_parent {
            self.pop_temp(t);
        }
        Ok(())
    }

    fn unary_expr(&mut self, op: UnaryOp, operand: &'ast Expr, dst: u16) -> EResult<()> {
        match op {
            UnaryOp::Typeof => {
                if let ExprKind::Ident(name) = &operand.kind {
                    let atom = self.atom(name);
                    self.ensure_arguments_if_needed(atom);
                    match self.resolve_identifier(atom) {
                        Resolved::Global | Resolved::Dynamic => {
                            self.emit(Opcode::TypeofByName { name: atom, dst });
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                let t = self.push_temp()?;
                self.expr(operand, t)?;
                self.emit(Opcode::TypeofValue { src: t, dst });
                self.pop_temp(t);
            }
            UnaryOp::Delete => match &operand.kind {
                ExprKind::Member { object, property } => {
                    let t_obj = self.push_temp()?;
                    self.expr(object, t_obj)?;
                    let t_key = self.push_temp()?;
                    self.member_key(property, t_key)?;
                    self.emit(Opcode::DeleteProperty {
                        obj: t_obj,
                        key: t_key,
                        dst,
                    });
                    self.pop_temp(t_key);
                    self.pop_temp(t_obj);
                }
                ExprKind::Ident(name) => {
                    let name = self.atom(name);
                    self.emit(Opcode::DeleteByName { name, dst });
                }
                _ => {
                    let t = self.push_temp()?;
                    self.expr(operand, t)?;
                    self.pop_temp(t);
                    self.emit(Opcode::LoadTrue { dst });
                }
            },
            UnaryOp::Void => {
                let t = self.push_temp()?;
                self.expr(operand, t)?;
                self.pop_temp(t);
                self.emit(Opcode::LoadUndefined { dst });
            }
            _ => {
                let t = self.push_temp()?;
                self.expr(operand, t)?;
                let op = match op {
                    UnaryOp::Minus => Opcode::Negate { src: t, dst },
                    UnaryOp::Plus => Opcode::ToNumber { src: t, dst },
                    UnaryOp::Not => Opcode::LogicalNot { src: t, dst },
                    UnaryOp::BitNot => Opcode::BitNot { src: t, dst },
                    _ => unreachable!(),
                };
                self.emit(op);
                self.pop_temp(t);
            }
        }
        Ok(())
    }

    fn update_expr(
        &mut self,
        increment: bool,
        prefix: bool,
        target: &'ast Expr,
        dst: u16,
    ) -> EResult<()> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let atom = self.atom(name);
                self.ensure_arguments_if_needed(atom);
                let cur = self.emit_load_identifier(atom, false)?;
                let t_old = self.push_temp()?;
                self.emit(Opcode::ToNumber {
                    src: cur,
                    dst: t_old,
                });
                let t_new = self.push_temp()?;
                if increment {
                    self.emit(Opcode::Increment {
                        src: t_old,
                        dst: t_new,
                    });
                } else {
                    self.emit(Opcode::Decrement {
                        src: t_old,
                        dst: t_new,
                    });
                }
                self.emit_store_identifier(atom, t_new, StoreKind::Plain)?;
                let result = if prefix { t_new } else { t_old };
                if result != dst {
                    self.emit(Opcode::Move {
                        src: result,
                        dst,
                    });
                }
                self.pop_temp(t_new);
                self.pop_temp(t_old);
                self.release(cur);
            }
            ExprKind::Member { object, property } => {
                let t_obj = self.push_temp()?;
                self.expr(object, t_obj)?;
                let t_key = self.push_temp()?;
                self.member_key(property, t_key)?;
                let t_old = self.push_temp()?;
                self.emit(Opcode::GetByProperty {
                    obj: t_obj,
                    key: t_key,
                    dst: t_old,
                });
                self.emit(Opcode::ToNumber {
                    src: t_old,
                    dst: t_old,
                });
                let t_new = self.push_temp()?;
                if increment {
                    self.emit(Opcode::Increment {
                        src: t_old,
                        dst: t_new,
                    });
                } else {
                    self.emit(Opcode::Decrement {
                        src: t_old,
                        dst: t_new,
                    });
                }
                self.emit(Opcode::SetByProperty {
                    obj: t_obj,
                    key: t_key,
                    src: t_new,
                });
                let result = if prefix { t_new } else { t_old };
                if result != dst {
                    self.emit(Opcode::Move {
                        src: result,
                        dst,
                    });
                }
                self.pop_temp(t_new);
                self.pop_temp(t_old);
                self.pop_temp(t_key);
                self.pop_temp(t_obj);
            }
            _ => return Err(self.error("invalid increment/decrement target")),
        }
        Ok(())
    }

    fn assignment_expr(
        &mut self,
        op: Option<BinaryOp>,
        target: &'ast Expr,
        value: &'ast Expr,
        dst: u16,
    ) -> EResult<()> {
        match (&target.kind, op) {
            (ExprKind::Ident(name), None) => {
                let atom = self.atom(name);
                self.ensure_arguments_if_needed(atom);
                self.expr(value, dst)?;
                self.emit_store_identifier(atom, dst, StoreKind::Plain)?;
            }
            (ExprKind::Ident(name), Some(op)) => {
                let atom = self.atom(name);
                self.ensure_arguments_if_needed(atom);
                // Under a live object scope the reference must be
                // resolved before the RHS can run.
                let needs_address = self.f().with_depth > 0
                    && matches!(
                        self.resolve_identifier(atom),
                        Resolved::Named { .. } | Resolved::Dynamic
                    );
                if needs_address {
                    let t_addr = self.push_temp()?;
                    self.emit(Opcode::ResolveNameAddress {
                        name: atom,
                        dst: t_addr,
                    });
                    let t_cur = self.push_temp()?;
                    self.emit(Opcode::LoadByName {
                        name: atom,
                        dst: t_cur,
                    });
                    let t_val = self.push_temp()?;
                    self.expr(value, t_val)?;
                    self.emit(binary_opcode(op, t_cur, t_val, dst));
                    self.emit(Opcode::StoreByNameWithAddress {
                        addr: t_addr,
                        name: atom,
                        src: dst,
                    });
                    self.pop_temp(t_val);
                    self.pop_temp(t_cur);
                    self.pop_temp(t_addr);
                } else {
                    let cur = self.emit_load_identifier(atom, false)?;
                    let t_val = self.push_temp()?;
                    self.expr(value, t_val)?;
                    self.emit(binary_opcode(op, cur, t_val, dst));
                    self.emit_store_identifier(atom, dst, StoreKind::Plain)?;
                    self.pop_temp(t_val);
                    self.release(cur);
                }
            }
            (ExprKind::Member { object, property }, None) => {
                let t_obj = self.push_temp()?;
                self.expr(object, t_obj)?;
                let t_key = self.push_temp()?;
                self.member_key(property, t_key)?;
                self.expr(value, dst)?;
                self.emit(Opcode::SetByProperty {
                    obj: t_obj,
                    key: t_key,
                    src: dst,
                });
                self.pop_temp(t_key);
                self.pop_temp(t_obj);
            }
            (ExprKind::Member { object, property }, Some(op)) => {
                let t_obj = self.push_temp()?;
                self.expr(object, t_obj)?;
                let t_key = self.push_temp()?;
                self.member_key(property, t_key)?;
                let t_cur = self.push_temp()?;
                self.emit(Opcode::GetByProperty {
                    obj: t_obj,
                    key: t_key,
                    dst: t_cur,
                });
                let t_val = self.push_temp()?;
                self.expr(value, t_val)?;
                self.emit(binary_opcode(op, t_cur, t_val, dst));
                self.emit(Opcode::SetByProperty {
                    obj: t_obj,
                    key: t_key,
                    src: dst,
                });
                self.pop_temp(t_val);
                self.pop_temp(t_cur);
                self.pop_temp(t_key);
                self.pop_temp(t_obj);
            }
            _ => return Err(self.error("invalid assignment target")),
        }
        Ok(())
    }

    /// Store an already-computed value to an assignment target
    /// (for-in/for-of heads).
    fn assign_to_target(&mut self, target: &'ast Expr, src: u16) -> EResult<()> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let atom = self.atom(name);
                self.emit_store_identifier(atom, src, StoreKind::Plain)
            }
            ExprKind::Member { object, property } => {
                let t_obj = self.push_temp()?;
                self.expr(object, t_obj)?;
                let t_key = self.push_temp()?;
                self.member_key(property, t_key)?;
                self.emit(Opcode::SetByProperty {
                    obj: t_obj,
                    key: t_key,
                    src,
                });
                self.pop_temp(t_key);
                self.pop_temp(t_obj);
                Ok(())
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    fn call_expr(&mut self, callee: &'ast Expr, args: &'ast [Expr], dst: u16) -> EResult<()> {
        // Direct eval call sites get their own opcode; the interpreter
        // falls back to a normal call when the resolved callee is not
        // the builtin eval.
        if let ExprKind::Ident(name) = &callee.kind {
            if name == "eval" {
                let argv = self.emit_arguments(args)?;
                self.emit(Opcode::CallEval {
                    argv,
                    argc: args.len() as u16,
                    dst,
                });
                self.release_arguments(args.len());
                return Ok(());
            }
        }
        if let ExprKind::Member { object, property } = &callee.kind {
            // Method call: the receiver becomes `this`.
            let t_this = self.push_temp()?;
            self.expr(object, t_this)?;
            let t_callee = self.push_temp()?;
            self.member_key(property, t_callee)?;
            self.emit(Opcode::GetByProperty {
                obj: t_this,
                key: t_callee,
                dst: t_callee,
            });
            let argv = self.emit_arguments(args)?;
            self.emit(Opcode::Call {
                callee: t_callee,
                this_reg: t_this,
                argv,
                argc: args.len() as u16,
                dst,
            });
            self.release_arguments(args.len());
            self.pop_temp(t_callee);
            self.pop_temp(t_this);
            return Ok(());
        }

        let t_callee = self.push_temp()?;
        self.expr(callee, t_callee)?;
        let argv = self.emit_arguments(args)?;
        self.emit(Opcode::Call {
            callee: t_callee,
            this_reg: REG_NONE,
            argv,
            argc: args.len() as u16,
            dst,
        });
        self.release_arguments(args.len());
        self.pop_temp(t_callee);
        Ok(())
    }

    /// Evaluate arguments into consecutive temporaries; returns the
    /// first register.
    fn emit_arguments(&mut self, args: &'ast [Expr]) -> EResult<u16> {
        let argv = self.f().temp_next;
        for arg in args {
            let t = self.push_temp()?;
            self.expr(arg, t)?;
        }
        Ok(argv)
    }

    fn release_arguments(&mut self, argc: usize) {
        for _ in 0..argc {
            let top = self.f().temp_next - 1;
            self.pop_temp(top);
        }
    }
}

fn binary_opcode(op: BinaryOp, lhs: u16, rhs: u16, dst: u16) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add { lhs, rhs, dst },
        BinaryOp::Sub => Opcode::Sub { lhs, rhs, dst },
        BinaryOp::Mul => Opcode::Mul { lhs, rhs, dst },
        BinaryOp::Div => Opcode::Div { lhs, rhs, dst },
        BinaryOp::Mod => Opcode::Mod { lhs, rhs, dst },
        BinaryOp::Pow => Opcode::Pow { lhs, rhs, dst },
        BinaryOp::Shl => Opcode::Shl { lhs, rhs, dst },
        BinaryOp::Sar => Opcode::Sar { lhs, rhs, dst },
        BinaryOp::Shr => Opcode::Shr { lhs, rhs, dst },
        BinaryOp::BitAnd => Opcode::BitAnd { lhs, rhs, dst },
        BinaryOp::BitOr => Opcode::BitOr { lhs, rhs, dst },
        BinaryOp::BitXor => Opcode::BitXor { lhs, rhs, dst },
        BinaryOp::Lt => Opcode::Less { lhs, rhs, dst },
        BinaryOp::Gt => Opcode::Greater { lhs, rhs, dst },
        BinaryOp::LtEq => Opcode::LessEq { lhs, rhs, dst },
        BinaryOp::GtEq => Opcode::GreaterEq { lhs, rhs, dst },
        BinaryOp::Eq => Opcode::Eq { lhs, rhs, dst },
        BinaryOp::NotEq => Opcode::NotEq { lhs, rhs, dst },
        BinaryOp::StrictEq => Opcode::StrictEq { lhs, rhs, dst },
        BinaryOp::StrictNotEq => Opcode::StrictNotEq { lhs, rhs, dst },
        BinaryOp::In => Opcode::In { lhs, rhs, dst },
        BinaryOp::Instanceof => Opcode::InstanceOf { lhs, rhs, dst },
    }
}

/// Lexical names declared directly at a chunk's top level.
fn top_level_lexicals(body: &[Stmt]) -> Vec<(String, BindKind)> {
    let mut names = Vec::new();
    for stmt in body {
        let decl = match &stmt.kind {
            StmtKind::ExportNamed {
                decl: Some(decl), ..
            } => &decl.kind,
            other => other,
        };
        match decl {
            StmtKind::VarDecl { kind, decls } if kind.is_lexical() => {
                let bk = if *kind == DeclKind::Const {
                    BindKind::Const
                } else {
                    BindKind::Let
                };
                for (name, _) in decls {
                    names.push((name.clone(), bk));
                }
            }
            StmtKind::ClassDecl(class) => {
                if let Some(name) = &class.name {
                    names.push((name.clone(), BindKind::Let));
                }
            }
            _ => {}
        }
    }
    names
}

/// Names introduced by a declaration statement.
fn declared_names(stmt: &Stmt) -> Vec<String> {
    match &stmt.kind {
        StmtKind::VarDecl { decls, .. } => decls.iter().map(|(n, _)| n.clone()).collect(),
        StmtKind::FunctionDecl(f) => f.name.iter().cloned().collect(),
        StmtKind::ClassDecl(c) => c.name.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

fn declared_kind(stmt: &Stmt) -> BindKind {
    match &stmt.kind {
        StmtKind::VarDecl {
            kind: DeclKind::Const,
            ..
        } => BindKind::Const,
        StmtKind::VarDecl {
            kind: DeclKind::Let,
            ..
        } => BindKind::Let,
        StmtKind::VarDecl { .. } | StmtKind::FunctionDecl(_) => BindKind::Var,
        StmtKind::ClassDecl(_) => BindKind::Let,
        _ => BindKind::Var,
    }
}
