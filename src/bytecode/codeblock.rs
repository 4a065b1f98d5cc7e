//! Code blocks
//!
//! A code block is the compiled form of one function body (or the
//! program / module top level): the instruction vector, its constant
//! pool, the source-map side table, the scope descriptor the
//! interpreter uses to activate the block, and the per-block flags the
//! resolver computed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::atom::Atom;
use crate::bytecode::opcode::{Opcode, SourceMap};
use crate::runtime::shape::ShapeId;
use crate::value::Value;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CodeBlockFlags: u16 {
        const STRICT = 1 << 0;
        const ARROW = 1 << 1;
        const USES_ARGUMENTS = 1 << 2;
        /// Bindings resolved to slots; no direct eval, `with`, or
        /// non-simple parameters in this block.
        const CAN_USE_INDEXED_STORAGE = 1 << 3;
        /// No closure captures any binding; activation may skip heap
        /// environment allocation entirely.
        const ENV_CAN_LIVE_ON_STACK = 1 << 4;
        /// Some enclosing scope forces dynamic name lookup.
        const ANCESTOR_FORCES_NAME_LOOKUP = 1 << 5;
        /// Activation allocates the function-level environment record.
        const NEEDS_BODY_ENV = 1 << 6;
        const PROGRAM = 1 << 7;
        const MODULE = 1 << 8;
        const CLASS_CONSTRUCTOR = 1 << 9;
        const DERIVED_CLASS_CONSTRUCTOR = 1 << 10;
        const GETTER_OR_SETTER = 1 << 11;
    }
}

/// One import binding of a module code block.
#[derive(Debug, Clone)]
pub struct ModuleImport {
    /// Index into `module_requests`.
    pub request: u16,
    /// Name exported by the dependency (`default` for default imports).
    pub imported: Atom,
    /// Local binding name in the module environment.
    pub local: Atom,
}

/// Where one declared parameter lands at activation.
#[derive(Debug, Clone, Copy)]
pub enum ParamBinding {
    Stack { reg: u16 },
    BodyEnv { slot: u16 },
    Named { atom: Atom },
}

/// Runtime state of one `GetGlobalVariable` cache slot: the last seen
/// global-object shape and the property slot it resolved to.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalCacheSlot {
    pub shape: Option<ShapeId>,
    pub slot: u32,
}

#[derive(Debug)]
pub struct CodeBlock {
    pub name: Option<Atom>,
    pub code: Vec<Opcode>,
    pub constants: Vec<Value>,
    pub source_map: SourceMap,
    /// Script name, reported in stack traces.
    pub source_name: Rc<str>,
    /// Script text, shared across the block tree; stack traces resolve
    /// line and column against it.
    pub source: Rc<str>,
    pub flags: CodeBlockFlags,

    /// Temporaries below the regular register limit.
    pub temp_register_count: u16,
    /// Stack-allocated locals addressed as `limit + slot`.
    pub stack_slot_count: u16,
    /// Slots of the function-level environment record.
    pub body_env_slot_count: u16,

    pub param_count: u16,
    pub param_bindings: Vec<ParamBinding>,
    /// Where the arguments object lands when it must be materialized
    /// eagerly at activation (captured or name-addressed). Lazy
    /// materialization uses `EnsureArgumentsObject` instead.
    pub arguments_binding: Option<ParamBinding>,
    /// Names created as mutable undefined bindings at activation when
    /// the block runs in named (non-indexed) storage mode.
    pub hoisted_names: Vec<Atom>,

    /// Enclosing code block; the root has no parent.
    pub parent: RefCell<Weak<CodeBlock>>,
    pub inner: Vec<Rc<CodeBlock>>,

    /// Module specifiers this module must load and evaluate first.
    pub module_requests: Vec<Rc<str>>,
    /// Import bindings copied into the module environment at
    /// activation, after the dependencies evaluated.
    pub imports: Vec<ModuleImport>,
    /// Exported names; the module linker creates these on the
    /// namespace object before the body runs.
    pub export_names: Vec<Atom>,
    /// `export { local as exported }` pairs copied at body completion.
    pub export_aliases: Vec<(Atom, Atom)>,

    /// Atoms of the global-cache family, one per cache index.
    pub global_cache_atoms: Vec<Atom>,
    /// Runtime cache state, lazily refreshed by the interpreter.
    pub global_caches: RefCell<Vec<GlobalCacheSlot>>,
}

impl CodeBlock {
    pub fn is_strict(&self) -> bool {
        self.flags.contains(CodeBlockFlags::STRICT)
    }

    pub fn is_arrow(&self) -> bool {
        self.flags.contains(CodeBlockFlags::ARROW)
    }

    pub fn can_use_indexed_storage(&self) -> bool {
        self.flags.contains(CodeBlockFlags::CAN_USE_INDEXED_STORAGE)
    }

    /// Link `parent` back-references after the tree is complete.
    pub fn link_children(self: &Rc<Self>) {
        for child in &self.inner {
            *child.parent.borrow_mut() = Rc::downgrade(self);
            child.link_children();
        }
    }

    /// Register-file size needed to execute this block.
    pub fn register_count(&self) -> usize {
        self.temp_register_count as usize + self.stack_slot_count as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(inner: Vec<Rc<CodeBlock>>) -> Rc<CodeBlock> {
        Rc::new(CodeBlock {
            name: None,
            code: Vec::new(),
            constants: Vec::new(),
            source_map: SourceMap::new(),
            source_name: "test".into(),
            source: "".into(),
            flags: CodeBlockFlags::CAN_USE_INDEXED_STORAGE,
            temp_register_count: 4,
            stack_slot_count: 2,
            body_env_slot_count: 0,
            param_count: 0,
            param_bindings: Vec::new(),
            arguments_binding: None,
            hoisted_names: Vec::new(),
            parent: RefCell::new(Weak::new()),
            inner,
            module_requests: Vec::new(),
            imports: Vec::new(),
            export_names: Vec::new(),
            export_aliases: Vec::new(),
            global_cache_atoms: Vec::new(),
            global_caches: RefCell::new(Vec::new()),
        })
    }

    #[test]
    fn parent_links() {
        let child = block(Vec::new());
        let root = block(vec![child]);
        root.link_children();
        let got = root.inner[0].parent.borrow().upgrade().unwrap();
        assert!(Rc::ptr_eq(&got, &root));
    }

    #[test]
    fn register_count_sums_temps_and_slots() {
        let b = block(Vec::new());
        assert_eq!(b.register_count(), 6);
    }
}
