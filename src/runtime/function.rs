//! Function object payloads
//!
//! A callable object carries one of three payloads: a native function
//! (direct call into a builtin), an interpreted function (a code block
//! plus its captured environment chain), or a bound function wrapping
//! another callable.

use std::rc::Rc;

use crate::bytecode::codeblock::CodeBlock;
use crate::context::ExecState;
use crate::value::{EnvRef, ObjectRef, Value};

/// Native function signature. `func` is the function object itself so
/// native closures can reach their payload values.
pub type NativeFn =
    fn(st: &mut ExecState<'_>, this: Value, args: &[Value], func: ObjectRef) -> Result<Value, Value>;

/// How a function treats `this` and `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    Getter,
    Setter,
    ClassConstructor,
    DerivedClassConstructor,
}

impl FunctionKind {
    /// Arrow functions and methods cannot be constructed.
    pub fn is_constructor(self) -> bool {
        matches!(
            self,
            FunctionKind::Normal
                | FunctionKind::ClassConstructor
                | FunctionKind::DerivedClassConstructor
        )
    }
}

/// The callable payload of a function object.
pub enum Callable {
    Native {
        f: NativeFn,
        /// Captured values for native closures (promise resolvers and
        /// the like).
        payload: Vec<Value>,
    },
    Interpreted {
        block: Rc<CodeBlock>,
        /// Innermost captured environment record at creation.
        env: Option<EnvRef>,
        /// `this` captured at creation for arrows.
        captured_this: Option<Value>,
        /// Parent constructor for `super(...)` in derived constructors.
        parent_constructor: Option<ObjectRef>,
    },
    Bound {
        target: ObjectRef,
        bound_this: Value,
        bound_args: Vec<Value>,
    },
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Native { .. } => write!(f, "Native"),
            Callable::Interpreted { block, .. } => {
                write!(f, "Interpreted({:?})", block.name)
            }
            Callable::Bound { target, .. } => write!(f, "Bound(#{})", target.0),
        }
    }
}

/// Payload of a function object.
#[derive(Debug)]
pub struct FunctionData {
    pub kind: FunctionKind,
    pub callable: Callable,
}

impl FunctionData {
    pub fn native(f: NativeFn) -> Self {
        FunctionData {
            kind: FunctionKind::Normal,
            callable: Callable::Native {
                f,
                payload: Vec::new(),
            },
        }
    }

    pub fn native_with_payload(f: NativeFn, payload: Vec<Value>) -> Self {
        FunctionData {
            kind: FunctionKind::Normal,
            callable: Callable::Native { f, payload },
        }
    }

    pub fn is_constructor(&self) -> bool {
        match &self.callable {
            Callable::Bound { .. } => true,
            _ => self.kind.is_constructor(),
        }
    }
}
