//! QuartzJS - an embeddable ECMAScript engine
//!
//! Source text is parsed into an AST, lowered to register bytecode
//! attached to a lexical-scope-aware code block, and executed against a
//! tagged value representation backed by a traced heap.
//!
//! # Example
//! ```ignore
//! use quartzjs::{Context, VmInstance};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let vm = Rc::new(RefCell::new(VmInstance::new_bare()));
//! let mut ctx = Context::new(vm);
//! let result = ctx.eval("6 * 7").unwrap();
//! assert_eq!(result.as_int32(), Some(42));
//! ```

// Core value representation
pub mod value;

// Atomic string table
pub mod atom;

// Traced heap
pub mod gc;

// Runtime object model
pub mod runtime;

// Parser and scope resolver
pub mod parser;

// Bytecode format and emitter
pub mod bytecode;

// Interpreter and job queue
pub mod vm;

// Builtin library
pub mod builtins;

// Embedding surface
pub mod context;

// Conversion helpers
pub mod util;

// Re-export main types
pub use context::{Context, EvalError, Globals, Platform, Script, VmInstance};
pub use value::Value;
