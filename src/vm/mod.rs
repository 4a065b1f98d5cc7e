//! Virtual machine
//!
//! The interpreter dispatches register bytecode over engine-owned
//! frames; the job queue drains promise reactions between evaluations.

pub mod interpreter;
pub mod jobs;

pub use interpreter::{call_function, construct, run_program, Frame};
pub use jobs::Job;
