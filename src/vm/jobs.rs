//! Promise job queue
//!
//! Jobs are drained cooperatively between top-level evaluations, FIFO,
//! never preempting running script. A job enqueued while a job runs
//! executes after the current one completes.

use crate::context::ExecState;
use crate::gc::RootSet;
use crate::value::{ObjectRef, Value};
use crate::vm::interpreter::call_function;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Fulfill,
    Reject,
}

/// One queued promise reaction.
#[derive(Debug, Clone, Copy)]
pub struct Job {
    /// The `then` handler; absent for pass-through reactions.
    pub handler: Option<ObjectRef>,
    /// Settlement value of the source promise.
    pub argument: Value,
    /// The derived promise to settle with the handler's outcome.
    pub derived: Option<ObjectRef>,
    pub kind: JobKind,
}

impl Job {
    pub fn trace(&self, roots: &mut RootSet) {
        if let Some(h) = self.handler {
            roots.objects.push(h);
        }
        roots.push_value(self.argument);
        if let Some(d) = self.derived {
            roots.objects.push(d);
        }
    }
}

/// Run one job to completion.
pub fn run_job(st: &mut ExecState<'_>, job: Job) -> Result<(), Value> {
    match job.handler {
        Some(handler) => match call_function(st, handler, Value::undefined(), &[job.argument]) {
            Ok(result) => {
                if let Some(derived) = job.derived {
                    crate::builtins::promise::resolve_promise(st, derived, result)?;
                }
                Ok(())
            }
            Err(thrown) => {
                if let Some(derived) = job.derived {
                    crate::builtins::promise::reject_promise(st, derived, thrown);
                    Ok(())
                } else {
                    Err(thrown)
                }
            }
        },
        None => {
            // Pass-through: no handler registered for this settlement
            // direction.
            if let Some(derived) = job.derived {
                match job.kind {
                    JobKind::Fulfill => {
                        crate::builtins::promise::resolve_promise(st, derived, job.argument)?
                    }
                    JobKind::Reject => {
                        crate::builtins::promise::reject_promise(st, derived, job.argument)
                    }
                }
            }
            Ok(())
        }
    }
}
