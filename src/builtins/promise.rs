//! Promise
//!
//! Settlement never runs handlers inline: reactions are enqueued on the
//! instance job queue and drained by the host between evaluations.

use crate::builtins::{define_method, link_constructor};
use crate::context::{ExecState, Realm, VmInstance};
use crate::runtime::conversion::get_object_property;
use crate::runtime::function::FunctionData;
use crate::runtime::object::{ObjectKind, PromiseData, PromiseReaction, PromiseState};
use crate::runtime::property::PropertyKey;
use crate::value::{ObjectRef, Value};
use crate::vm::interpreter::call_function;
use crate::vm::jobs::{Job, JobKind};

pub fn create_promise(st: &mut ExecState<'_>) -> ObjectRef {
    let proto = st.realm.promise_prototype;
    st.vm.alloc_object(
        Some(proto),
        ObjectKind::Promise(Box::new(PromiseData {
            state: PromiseState::Pending,
            result: Value::undefined(),
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
        })),
    )
}

fn promise_data<'s, 'a>(st: &'s ExecState<'a>, obj: ObjectRef) -> Option<&'s PromiseData> {
    match &st.vm.heap.object(obj).kind {
        ObjectKind::Promise(data) => Some(data),
        _ => None,
    }
}

pub fn constructor(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    if !this.is_object() {
        return Err(st.throw_type_error("Promise constructor cannot be invoked without 'new'"));
    }
    let executor = match args.first().and_then(|v| v.as_object()) {
        Some(f) if st.vm.heap.object(f).is_callable() => f,
        _ => return Err(st.throw_type_error("Promise resolver is not a function")),
    };
    let promise = create_promise(st);
    let resolve = settle_function(st, promise, resolve_native);
    let reject = settle_function(st, promise, reject_native);
    let outcome = call_function(
        st,
        executor,
        Value::undefined(),
        &[Value::object(resolve), Value::object(reject)],
    );
    if let Err(thrown) = outcome {
        reject_promise(st, promise, thrown);
    }
    Ok(Value::object(promise))
}

/// A native closure holding the promise it settles.
fn settle_function(
    st: &mut ExecState<'_>,
    promise: ObjectRef,
    f: crate::runtime::function::NativeFn,
) -> ObjectRef {
    let data = FunctionData::native_with_payload(f, vec![Value::object(promise)]);
    let proto = st.realm.function_prototype;
    st.vm
        .alloc_object(Some(proto), ObjectKind::Function(Box::new(data)))
}

fn payload_promise(st: &ExecState<'_>, func: ObjectRef) -> Option<ObjectRef> {
    match st.vm.heap.object(func).function_data() {
        Some(FunctionData {
            callable: crate::runtime::function::Callable::Native { payload, .. },
            ..
        }) => payload.first().and_then(|v| v.as_object()),
        _ => None,
    }
}

fn resolve_native(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    func: ObjectRef,
) -> Result<Value, Value> {
    if let Some(promise) = payload_promise(st, func) {
        resolve_promise(st, promise, args.first().copied().unwrap_or(Value::undefined()))?;
    }
    Ok(Value::undefined())
}

fn reject_native(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    func: ObjectRef,
) -> Result<Value, Value> {
    if let Some(promise) = payload_promise(st, func) {
        reject_promise(st, promise, args.first().copied().unwrap_or(Value::undefined()));
    }
    Ok(Value::undefined())
}

/// Resolve: unwrap thenables, otherwise fulfill.
pub fn resolve_promise(
    st: &mut ExecState<'_>,
    promise: ObjectRef,
    value: Value,
) -> Result<(), Value> {
    if !promise_data(st, promise).is_some_and(|d| d.state == PromiseState::Pending) {
        return Ok(());
    }
    if let Some(inner) = value.as_object() {
        if let Some(data) = promise_data(st, inner) {
            // Chaining on one of our promises: settle this one when the
            // inner settles.
            let state = data.state;
            let result = data.result;
            match state {
                PromiseState::Pending => {
                    if let ObjectKind::Promise(data) = &mut st.vm.heap.object_mut(inner).kind {
                        data.fulfill_reactions.push(PromiseReaction {
                            handler: None,
                            derived: Some(promise),
                        });
                        data.reject_reactions.push(PromiseReaction {
                            handler: None,
                            derived: Some(promise),
                        });
                    }
                }
                PromiseState::Fulfilled => {
                    st.vm.jobs.push_back(Job {
                        handler: None,
                        argument: result,
                        derived: Some(promise),
                        kind: JobKind::Fulfill,
                    });
                }
                PromiseState::Rejected => {
                    st.vm.jobs.push_back(Job {
                        handler: None,
                        argument: result,
                        derived: Some(promise),
                        kind: JobKind::Reject,
                    });
                }
            }
            return Ok(());
        }
        // Generic thenable: hand it our settle functions.
        let then_key = PropertyKey::Atom(st.vm.wk.then);
        let then = get_object_property(st, inner, &then_key, value)?;
        if let Some(then_fn) = then.as_object() {
            if st.vm.heap.object(then_fn).is_callable() {
                let resolve = settle_function(st, promise, resolve_native);
                let reject = settle_function(st, promise, reject_native);
                let outcome = call_function(
                    st,
                    then_fn,
                    value,
                    &[Value::object(resolve), Value::object(reject)],
                );
                if let Err(thrown) = outcome {
                    reject_promise(st, promise, thrown);
                }
                return Ok(());
            }
        }
    }
    settle(st, promise, PromiseState::Fulfilled, value);
    Ok(())
}

pub fn reject_promise(st: &mut ExecState<'_>, promise: ObjectRef, reason: Value) {
    settle(st, promise, PromiseState::Rejected, reason);
}

fn settle(st: &mut ExecState<'_>, promise: ObjectRef, state: PromiseState, result: Value) {
    let reactions = {
        let ObjectKind::Promise(data) = &mut st.vm.heap.object_mut(promise).kind else {
            return;
        };
        if data.state != PromiseState::Pending {
            return;
        }
        data.state = state;
        data.result = result;
        let reactions = if state == PromiseState::Fulfilled {
            std::mem::take(&mut data.fulfill_reactions)
        } else {
            std::mem::take(&mut data.reject_reactions)
        };
        data.fulfill_reactions.clear();
        data.reject_reactions.clear();
        reactions
    };
    let kind = if state == PromiseState::Fulfilled {
        JobKind::Fulfill
    } else {
        JobKind::Reject
    };
    for reaction in reactions {
        st.vm.jobs.push_back(Job {
            handler: reaction.handler,
            argument: result,
            derived: reaction.derived,
            kind,
        });
    }
}

fn callable_or_none(st: &ExecState<'_>, v: Value) -> Option<ObjectRef> {
    v.as_object()
        .filter(|o| st.vm.heap.object(*o).is_callable())
}

fn then(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let Some(promise) = this.as_object() else {
        return Err(st.throw_type_error("Promise.prototype.then called on a non-promise"));
    };
    let Some(data) = promise_data(st, promise) else {
        return Err(st.throw_type_error("Promise.prototype.then called on a non-promise"));
    };
    let state = data.state;
    let result = data.result;
    let on_fulfilled = callable_or_none(st, args.first().copied().unwrap_or(Value::undefined()));
    let on_rejected = callable_or_none(st, args.get(1).copied().unwrap_or(Value::undefined()));
    let derived = create_promise(st);

    match state {
        PromiseState::Pending => {
            if let ObjectKind::Promise(data) = &mut st.vm.heap.object_mut(promise).kind {
                data.fulfill_reactions.push(PromiseReaction {
                    handler: on_fulfilled,
                    derived: Some(derived),
                });
                data.reject_reactions.push(PromiseReaction {
                    handler: on_rejected,
                    derived: Some(derived),
                });
            }
        }
        PromiseState::Fulfilled => {
            st.vm.jobs.push_back(Job {
                handler: on_fulfilled,
                argument: result,
                derived: Some(derived),
                kind: JobKind::Fulfill,
            });
        }
        PromiseState::Rejected => {
            st.vm.jobs.push_back(Job {
                handler: on_rejected,
                argument: result,
                derived: Some(derived),
                kind: JobKind::Reject,
            });
        }
    }
    Ok(Value::object(derived))
}

fn catch(
    st: &mut ExecState<'_>,
    this: Value,
    args: &[Value],
    func: ObjectRef,
) -> Result<Value, Value> {
    let on_rejected = args.first().copied().unwrap_or(Value::undefined());
    then(st, this, &[Value::undefined(), on_rejected], func)
}

fn promise_resolve(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let v = args.first().copied().unwrap_or(Value::undefined());
    if let Some(obj) = v.as_object() {
        if promise_data(st, obj).is_some() {
            return Ok(v);
        }
    }
    let promise = create_promise(st);
    resolve_promise(st, promise, v)?;
    Ok(Value::object(promise))
}

fn promise_reject(
    st: &mut ExecState<'_>,
    _this: Value,
    args: &[Value],
    _func: ObjectRef,
) -> Result<Value, Value> {
    let promise = create_promise(st);
    reject_promise(st, promise, args.first().copied().unwrap_or(Value::undefined()));
    Ok(Value::object(promise))
}

pub fn install(vm: &mut VmInstance, realm: &Realm) {
    let ctor = realm.promise_constructor;
    link_constructor(vm, realm, ctor, realm.promise_prototype, "Promise");
    define_method(vm, realm, ctor, "resolve", 1, promise_resolve);
    define_method(vm, realm, ctor, "reject", 1, promise_reject);
    define_method(vm, realm, realm.promise_prototype, "then", 2, then);
    define_method(vm, realm, realm.promise_prototype, "catch", 1, catch);
}
