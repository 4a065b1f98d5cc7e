//! End-to-end script benchmarks

use std::cell::RefCell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quartzjs::{Context, VmInstance};

fn new_context() -> Context {
    Context::new(Rc::new(RefCell::new(VmInstance::new_bare())))
}

fn bench_arithmetic_loop(c: &mut Criterion) {
    c.bench_function("arithmetic_loop", |b| {
        let mut ctx = new_context();
        b.iter(|| {
            let result = ctx
                .eval("var s = 0; for (var i = 0; i < 1000; i++) { s += i; } s")
                .unwrap();
            black_box(result);
        });
    });
}

fn bench_property_access(c: &mut Criterion) {
    c.bench_function("property_access", |b| {
        let mut ctx = new_context();
        ctx.eval("var o = { x: 1, y: 2, z: 3 };").unwrap();
        b.iter(|| {
            let result = ctx
                .eval("var t = 0; for (var i = 0; i < 500; i++) { t += o.x + o.y + o.z; } t")
                .unwrap();
            black_box(result);
        });
    });
}

fn bench_array_workload(c: &mut Criterion) {
    c.bench_function("array_workload", |b| {
        let mut ctx = new_context();
        b.iter(|| {
            let result = ctx
                .eval(
                    "var a = []; for (var i = 0; i < 200; i++) { a.push(i); } \
                     a.map(function (x) { return x * 2; }).filter(function (x) { return x % 4 === 0; }).length",
                )
                .unwrap();
            black_box(result);
        });
    });
}

fn bench_closures(c: &mut Criterion) {
    c.bench_function("closures", |b| {
        let mut ctx = new_context();
        b.iter(|| {
            let result = ctx
                .eval(
                    "function counter() { var n = 0; return function () { return ++n; }; } \
                     var c = counter(); var last = 0; \
                     for (var i = 0; i < 300; i++) { last = c(); } last",
                )
                .unwrap();
            black_box(result);
        });
    });
}

criterion_group!(
    benches,
    bench_arithmetic_loop,
    bench_property_access,
    bench_array_workload,
    bench_closures
);
criterion_main!(benches);
