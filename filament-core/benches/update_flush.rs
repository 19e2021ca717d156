//! Benchmarks for the render and update paths.
//!
//! Run with: cargo bench -p filament-core --bench update_flush

use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use filament_core::{el, Engine, MemorySurface, Surface, Template, Value};
use serde_json::json;

fn list_engine(size: usize) -> (Rc<MemorySurface>, Engine) {
    let surface = Rc::new(MemorySurface::new());
    let engine = Engine::new(surface.clone());
    let items: Vec<usize> = (0..size).collect();
    engine
        .register(
            "list",
            Template::new([el("ul").child(
                el("for")
                    .bind("in", "state.items")
                    .args(&["item", "i"])
                    .child(el("li").bind("data-i", "i").text("{item}")),
            )])
            .with_state(json!({ "items": items })),
        )
        .expect("template is valid");
    (surface, engine)
}

fn bench_initial_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render/list");
    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("mount", size), &size, |b, &size| {
            b.iter(|| {
                let (surface, engine) = list_engine(size);
                let list = engine.mount("list", Value::Undefined, surface.root()).expect("mounts");
                black_box(list.inspect())
            })
        });
    }
    group.finish();
}

fn bench_single_item_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update/one_item");
    for size in [10usize, 100, 1000] {
        let (surface, engine) = list_engine(size);
        let list = engine.mount("list", Value::Undefined, surface.root()).expect("mounts");
        let mut tick = 0usize;
        group.bench_with_input(BenchmarkId::new("flush", size), &size, |b, &size| {
            b.iter(|| {
                tick += 1;
                let mut items: Vec<usize> = (0..size).collect();
                items[size / 2] = size + tick;
                list.set_state("items", json!(items)).expect("valid path");
                black_box(engine.run_until_idle())
            })
        });
    }
    group.finish();
}

fn bench_text_binding(c: &mut Criterion) {
    let surface = Rc::new(MemorySurface::new());
    let engine = Engine::new(surface.clone());
    engine
        .register(
            "counter",
            Template::new([el("p").bind("title", "state.n").text("count {state.n}")])
                .with_state(json!({"n": 0})),
        )
        .expect("template is valid");
    let counter = engine.mount("counter", Value::Undefined, surface.root()).expect("mounts");
    let mut n = 0i64;
    c.bench_function("update/text_binding", |b| {
        b.iter(|| {
            n += 1;
            counter.set_state("n", n).expect("valid path");
            black_box(engine.run_until_idle())
        })
    });
}

criterion_group!(benches, bench_initial_render, bench_single_item_update, bench_text_binding);
criterion_main!(benches);
