//! Notify-path benchmarks: listener fan-out, bubbling depth, and the
//! pooled-carrier hot path.

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{Criterion, criterion_group, criterion_main};
use propwire_core::{ChangeEvent, ChangeListener, Node, Schema, Value};

struct Counter(AtomicU64);

impl ChangeListener for Counter {
    fn on_change(&self, event: &ChangeEvent) {
        black_box(event.name());
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

fn leaf_schema() -> Arc<Schema> {
    Schema::builder("Leaf").property("Value", Value::Int(0)).build()
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify_fanout");
    for listeners in [1usize, 8, 64] {
        let node = Node::new(&leaf_schema());
        for i in 0..listeners {
            let l: Arc<dyn ChangeListener> = Arc::new(Counter(AtomicU64::new(0)));
            node.register_listener(&format!("tag{i}"), &l);
            // Leak the Arc into the registry on purpose; the bench only
            // measures delivery, not teardown.
            std::mem::forget(l);
        }
        group.bench_function(format!("listeners_{listeners}"), |b| {
            b.iter(|| node.notify_property(black_box("Value")));
        });
    }
    group.finish();
}

fn bench_bubbling_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("bubble_depth");
    for depth in [2usize, 4, 8] {
        let holder = Schema::builder("Holder").property("child", Value::Null).build();
        let root = Node::new(&holder);
        let mut current = root.clone();
        for _ in 0..depth {
            let next = Node::new(&holder);
            current.set("child", next.clone());
            current = next;
        }
        let leaf = Node::new(&leaf_schema());
        current.set("child", leaf.clone());

        let l: Arc<dyn ChangeListener> = Arc::new(Counter(AtomicU64::new(0)));
        root.register_listener("top", &l);
        std::mem::forget(l);

        group.bench_function(format!("depth_{depth}"), |b| {
            b.iter(|| leaf.notify_property(black_box("Value")));
        });
    }
    group.finish();
}

fn bench_set_with_suppression(c: &mut Criterion) {
    let node = Node::new(&leaf_schema());
    let l: Arc<dyn ChangeListener> = Arc::new(Counter(AtomicU64::new(0)));
    node.register_listener("t", &l);

    let mut toggle = 0i64;
    c.bench_function("set_changing_value", |b| {
        b.iter(|| {
            toggle ^= 1;
            node.set(black_box("Value"), toggle)
        });
    });
    node.set("Value", 7);
    c.bench_function("set_suppressed_equal_value", |b| {
        b.iter(|| node.set(black_box("Value"), 7));
    });
}

criterion_group!(benches, bench_fanout, bench_bubbling_depth, bench_set_with_suppression);
criterion_main!(benches);
