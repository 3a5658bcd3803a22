//! Benchmarks for gate activation and bridge throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use drowse_core::reactive::{Channel, Memo, Observable, Signal};
use drowse_core::{AsyncBridge, BridgeOptions, LifecycleGate, Outcome};

fn wake_sleep_cycle(c: &mut Criterion) {
    let source = Signal::new(1u64);
    let host = Memo::pure(|| ());
    let source_clone = source.clone();
    let gate = LifecycleGate::new(&host, move || source_clone.get() * 2).unwrap();

    c.bench_function("gate_wake_sleep_cycle", |b| {
        b.iter(|| {
            let observer = host.subscribe(Channel::Change, || {});
            black_box(gate.is_active());
            drop(observer);
        })
    });
}

fn ready_bridge_updates(c: &mut Criterion) {
    let input = Signal::new(0u64);
    let input_clone = input.clone();
    let bridge = AsyncBridge::new(move || Outcome::Ready(input_clone.get() + 1), BridgeOptions::new());
    let _observer = bridge.subscribe(Channel::Change, || {});

    let mut n = 0u64;
    c.bench_function("bridge_ready_update", |b| {
        b.iter(|| {
            n += 1;
            input.set(n);
            black_box(bridge.get())
        })
    });
}

criterion_group!(benches, wake_sleep_cycle, ready_bridge_updates);
criterion_main!(benches);
