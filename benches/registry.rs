//! Identity registry and boundary crossing benchmarks
//!
//! Measures proxy lookup (hit and miss paths) and a full host-to-guest call.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crossbind::frontend::config::RegistryConfig;
use crossbind::interop::registry::{IdentityRegistry, RegistryKey};
use crossbind::runtime::host::HostForeign;
use crossbind::{Bridge, Direction, HostValue};
use std::rc::Rc;

fn bench_registry_hit(c: &mut Criterion) {
    let mut registry = IdentityRegistry::new(&RegistryConfig::default());
    let target = Rc::new(0u64);
    let key = RegistryKey::new(Direction::GuestToHost, Rc::as_ptr(&target) as usize);
    let held = registry.get_or_create(key, Box::new(|| true), |_| Rc::new(1u64));

    c.bench_function("registry_hit", |b| {
        b.iter(|| {
            let proxy = registry.get_or_create(black_box(key), Box::new(|| true), |_| Rc::new(1u64));
            black_box(proxy)
        })
    });
    drop(held);
}

fn bench_registry_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_miss");

    for threshold in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(threshold), &threshold, |b, &threshold| {
            let config = RegistryConfig { sweep_threshold: threshold, ..RegistryConfig::default() };
            let mut registry = IdentityRegistry::new(&config);
            let mut identity = 0usize;
            b.iter(|| {
                identity += 1;
                let key = RegistryKey::new(Direction::HostToGuest, identity);
                // Dropped at once, so every lookup leaves a dead slot behind
                black_box(registry.get_or_create(key, Box::new(|| true), |_| Rc::new(identity)));
            })
        });
    }

    group.finish();
}

fn bench_host_to_guest_call(c: &mut Criterion) {
    let bridge = Bridge::with_defaults();
    let function = bridge
        .embed_guest_function("def add(a, b):\n    return a + b")
        .unwrap_or(HostValue::Null);
    let HostValue::Foreign(function) = function else { return };

    c.bench_function("host_to_guest_call", |b| {
        b.iter(|| black_box(function.invoke(vec![HostValue::Int(1), HostValue::Int(2)])))
    });
}

criterion_group!(benches, bench_registry_hit, bench_registry_miss, bench_host_to_guest_call);
criterion_main!(benches);
