//! Filter evaluation and delta benchmarks.

use beacon_bench::{relay_space, user};
use beacon_core::{delta, filter_users, ClientWatcher, LogErrorSink, RelayUser};
use beacon_protocol::SpaceFilter;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Computing a view and diffing two views.
fn bench_delta(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta");
    let old = SpaceFilter::contains_name("bench", "f", "ann");
    let new = SpaceFilter::live_streaming("bench", "f");

    for size in [100u32, 1000, 10000].iter() {
        let users: Vec<RelayUser> = (0..*size).map(|id| RelayUser::new(user(id))).collect();
        group.throughput(Throughput::Elements(u64::from(*size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), &users, |b, users| {
            b.iter(|| {
                let old_view = filter_users(&old, users, &LogErrorSink);
                let new_view = filter_users(&new, users, &LogErrorSink);
                black_box(delta(&old_view, &new_view).added.len())
            });
        });
    }

    group.finish();
}

/// Switching a client's filter back and forth on a populated space.
fn bench_update_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_filter");
    let names = SpaceFilter::contains_name("bench", "f", "bob");
    let live = SpaceFilter::live_streaming("bench", "f");

    group.bench_function("1000_users", |b| {
        let (space, sink) = relay_space(1000, 0, &[]);
        let watcher = ClientWatcher::new(99, sink);
        space.handle_add_filter(&watcher, names.clone());
        let mut flip = false;

        b.iter(|| {
            flip = !flip;
            let next = if flip { live.clone() } else { names.clone() };
            space.handle_update_filter(black_box(&watcher), next);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_delta, bench_update_filter);
criterion_main!(benches);
