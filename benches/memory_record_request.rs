use std::{hint::black_box, time::Duration};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use ratewatch::{CounterStore, MemoryCounterStore, Rate, StoreOptions};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_hot_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/hot_key");
    group.sample_size(200);

    let rt = runtime();
    let store = MemoryCounterStore::in_memory(StoreOptions::default());
    let rate = Rate::new(u64::MAX, Duration::from_secs(60)).unwrap();

    rt.block_on(async {
        store.record_request("k", &rate).await.unwrap();
    });

    group.bench_function("record_request", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(store.record_request(black_box("k"), black_box(&rate)).await)
            })
        });
    });

    group.bench_function("check_limit", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(store.check_limit(black_box("k"), black_box(&rate)).await)
            })
        });
    });

    group.finish();
}

fn bench_many_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory/many_keys");
    group.sample_size(100);

    let rt = runtime();
    let rate = Rate::new(u64::MAX, Duration::from_secs(60)).unwrap();

    for key_space in [1_000_usize, 100_000] {
        group.bench_function(format!("record_request/keys={key_space}"), |b| {
            let store = MemoryCounterStore::in_memory(StoreOptions::default());
            let keys: Vec<String> = (0..key_space).map(|i| format!("user_{i}")).collect();
            let mut idx = 0usize;

            b.iter_batched(
                || {
                    idx = (idx + 1) % key_space;
                    idx
                },
                |i| {
                    rt.block_on(async {
                        black_box(store.record_request(black_box(&keys[i]), &rate).await)
                    })
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hot_key, bench_many_keys);
criterion_main!(benches);
