//! Throughput benchmarks: lrumap vs Moka vs QuickCache.
//!
//! Each group runs the same workload against every cache so criterion can
//! put the results side by side.
//!
//! Run with:
//!     cargo bench --bench throughput

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lrumap::LruCache;
use moka::sync::Cache as MokaCache;
use quick_cache::sync::Cache as QuickCache;

/// Logical capacity of every cache, and the size of the pre-filled key range.
const CAP: usize = 10_000;

/// Operations executed per criterion iteration.
const OPS: u64 = 1_000;

fn lru(cap: usize) -> LruCache<u64, u64> {
    LruCache::new(cap).unwrap()
}

fn prefilled_lru() -> LruCache<u64, u64> {
    let cache = lru(CAP);
    for i in 0..CAP as u64 {
        cache.insert(i, i * 2);
    }
    cache
}

fn prefilled_moka() -> MokaCache<u64, u64> {
    let cache = MokaCache::new(CAP as u64);
    for i in 0..CAP as u64 {
        cache.insert(i, i * 2);
    }
    cache
}

fn prefilled_quick() -> QuickCache<u64, u64> {
    let cache = QuickCache::new(CAP);
    for i in 0..CAP as u64 {
        cache.insert(i, i * 2);
    }
    cache
}

// ---------------------------------------------------------------------------
// get_hit
// ---------------------------------------------------------------------------
// Every key is present; pure read throughput.

fn bench_get_hit(c: &mut Criterion) {
    let ours = prefilled_lru();
    let moka = prefilled_moka();
    let qc = prefilled_quick();

    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("lrumap", |b| {
        b.iter(|| {
            for i in 0..OPS {
                black_box(ours.get(black_box(&i)));
            }
        })
    });
    group.bench_function("moka", |b| {
        b.iter(|| {
            for i in 0..OPS {
                black_box(moka.get(black_box(&i)));
            }
        })
    });
    group.bench_function("quick_cache", |b| {
        b.iter(|| {
            for i in 0..OPS {
                black_box(qc.get(black_box(&i)));
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// insert_evicting
// ---------------------------------------------------------------------------
// Always-new keys, so every insert past warm-up evicts.

fn bench_insert_evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_evicting");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("lrumap", |b| {
        let cache = lru(CAP);
        let mut key = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                cache.insert(black_box(key), black_box(key));
                key = key.wrapping_add(1);
            }
        })
    });
    group.bench_function("moka", |b| {
        let cache: MokaCache<u64, u64> = MokaCache::new(CAP as u64);
        let mut key = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                cache.insert(black_box(key), black_box(key));
                key = key.wrapping_add(1);
            }
        })
    });
    group.bench_function("quick_cache", |b| {
        let cache: QuickCache<u64, u64> = QuickCache::new(CAP);
        let mut key = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                cache.insert(black_box(key), black_box(key));
                key = key.wrapping_add(1);
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// listener_overhead
// ---------------------------------------------------------------------------
// Same evicting workload, with and without an eviction listener.

fn bench_listener_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("listener_overhead");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("no_listener", |b| {
        let cache = lru(CAP);
        let mut key = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                cache.insert(black_box(key), key);
                key = key.wrapping_add(1);
            }
        })
    });
    group.bench_function("counting_listener", |b| {
        let evicted = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evicted);
        let cache: LruCache<u64, u64> = LruCache::with_listener(CAP, move |_k, _v| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        let mut key = 0u64;
        b.iter(|| {
            for _ in 0..OPS {
                cache.insert(black_box(key), key);
                key = key.wrapping_add(1);
            }
        });
        black_box(evicted.load(Ordering::Relaxed));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// mixed_80r_20w
// ---------------------------------------------------------------------------
// 80 % reads, 20 % writes over a working set twice the capacity.  Keys cycle
// with a prime step.

const WORKING_SET: u64 = CAP as u64 * 2;
const STEP: u64 = 7_919;

fn mixed_loop(cursor: &mut u64, mut read: impl FnMut(u64), mut write: impl FnMut(u64)) {
    for i in 0..OPS {
        let k = *cursor % WORKING_SET;
        if i % 5 == 0 {
            write(k);
        } else {
            read(k);
        }
        *cursor = cursor.wrapping_add(STEP);
    }
}

fn bench_mixed_80r_20w(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_80r_20w");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("lrumap", |b| {
        let cache = prefilled_lru();
        let mut cursor = 0u64;
        b.iter(|| {
            mixed_loop(
                &mut cursor,
                |k| {
                    black_box(cache.get(&k));
                },
                |k| {
                    cache.insert(k, k);
                },
            )
        })
    });
    group.bench_function("moka", |b| {
        let cache = prefilled_moka();
        let mut cursor = 0u64;
        b.iter(|| {
            mixed_loop(
                &mut cursor,
                |k| {
                    black_box(cache.get(&k));
                },
                |k| cache.insert(k, k),
            )
        })
    });
    group.bench_function("quick_cache", |b| {
        let cache = prefilled_quick();
        let mut cursor = 0u64;
        b.iter(|| {
            mixed_loop(
                &mut cursor,
                |k| {
                    black_box(cache.get(&k));
                },
                |k| cache.insert(k, k),
            )
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// merge_counter
// ---------------------------------------------------------------------------
// Read-modify-write on a small hot set; exercises the update core.

fn bench_merge_counter(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_counter");
    group.throughput(Throughput::Elements(OPS));

    group.bench_function("merge", |b| {
        let cache = lru(CAP);
        b.iter(|| {
            for i in 0..OPS {
                black_box(cache.merge(i % 64, 1, |a, b| Some(a + b)));
            }
        })
    });
    group.bench_function("compute", |b| {
        let cache = lru(CAP);
        b.iter(|| {
            for i in 0..OPS {
                black_box(cache.compute(i % 64, |_, v| Some(v.map_or(1, |n| n + 1))));
            }
        })
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// concurrent_8t_50r_50w
// ---------------------------------------------------------------------------

const THREADS: usize = 8;
const OPS_PER_THREAD: u64 = 2_000;

/// Runs `op(cache, key, is_write)` on `THREADS` threads released together and
/// returns the slowest thread's wall time.
fn run_concurrent<C>(cache: &Arc<C>, op: fn(&C, u64, bool)) -> Duration
where
    C: Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(THREADS + 1));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let c = Arc::clone(cache);
            let bar = Arc::clone(&barrier);
            std::thread::spawn(move || {
                bar.wait();
                let start = Instant::now();
                let base = t as u64 * OPS_PER_THREAD;
                for j in 0..OPS_PER_THREAD {
                    let k = base.wrapping_add(j * STEP) % WORKING_SET;
                    op(&c, black_box(k), j % 2 == 0);
                }
                start.elapsed()
            })
        })
        .collect();
    barrier.wait();
    handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .max()
        .unwrap_or_default()
}

fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_8t_50r_50w");
    group.throughput(Throughput::Elements(THREADS as u64 * OPS_PER_THREAD));

    let ours = Arc::new(prefilled_lru());
    group.bench_function("lrumap", |b| {
        b.iter_custom(|iters| {
            (0..iters)
                .map(|_| {
                    run_concurrent(&ours, |c, k, write| {
                        if write {
                            c.insert(k, k);
                        } else {
                            black_box(c.get(&k));
                        }
                    })
                })
                .sum()
        })
    });

    let moka = Arc::new(prefilled_moka());
    group.bench_function("moka", |b| {
        b.iter_custom(|iters| {
            (0..iters)
                .map(|_| {
                    run_concurrent(&moka, |c, k, write| {
                        if write {
                            c.insert(k, k);
                        } else {
                            black_box(c.get(&k));
                        }
                    })
                })
                .sum()
        })
    });

    let qc = Arc::new(prefilled_quick());
    group.bench_function("quick_cache", |b| {
        b.iter_custom(|iters| {
            (0..iters)
                .map(|_| {
                    run_concurrent(&qc, |c, k, write| {
                        if write {
                            c.insert(k, k);
                        } else {
                            black_box(c.get(&k));
                        }
                    })
                })
                .sum()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_insert_evicting,
    bench_listener_overhead,
    bench_mixed_80r_20w,
    bench_merge_counter,
    bench_concurrent_mixed,
);
criterion_main!(benches);
