use std::{
    hint::black_box,
    sync::{Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use criterion::{Criterion, criterion_group, criterion_main};

use stampede::single_flight::Group;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_flight/uncontended");
    group.sample_size(200);

    group.bench_function("call/same_key", |b| {
        let flights: Group<&'static str, u64, String> = Group::new();

        b.iter(|| {
            black_box(flights.call(black_box("benchmark-key"), || Ok(1)).ok());
        });
    });

    group.bench_function("call/distinct_keys", |b| {
        let flights: Group<u64, u64, String> = Group::new();
        let mut key = 0_u64;

        b.iter(|| {
            key = key.wrapping_add(1);
            black_box(flights.call(black_box(key), || Ok(key)).ok());
        });
    });

    group.bench_function("call_detached/same_key", |b| {
        let flights: Group<&'static str, u64, String> = Group::new();

        b.iter(|| {
            black_box(flights.call_detached(black_box("benchmark-key"), || Ok(1)).wait());
        });
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_flight/contended");
    group.sample_size(20);

    for threads in [4_usize, 16, 64] {
        group.bench_function(format!("call/threads={threads}"), |b| {
            let flights: Group<&'static str, u64, String> = Group::new();

            b.iter_custom(|iters| {
                let start = Instant::now();

                for _ in 0..iters {
                    let barrier = Arc::new(Barrier::new(threads));
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let flights = flights.clone();
                            let barrier = Arc::clone(&barrier);
                            thread::spawn(move || {
                                barrier.wait();
                                flights
                                    .call("concurrent-key", || {
                                        thread::sleep(Duration::from_micros(50));
                                        Ok(1)
                                    })
                                    .ok()
                            })
                        })
                        .collect();

                    for handle in handles {
                        black_box(handle.join().ok());
                    }
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);
