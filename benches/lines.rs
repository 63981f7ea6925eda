use std::{
    io::sink,
    sync::{Arc, Barrier},
    thread,
    time::{Duration, Instant},
};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lager::{list, map, pairs, Config, Globals, Output, Severity};
use tracing_subscriber::layer::SubscriberExt;

fn globals(keys: bool) -> Arc<Globals> {
    let mut config = Config::default();
    config.set_levels("FWNAI").set_output(Some(Output::new(sink)));
    if keys {
        config.set_keys(Some(lager::Keys::gcp()));
    }
    Globals::new(config)
}

type Group<'a> = criterion::BenchmarkGroup<'a, criterion::measurement::WallTime>;
fn bench_thrpt(c: &mut Criterion, name: &'static str, mut f: impl FnMut(&mut Group<'_>, &usize)) {
    const N_LINES: &[usize] = &[1, 10, 50];

    let mut group = c.benchmark_group(name);
    for lines in N_LINES {
        group.throughput(Throughput::Elements(*lines as u64));
        f(&mut group, lines);
    }
    group.finish();
}

// Runs `body` on 4 threads at once and returns how long the slowest took.
fn multithreaded(body: impl Fn() + Send + Sync + 'static) -> Duration {
    const THREADS: usize = 4;
    let body = Arc::new(body);
    let start = Arc::new(Barrier::new(THREADS + 1));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let body = Arc::clone(&body);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                body();
            })
        })
        .collect();
    start.wait();
    let began = Instant::now();
    for handle in handles {
        handle.join().unwrap();
    }
    began.elapsed()
}

fn bench_lines(c: &mut Criterion) {
    for (name, keys) in [("array", false), ("object", true)] {
        bench_thrpt(c, name, |group, i| {
            let g = globals(keys);
            group.bench_with_input(BenchmarkId::new("mmap/single_thread", i), i, |b, &i| {
                let info = g.lager(Severity::Info).with(&[pairs!("request", 42)]);
                b.iter(|| {
                    for n in 0..i {
                        info.mmap("Handled", map!("n", n, "path", "/index.html", "ms", 1.5));
                    }
                })
            });
            group.bench_with_input(BenchmarkId::new("mlist/single_thread", i), i, |b, &i| {
                let warn = g.lager(Severity::Warn);
                b.iter(|| {
                    for n in 0..i {
                        warn.mlist("Retrying", list!(n, "times", true));
                    }
                })
            });
            group.bench_with_input(BenchmarkId::new("mmap/multithreaded", i), i, |b, &i| {
                b.iter_custom(|iters| {
                    let mut total = Duration::from_secs(0);
                    for _ in 0..iters {
                        let info = g.lager(Severity::Info).clone();
                        total += multithreaded(move || {
                            for n in 0..i {
                                info.mmap("Handled", map!("n", n, "path", "/index.html"));
                            }
                        });
                    }
                    total
                })
            });
            group.bench_with_input(BenchmarkId::new("disabled", i), i, |b, &i| {
                let debug = g.lager(Severity::Debug);
                b.iter(|| {
                    for n in 0..i {
                        debug.mmap("Never written", map!("n", n));
                    }
                })
            });
        });
    }
}

fn bench_layer(c: &mut Criterion) {
    bench_thrpt(c, "layer", |group, i| {
        let dispatch = tracing::Dispatch::new(
            tracing_subscriber::registry().with(lager::LagerLayer::with_globals(globals(false))),
        );
        group.bench_with_input(BenchmarkId::new("event", i), i, |b, &i| {
            tracing::dispatcher::with_default(&dispatch, || {
                let span = tracing::info_span!("request", id = 42);
                let _guard = span.enter();
                b.iter(|| {
                    for n in 0..i {
                        tracing::info!(n, "handled");
                    }
                })
            });
        });
    });
}

criterion_group!(benches, bench_lines, bench_layer);
criterion_main!(benches);
