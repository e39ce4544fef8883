use std::sync::Arc;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use eventfire::{
    CancelFlag, Cancellable, DispatchConfig, DispatchManager, Event, EventId, ListenerBindings,
    Outcome, Priority,
};

struct Write {
    id: EventId,
    key: u64,
    cancel: CancelFlag,
}

impl Write {
    fn new(key: u64) -> Self {
        Self {
            id: EventId::new(),
            key,
            cancel: CancelFlag::default(),
        }
    }
}

impl Event for Write {
    fn id(&self) -> &EventId {
        &self.id
    }

    fn cancellation(&self) -> Option<&dyn Cancellable> {
        Some(&self.cancel)
    }
}

fn make_manager(monitors: usize) -> DispatchManager {
    let manager = DispatchManager::new(DispatchConfig {
        dispatch_workers: 4,
        monitor_workers: 2,
        max_dispatch_workers: Some(8),
        ..DispatchConfig::default()
    })
    .unwrap();

    // One handler per tier so every dispatch walks the full ladder.
    for priority in Priority::HANDLER_TIERS {
        manager
            .register_events(
                ListenerBindings::builder()
                    .handler(priority, |e: &Write| {
                        if e.key % 97 == 0 {
                            e.cancel.set_cancelled(true);
                        }
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
    for _ in 0..monitors {
        manager
            .register_events(
                ListenerBindings::builder()
                    .monitor(|e: &Write, outcome| {
                        criterion::black_box((e.key, outcome));
                        Ok(())
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
    manager
}

fn bench_fire_and_get(c: &mut Criterion) {
    let manager = make_manager(0);
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("fire_get_5_tiers", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key += 1;
            let future = manager.fire_event(Write::new(key)).unwrap();
            criterion::black_box(future.outcome().unwrap());
        });
    });

    group.finish();
}

fn bench_pipelined_fire(c: &mut Criterion) {
    let manager = make_manager(0);
    let mut group = c.benchmark_group("dispatch_pipelined");
    group.throughput(Throughput::Elements(256));

    group.bench_function("fire_256_then_wait", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let futures: Vec<_> = (0..256u64)
                    .map(|key| manager.fire_event(Write::new(key)).unwrap())
                    .collect();
                for future in &futures {
                    criterion::black_box(future.get().unwrap());
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

fn bench_complete_with_monitors(c: &mut Criterion) {
    let manager = Arc::new(make_manager(4));
    let mut group = c.benchmark_group("monitor_fanout");
    group.throughput(Throughput::Elements(1));

    group.bench_function("complete_4_monitors", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key += 1;
            let future = manager.fire_event(Write::new(key)).unwrap();
            let (outcome, monitors) = future.complete().unwrap();
            monitors.get().unwrap();
            criterion::black_box(outcome == Outcome::Cancelled);
        });
    });

    group.finish();
}

criterion_group!(
    dispatch,
    bench_fire_and_get,
    bench_pipelined_fire,
    bench_complete_with_monitors
);
criterion_main!(dispatch);
