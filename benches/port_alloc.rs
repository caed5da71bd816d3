use criterion::{criterion_group, criterion_main, Criterion};

use flow_core::port::PortAllocator;

fn pick_then_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("PortAllocator::pick_port/release");

    group.bench_function("single worker", |b| {
        let mut allocator = PortAllocator::new(1, 1024..65536).unwrap();
        b.iter(|| {
            let handle = allocator.pick_port(0).unwrap();
            allocator.release(handle);
            allocator.release(handle);
        });
    });

    for worker_count in [2, 4, 8] {
        let mut allocator = PortAllocator::new(worker_count, 1024..65536).unwrap();

        group.bench_function(format!("{worker_count} workers"), |b| {
            b.iter(|| {
                for worker in 0..worker_count {
                    let handle = allocator.pick_port(worker).unwrap();
                    allocator.release(handle);
                    allocator.release(handle);
                }
            });
        });
    }
}

criterion_group!(benches, pick_then_release);
criterion_main!(benches);
