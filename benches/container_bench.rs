//! Benchmarks for the DI container's hot paths: registration, resolution
//! across all three lifetimes, and scope creation.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use hostkit::Container;
use std::hint::black_box;
use std::sync::Arc;

struct SmallService {
    #[allow(dead_code)]
    value: u32,
}

struct MediumService {
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    values: Vec<u32>,
}

struct LargeService;

struct ServiceA {
    #[allow(dead_code)]
    value: u32,
}
struct ServiceB {
    #[allow(dead_code)]
    name: String,
}
struct ServiceC {
    #[allow(dead_code)]
    data: Vec<u32>,
}
struct ServiceD {
    #[allow(dead_code)]
    flag: bool,
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("singleton_small", |b| {
        b.iter(|| {
            let container = Container::new();
            container.register_singleton::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();
            black_box(container)
        })
    });

    group.bench_function("singleton_medium", |b| {
        b.iter(|| {
            let container = Container::new();
            container
                .register_singleton::<MediumService, ()>(|_| MediumService {
                    name: "test".to_string(),
                    values: vec![1, 2, 3, 4, 5],
                })
                .unwrap();
            black_box(container)
        })
    });

    group.bench_function("transient", |b| {
        b.iter(|| {
            let container = Container::new();
            container.register_transient::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();
            black_box(container)
        })
    });

    group.bench_function("individual_4_services", |b| {
        b.iter(|| {
            let container = Container::new();
            container.register_singleton::<ServiceA, ()>(|_| ServiceA { value: 1 }).unwrap();
            container
                .register_singleton::<ServiceB, ()>(|_| ServiceB { name: "test".into() })
                .unwrap();
            container
                .register_singleton::<ServiceC, ()>(|_| ServiceC { data: vec![1, 2, 3] })
                .unwrap();
            container.register_singleton::<ServiceD, ()>(|_| ServiceD { flag: true }).unwrap();
            black_box(container)
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let container = Container::new();
    container.register_singleton::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();
    container
        .register_singleton::<MediumService, ()>(|_| MediumService {
            name: "test".to_string(),
            values: vec![1, 2, 3, 4, 5],
        })
        .unwrap();

    group.bench_function("get_singleton", |b| {
        b.iter(|| {
            let service = container.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("get_medium", |b| {
        b.iter(|| {
            let service = container.get::<MediumService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("contains_check", |b| {
        b.iter(|| {
            let exists = container.contains::<SmallService>();
            black_box(exists)
        })
    });

    group.bench_function("try_get_found", |b| {
        b.iter(|| {
            let service = container.try_get::<SmallService>();
            black_box(service)
        })
    });

    group.bench_function("try_get_not_found", |b| {
        b.iter(|| {
            let service = container.try_get::<LargeService>();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_transient_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient");
    group.throughput(Throughput::Elements(1));

    let container = Container::new();
    container.register_transient::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();

    group.bench_function("get_transient", |b| {
        b.iter(|| {
            let service = container.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    use hostkit::Properties;

    struct RequestScope;

    let mut group = c.benchmark_group("scoped");

    group.bench_function("create_scope", |b| {
        let root = Container::new();
        root.register_singleton::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();

        b.iter(|| {
            let scope = root.create_scope();
            black_box(scope)
        })
    });

    group.bench_function("resolve_from_parent", |b| {
        let root = Container::new();
        root.register_singleton::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();
        let child = root.create_scope();

        b.iter(|| {
            let service = child.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.bench_function("resolve_scoped_component", |b| {
        let root = Container::new();
        root.register_scoped::<SmallService, RequestScope, ()>(|_| SmallService { value: 100 })
            .unwrap();
        root.register_instance(RequestScope).unwrap();
        let scope = root.create_typed_scope::<RequestScope>(Properties::new()).unwrap();

        b.iter(|| {
            let service = scope.get::<SmallService>().unwrap();
            black_box(service)
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let container = Container::new();
        container.register_singleton::<SmallService, ()>(|_| SmallService { value: 42 }).unwrap();
        let container = Arc::new(container);

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = Arc::clone(&container);
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = c.get::<SmallService>().unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_transient_resolution,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
