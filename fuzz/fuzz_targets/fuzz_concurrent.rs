#![no_main]

//! Fuzz target for concurrent container operations.
//!
//! Tests thread-safety of resolution under concurrent access.

use arbitrary::Arbitrary;
use hostkit::Container;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::thread;

#[derive(Clone, Debug, Arbitrary)]
struct ConcurrentService {
    id: u64,
    data: Vec<u8>,
}

#[derive(Clone, Debug, Arbitrary)]
struct SharedConfig {
    value: u32,
}

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    Get,
    TryGet,
    Contains,
}

#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    thread_count: u8,
    ops_per_thread: Vec<ThreadOp>,
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let container = Container::new();
    let _ = container.register_singleton::<ConcurrentService, ()>(|_| ConcurrentService { id: 0, data: vec![] });
    let _ = container.register_singleton::<SharedConfig, ()>(|_| SharedConfig { value: 42 });
    let container = Arc::new(container);

    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;

    let mut handles = Vec::new();

    for _ in 0..thread_count {
        let container = Arc::clone(&container);
        let ops = ops.clone();

        let handle = thread::spawn(move || {
            for op in ops.into_iter().take(50) {
                match op {
                    ThreadOp::Get => {
                        let _ = container.get::<SharedConfig>();
                    }
                    ThreadOp::TryGet => {
                        let _ = container.try_get::<ConcurrentService>();
                    }
                    ThreadOp::Contains => {
                        let _ = container.contains::<SharedConfig>();
                        let _ = container.contains::<ConcurrentService>();
                    }
                }
            }
        });

        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.join();
    }

    let _ = container.try_get::<SharedConfig>();
});
