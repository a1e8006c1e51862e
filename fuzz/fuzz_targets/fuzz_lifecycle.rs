#![no_main]

//! Fuzz target for singleton/transient lifecycle invariants.
//!
//! Tests that singleton resolution always returns the same instance and
//! transient resolution always returns a fresh one, under arbitrary
//! interleavings of registration and resolution.

use arbitrary::Arbitrary;
use hostkit::Container;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static LAZY_COUNTER: AtomicU64 = AtomicU64::new(0);
static TRANSIENT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug)]
struct LazyService {
    id: u64,
}

#[derive(Clone, Debug)]
struct TransientService {
    instance_id: u64,
}

#[derive(Clone, Debug, Arbitrary)]
struct SimpleService {
    value: u32,
}

#[derive(Debug, Arbitrary)]
enum LifecycleOp {
    RegisterSingleton(SimpleService),
    RegisterLazy,
    RegisterTransient,
    GetSingleton,
    GetLazy,
    GetTransient,
    GetTransientMultiple(u8),
    Contains,
}

fuzz_target!(|ops: Vec<LifecycleOp>| {
    LAZY_COUNTER.store(0, Ordering::SeqCst);
    TRANSIENT_COUNTER.store(0, Ordering::SeqCst);

    let container = Container::new();
    let mut has_lazy = false;
    let mut has_transient = false;

    for op in ops.into_iter().take(100) {
        match op {
            LifecycleOp::RegisterSingleton(svc) => {
                let _ = container.register_instance(svc);
            }
            LifecycleOp::RegisterLazy => {
                if container
                    .register_singleton::<LazyService, ()>(|_| LazyService {
                        id: LAZY_COUNTER.fetch_add(1, Ordering::SeqCst),
                    })
                    .is_ok()
                {
                    has_lazy = true;
                }
            }
            LifecycleOp::RegisterTransient => {
                if container
                    .register_transient::<TransientService, ()>(|_| TransientService {
                        instance_id: TRANSIENT_COUNTER.fetch_add(1, Ordering::SeqCst),
                    })
                    .is_ok()
                {
                    has_transient = true;
                }
            }
            LifecycleOp::GetSingleton => {
                let _ = container.try_get::<SimpleService>();
            }
            LifecycleOp::GetLazy => {
                if has_lazy {
                    let result1 = container.try_get::<LazyService>();
                    let result2 = container.try_get::<LazyService>();
                    if let (Some(s1), Some(s2)) = (result1, result2) {
                        assert!(Arc::ptr_eq(&s1, &s2), "singleton should be the same instance");
                    }
                }
            }
            LifecycleOp::GetTransient => {
                if has_transient {
                    let result1 = container.try_get::<TransientService>();
                    let result2 = container.try_get::<TransientService>();
                    if let (Some(s1), Some(s2)) = (result1, result2) {
                        assert!(!Arc::ptr_eq(&s1, &s2), "transient should be a fresh instance");
                        assert_ne!(s1.instance_id, s2.instance_id);
                    }
                }
            }
            LifecycleOp::GetTransientMultiple(count) => {
                if has_transient {
                    let count = (count % 10).max(1);
                    let mut instances = Vec::new();
                    for _ in 0..count {
                        if let Some(svc) = container.try_get::<TransientService>() {
                            instances.push(svc);
                        }
                    }
                    for i in 0..instances.len() {
                        for j in (i + 1)..instances.len() {
                            assert!(!Arc::ptr_eq(&instances[i], &instances[j]));
                        }
                    }
                }
            }
            LifecycleOp::Contains => {
                let _ = container.contains::<SimpleService>();
                let _ = container.contains::<LazyService>();
                let _ = container.contains::<TransientService>();
            }
        }
    }
});
