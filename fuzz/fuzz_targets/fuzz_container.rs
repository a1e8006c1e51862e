#![no_main]

//! Fuzz target for basic container operations.
//!
//! Tests registration and resolution with various data patterns.

use arbitrary::Arbitrary;
use hostkit::Container;
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct SmallService {
    id: u32,
    name: String,
}

#[derive(Clone, Debug, Arbitrary)]
struct ServiceConfig {
    enabled: bool,
    timeout_ms: u32,
    retries: u8,
    tags: Vec<String>,
}

#[derive(Clone, Debug, Arbitrary)]
struct MediumService {
    id: u64,
    data: Vec<u8>,
    config: ServiceConfig,
}

#[derive(Clone, Debug, Arbitrary)]
struct LargeService {
    id: u128,
    payload: Vec<u8>,
    metadata: Vec<(String, String)>,
}

#[derive(Debug, Arbitrary)]
enum ContainerOp {
    RegisterSmall(SmallService),
    RegisterMedium(MediumService),
    RegisterLarge(LargeService),
    RegisterTransientSmall,
    GetSmall,
    GetMedium,
    GetLarge,
    TryGetSmall,
    TryGetMedium,
    ContainsSmall,
    ContainsMedium,
    ContainsLarge,
}

fuzz_target!(|ops: Vec<ContainerOp>| {
    let container = Container::new();

    for op in ops.into_iter().take(200) {
        match op {
            ContainerOp::RegisterSmall(svc) => {
                let _ = container.register_instance(svc);
            }
            ContainerOp::RegisterMedium(svc) => {
                let _ = container.register_instance(svc);
            }
            ContainerOp::RegisterLarge(svc) => {
                let _ = container.register_instance(svc);
            }
            ContainerOp::RegisterTransientSmall => {
                let _ = container.register_transient::<SmallService, ()>(|_| SmallService {
                    id: 0,
                    name: "transient".into(),
                });
            }
            ContainerOp::GetSmall => {
                let _ = container.get::<SmallService>();
            }
            ContainerOp::GetMedium => {
                let _ = container.get::<MediumService>();
            }
            ContainerOp::GetLarge => {
                let _ = container.get::<LargeService>();
            }
            ContainerOp::TryGetSmall => {
                let _ = container.try_get::<SmallService>();
            }
            ContainerOp::TryGetMedium => {
                let _ = container.try_get::<MediumService>();
            }
            ContainerOp::ContainsSmall => {
                let _ = container.contains::<SmallService>();
            }
            ContainerOp::ContainsMedium => {
                let _ = container.contains::<MediumService>();
            }
            ContainerOp::ContainsLarge => {
                let _ = container.contains::<LargeService>();
            }
        }
    }
});
