#![no_main]

//! Fuzz target for scoped container operations.
//!
//! Tests hierarchical scope relationships and parent-chain resolution.

use arbitrary::Arbitrary;
use hostkit::{Container, Properties};
use libfuzzer_sys::fuzz_target;

#[derive(Clone, Debug, Arbitrary)]
struct RootService {
    id: u32,
}

struct RequestScope {
    #[allow(dead_code)]
    tag: u32,
}

#[derive(Debug, Arbitrary)]
enum ScopedOp {
    GetFromRoot,
    CreateAnonymousScope,
    CreateTypedScope(u32),
    GetRootFromScope,
    GetScopedFromScope,
    ContainsInScope,
    DisposeScope,
}

fuzz_target!(|ops: Vec<ScopedOp>| {
    let root = Container::new();
    let _ = root.register_singleton::<RootService, ()>(|_| RootService { id: 1 });
    let _ = root.register_scoped::<String, RequestScope, ()>(|_| "scoped-value".to_string());
    let _ = root.register_instance(RequestScope { tag: 0 });

    let mut scopes = vec![root.root_scope()];

    for op in ops.into_iter().take(100) {
        match op {
            ScopedOp::GetFromRoot => {
                let _ = root.try_get::<RootService>();
            }
            ScopedOp::CreateAnonymousScope => {
                if scopes.len() < 10 {
                    let parent = scopes.last().unwrap().clone();
                    scopes.push(parent.create_scope());
                }
            }
            ScopedOp::CreateTypedScope(_tag) => {
                if scopes.len() < 10 {
                    let parent = scopes.last().unwrap().clone();
                    if let Ok(scope) = parent.create_typed_scope::<RequestScope>(Properties::new()) {
                        scopes.push(scope);
                    }
                }
            }
            ScopedOp::GetRootFromScope => {
                if let Some(scope) = scopes.last() {
                    let _ = scope.get::<RootService>();
                }
            }
            ScopedOp::GetScopedFromScope => {
                if let Some(scope) = scopes.last() {
                    let _ = scope.get::<String>();
                }
            }
            ScopedOp::ContainsInScope => {
                if let Some(scope) = scopes.last() {
                    let _ = scope.get::<RootService>().is_ok();
                    let _ = scope.get::<String>().is_ok();
                }
            }
            ScopedOp::DisposeScope => {
                if scopes.len() > 1 {
                    let scope = scopes.pop().unwrap();
                    scope.dispose();
                }
            }
        }
    }

    let _ = root.try_get::<RootService>();
    let _ = root.contains::<RootService>();
});
