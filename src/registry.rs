//! The component registry: one factory record per registered type, plus the
//! policy a set of registrations is validated against.
//!
//! Grounded in `pkg/host/dep/manager.go` and `options.go` of the source host
//! package. The original validates a reflected function signature at
//! registration time (arg count, output count, assignability); here the
//! compiler performs the equivalent checks when a `RawFactory` is built, so
//! the registry itself only needs to guard against duplicate keys and carry
//! the declared lifetime.

use crate::cx::Cx;
use crate::error::{DiError, Result};
use crate::scope::ScopeKind;
use crate::token::{TypeShape, TypeToken};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Sharing semantics a registered factory is created under.
#[derive(Clone)]
pub enum Lifetime {
    /// One instance for the whole process, created lazily on first request.
    Singleton,
    /// One instance per ancestor scope matching `ScopeKind`.
    Scoped(ScopeKind),
    /// A fresh instance on every request.
    Transient,
}

impl Lifetime {
    pub fn label(&self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped(_) => "scoped",
            Lifetime::Transient => "transient",
        }
    }
}

/// A type-erased factory, built once at registration from a strongly typed
/// closure and invoked through [`Cx`] thereafter.
pub trait RawFactory: Send + Sync {
    fn build(&self, cx: &Cx) -> Result<Arc<dyn Any + Send + Sync>>;
}

pub(crate) struct ClosureFactory<F> {
    pub(crate) f: F,
}

impl<F> RawFactory for ClosureFactory<F>
where
    F: Fn(&Cx) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync,
{
    fn build(&self, cx: &Cx) -> Result<Arc<dyn Any + Send + Sync>> {
        (self.f)(cx)
    }
}

/// One registered factory: its declared type, lifetime, and the closure that
/// builds it.
pub struct FactoryEntry {
    pub token: TypeToken,
    pub lifetime: Lifetime,
    pub factory: Arc<dyn RawFactory>,
}

/// Registration policy, mirroring `ComponentProviderOptions` from the source.
/// Every field has a sensible default; a host only needs to override what it
/// wants to restrict or relax.
#[derive(Debug, Clone)]
pub struct Options {
    /// Shapes accepted by `register_*` component calls.
    pub allowed_component_types: Vec<TypeShape>,
    /// Shapes accepted by configuration registration.
    pub allowed_configuration_types: Vec<TypeShape>,
    /// Skip the declared-type assignability check entirely (multi-impl hubs
    /// rely on this — the hub's own key resolution is the real gate).
    pub allow_any_output: bool,
    /// Attach a "why was this created" dependency chain to cyclic-dependency
    /// errors. Off by default: walking the tracker costs an allocation per
    /// failure and most callers only care that it failed.
    pub enable_diagnostics: bool,
    /// Use the re-entrant `Mutex`+`Condvar` guard for singleton/scoped
    /// construction (safe under concurrent first-access). Disabling it swaps
    /// in a plain flag, valid only when the host guarantees single-threaded
    /// construction.
    pub enable_singleton_concurrency: bool,
    /// Track per-thread transient construction depth and raise
    /// `RecursionExceeded` past `max_allowed_recurrence`.
    pub track_transient_recurrence: bool,
    pub max_allowed_recurrence: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allowed_component_types: vec![TypeShape::Component],
            allowed_configuration_types: vec![TypeShape::Configuration],
            allow_any_output: false,
            enable_diagnostics: false,
            enable_singleton_concurrency: true,
            track_transient_recurrence: true,
            max_allowed_recurrence: 2,
        }
    }
}

/// Stores one factory per registered type key.
pub struct Registry {
    entries: DashMap<TypeId, Arc<FactoryEntry>, RandomState>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Reject a registration whose shape isn't in the policy's allowed list
    /// for that shape — `register_*` component calls are checked against
    /// `allowed_component_types`, `register_configuration` against
    /// `allowed_configuration_types`. Called from `Engine` before every
    /// `Registry::add`.
    pub fn check_shape(options: &Options, token: &TypeToken) -> Result<()> {
        let allowed = match token.shape() {
            TypeShape::Component => &options.allowed_component_types,
            TypeShape::Configuration => &options.allowed_configuration_types,
        };
        if allowed.contains(&token.shape()) {
            Ok(())
        } else {
            Err(DiError::Configuration {
                type_name: token.name(),
                reason: format!("{:?} registrations are disallowed by this registry's policy", token.shape()),
            })
        }
    }

    /// Insert a new entry. Fails if `token`'s type id is already registered —
    /// the registry never silently overwrites.
    pub fn add(&self, token: TypeToken, lifetime: Lifetime, factory: Arc<dyn RawFactory>) -> Result<()> {
        use dashmap::mapref::entry::Entry as DEntry;
        match self.entries.entry(token.id()) {
            DEntry::Occupied(_) => Err(DiError::Configuration {
                type_name: token.name(),
                reason: "a factory is already registered for this type".into(),
            }),
            DEntry::Vacant(slot) => {
                slot.insert(Arc::new(FactoryEntry {
                    token,
                    lifetime,
                    factory,
                }));
                Ok(())
            }
        }
    }

    pub fn get(&self, type_id: &TypeId) -> Option<Arc<FactoryEntry>> {
        self.entries.get(type_id).map(|e| Arc::clone(&e))
    }

    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.entries.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All currently registered type tokens, for diagnostics.
    pub fn tokens(&self) -> Vec<TypeToken> {
        self.entries.iter().map(|e| e.token).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;

    #[test]
    fn duplicate_registration_is_an_error() {
        let registry = Registry::new();
        let token = TypeToken::component::<A>();
        let factory: Arc<dyn RawFactory> = Arc::new(ClosureFactory {
            f: |_: &Cx| Ok(Arc::new(A) as Arc<dyn Any + Send + Sync>),
        });

        registry.add(token, Lifetime::Singleton, Arc::clone(&factory)).unwrap();
        let second = registry.add(token, Lifetime::Singleton, factory);
        assert!(matches!(second, Err(DiError::Configuration { .. })));
    }
}
