//! The resolver/lifecycle engine: wraps a registered factory with the
//! sharing semantics its lifetime declares, detects cyclic dependencies, and
//! tracks transient recursion depth.
//!
//! Grounded in `pkg/host/dep/manager.go`, `lifecyclecontroller.go` and
//! `recurrencetracker.go` of the source host package.

use crate::cx::{Cx, Resolvable};
use crate::error::{DiError, Result};
use crate::multi_impl::{Hub, HubResolver, KeyFn};
use crate::properties::Properties;
use crate::registry::{ClosureFactory, FactoryEntry, Lifetime, Options, RawFactory, Registry};
use crate::token::TypeShape;
use crate::scope::{ComponentContext, ScopeContext, ScopeKind};
use crate::token::TypeToken;
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::hash::Hash;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

thread_local! {
    /// Per-thread transient construction depth — mirrors
    /// `recurrencetracker.go`'s goroutine-local counter without needing a
    /// map, since each thread only ever tracks its own call stack.
    static TRANSIENT_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct RecurrenceGuard;

impl RecurrenceGuard {
    fn enter(type_name: &'static str, max: u32) -> Result<Self> {
        let depth = TRANSIENT_DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        if depth > max {
            TRANSIENT_DEPTH.with(|d| d.set(d.get() - 1));
            return Err(DiError::RecursionExceeded { type_name, max });
        }
        Ok(Self)
    }
}

impl Drop for RecurrenceGuard {
    fn drop(&mut self) {
        TRANSIENT_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Owns the registry and the global scope context; the single point every
/// resolution — top-level or nested — passes through.
pub struct Engine {
    registry: Registry,
    hubs: DashMap<TypeId, Arc<dyn HubResolver>, RandomState>,
    global: Arc<ScopeContext>,
    options: Options,
}

impl Engine {
    pub fn new(options: Options) -> Self {
        Self {
            registry: Registry::new(),
            hubs: DashMap::with_hasher(RandomState::new()),
            global: ScopeContext::global(options.enable_singleton_concurrency, options.enable_diagnostics),
            options,
        }
    }

    #[inline]
    pub fn global(&self) -> &Arc<ScopeContext> {
        &self.global
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    // -- Registration ---------------------------------------------------

    /// Register a singleton: `factory` runs at most once, the first time the
    /// type is requested, and every caller thereafter shares the same `Arc`.
    /// Properties passed to a `get` call are ignored for singletons.
    pub fn register_singleton<T, Deps>(&self, factory: impl Fn(Deps) -> T + Send + Sync + 'static) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.register_singleton_fallible::<T, Deps>(move |deps| Ok(factory(deps)))
    }

    /// Fallible counterpart of [`Self::register_singleton`]: the factory may
    /// fail construction, surfacing as whatever `DiError` it returns.
    pub fn register_singleton_fallible<T, Deps>(
        &self,
        factory: impl Fn(Deps) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        let token = TypeToken::component::<T>();
        Registry::check_shape(&self.options, &token)?;
        self.registry.add(token, Lifetime::Singleton, wrap::<T, Deps, _>(factory))
    }

    /// Register a scoped component: one instance per ancestor scope whose
    /// kind matches `Scope`. Resolving without a matching ancestor scope in
    /// the chain raises `DiError::ScopeMismatch`.
    pub fn register_scoped<T, Scope, Deps>(
        &self,
        factory: impl Fn(Deps) -> T + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        Scope: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.register_scoped_fallible::<T, Scope, Deps>(move |deps| Ok(factory(deps)))
    }

    pub fn register_scoped_fallible<T, Scope, Deps>(
        &self,
        factory: impl Fn(Deps) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        Scope: Send + Sync + 'static,
        Deps: Resolvable,
    {
        let token = TypeToken::component::<T>();
        Registry::check_shape(&self.options, &token)?;
        let scope_kind = ScopeKind::Typed(TypeToken::component::<Scope>());
        self.registry
            .add(token, Lifetime::Scoped(scope_kind), wrap::<T, Deps, _>(factory))
    }

    /// Register a transient: a fresh instance every request. Properties
    /// passed to `get`/`create_with_properties` reach the factory via the
    /// `Properties` element of `Deps`.
    pub fn register_transient<T, Deps>(&self, factory: impl Fn(Deps) -> T + Send + Sync + 'static) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.register_transient_fallible::<T, Deps>(move |deps| Ok(factory(deps)))
    }

    pub fn register_transient_fallible<T, Deps>(
        &self,
        factory: impl Fn(Deps) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        let token = TypeToken::component::<T>();
        Registry::check_shape(&self.options, &token)?;
        self.registry
            .add(token, Lifetime::Transient, wrap::<T, Deps, _>(factory))
    }

    /// Register a pre-built instance directly as a singleton, bypassing a
    /// factory entirely. The singleton cache guarantees the wrapping factory
    /// runs at most once, so handing out the instance by value on that one
    /// call never requires `T: Clone`.
    pub fn register_instance<T: Send + Sync + 'static>(&self, instance: T) -> Result<()> {
        let slot = std::sync::Mutex::new(Some(instance));
        self.register_singleton::<T, ()>(move |_: ()| {
            slot.lock().unwrap().take().expect("singleton factory invoked more than once")
        })
    }

    /// Register a configuration value: a plain struct resolved by reference
    /// rather than by value, checked against `allowed_configuration_types`
    /// instead of `allowed_component_types`. Stored and resolved exactly
    /// like a singleton instance; the distinct [`TypeShape`] only changes
    /// which policy list gates the registration.
    pub fn register_configuration<T: Send + Sync + 'static>(&self, value: T) -> Result<()> {
        let token = TypeToken::configuration::<T>();
        Registry::check_shape(&self.options, &token)?;
        let slot = std::sync::Mutex::new(Some(value));
        let factory = wrap::<T, (), _>(move |_: ()| {
            Ok(slot.lock().unwrap().take().expect("configuration factory invoked more than once"))
        });
        self.registry.add(token, Lifetime::Singleton, factory)
    }

    /// Resolve a configuration value previously registered with
    /// [`Self::register_configuration`].
    pub fn get_configuration<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get::<T>(&self.global)
    }

    // -- Resolution -------------------------------------------------------

    /// Resolve `T` from the registry for a request made within `scope` — the
    /// fallback path [`Cx::resolve`] takes once local/contextual lookup comes
    /// up empty.
    pub fn resolve_registered<T: Send + Sync + 'static>(&self, scope: &Arc<ScopeContext>) -> Result<Arc<T>> {
        let instance = self.resolve_dyn(TypeId::of::<T>(), scope, None)?;
        Ok(downcast::<T>(instance))
    }

    /// Top-level entry point: resolve `T` within `scope`, with no inherited
    /// component context (this is a fresh request, not a nested dependency).
    pub fn get<T: Send + Sync + 'static>(&self, scope: &Arc<ScopeContext>) -> Result<Arc<T>> {
        self.resolve_registered::<T>(scope)
    }

    /// Like [`Self::get`], but with explicit properties for a transient
    /// request (ignored for singleton/scoped, per the invariant that a
    /// shared instance cannot carry per-caller properties).
    pub fn get_with_properties<T: Send + Sync + 'static>(
        &self,
        scope: &Arc<ScopeContext>,
        props: Properties,
    ) -> Result<Arc<T>> {
        let instance = self.resolve_dyn(TypeId::of::<T>(), scope, Some(props))?;
        Ok(downcast::<T>(instance))
    }

    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.registry.contains(type_id) || self.hubs.contains_key(type_id)
    }

    /// Register a multi-implementation hub for `T`: `key_fn` selects an
    /// implementation by evaluating the request's properties, `configure`
    /// populates the hub's keyed implementations via `add_impl`/
    /// `add_singleton_impl`. Once registered, `T` resolves through the hub on
    /// every ordinary `get`/`create_with_properties` call exactly as if it
    /// were a plain factory entry.
    pub fn register_component<K, T>(
        &self,
        name: &'static str,
        key_fn: KeyFn<K>,
        configure: impl FnOnce(&mut Hub<K, T>),
    ) -> Result<()>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        if self.contains(&type_id) {
            return Err(DiError::already_registered::<T>());
        }
        let mut hub = Hub::new(name, key_fn);
        configure(&mut hub);
        self.hubs.insert(type_id, Arc::new(hub));
        Ok(())
    }

    fn resolve_dyn(
        &self,
        type_id: TypeId,
        scope: &Arc<ScopeContext>,
        props: Option<Properties>,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        if let Some(hub) = self.hubs.get(&type_id) {
            let merged = scope.data().properties().merged_with(&props.unwrap_or_default());
            let cx = Cx::new(self, Arc::clone(scope));
            return hub.resolve_dyn(&cx, &merged);
        }

        let entry = self
            .registry
            .get(&type_id)
            .ok_or(DiError::NotFound {
                type_name: "<unregistered>",
                type_id,
            })?;

        match &entry.lifetime {
            Lifetime::Singleton => self.resolve_cached(&entry, &Arc::clone(&self.global)),
            Lifetime::Scoped(kind) => {
                let target = scope.nearest_matching_ancestor(kind).ok_or_else(|| DiError::ScopeMismatch {
                    type_name: entry.token.name(),
                    scope_kind: kind.to_string(),
                })?;
                self.resolve_cached(&entry, &target)
            }
            Lifetime::Transient => {
                let _guard = if self.options.track_transient_recurrence {
                    Some(RecurrenceGuard::enter(entry.token.name(), self.options.max_allowed_recurrence)?)
                } else {
                    None
                };
                let props = props.unwrap_or_default();
                let component = Arc::new(ComponentContext::new(Arc::clone(scope), props, entry.token));
                let cx = Cx::new(self, Arc::clone(scope)).with_component(Arc::clone(&component));
                self.build_with_diagnostics(&entry, &cx, &component)
            }
        }
    }

    /// Build (or return the cached) instance of a singleton/scoped entry
    /// inside `target_scope`'s own record cache.
    fn resolve_cached(
        &self,
        entry: &Arc<FactoryEntry>,
        target_scope: &Arc<ScopeContext>,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        let record = target_scope.data().record_for(entry.token.id());
        let (instance, component, existed) = record.execute(entry.token.name(), || {
            let component = Arc::new(ComponentContext::new(
                Arc::clone(target_scope),
                Properties::new(),
                entry.token,
            ));
            let cx = Cx::new(self, Arc::clone(target_scope)).with_component(Arc::clone(&component));
            let instance = entry.factory.build(&cx)?;
            Ok((instance, component))
        })?;

        #[cfg(feature = "logging")]
        if !existed {
            debug!(component = entry.token.name(), lifetime = entry.lifetime.label(), "constructed");
        }
        let _ = (existed, component);
        Ok(instance)
    }

    fn build_with_diagnostics(
        &self,
        entry: &Arc<FactoryEntry>,
        cx: &Cx,
        component: &Arc<ComponentContext>,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        entry.factory.build(cx).map_err(|e| {
            #[cfg(feature = "logging")]
            if self.options.enable_diagnostics && e.is_cyclic() {
                warn!(
                    component = entry.token.name(),
                    chain = %component.tracker().describe_chain(entry.token.name()),
                    "construction failed"
                );
            }
            let _ = component;
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &str;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> &str {
            "hello"
        }
    }
    struct French;
    impl Greeter for French {
        fn greet(&self) -> &str {
            "bonjour"
        }
    }

    #[test]
    fn hub_dispatches_by_request_property() {
        let engine = Engine::new(Options::default());
        let key_fn: KeyFn<String> = Arc::new(|props| props.get::<String>("locale").ok());
        engine
            .register_component::<String, Box<dyn Greeter>>("Greeter", key_fn, |hub| {
                hub.add_singleton_impl("en".into(), |_| Ok(Box::new(English) as Box<dyn Greeter>));
                hub.add_impl("fr".into(), |_| Ok(Box::new(French) as Box<dyn Greeter>));
            })
            .unwrap();

        let mut props = Properties::new();
        props.set("locale", "fr".to_string());
        let greeter = engine.get_with_properties::<Box<dyn Greeter>>(engine.global(), props).unwrap();
        assert_eq!(greeter.greet(), "bonjour");
    }

    #[test]
    fn hub_registration_conflicts_with_existing_factory() {
        struct Thing;
        let engine = Engine::new(Options::default());
        engine.register_singleton::<Thing, ()>(|_| Thing).unwrap();

        let key_fn: KeyFn<String> = Arc::new(|_| None);
        let result = engine.register_component::<String, Thing>("Thing", key_fn, |_hub| {});
        assert!(matches!(result, Err(DiError::AlreadyRegistered { .. })));
    }
}

fn wrap<T, Deps, F>(factory: F) -> Arc<dyn RawFactory>
where
    T: Send + Sync + 'static,
    Deps: Resolvable,
    F: Fn(Deps) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(ClosureFactory {
        f: move |cx: &Cx| -> Result<Arc<dyn Any + Send + Sync>> {
            let deps = Deps::resolve(cx)?;
            let value = factory(deps)?;
            Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>)
        },
    })
}

#[inline]
fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>) -> Arc<T> {
    value
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("registry entry produced the wrong concrete type"))
}
