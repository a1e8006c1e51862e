//! The top-level component container: wires the registry, the resolver/
//! lifecycle engine and the global scope context into the single handle
//! application code registers against and resolves from.
//!
//! Grounded in `pkg/host/dep/manager.go` of the source host package, which
//! plays the same role there (`Manager` owning a `Registry` and the root
//! `ScopeContext`).

use crate::cx::Resolvable;
use crate::engine::Engine;
use crate::error::Result;
use crate::multi_impl::{Hub, KeyFn};
use crate::properties::Properties;
use crate::registry::Options;
use crate::scope_factory::Scope;
use std::hash::Hash;
use std::sync::Arc;

/// Registers component factories and resolves instances from them.
///
/// Cheap to clone: internally an `Arc<Engine>`, so handing a `Container` to a
/// service or a looper processor is just a refcount bump.
#[derive(Clone)]
pub struct Container {
    engine: Arc<Engine>,
}

impl Container {
    /// A container with default registration policy (see [`Options::default`]).
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            engine: Arc::new(Engine::new(options)),
        }
    }

    #[inline]
    pub fn options(&self) -> &Options {
        self.engine.options()
    }

    /// The root scope, for APIs that want direct access to the context tree.
    pub fn root_scope(&self) -> Scope<'_> {
        Scope::new(&self.engine, Arc::clone(self.engine.global()))
    }

    // -- Registration ---------------------------------------------------

    pub fn register_singleton<T, Deps>(&self, factory: impl Fn(Deps) -> T + Send + Sync + 'static) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.engine.register_singleton::<T, Deps>(factory)
    }

    pub fn register_singleton_fallible<T, Deps>(
        &self,
        factory: impl Fn(Deps) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.engine.register_singleton_fallible::<T, Deps>(factory)
    }

    pub fn register_scoped<T, ScopeKind, Deps>(
        &self,
        factory: impl Fn(Deps) -> T + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        ScopeKind: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.engine.register_scoped::<T, ScopeKind, Deps>(factory)
    }

    pub fn register_scoped_fallible<T, ScopeKind, Deps>(
        &self,
        factory: impl Fn(Deps) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        ScopeKind: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.engine.register_scoped_fallible::<T, ScopeKind, Deps>(factory)
    }

    pub fn register_transient<T, Deps>(&self, factory: impl Fn(Deps) -> T + Send + Sync + 'static) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.engine.register_transient::<T, Deps>(factory)
    }

    pub fn register_transient_fallible<T, Deps>(
        &self,
        factory: impl Fn(Deps) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()>
    where
        T: Send + Sync + 'static,
        Deps: Resolvable,
    {
        self.engine.register_transient_fallible::<T, Deps>(factory)
    }

    /// Register an already-constructed value as a singleton.
    pub fn register_instance<T: Send + Sync + 'static>(&self, instance: T) -> Result<()> {
        self.engine.register_instance(instance)
    }

    /// Register a configuration value, checked against the registry's
    /// `allowed_configuration_types` policy rather than its component one.
    pub fn register_configuration<T: Send + Sync + 'static>(&self, value: T) -> Result<()> {
        self.engine.register_configuration(value)
    }

    /// Resolve a configuration value previously registered with
    /// [`Self::register_configuration`].
    pub fn get_configuration<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.engine.get_configuration::<T>()
    }

    /// Register a multi-implementation hub for `T`: `key_fn` evaluates a
    /// request's (scope-merged) properties to pick which implementation to
    /// build, and `configure` populates the hub's keyed implementations.
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
        self.engine.register_component(name, key_fn, configure)
    }

    // -- Resolution -------------------------------------------------------

    /// Resolve `T` from the root scope.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.engine.get::<T>(self.engine.global())
    }

    /// Resolve `T`, returning `None` instead of an error on any failure.
    pub fn try_get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// Resolve a transient `T` with explicit properties.
    pub fn create_with_properties<T: Send + Sync + 'static>(&self, props: Properties) -> Result<Arc<T>> {
        self.engine.get_with_properties::<T>(self.engine.global(), props)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.engine.contains(&std::any::TypeId::of::<T>())
    }

    // -- Scopes -------------------------------------------------------------

    pub fn create_scope(&self) -> Scope<'_> {
        self.root_scope().create_scope()
    }

    /// Create a typed child scope whose instance is resolved from the root
    /// scope by calling `get::<S>()` — see [`Scope::create_typed_scope`].
    pub fn create_typed_scope<S: Send + Sync + 'static>(&self, props: Properties) -> Result<Scope<'_>> {
        self.root_scope().create_typed_scope::<S>(props)
    }

    pub fn create_scope_from<S: Send + Sync + 'static>(&self, instance: Arc<S>, props: Properties) -> Scope<'_> {
        self.root_scope().create_scope_from(instance, props)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registered", &self.engine.registry().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeting(String);
    struct Greeter {
        greeting: Arc<Greeting>,
    }

    struct RequestScope;

    #[test]
    fn singleton_is_shared_across_resolutions() {
        let container = Container::new();
        container.register_singleton::<Greeting, ()>(|_| Greeting("hi".into())).unwrap();

        let a = container.get::<Greeting>().unwrap();
        let b = container.get::<Greeting>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dependent_singleton_is_resolved_through_injection() {
        let container = Container::new();
        container.register_singleton::<Greeting, ()>(|_| Greeting("hi".into())).unwrap();
        container
            .register_singleton::<Greeter, Arc<Greeting>>(|greeting| Greeter { greeting })
            .unwrap();

        let greeter = container.get::<Greeter>().unwrap();
        assert_eq!(greeter.greeting.0, "hi");
    }

    #[test]
    fn transient_creates_a_new_instance_each_time() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        struct Counter(u32);

        let container = Container::new();
        container
            .register_transient::<Counter, ()>(|_| Counter(COUNTER.fetch_add(1, Ordering::SeqCst)))
            .unwrap();

        let a = container.get::<Counter>().unwrap();
        let b = container.get::<Counter>().unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn scoped_without_matching_ancestor_is_a_scope_mismatch() {
        struct Session(u32);
        let container = Container::new();
        container
            .register_scoped::<Session, RequestScope, ()>(|_| Session(1))
            .unwrap();

        let result = container.get::<Session>();
        assert!(result.is_err());
    }

    #[test]
    fn scoped_resolves_within_matching_scope() {
        struct Session(u32);
        let container = Container::new();
        container
            .register_scoped::<Session, RequestScope, ()>(|_| Session(1))
            .unwrap();
        container.register_instance(RequestScope).unwrap();

        let scope = container.create_typed_scope::<RequestScope>(Properties::new()).unwrap();
        let session = scope.get::<Session>().unwrap();
        assert_eq!(session.0, 1);
    }

    #[test]
    fn register_instance_round_trips_the_value() {
        let container = Container::new();
        container.register_instance(Greeting("hello".into())).unwrap();
        assert_eq!(container.get::<Greeting>().unwrap().0, "hello");
    }

    #[test]
    fn not_found_is_an_error_not_a_panic() {
        struct Unregistered;
        let container = Container::new();
        assert!(container.get::<Unregistered>().is_err());
        assert!(container.try_get::<Unregistered>().is_none());
    }

    #[test]
    fn hub_selects_implementation_by_request_property() {
        trait Notifier: Send + Sync {
            fn channel(&self) -> &str;
        }
        struct Email;
        impl Notifier for Email {
            fn channel(&self) -> &str {
                "email"
            }
        }
        struct Sms;
        impl Notifier for Sms {
            fn channel(&self) -> &str {
                "sms"
            }
        }

        let container = Container::new();
        let key_fn: KeyFn<String> = Arc::new(|props| props.get::<String>("channel").ok());
        container
            .register_component::<String, Box<dyn Notifier>>("Notifier", key_fn, |hub| {
                hub.add_singleton_impl("email".into(), |_| Ok(Box::new(Email) as Box<dyn Notifier>));
                hub.add_impl("sms".into(), |_| Ok(Box::new(Sms) as Box<dyn Notifier>));
            })
            .unwrap();

        let mut props = Properties::new();
        props.set("channel", "sms".to_string());
        let notifier = container.create_with_properties::<Box<dyn Notifier>>(props).unwrap();
        assert_eq!(notifier.channel(), "sms");
    }

    #[test]
    fn configuration_round_trips_separately_from_components() {
        struct AppConfig {
            port: u16,
        }
        let container = Container::new();
        container.register_configuration(AppConfig { port: 8080 }).unwrap();
        assert_eq!(container.get_configuration::<AppConfig>().unwrap().port, 8080);
    }

    #[test]
    fn configuration_registration_is_rejected_when_policy_disallows_it() {
        struct AppConfig;
        let options = crate::registry::Options {
            allowed_configuration_types: vec![],
            ..Default::default()
        };
        let container = Container::with_options(options);
        let result = container.register_configuration(AppConfig);
        assert!(matches!(result, Err(crate::error::DiError::Configuration { .. })));
    }

    #[test]
    fn one_singleton_exposed_under_several_declared_types_shares_identity() {
        // `register_singleton_for_types` in the source registers one factory
        // output under several interface types at once. Rust doesn't have an
        // assignable-to-many-interfaces relationship to hang that off of, but
        // the same sharing falls out of composing two ordinary singleton
        // registrations: register the concrete type once, then register the
        // additional declared type as a singleton that depends on `Arc<T>` and
        // unsize-coerces it. The dependency resolves to the same cached `Arc`,
        // so mutating through either declared type is visible through both.
        use std::sync::atomic::{AtomicU32, Ordering};

        struct Clock {
            ticks: AtomicU32,
        }

        trait TimeSource: Send + Sync {
            fn ticks(&self) -> u32;
        }
        impl TimeSource for Clock {
            fn ticks(&self) -> u32 {
                self.ticks.load(Ordering::SeqCst)
            }
        }

        let container = Container::new();
        container
            .register_singleton::<Clock, ()>(|_| Clock { ticks: AtomicU32::new(0) })
            .unwrap();
        container
            .register_singleton::<Arc<dyn TimeSource>, Arc<Clock>>(|clock| clock as Arc<dyn TimeSource>)
            .unwrap();

        let clock = container.get::<Clock>().unwrap();
        clock.ticks.fetch_add(5, Ordering::SeqCst);

        let as_time_source = container.get::<Arc<dyn TimeSource>>().unwrap();
        assert_eq!(as_time_source.ticks(), 5);
    }

    #[test]
    fn registering_a_hub_over_an_existing_factory_fails() {
        struct Thing;
        let container = Container::new();
        container.register_singleton::<Thing, ()>(|_| Thing).unwrap();

        let key_fn: KeyFn<String> = Arc::new(|_| None);
        let result = container.register_component::<String, Thing>("Thing", key_fn, |_| {});
        assert!(result.is_err());
    }
}
