//! Multi-implementation hub: one interface, many keyed implementations,
//! selected at resolution time by evaluating a property against the
//! request's properties.
//!
//! Grounded in `pkg/host/dep/componenthub.go` of the source host package.
//! The source selects an implementation by invoking a user-supplied
//! `KeyFunc` against a `Properties` bag and panicking if it returns no key or
//! an unregistered one; that panic-on-miss behavior is kept here as
//! `DiError::HubKeyNotFound`, surfaced through the fallible entry points
//! rather than an actual `panic!`.

use crate::cx::Cx;
use crate::error::{DiError, Result};
use crate::properties::Properties;
use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// A single keyed implementation: lazily built once per key, then shared.
struct Impl<T> {
    factory: Box<dyn Fn(&Cx) -> Result<T> + Send + Sync>,
    instance: Mutex<Option<Arc<T>>>,
    singleton: bool,
}

/// Evaluates the key that selects an implementation for a given request.
/// Mirrors the source's `KeyFunc(props Properties) interface{}`.
pub type KeyFn<K> = Arc<dyn Fn(&Properties) -> Option<K> + Send + Sync>;

/// One interface, many keyed implementations.
pub struct Hub<K, T> {
    name: &'static str,
    key_fn: KeyFn<K>,
    impls: HashMap<K, Impl<T>>,
}

impl<K: Eq + Hash + Clone, T: Send + Sync + 'static> Hub<K, T> {
    pub fn new(name: &'static str, key_fn: KeyFn<K>) -> Self {
        Self {
            name,
            key_fn,
            impls: HashMap::new(),
        }
    }

    /// Register a singleton implementation under `key`: built at most once,
    /// shared on every subsequent resolution with that key.
    pub fn add_singleton_impl(&mut self, key: K, factory: impl Fn(&Cx) -> Result<T> + Send + Sync + 'static) {
        self.impls.insert(
            key,
            Impl {
                factory: Box::new(factory),
                instance: Mutex::new(None),
                singleton: true,
            },
        );
    }

    /// Register a transient implementation under `key`: rebuilt on every
    /// resolution.
    pub fn add_impl(&mut self, key: K, factory: impl Fn(&Cx) -> Result<T> + Send + Sync + 'static) {
        self.impls.insert(
            key,
            Impl {
                factory: Box::new(factory),
                instance: Mutex::new(None),
                singleton: false,
            },
        );
    }

    /// Evaluate `key_fn` against `props`, select the matching implementation,
    /// and build (or return the cached) instance.
    pub fn resolve(&self, cx: &Cx, props: &Properties) -> Result<Arc<T>> {
        let key = (self.key_fn)(props).ok_or(DiError::HubKeyNotFound { hub_name: self.name })?;
        let imp = self.impls.get(&key).ok_or(DiError::HubKeyNotFound { hub_name: self.name })?;

        if !imp.singleton {
            return Ok(Arc::new((imp.factory)(cx)?));
        }

        let mut slot = imp.instance.lock().unwrap();
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let built = Arc::new((imp.factory)(cx)?);
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.impls.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.impls.keys()
    }
}

/// Type-erased resolution entry point so the engine can keep a heterogeneous
/// collection of hubs alongside ordinary factory entries, keyed only by the
/// interface type `T`'s `TypeId` (the key type `K` stays internal to the hub).
pub(crate) trait HubResolver: Any + Send + Sync {
    fn resolve_dyn(&self, cx: &Cx, props: &Properties) -> Result<Arc<dyn Any + Send + Sync>>;
}

impl<K, T> HubResolver for Hub<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn resolve_dyn(&self, cx: &Cx, props: &Properties) -> Result<Arc<dyn Any + Send + Sync>> {
        self.resolve(cx, props).map(|v| v as Arc<dyn Any + Send + Sync>)
    }
}
