//! The parameter-resolution surface a factory sees while it runs.
//!
//! `Cx` is what an [`Engine`](crate::engine::Engine) hands a factory: "resolve
//! me a `T`" without the factory needing to know whether `T` comes from a
//! contextual dependency, an ancestor scope, or the registry. `Resolvable` is
//! the companion trait that lets a factory declare its whole parameter list as
//! one type (`()`, `Arc<T>`, or a tuple of `Arc<T>`s) and have each element
//! resolved in turn — the injector's reflection-over-parameters replaced by
//! Rust generics resolved at the call site.

use crate::engine::Engine;
use crate::error::Result;
use crate::properties::Properties;
use crate::scope::{ComponentContext, ScopeContext};
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Context handed to a factory while it constructs one instance.
///
/// Borrows the engine for registry fallback, the scope the request resolves
/// within, and — for nested resolutions triggered from inside another
/// factory — the component context of the instance currently under
/// construction.
pub struct Cx<'a> {
    engine: &'a Engine,
    scope: Arc<ScopeContext>,
    component: Option<Arc<ComponentContext>>,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(engine: &'a Engine, scope: Arc<ScopeContext>) -> Self {
        Self {
            engine,
            scope,
            component: None,
        }
    }

    pub(crate) fn with_component(mut self, component: Arc<ComponentContext>) -> Self {
        self.component = Some(component);
        self
    }

    /// The scope this resolution is running within.
    #[inline]
    pub fn scope(&self) -> &Arc<ScopeContext> {
        &self.scope
    }

    /// The component currently under construction, if this `Cx` was handed to
    /// a factory rather than obtained from a top-level `get`.
    #[inline]
    pub fn component(&self) -> Option<&Arc<ComponentContext>> {
        self.component.as_ref()
    }

    /// The properties in force for this resolution: the constructing
    /// component's snapshot if there is one, otherwise the enclosing scope's
    /// inherited properties.
    pub fn properties(&self) -> Properties {
        match &self.component {
            Some(cc) => cc.properties().clone(),
            None => self.scope.data().properties(),
        }
    }

    /// Resolve `T`, searching local contextual deps, then walking scope
    /// parents, then falling back to the registry. This is the single
    /// resolution path every `Resolvable` impl and every top-level `get`
    /// bottoms out in.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let type_id = TypeId::of::<T>();

        if let Some(cc) = &self.component
            && let Some(value) = cc.get_local_dependency(&type_id)
        {
            return Ok(downcast::<T>(value));
        }
        if let Some(value) = self.scope.get_dependency(&type_id) {
            return Ok(downcast::<T>(value));
        }
        self.engine.resolve_registered::<T>(&self.scope)
    }
}

#[inline]
fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>) -> Arc<T> {
    value
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("contextual dependency stored under the wrong TypeId"))
}

/// A factory's entire parameter list, resolved as one value.
///
/// Implemented for `()` (no dependencies), `Arc<T>` (one dependency),
/// `Option<Arc<T>>` (an optional one), `Properties` and `Arc<ScopeContext>`
/// (ambient capabilities every factory can ask for), and tuples of `Arc<T>`
/// up to twelve elements.
pub trait Resolvable: Sized {
    fn resolve(cx: &Cx) -> Result<Self>;
}

impl Resolvable for () {
    #[inline]
    fn resolve(_cx: &Cx) -> Result<Self> {
        Ok(())
    }
}

impl<T: Send + Sync + 'static> Resolvable for Arc<T> {
    #[inline]
    fn resolve(cx: &Cx) -> Result<Self> {
        cx.resolve::<T>()
    }
}

impl<T: Send + Sync + 'static> Resolvable for Option<Arc<T>> {
    #[inline]
    fn resolve(cx: &Cx) -> Result<Self> {
        Ok(cx.resolve::<T>().ok())
    }
}

impl Resolvable for Properties {
    #[inline]
    fn resolve(cx: &Cx) -> Result<Self> {
        Ok(cx.properties())
    }
}

impl Resolvable for Arc<ScopeContext> {
    #[inline]
    fn resolve(cx: &Cx) -> Result<Self> {
        Ok(Arc::clone(cx.scope()))
    }
}

macro_rules! impl_resolvable_tuple {
    ($($T:ident),+) => {
        impl<$($T: Send + Sync + 'static),+> Resolvable for ($(Arc<$T>,)+) {
            #[inline]
            fn resolve(cx: &Cx) -> Result<Self> {
                Ok(($(cx.resolve::<$T>()?,)+))
            }
        }
    };
}

impl_resolvable_tuple!(A, B);
impl_resolvable_tuple!(A, B, C);
impl_resolvable_tuple!(A, B, C, D);
impl_resolvable_tuple!(A, B, C, D, E);
impl_resolvable_tuple!(A, B, C, D, E, F);
impl_resolvable_tuple!(A, B, C, D, E, F, G);
impl_resolvable_tuple!(A, B, C, D, E, F, G, H);
impl_resolvable_tuple!(A, B, C, D, E, F, G, H, I);
impl_resolvable_tuple!(A, B, C, D, E, F, G, H, I, J);
impl_resolvable_tuple!(A, B, C, D, E, F, G, H, I, J, K);
impl_resolvable_tuple!(A, B, C, D, E, F, G, H, I, J, K, L);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    struct A(i32);
    struct B(&'static str);

    #[test]
    fn tuple_resolves_each_element() {
        let engine = Engine::new(Default::default());
        engine.register_singleton::<A, ()>(|_| A(1));
        engine.register_singleton::<B, ()>(|_| B("x"));

        let cx = Cx::new(&engine, Arc::clone(engine.global()));
        let (a, b): (Arc<A>, Arc<B>) = Resolvable::resolve(&cx).unwrap();
        assert_eq!(a.0, 1);
        assert_eq!(b.0, "x");
    }

    #[test]
    fn optional_dependency_is_none_when_unregistered() {
        let engine = Engine::new(Default::default());
        let cx = Cx::new(&engine, Arc::clone(engine.global()));
        let missing: Option<Arc<A>> = Resolvable::resolve(&cx).unwrap();
        assert!(missing.is_none());
    }
}
