//! Scope creation: child scopes, typed scopes carrying a scope instance, and
//! the `using` helper for scoping a single call to a temporary instance.
//!
//! Grounded in `src/pkg/host/dep/scopefactory.go` of the source host package.

use crate::engine::Engine;
use crate::error::Result;
use crate::properties::Properties;
use crate::scope::{ScopeContext, ScopeKind};
use crate::token::TypeToken;
use std::any::Any;
use std::sync::Arc;

/// A freshly created scope, bound to the engine it resolves against.
///
/// Cheap to clone (both fields are `Arc`s); every resolution method borrows
/// the engine, so a `Scope` outlives any one `get` call.
#[derive(Clone)]
pub struct Scope<'a> {
    engine: &'a Engine,
    ctx: Arc<ScopeContext>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(engine: &'a Engine, ctx: Arc<ScopeContext>) -> Self {
        Self { engine, ctx }
    }

    #[inline]
    pub fn context(&self) -> &Arc<ScopeContext> {
        &self.ctx
    }

    #[inline]
    pub fn id(&self) -> String {
        self.ctx.scope_id()
    }

    /// Resolve `T` within this scope.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.engine.get::<T>(&self.ctx)
    }

    /// Resolve `T` within this scope, supplying explicit properties for a
    /// transient request.
    pub fn get_with_properties<T: Send + Sync + 'static>(&self, props: Properties) -> Result<Arc<T>> {
        self.engine.get_with_properties::<T>(&self.ctx, props)
    }

    /// Create an anonymous child scope beneath this one.
    pub fn create_scope(&self) -> Scope<'a> {
        let child = self.ctx.child(ScopeKind::None_, None, Properties::new());
        Scope::new(self.engine, child)
    }

    /// Create a typed child scope whose instance is resolved from this
    /// scope's context by calling `get::<S>()`, not supplied by the caller —
    /// mirrors `CreateTypedScope`, which resolves the scope type as a
    /// component rather than accepting an instance (that's
    /// [`Self::create_scope_from`]'s job).
    pub fn create_typed_scope<S: Send + Sync + 'static>(&self, props: Properties) -> Result<Scope<'a>> {
        let instance = self.get::<S>()?;
        Ok(self.create_scope_from(instance, props))
    }

    /// Create a typed child scope from an already-shared instance, without
    /// taking ownership of a fresh value.
    pub fn create_scope_from<S: Send + Sync + 'static>(&self, instance: Arc<S>, props: Properties) -> Scope<'a> {
        let token = TypeToken::component::<S>();
        let erased: Arc<dyn Any + Send + Sync> = instance;
        let child = self.ctx.child(ScopeKind::Typed(token), Some(erased), props);
        Scope::new(self.engine, child)
    }

    /// Clear this scope's own instance cache. Does not affect parent or
    /// child scopes, and does not run any user cleanup code.
    pub fn dispose(&self) {
        self.ctx.dispose();
    }
}

/// Run `body` inside a scope built from `instance`, disposing the scope
/// afterwards regardless of whether `body` returned `Ok` or `Err`. Mirrors
/// the source's `Using(instance, fn)` helper, which builds its scope via
/// `CreateScopeFrom` (the caller already holds the instance) rather than
/// resolving one through the context.
pub fn using<'a, S, R>(parent: &Scope<'a>, instance: Arc<S>, props: Properties, body: impl FnOnce(&Scope<'a>) -> R) -> R
where
    S: Send + Sync + 'static,
{
    let scope = parent.create_scope_from(instance, props);
    let result = body(&scope);
    scope.dispose();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Options;

    struct RequestId(u32);

    #[test]
    fn typed_scope_resolves_its_own_instance() {
        let engine = Engine::new(Options::default());
        engine.register_instance(RequestId(7)).unwrap();
        let root = Scope::new(&engine, Arc::clone(engine.global()));
        let child = root.create_typed_scope::<RequestId>(Properties::new()).unwrap();

        let id = child.get::<RequestId>().unwrap();
        assert_eq!(id.0, 7);
    }

    #[test]
    fn using_disposes_after_body_runs() {
        let engine = Engine::new(Options::default());
        let root = Scope::new(&engine, Arc::clone(engine.global()));

        let area = using(&root, Arc::new(RequestId(1)), Properties::new(), |scope| scope.get::<RequestId>().unwrap().0);
        assert_eq!(area, 1);
    }

    #[test]
    fn anonymous_scope_inherits_parent_properties() {
        let engine = Engine::new(Options::default());
        let root = Scope::new(&engine, Arc::clone(engine.global()));
        root.context().data().update_properties(&Properties::from_pairs([("env".to_string(), "prod".to_string())]));

        let child = root.create_scope();
        assert_eq!(child.context().data().properties().get::<String>("env").unwrap(), "prod");
    }
}
