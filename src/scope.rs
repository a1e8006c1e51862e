//! The context tree: scope contexts, scope data, component contexts and the
//! dependency tracker that links them.
//!
//! Grounded in `pkg/host/dep/scopecontext.go`, `scopedata.go`, `singletonlock.go`
//! and `componentcontext.go` of the source host package. The re-entrant lock
//! there is keyed by a goroutine id recovered by parsing a stack trace; here it
//! is keyed by [`std::thread::ThreadId`], which is a native stable identifier.

use crate::error::{DiError, Result};
use crate::properties::Properties;
use crate::token::TypeToken;
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

#[cfg(feature = "logging")]
use tracing::trace;

/// The kind tag attached to a scope, and the filter a scoped registration
/// declares against it. `Global` means singleton storage; `None_` is an
/// anonymous, untyped scope; `Any` matches any non-global scope; a `Typed`
/// kind carries the registered scope type's token.
#[derive(Debug, Clone, Copy)]
pub enum ScopeKind {
    Global,
    None_,
    Any,
    Typed(TypeToken),
}

impl ScopeKind {
    /// Whether `self` (a scope's own kind) satisfies a request declared as
    /// `requested` (the scope filter on a `Scoped<T>` registration). Exact
    /// match only — there is no structural subtyping among scope types.
    pub fn matches(&self, requested: &ScopeKind) -> bool {
        match requested {
            ScopeKind::Any => !matches!(self, ScopeKind::Global),
            ScopeKind::Global => matches!(self, ScopeKind::Global),
            ScopeKind::None_ => matches!(self, ScopeKind::None_),
            ScopeKind::Typed(want) => matches!(self, ScopeKind::Typed(have) if have == want),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Global => write!(f, "Global"),
            ScopeKind::None_ => write!(f, "None"),
            ScopeKind::Any => write!(f, "Any"),
            ScopeKind::Typed(token) => write!(f, "{}", token.name()),
        }
    }
}

/// A map from type token to a getter closure, used both for contextual
/// dependencies (`Context`, `Logger`, `Properties`, `ScopeContext`, `Scope`
/// overlays) and for the typed-scope self-registration in `initialize`.
#[derive(Clone, Default)]
pub struct DepDict {
    getters: Arc<DashMap<TypeId, Arc<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>>>,
}

impl DepDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&self, type_id: TypeId, getter: F)
    where
        F: Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync + 'static,
    {
        self.getters.insert(type_id, Arc::new(getter));
    }

    pub fn get(&self, type_id: &TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.getters.get(type_id).map(|getter| getter())
    }

    pub fn contains(&self, type_id: &TypeId) -> bool {
        self.getters.contains_key(type_id)
    }
}

/// A per-context list of the contexts whose construction triggered this
/// context's creation. The first entry is the "why was this created" link
/// diagnostics walk.
#[derive(Default)]
pub struct DependencyTracker {
    dependents: Mutex<Vec<Arc<ComponentContext>>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dependent(&self, ctx: Arc<ComponentContext>) {
        self.dependents.lock().unwrap().push(ctx);
    }

    pub fn dependents(&self) -> Vec<Arc<ComponentContext>> {
        self.dependents.lock().unwrap().clone()
    }

    /// Render the "why was this created" chain for diagnostics, walking the
    /// first-dependent link of each context in turn.
    pub fn describe_chain(&self, type_name: &str) -> String {
        let mut chain = vec![type_name.to_string()];
        let mut current = self.dependents().into_iter().next();
        while let Some(ctx) = current {
            chain.push(ctx.type_token.name().to_string());
            current = ctx.tracker.dependents().into_iter().next();
        }
        chain.join(" <- ")
    }
}

/// Re-entrant mutual exclusion keyed by the executing thread. Acquiring the
/// lock from the thread that already holds it does not block — it reports
/// re-entry so the caller can raise a cyclic-dependency error instead of
/// deadlocking.
struct CreateLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

enum LockOutcome {
    Acquired,
    Reentrant,
}

impl CreateLock {
    fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    fn enter(&self) -> LockOutcome {
        let me = std::thread::current().id();
        let mut owner = self.owner.lock().unwrap();
        loop {
            match *owner {
                None => {
                    *owner = Some(me);
                    return LockOutcome::Acquired;
                }
                Some(id) if id == me => return LockOutcome::Reentrant,
                Some(_) => {
                    owner = self.released.wait(owner).unwrap();
                }
            }
        }
    }

    fn leave(&self) {
        let mut owner = self.owner.lock().unwrap();
        *owner = None;
        self.released.notify_all();
    }
}

/// Guards at-most-one concurrent construction of a scope record's instance,
/// either via the re-entrant lock (`EnableSingletonConcurrency`) or a plain
/// flag for the single-threaded variant.
enum CreateGuard {
    Locked(CreateLock),
    Flagged(AtomicBool),
}

/// One cached singleton/scoped instance within a [`ScopeData`] map, plus the
/// component context that was produced alongside it.
pub struct ScopeRecord {
    instance: once_cell::sync::OnceCell<Arc<dyn Any + Send + Sync>>,
    component_context: once_cell::sync::OnceCell<Arc<ComponentContext>>,
    guard: CreateGuard,
}

impl ScopeRecord {
    fn new(concurrency: bool) -> Self {
        Self {
            instance: once_cell::sync::OnceCell::new(),
            component_context: once_cell::sync::OnceCell::new(),
            guard: if concurrency {
                CreateGuard::Locked(CreateLock::new())
            } else {
                CreateGuard::Flagged(AtomicBool::new(false))
            },
        }
    }

    /// Build (or return the cached) instance. `build` is called at most once
    /// across all threads; a thread that re-enters its own construction
    /// observes `Err(DiError::CyclicDependency { .. })` instead of blocking.
    ///
    /// Returns `(instance, component_context, already_existed)`.
    pub fn execute<F>(
        &self,
        type_name: &'static str,
        build: F,
    ) -> Result<(Arc<dyn Any + Send + Sync>, Arc<ComponentContext>, bool)>
    where
        F: FnOnce() -> Result<(Arc<dyn Any + Send + Sync>, Arc<ComponentContext>)>,
    {
        if let Some(instance) = self.instance.get() {
            return Ok((
                Arc::clone(instance),
                Arc::clone(self.component_context.get().expect("set alongside instance")),
                true,
            ));
        }

        match &self.guard {
            CreateGuard::Flagged(creating) => {
                if creating.swap(true, Ordering::AcqRel) {
                    return Err(DiError::CyclicDependency { type_name });
                }
                let result = self.finish(build);
                creating.store(false, Ordering::Release);
                result
            }
            CreateGuard::Locked(lock) => match lock.enter() {
                LockOutcome::Reentrant => Err(DiError::CyclicDependency { type_name }),
                LockOutcome::Acquired => {
                    // Double-checked: another thread may have finished while we waited.
                    if let Some(instance) = self.instance.get() {
                        lock.leave();
                        return Ok((
                            Arc::clone(instance),
                            Arc::clone(
                                self.component_context.get().expect("set alongside instance"),
                            ),
                            true,
                        ));
                    }
                    let result = self.finish(build);
                    lock.leave();
                    result
                }
            },
        }
    }

    fn finish<F>(
        &self,
        build: F,
    ) -> Result<(Arc<dyn Any + Send + Sync>, Arc<ComponentContext>, bool)>
    where
        F: FnOnce() -> Result<(Arc<dyn Any + Send + Sync>, Arc<ComponentContext>)>,
    {
        let (instance, ctx) = build()?;
        // First writer wins; under the lock variant we are the only writer anyway.
        let _ = self.instance.set(Arc::clone(&instance));
        let _ = self.component_context.set(Arc::clone(&ctx));
        Ok((instance, ctx, false))
    }
}

/// Per-scope cache of singleton/scoped instances, plus the scope's own
/// inherited property snapshot.
pub struct ScopeData {
    records: DashMap<TypeId, Arc<ScopeRecord>, RandomState>,
    properties: Mutex<Properties>,
    concurrency: bool,
}

impl ScopeData {
    pub fn new(concurrency: bool, properties: Properties) -> Self {
        Self {
            records: DashMap::with_hasher(RandomState::new()),
            properties: Mutex::new(properties),
            concurrency,
        }
    }

    /// Get or lazily create the scope record for `type_id`.
    pub fn record_for(&self, type_id: TypeId) -> Arc<ScopeRecord> {
        Arc::clone(
            self.records
                .entry(type_id)
                .or_insert_with(|| Arc::new(ScopeRecord::new(self.concurrency))),
        )
    }

    /// Drop every cached record, as `Dispose` does. Does not invoke user code.
    pub fn clear(&self) {
        self.records.clear();
    }

    pub fn properties(&self) -> Properties {
        self.properties.lock().unwrap().clone()
    }

    pub fn update_properties(&self, update: &Properties) {
        self.properties.lock().unwrap().update(update);
    }
}

/// A node in the context tree: owns scope data, contextual deps, and a
/// parent link. The global (root) scope has no parent.
pub struct ScopeContext {
    id: u64,
    kind: ScopeKind,
    scope_instance: Option<Arc<dyn Any + Send + Sync>>,
    parent: Option<Arc<ScopeContext>>,
    contextual_deps: DepDict,
    data: ScopeData,
    concurrency: bool,
    debug: bool,
}

impl ScopeContext {
    fn next_id() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    /// The root global scope, created once with the host.
    pub fn global(concurrency: bool, debug: bool) -> Arc<Self> {
        Arc::new(Self {
            id: Self::next_id(),
            kind: ScopeKind::Global,
            scope_instance: None,
            parent: None,
            contextual_deps: DepDict::new(),
            data: ScopeData::new(concurrency, Properties::new()),
            concurrency,
            debug,
        })
    }

    /// Create a child scope. `kind`/`scope_instance` are supplied together:
    /// `ScopeKind::None_` with no instance for an anonymous scope, or
    /// `ScopeKind::Typed(token)` with the scope object for a typed one.
    /// `initial_properties` is always provided — "no properties" is an empty
    /// map, matching the single initialization path the design notes settle on.
    pub fn child(
        self: &Arc<Self>,
        kind: ScopeKind,
        scope_instance: Option<Arc<dyn Any + Send + Sync>>,
        initial_properties: Properties,
    ) -> Arc<Self> {
        let mut inherited = self.data.properties();
        inherited.update(&initial_properties);

        let child = Arc::new(Self {
            id: Self::next_id(),
            kind,
            scope_instance: scope_instance.clone(),
            parent: Some(Arc::clone(self)),
            contextual_deps: DepDict::new(),
            data: ScopeData::new(self.concurrency, inherited),
            concurrency: self.concurrency,
            debug: self.debug,
        });

        // Registers the scope instance as a contextual dependency keyed by
        // its own type, so nested injections of that type return it.
        if let (ScopeKind::Typed(token), Some(instance)) = (&child.kind, scope_instance) {
            let type_id = token.id();
            child
                .contextual_deps
                .insert(type_id, move || Arc::clone(&instance));
        }

        #[cfg(feature = "logging")]
        trace!(scope_id = child.id, kind = %child.kind, "scope context created");

        child
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<ScopeContext>> {
        self.parent.as_ref()
    }

    #[inline]
    pub fn data(&self) -> &ScopeData {
        &self.data
    }

    #[inline]
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    /// Add a contextual dependency resolved by calling `getter` on demand.
    pub fn add_dependency<F>(&self, type_id: TypeId, getter: F)
    where
        F: Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync + 'static,
    {
        self.contextual_deps.insert(type_id, getter);
    }

    /// Search this scope's contextual deps first, then walk parents. Returns
    /// `None` if unfound anywhere, so callers can then fall back to the
    /// registry.
    pub fn get_dependency(&self, type_id: &TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        if let Some(value) = self.contextual_deps.get(type_id) {
            return Some(value);
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.get_dependency(type_id))
    }

    /// Walk to the nearest ancestor (inclusive of self, exclusive of global)
    /// whose kind matches `requested`.
    pub fn nearest_matching_ancestor(
        self: &Arc<Self>,
        requested: &ScopeKind,
    ) -> Option<Arc<ScopeContext>> {
        let mut current = Some(Arc::clone(self));
        while let Some(ctx) = current {
            if matches!(ctx.kind, ScopeKind::Global) {
                return None;
            }
            if ctx.kind.matches(requested) {
                return Some(ctx);
            }
            current = ctx.parent.clone();
        }
        None
    }

    /// Printable identifier: `"Global"` for the root scope, `TypeName@id` for
    /// typed scopes, and just the instance id for anonymous ones. Tolerates a
    /// `None` scope instance (always true for the global scope).
    pub fn scope_id(&self) -> String {
        match &self.kind {
            ScopeKind::Global => "Global".to_string(),
            ScopeKind::Typed(token) => format!("{}@{}", token.name(), self.id),
            _ => self.id.to_string(),
        }
    }

    /// Clear this scope's instance cache. Does not invoke any user callback.
    pub fn dispose(&self) {
        self.data.clear();
    }
}

impl fmt::Debug for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeContext")
            .field("id", &self.scope_id())
            .field("kind", &self.kind.to_string())
            .finish()
    }
}

/// The context bound to one component instance while its factory runs. Holds
/// a dependency tracker, a property *snapshot* taken at construction, and any
/// local contextual deps contributed by an action/scope overlay.
pub struct ComponentContext {
    scope: Arc<ScopeContext>,
    tracker: DependencyTracker,
    properties: Properties,
    contextual_deps: DepDict,
    type_token: TypeToken,
}

impl ComponentContext {
    pub fn new(scope: Arc<ScopeContext>, properties: Properties, type_token: TypeToken) -> Self {
        Self {
            scope,
            tracker: DependencyTracker::new(),
            properties,
            contextual_deps: DepDict::new(),
            type_token,
        }
    }

    #[inline]
    pub fn scope(&self) -> &Arc<ScopeContext> {
        &self.scope
    }

    #[inline]
    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// The properties as captured at construction time. Later updates to the
    /// owning scope's properties never retroactively change this snapshot.
    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    #[inline]
    pub fn type_token(&self) -> &TypeToken {
        &self.type_token
    }

    pub fn add_dependency<F>(&self, type_id: TypeId, getter: F)
    where
        F: Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync + 'static,
    {
        self.contextual_deps.insert(type_id, getter);
    }

    pub fn get_local_dependency(&self, type_id: &TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.contextual_deps.get(type_id)
    }
}

/// Monotonically increasing instance identity, used e.g. by anonymous scopes
/// for their printable id. Not to be confused with [`ScopeContext::id`] —
/// this is exposed so user code can mint the same kind of identity for
/// contextual-dependency keys when constructing a typed scope's instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestScope;

    #[test]
    fn global_scope_has_no_parent() {
        let global = ScopeContext::global(true, false);
        assert!(global.parent().is_none());
        assert_eq!(global.scope_id(), "Global");
    }

    #[test]
    fn typed_child_scope_registers_itself_as_contextual_dependency() {
        let global = ScopeContext::global(true, false);
        let token = TypeToken::component::<TestScope>();
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(TestScope);

        let child = global.child(ScopeKind::Typed(token), Some(instance), Properties::new());

        assert!(child.get_dependency(&token.id()).is_some());
        assert!(child.scope_id().starts_with("hostkit::scope::tests::TestScope@"));
    }

    #[test]
    fn nearest_matching_ancestor_skips_global() {
        let global = ScopeContext::global(true, false);
        let token = TypeToken::component::<TestScope>();
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(TestScope);
        let typed = global.child(ScopeKind::Typed(token), Some(instance), Properties::new());
        let anon = typed.child(ScopeKind::None_, None, Properties::new());

        let found = anon.nearest_matching_ancestor(&ScopeKind::Typed(token));
        assert!(found.is_some());
        assert_eq!(found.unwrap().id(), typed.id());

        assert!(global.nearest_matching_ancestor(&ScopeKind::Any).is_none());
    }

    #[test]
    fn scope_record_reentrant_build_is_cyclic() {
        let record = ScopeRecord::new(true);
        let result = record.execute("Cyclic", || {
            record.execute("Cyclic", || {
                Ok((Arc::new(1i32) as Arc<dyn Any + Send + Sync>, Arc::new(
                    ComponentContext::new(
                        ScopeContext::global(true, false),
                        Properties::new(),
                        TypeToken::component::<i32>(),
                    ),
                )))
            })
        });
        assert!(matches!(result, Err(DiError::CyclicDependency { .. })));
    }

    #[test]
    fn scope_record_caches_after_first_build() {
        let record = ScopeRecord::new(true);
        let build_count = std::sync::atomic::AtomicU32::new(0);
        let make = || {
            build_count.fetch_add(1, Ordering::SeqCst);
            Ok((
                Arc::new(42i32) as Arc<dyn Any + Send + Sync>,
                Arc::new(ComponentContext::new(
                    ScopeContext::global(true, false),
                    Properties::new(),
                    TypeToken::component::<i32>(),
                )),
            ))
        };

        let (a, _, existed_a) = record.execute("i32", make).unwrap();
        let (b, _, existed_b) = record.execute("i32", make).unwrap();

        assert!(!existed_a);
        assert!(existed_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(build_count.load(Ordering::SeqCst), 1);
    }
}
