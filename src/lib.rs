//! # hostkit - dependency injection and application hosting for long-running services
//!
//! `hostkit` combines a type-erased dependency injection container with an
//! application host runtime: register component factories with a lifetime
//! (singleton, scoped, or transient), resolve them through a scope tree that
//! mirrors your request/session/worker boundaries, and hand the whole thing
//! to a [`host::Host`] that starts your services and loopers together and
//! brings them down in a fixed order on shutdown.
//!
//! ## Features
//!
//! - **Type-erased registry** - any `Send + Sync + 'static` type can be
//!   registered, keyed by `TypeId` via [`token::TypeToken`]
//! - **Three lifetimes** - singleton, scoped (to a caller-defined
//!   [`scope::ScopeKind`]), and transient
//! - **Scope tree** - hierarchical [`scope::ScopeContext`]s with parent-chain
//!   resolution and cycle detection
//! - **Multi-implementation hubs** - one interface, many keyed
//!   implementations, selected at resolution time from request properties
//!   (see [`multi_impl::Hub`])
//! - **Application hosting** - [`host::Host`] runs [`service::Service`]s and
//!   [`host::Looper`]s on dedicated threads with ordered lifecycle hooks
//! - **Observable** - optional `tracing` integration via [`logging`]
//!
//! ## Quick start
//!
//! ```rust
//! use hostkit::Container;
//!
//! #[derive(Clone)]
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: std::sync::Arc<Database>,
//! }
//!
//! let container = Container::new();
//! container.register_instance(Database { url: "postgres://localhost".into() }).unwrap();
//! container
//!     .register_singleton::<UserService, std::sync::Arc<Database>>(|db| UserService { db })
//!     .unwrap();
//!
//! let db = container.get::<Database>().unwrap();
//! let users = container.get::<UserService>().unwrap();
//! assert_eq!(users.db.url, db.url);
//! ```
//!
//! ## Service lifetimes
//!
//! ```rust
//! use hostkit::Container;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! static COUNTER: AtomicU64 = AtomicU64::new(0);
//!
//! struct RequestId(u64);
//!
//! let container = Container::new();
//!
//! // Transient - new instance every resolve.
//! container
//!     .register_transient::<RequestId, ()>(|_| RequestId(COUNTER.fetch_add(1, Ordering::SeqCst)))
//!     .unwrap();
//!
//! let a = container.get::<RequestId>().unwrap();
//! let b = container.get::<RequestId>().unwrap();
//! assert_ne!(a.0, b.0);
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use hostkit::Container;
//! use hostkit::Properties;
//!
//! struct RequestScope;
//! struct RequestContext { id: String }
//!
//! let root = Container::new();
//! root.register_scoped::<RequestContext, RequestScope, ()>(|_| RequestContext { id: "req-1".into() }).unwrap();
//! root.register_instance(RequestScope).unwrap();
//!
//! let request = root.create_typed_scope::<RequestScope>(Properties::new()).unwrap();
//! let ctx = request.get::<RequestContext>().unwrap();
//! assert_eq!(ctx.id, "req-1");
//!
//! // The root scope has no matching ancestor for a request-scoped type.
//! assert!(root.get::<RequestContext>().is_err());
//! ```

mod container;
pub mod cx;
pub mod engine;
mod error;
pub mod host;
#[cfg(feature = "logging")]
pub mod logging;
#[cfg(feature = "mem-stats")]
pub mod memstats;
pub mod multi_impl;
pub mod properties;
pub mod registry;
pub mod scope;
pub mod scope_factory;
pub mod service;
#[cfg(feature = "config-loader")]
pub mod settings;
pub mod token;

pub use container::Container;
pub use cx::{Cx, Resolvable};
pub use engine::Engine;
pub use error::{DiError, Result};
pub use host::{
    Condition, ExitScope, Flow, Host, HostBuilder, HostContext, HostSettings, Looper, LooperBuilder, Processor,
    ProcessorGroup, ProcessorGroupBuilder, RunningMode, StopEvent, StopEventKind,
};
pub use multi_impl::{Hub, KeyFn};
pub use properties::Properties;
pub use registry::{Lifetime, Options, Registry};
pub use scope::{ComponentContext, ScopeContext, ScopeData, ScopeKind};
pub use scope_factory::{using, Scope};
pub use service::{run_guarded, FnService, Service};
#[cfg(feature = "config-loader")]
pub use settings::load as load_settings;
pub use token::{TypeShape, TypeToken};

#[cfg(feature = "derive")]
pub use hostkit_derive::Inject;

// Re-export tracing macros for convenience when the logging feature is enabled.
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

pub use std::sync::Arc;

/// Convenience imports for application code.
pub mod prelude {
    pub use crate::{Container, DiError, Hub, Properties, Result, Scope, ScopeKind, Service};
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone)]
    struct Database {
        url: String,
    }

    struct UserService {
        #[allow(dead_code)]
        db: Arc<Database>,
    }

    struct RequestScope;

    #[test]
    fn singleton_registration_round_trips() {
        let container = Container::new();
        container.register_instance(Database { url: "test".into() }).unwrap();

        let db = container.get::<Database>().unwrap();
        assert_eq!(db.url, "test");
    }

    #[test]
    fn multiple_resolves_share_the_same_instance() {
        let container = Container::new();
        container.register_instance(Database { url: "test".into() }).unwrap();

        let db1 = container.get::<Database>().unwrap();
        let db2 = container.get::<Database>().unwrap();
        assert!(Arc::ptr_eq(&db1, &db2));
    }

    #[test]
    fn transient_creates_a_new_instance_each_time() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        struct Counter(u32);

        let container = Container::new();
        container
            .register_transient::<Counter, ()>(|_| Counter(COUNTER.fetch_add(1, Ordering::SeqCst)))
            .unwrap();

        let c1 = container.get::<Counter>().unwrap();
        let c2 = container.get::<Counter>().unwrap();
        assert_ne!(c1.0, c2.0);
    }

    #[test]
    fn singleton_depends_on_another_singleton_through_injection() {
        let container = Container::new();
        container.register_instance(Database { url: "test".into() }).unwrap();
        container
            .register_singleton::<UserService, Arc<Database>>(|db| UserService { db })
            .unwrap();

        assert!(container.get::<UserService>().is_ok());
    }

    #[test]
    fn scoped_type_resolves_only_within_a_matching_scope() {
        struct Session(u32);
        let root = Container::new();
        root.register_scoped::<Session, RequestScope, ()>(|_| Session(1)).unwrap();
        root.register_instance(RequestScope).unwrap();

        assert!(root.get::<Session>().is_err());

        let scope = root.create_typed_scope::<RequestScope>(Properties::new()).unwrap();
        assert_eq!(scope.get::<Session>().unwrap().0, 1);
    }
}
