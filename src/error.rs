//! Error types for dependency injection and host orchestration.
//!
//! All six kinds below correspond to a distinct failure surface of the
//! component engine. Every one of them is raised as a panic at its call site
//! (see the crate-level docs) — `DiError` is the payload carried by that
//! panic, and the payload type callers see when they use the `try_*` entry
//! points instead.

use std::any::TypeId;
use thiserror::Error;

/// Errors that can occur during dependency injection and host operations.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    // -- ConfigurationError --------------------------------------------------
    /// Registration violated policy: disallowed type, duplicate key, or a bad
    /// factory signature.
    #[error("configuration error registering {type_name}: {reason}")]
    Configuration {
        type_name: &'static str,
        reason: String,
    },

    /// Attempted to register a type that already has a factory.
    #[error("service already registered: {type_name}")]
    AlreadyRegistered { type_name: &'static str },

    /// The registry is locked and cannot be modified.
    #[error("registry is locked - cannot register new services")]
    Locked,

    // -- ResolutionError ------------------------------------------------------
    /// No factory registered for the requested type.
    #[error("service not found: {type_name}")]
    NotFound {
        type_name: &'static str,
        type_id: TypeId,
    },

    /// A scoped request had no ancestor scope matching the declared scope kind.
    #[error("scope mismatch resolving {type_name}: no ancestor scope of kind {scope_kind}")]
    ScopeMismatch {
        type_name: &'static str,
        scope_kind: String,
    },

    // -- ConstructionError ------------------------------------------------------
    /// The factory itself returned an error.
    #[error("failed to construct {type_name}: {reason}")]
    ConstructionFailed {
        type_name: &'static str,
        reason: String,
    },

    /// The factory panicked while constructing the component.
    #[error("factory for {type_name} panicked: {reason}")]
    ConstructionPanicked {
        type_name: &'static str,
        reason: String,
    },

    // -- CyclicDependency ------------------------------------------------------
    /// Singleton/scoped construction re-entered its own scope record.
    #[error("cyclic dependency detected while resolving: {type_name}")]
    CyclicDependency { type_name: &'static str },

    /// Transient construction exceeded `max_allowed_recurrence`.
    #[error("transient recursion depth exceeded for {type_name} (max {max})")]
    RecursionExceeded { type_name: &'static str, max: u32 },

    // -- PropertyError ------------------------------------------------------
    /// Requested property key does not exist.
    #[error("property {0:?} not exist")]
    MissingProperty(String),

    /// Property exists but is not the requested type.
    #[error("property {key:?} is not a {expected}")]
    PropertyTypeMismatch { key: String, expected: &'static str },

    /// A multi-impl key evaluator returned no key, or a key with no
    /// registered implementation.
    #[error("component implementation not found for key in hub {hub_name}")]
    HubKeyNotFound { hub_name: &'static str },

    // -- ServiceStopError ------------------------------------------------------
    /// A service's `stop` returned an error or panicked during shutdown.
    #[error("service {service_name} failed to stop: {reason}")]
    ServiceStop {
        service_name: String,
        reason: String,
    },

    /// Internal invariant violation — should never surface in practice.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DiError {
    #[inline]
    pub fn not_found<T: 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    #[inline]
    pub fn already_registered<T: 'static>() -> Self {
        Self::AlreadyRegistered {
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn configuration<T: 'static>(reason: impl Into<String>) -> Self {
        Self::Configuration {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn scope_mismatch<T: 'static>(scope_kind: impl Into<String>) -> Self {
        Self::ScopeMismatch {
            type_name: std::any::type_name::<T>(),
            scope_kind: scope_kind.into(),
        }
    }

    #[inline]
    pub fn construction_failed<T: 'static>(reason: impl Into<String>) -> Self {
        Self::ConstructionFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn construction_panicked<T: 'static>(reason: impl Into<String>) -> Self {
        Self::ConstructionPanicked {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn cyclic<T: 'static>() -> Self {
        Self::CyclicDependency {
            type_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn recursion_exceeded<T: 'static>(max: u32) -> Self {
        Self::RecursionExceeded {
            type_name: std::any::type_name::<T>(),
            max,
        }
    }

    #[inline]
    pub fn missing_property(key: impl Into<String>) -> Self {
        Self::MissingProperty(key.into())
    }

    #[inline]
    pub fn property_type_mismatch(key: impl Into<String>, expected: &'static str) -> Self {
        Self::PropertyTypeMismatch {
            key: key.into(),
            expected,
        }
    }

    #[inline]
    pub fn hub_key_not_found<T: 'static>() -> Self {
        Self::HubKeyNotFound {
            hub_name: std::any::type_name::<T>(),
        }
    }

    #[inline]
    pub fn service_stop(service_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceStop {
            service_name: service_name.into(),
            reason: reason.into(),
        }
    }

    /// `true` for the kinds raised by the cycle-detection machinery
    /// specifically (as opposed to plain resolution failures).
    pub fn is_cyclic(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency { .. } | Self::RecursionExceeded { .. }
        )
    }
}

/// Result type alias for DI and host operations.
pub type Result<T> = std::result::Result<T, DiError>;
