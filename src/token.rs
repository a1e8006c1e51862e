//! Compile-time type identity.
//!
//! The original component engine keys its registry and drives injection through
//! runtime reflection over a type descriptor. There is no such reflection here:
//! a [`TypeToken`] is `TypeId::of::<T>()` plus the type's name for diagnostics,
//! and it is always produced at a monomorphized call site rather than inspected
//! at runtime.

use std::any::TypeId;
use std::fmt;

/// The registration shape a type was declared under.
///
/// The source language distinguishes interface/struct/pointer/function values at
/// runtime; Rust has no such distinction for a registered value, so the shape is
/// supplied by the call site (`register_singleton` implies `Component`,
/// `add_configuration` implies `Configuration`) and only used for policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeShape {
    /// A component registered under a capability/trait-like interface type.
    Component,
    /// A plain configuration struct, resolved by reference rather than by value.
    Configuration,
}

/// Opaque compile-time identity for a registered type.
///
/// Equality and hashing are by [`TypeId`] only; the name is carried purely for
/// error messages and diagnostics and must never be used as an identity check.
#[derive(Debug, Clone, Copy)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
    shape: TypeShape,
}

impl TypeToken {
    /// Build the token for `T`, tagged with the shape it was registered under.
    #[inline]
    pub fn of<T: 'static>(shape: TypeShape) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            shape,
        }
    }

    /// Build a component-shaped token for `T`. The common case.
    #[inline]
    pub fn component<T: 'static>() -> Self {
        Self::of::<T>(TypeShape::Component)
    }

    /// Build a configuration-shaped token for `T`, as registered through
    /// `add_configuration`/`register_configuration` rather than a `register_*`
    /// component call.
    #[inline]
    pub fn configuration<T: 'static>() -> Self {
        Self::of::<T>(TypeShape::Configuration)
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn shape(&self) -> TypeShape {
        self.shape
    }
}

impl PartialEq for TypeToken {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for TypeToken {}

impl std::hash::Hash for TypeToken {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn identity_by_type_id_not_name() {
        let a1 = TypeToken::component::<A>();
        let a2 = TypeToken::component::<A>();
        let b = TypeToken::component::<B>();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.name(), std::any::type_name::<A>());
    }
}
