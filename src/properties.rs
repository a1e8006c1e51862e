//! Property bags carried alongside a component request.
//!
//! Mirrors `DefaultProperties` from the source host package, with one
//! deliberate divergence called out in the design notes: `get` on a missing
//! key is an error here, where the source silently returned the zero value.

use crate::error::{DiError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An ordered-insertion string-keyed map of arbitrary values.
///
/// Every context holds its own copy; mutating a `Properties` never reaches
/// back into the context it was copied from.
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    rendered: String,
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            rendered: self.rendered.clone(),
        }
    }
}

#[derive(Default, Clone)]
pub struct Properties {
    values: HashMap<String, Entry>,
}

impl Properties {
    /// An empty property map.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs, in the style of the source's `Props(pairs...)`.
    pub fn from_pairs<I, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, T)>,
        T: Any + Send + Sync + fmt::Display,
    {
        let mut props = Self::new();
        for (key, value) in pairs {
            props.set(key, value);
        }
        props
    }

    /// Set a value, overwriting any existing entry for `key`. The value's
    /// `Display` rendering is captured at insertion time for deterministic
    /// stringification later.
    pub fn set<T: Any + Send + Sync + fmt::Display>(&mut self, key: impl Into<String>, value: T) {
        let rendered = value.to_string();
        self.values.insert(
            key.into(),
            Entry {
                value: Arc::new(value),
                rendered,
            },
        );
    }

    /// Whether `key` is present, distinct from whether its value is meaningful.
    #[inline]
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fetch a value by key, downcast to `T`. Missing and type-mismatched keys
    /// both raise a `PropertyError` rather than returning `None`/a default —
    /// the source's silent-nil behavior is explicitly not carried over here.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Result<T> {
        let entry = self
            .values
            .get(key)
            .ok_or_else(|| DiError::missing_property(key))?;
        entry
            .value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| DiError::property_type_mismatch(key, std::any::type_name::<T>()))
    }

    /// Fetch a value without requiring `Clone`, returning a clone of the `Arc`.
    pub fn get_arc<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        let entry = self
            .values
            .get(key)
            .ok_or_else(|| DiError::missing_property(key))?;
        Arc::clone(&entry.value)
            .downcast::<T>()
            .map_err(|_| DiError::property_type_mismatch(key, std::any::type_name::<T>()))
    }

    /// All keys currently set, in no particular order (use `to_string` for a
    /// deterministic rendering).
    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    /// Copy every entry from `other` into `self`. Last write wins on conflicts.
    pub fn update(&mut self, other: &Properties) {
        for (key, entry) in &other.values {
            self.values.insert(key.clone(), entry.clone());
        }
    }

    /// An independent copy of this map.
    #[inline]
    pub fn copy(&self) -> Properties {
        self.clone()
    }

    /// Merge `overlay` into a copy of `self`, overlay entries taking priority.
    /// Used when request `props` override a scope's inherited properties.
    pub fn merged_with(&self, overlay: &Properties) -> Properties {
        let mut merged = self.clone();
        merged.update(overlay);
        merged
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Display for Properties {
    /// Deterministic serialization: `{k=v,k=v,...}` with keys sorted so that
    /// two maps built in different insertion order render identically.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        write!(f, "{{")?;
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", key, self.values[key.as_str()].rendered)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Properties")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_is_an_error() {
        let props = Properties::new();
        assert!(props.get::<i32>("missing").is_err());
    }

    #[test]
    fn has_distinguishes_missing_from_present() {
        let mut props = Properties::new();
        assert!(!props.has("age"));
        props.set("age", 30i32);
        assert!(props.has("age"));
    }

    #[test]
    fn stringify_is_deterministic_regardless_of_insertion_order() {
        let mut a = Properties::new();
        a.set("age", 30i32);
        a.set("name", "x".to_string());

        let mut b = Properties::new();
        b.set("name", "x".to_string());
        b.set("age", 30i32);

        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "{age=30,name=x}");
    }

    #[test]
    fn update_copies_entries_last_write_wins() {
        let mut base = Properties::new();
        base.set("type", "url".to_string());

        let mut overlay = Properties::new();
        overlay.set("type", "blob".to_string());
        overlay.set("retries", 3i32);

        base.update(&overlay);
        assert_eq!(base.get::<String>("type").unwrap(), "blob");
        assert_eq!(base.get::<i32>("retries").unwrap(), 3);
    }

    #[test]
    fn copy_is_independent_of_source() {
        let mut original = Properties::new();
        original.set("count", 1i32);

        let mut copy = original.copy();
        copy.set("count", 2i32);

        assert_eq!(original.get::<i32>("count").unwrap(), 1);
        assert_eq!(copy.get::<i32>("count").unwrap(), 2);
    }

    #[test]
    fn merged_with_overlay_takes_priority() {
        let mut base = Properties::new();
        base.set("type", "url".to_string());
        let mut overlay = Properties::new();
        overlay.set("type", "blob".to_string());

        let merged = base.merged_with(&overlay);
        assert_eq!(merged.get::<String>("type").unwrap(), "blob");
    }
}
