//! Type definitions for self-describing streams.
//!
//! A stream declaration can embed the textual definition of its sample type
//! so that a reader can decode the file without any other source of type
//! information. This module provides the lookup interface used by
//! [`StreamLogger::with_registry`](crate::StreamLogger::with_registry) and two
//! implementations of it.
//!
//! # Thread Safety
//!
//! The process-wide registry is shared by every thread and guarded by a
//! mutex. A [`MemoryRegistry`] is a plain value owned by its creator.

use std::collections::HashMap;

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// Source of serialized type definitions.
pub trait TypeRegistry {
    /// Returns the serialized definition of `type_name`, if known.
    fn type_definition(&self, type_name: &str) -> Option<String>;
}

/// A registry owning its definitions.
///
/// # Examples
///
/// ```
/// # use stream_logfile::{MemoryRegistry, TypeRegistry};
/// let mut registry = MemoryRegistry::new();
/// registry.insert("Vector3d", "struct Vector3d { double x, y, z; }");
///
/// assert!(registry.type_definition("Vector3d").is_some());
/// assert_eq!(registry.type_definition("Quaternion"), None);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistry {
    definitions: HashMap<String, String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the definition of `type_name`.
    pub fn insert(&mut self, type_name: impl Into<String>, definition: impl Into<String>) {
        self.definitions.insert(type_name.into(), definition.into());
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl TypeRegistry for MemoryRegistry {
    fn type_definition(&self, type_name: &str) -> Option<String> {
        self.definitions.get(type_name).cloned()
    }
}

lazy_static! {
    /// Process-wide map from type names to their serialized definitions.
    static ref GLOBAL_REGISTRY: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());
}

/// Registers `definition` for `type_name` in the process-wide registry.
///
/// Returns the definition previously registered under that name, if any.
///
/// # Examples
///
/// ```
/// # use stream_logfile::type_registry::{get_type_definition, register_type_definition};
/// register_type_definition("Pose", "struct Pose { Vector3d position; }");
/// assert_eq!(
///     get_type_definition("Pose").as_deref(),
///     Some("struct Pose { Vector3d position; }")
/// );
/// ```
pub fn register_type_definition(
    type_name: impl Into<String>,
    definition: impl Into<String>,
) -> Option<String> {
    GLOBAL_REGISTRY
        .lock()
        .insert(type_name.into(), definition.into())
}

/// Looks up `type_name` in the process-wide registry.
pub fn get_type_definition(type_name: &str) -> Option<String> {
    GLOBAL_REGISTRY.lock().get(type_name).cloned()
}

/// Handle on the process-wide registry, usable wherever a [`TypeRegistry`]
/// is expected.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalRegistry;

impl TypeRegistry for GlobalRegistry {
    fn type_definition(&self, type_name: &str) -> Option<String> {
        get_type_definition(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_registry_replaces() {
        let mut registry = MemoryRegistry::new();
        assert!(registry.is_empty());
        registry.insert("T", "v1");
        registry.insert("T", "v2");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.type_definition("T").as_deref(), Some("v2"));
    }

    #[test]
    fn test_global_registry_handle() {
        register_type_definition("registry_tests::Wrench", "struct Wrench {}");
        assert_eq!(
            GlobalRegistry.type_definition("registry_tests::Wrench").as_deref(),
            Some("struct Wrench {}")
        );
        assert_eq!(GlobalRegistry.type_definition("registry_tests::Missing"), None);
    }
}
