//! Name → constructor tables.
//!
//! Lookups ignore ASCII case and the separators `_`, `-` and space, so `"black_hole"`,
//! `"BlackHole"` and `"black-hole"` all resolve to the same entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::plugin::Plugin;
use crate::plugin::serializer::SerializerAdapter;
use crate::storage::Storage;

/// Builds a storage from its option mapping.
pub type AdapterConstructor =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Storage>> + Send + Sync>;

/// Builds a plugin from its option mapping.
pub type PluginConstructor =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// Builds a serializer from its option mapping.
pub type SerializerConstructor =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Arc<dyn SerializerAdapter>> + Send + Sync>;

pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

struct Entry<C> {
    name: String,
    constructor: C,
}

pub struct Registry<C> {
    entries: BTreeMap<String, Entry<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C: Clone> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `name`, replacing any entry with the same normalized name.
    pub fn register(&mut self, name: impl Into<String>, constructor: C) -> &mut Self {
        let name = name.into();
        self.entries
            .insert(normalize_name(&name), Entry { name, constructor });
        self
    }

    pub fn resolve(&self, name: &str) -> Option<C> {
        self.entries
            .get(&normalize_name(name))
            .map(|entry| entry.constructor.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_name(name))
    }

    /// Registered names as given at registration, sorted by normalized name.
    pub fn names(&self) -> Vec<String> {
        self.entries.values().map(|entry| entry.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|entry| &entry.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_separators() {
        let mut registry: Registry<u8> = Registry::new();
        registry.register("BlackHole", 1);

        assert_eq!(registry.resolve("blackhole"), Some(1));
        assert_eq!(registry.resolve("black_hole"), Some(1));
        assert_eq!(registry.resolve("Black-Hole"), Some(1));
        assert_eq!(registry.resolve("memory"), None);
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut registry: Registry<u8> = Registry::new();
        registry.register("Memory", 1).register("memory", 2);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("MEMORY"), Some(2));
        assert_eq!(registry.names(), vec!["memory"]);
    }
}
