//! Client-facing storage contract and optional capability interfaces.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::Result;
use crate::plugin::PluginAware;

use super::capabilities::Capabilities;

/// Comparison token produced by a read and presented to a later compare-and-swap write.
#[derive(Debug, Clone, PartialEq)]
pub struct CasToken(Value);

impl CasToken {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Uniform synchronous key/value operations.
///
/// Plural writes return the keys that were *not* processed; an empty list is full success.
pub trait Storage: Send {
    /// `None` is a miss.
    fn get_item(&mut self, key: &str) -> Result<Option<Value>>;

    /// Like [`Storage::get_item`], also returning a token for [`Storage::check_and_set_item`].
    fn get_item_with_token(&mut self, key: &str) -> Result<Option<(Value, CasToken)>>;

    /// Hits only, keyed by the requested key.
    fn get_items(&mut self, keys: &[&str]) -> Result<BTreeMap<String, Value>>;

    fn has_item(&mut self, key: &str) -> Result<bool>;

    /// Keys that exist.
    fn has_items(&mut self, keys: &[&str]) -> Result<Vec<String>>;

    fn set_item(&mut self, key: &str, value: Value) -> Result<bool>;

    fn set_items(&mut self, items: BTreeMap<String, Value>) -> Result<Vec<String>>;

    /// Store only if the key does not exist yet.
    fn add_item(&mut self, key: &str, value: Value) -> Result<bool>;

    fn add_items(&mut self, items: BTreeMap<String, Value>) -> Result<Vec<String>>;

    /// Store only if the key already exists.
    fn replace_item(&mut self, key: &str, value: Value) -> Result<bool>;

    fn replace_items(&mut self, items: BTreeMap<String, Value>) -> Result<Vec<String>>;

    /// Store only if the current value still matches `token`.
    fn check_and_set_item(&mut self, token: &CasToken, key: &str, value: Value) -> Result<bool>;

    /// Reset the lifetime of an item.
    fn touch_item(&mut self, key: &str) -> Result<bool>;

    fn touch_items(&mut self, keys: &[&str]) -> Result<Vec<String>>;

    fn remove_item(&mut self, key: &str) -> Result<bool>;

    fn remove_items(&mut self, keys: &[&str]) -> Result<Vec<String>>;

    fn capabilities(&mut self) -> Result<Capabilities>;

    /// Present when plugins can be attached to this storage.
    fn as_plugin_aware(&mut self) -> Option<&mut dyn PluginAware> {
        None
    }

    fn as_flushable(&mut self) -> Option<&mut dyn Flushable> {
        None
    }

    fn as_clear_expired(&mut self) -> Option<&mut dyn ClearExpired> {
        None
    }

    fn as_clear_by_namespace(&mut self) -> Option<&mut dyn ClearByNamespace> {
        None
    }

    fn as_clear_by_prefix(&mut self) -> Option<&mut dyn ClearByPrefix> {
        None
    }

    fn as_taggable(&mut self) -> Option<&mut dyn Taggable> {
        None
    }

    fn as_total_space(&mut self) -> Option<&mut dyn TotalSpace> {
        None
    }

    fn as_available_space(&mut self) -> Option<&mut dyn AvailableSpace> {
        None
    }
}

/// Remove everything, across namespaces.
pub trait Flushable {
    fn flush(&mut self) -> Result<bool>;
}

pub trait ClearExpired {
    fn clear_expired(&mut self) -> Result<bool>;
}

pub trait ClearByNamespace {
    fn clear_by_namespace(&mut self, namespace: &str) -> Result<bool>;
}

/// Remove items of the current namespace whose key starts with a prefix.
pub trait ClearByPrefix {
    fn clear_by_prefix(&mut self, prefix: &str) -> Result<bool>;
}

pub trait Taggable {
    /// Replace the tags of an item. An empty list removes all tags.
    fn set_tags(&mut self, key: &str, tags: &[&str]) -> Result<bool>;

    /// `None` when the item does not exist.
    fn get_tags(&mut self, key: &str) -> Result<Option<BTreeSet<String>>>;

    /// Remove items carrying all of `tags`, or any of them when `disjunction` is set.
    fn clear_by_tags(&mut self, tags: &[&str], disjunction: bool) -> Result<bool>;
}

/// Capacity in bytes.
pub trait TotalSpace {
    fn total_space(&mut self) -> Result<u64>;
}

/// Remaining capacity in bytes.
pub trait AvailableSpace {
    fn available_space(&mut self) -> Result<u64>;
}
