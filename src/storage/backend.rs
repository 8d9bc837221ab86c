//! I/O shim implemented by concrete backends.
//!
//! A backend only knows how to move values in and out of its store. Hooks, plugins, key
//! validation and option gating live in [`StorageAdapter`](super::adapter::StorageAdapter). The
//! plural operations and the conditional writes have default implementations built from the
//! single-item primitives; backends with native batch support override them.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;

use super::capabilities::Capabilities;
use super::contract::{
    AvailableSpace, ClearByNamespace, ClearByPrefix, ClearExpired, Flushable, Taggable, TotalSpace,
};
use super::options::AdapterOptions;

pub trait Backend: Send {
    fn capabilities(&self) -> Capabilities;

    /// Called when the owning adapter's options change.
    fn apply_options(&mut self, _options: &AdapterOptions) -> Result<()> {
        Ok(())
    }

    fn get_item(&mut self, key: &str) -> Result<Option<Value>>;

    fn set_item(&mut self, key: &str, value: Value) -> Result<bool>;

    fn remove_item(&mut self, key: &str) -> Result<bool>;

    fn get_items(&mut self, keys: &[String]) -> Result<BTreeMap<String, Value>> {
        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get_item(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn has_item(&mut self, key: &str) -> Result<bool> {
        Ok(self.get_item(key)?.is_some())
    }

    fn has_items(&mut self, keys: &[String]) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for key in keys {
            if self.has_item(key)? {
                found.push(key.clone());
            }
        }
        Ok(found)
    }

    fn set_items(&mut self, items: &BTreeMap<String, Value>) -> Result<Vec<String>> {
        collect_failed(items, |key, value| self.set_item(key, value))
    }

    fn add_item(&mut self, key: &str, value: Value) -> Result<bool> {
        if self.has_item(key)? {
            return Ok(false);
        }
        self.set_item(key, value)
    }

    fn add_items(&mut self, items: &BTreeMap<String, Value>) -> Result<Vec<String>> {
        collect_failed(items, |key, value| self.add_item(key, value))
    }

    fn replace_item(&mut self, key: &str, value: Value) -> Result<bool> {
        if !self.has_item(key)? {
            return Ok(false);
        }
        self.set_item(key, value)
    }

    fn replace_items(&mut self, items: &BTreeMap<String, Value>) -> Result<Vec<String>> {
        collect_failed(items, |key, value| self.replace_item(key, value))
    }

    /// Compares the raw stored value with `token`.
    fn check_and_set_item(&mut self, token: &Value, key: &str, value: Value) -> Result<bool> {
        match self.get_item(key)? {
            Some(current) if current == *token => self.set_item(key, value),
            _ => Ok(false),
        }
    }

    fn touch_item(&mut self, key: &str) -> Result<bool> {
        match self.get_item(key)? {
            Some(current) => self.replace_item(key, current),
            None => Ok(false),
        }
    }

    fn touch_items(&mut self, keys: &[String]) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.touch_item(key)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    fn remove_items(&mut self, keys: &[String]) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if !self.remove_item(key)? {
                failed.push(key.clone());
            }
        }
        Ok(failed)
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

fn collect_failed(
    items: &BTreeMap<String, Value>,
    mut write: impl FnMut(&str, Value) -> Result<bool>,
) -> Result<Vec<String>> {
    let mut failed = Vec::new();
    for (key, value) in items {
        if !write(key, value.clone())? {
            failed.push(key.clone());
        }
    }
    Ok(failed)
}
