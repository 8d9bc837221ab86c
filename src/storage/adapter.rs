//! The decorated storage handed to clients.
//!
//! [`StorageAdapter`] owns a backend, its options, an [`EventPipeline`] and the set of attached
//! plugins. Every operation validates its keys, fires `{operation}.pre`, runs the backend unless a
//! pre listener short-circuited, fires `{operation}.post` and returns whatever result the post
//! listeners left on the event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{CacheError, Result};
use crate::plugin::{Plugin, PluginAware, same_instance};

use super::backend::Backend;
use super::capabilities::{Capabilities, MaxKeyLength};
use super::contract::{
    AvailableSpace, CasToken, ClearByNamespace, ClearByPrefix, ClearExpired, Flushable, Storage,
    Taggable, TotalSpace,
};
use super::event::{Event, Operation, Outcome, Params};
use super::options::AdapterOptions;
use super::pipeline::EventPipeline;

pub(crate) const METRIC_ITEM_HIT_TOTAL: &str = "stowage_item_hit_total";
pub(crate) const METRIC_ITEM_MISS_TOTAL: &str = "stowage_item_miss_total";

pub struct StorageAdapter {
    backend: Box<dyn Backend>,
    options: AdapterOptions,
    max_key_length: MaxKeyLength,
    events: EventPipeline,
    plugins: Vec<(Arc<dyn Plugin>, i32)>,
}

impl StorageAdapter {
    pub fn new(mut backend: Box<dyn Backend>, options: AdapterOptions) -> Result<Self> {
        backend.apply_options(&options)?;
        let max_key_length = backend.capabilities().max_key_length();
        Ok(Self {
            backend,
            options,
            max_key_length,
            events: EventPipeline::new(),
            plugins: Vec::new(),
        })
    }

    pub fn with_backend(backend: impl Backend + 'static) -> Result<Self> {
        Self::new(Box::new(backend), AdapterOptions::default())
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: AdapterOptions) -> Result<()> {
        self.backend.apply_options(&options)?;
        self.max_key_length = self.backend.capabilities().max_key_length();
        self.options = options;
        Ok(())
    }

    pub fn events(&self) -> &EventPipeline {
        &self.events
    }

    /// Direct access for listeners that do not belong to a plugin.
    pub fn events_mut(&mut self) -> &mut EventPipeline {
        &mut self.events
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        self.options.validate_key(key)?;
        if !self.max_key_length.allows(key.len()) {
            return Err(CacheError::invalid_argument(format!(
                "The key '{key}' is longer than the maximum of {} characters",
                self.max_key_length.as_raw()
            )));
        }
        Ok(())
    }

    fn validate_keys<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Result<()> {
        keys.into_iter().try_for_each(|key| self.validate_key(key))
    }

    fn run<F>(&mut self, operation: Operation, params: Params, call: F) -> Result<Outcome>
    where
        F: FnOnce(&mut dyn Backend, &Params) -> Result<Outcome>,
    {
        let mut event = Event::new(operation.pre(), params, self.backend.as_mut());
        self.events.trigger(&mut event)?;

        let result = match event.take_short_circuit() {
            Some(result) => {
                trace!(operation = %operation, "backend skipped by pre listener");
                result
            }
            None => {
                let (backend, params) = event.split();
                call(backend, params)?
            }
        };

        let mut event = event.into_post(result);
        self.events.trigger(&mut event)?;
        event.into_result()
    }

    fn unprocessed(items: &BTreeMap<String, Value>) -> Vec<String> {
        items.keys().cloned().collect()
    }
}

fn owned_keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| (*key).to_string()).collect()
}

impl Storage for StorageAdapter {
    fn get_item(&mut self, key: &str) -> Result<Option<Value>> {
        self.validate_key(key)?;
        if !self.options.readable {
            return Ok(None);
        }

        let operation = Operation::GetItem;
        let item = self
            .run(
                operation,
                Params::Key { key: key.to_string() },
                |backend, params| Ok(Outcome::Item(backend.get_item(params.expect_key(operation)?)?)),
            )?
            .into_item(operation)?;

        if item.is_some() {
            counter!(METRIC_ITEM_HIT_TOTAL).increment(1);
        } else {
            counter!(METRIC_ITEM_MISS_TOTAL).increment(1);
        }
        Ok(item)
    }

    fn get_item_with_token(&mut self, key: &str) -> Result<Option<(Value, CasToken)>> {
        Ok(self.get_item(key)?.map(|value| {
            let token = CasToken::new(value.clone());
            (value, token)
        }))
    }

    fn get_items(&mut self, keys: &[&str]) -> Result<BTreeMap<String, Value>> {
        self.validate_keys(keys.iter().copied())?;
        if !self.options.readable {
            return Ok(BTreeMap::new());
        }

        let operation = Operation::GetItems;
        self.run(
            operation,
            Params::Keys { keys: owned_keys(keys) },
            |backend, params| Ok(Outcome::Items(backend.get_items(params.expect_keys(operation)?)?)),
        )?
        .into_items(operation)
    }

    fn has_item(&mut self, key: &str) -> Result<bool> {
        self.validate_key(key)?;
        if !self.options.readable {
            return Ok(false);
        }

        let operation = Operation::HasItem;
        self.run(
            operation,
            Params::Key { key: key.to_string() },
            |backend, params| Ok(Outcome::Flag(backend.has_item(params.expect_key(operation)?)?)),
        )?
        .into_flag(operation)
    }

    fn has_items(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        self.validate_keys(keys.iter().copied())?;
        if !self.options.readable {
            return Ok(Vec::new());
        }

        let operation = Operation::HasItems;
        self.run(
            operation,
            Params::Keys { keys: owned_keys(keys) },
            |backend, params| Ok(Outcome::Keys(backend.has_items(params.expect_keys(operation)?)?)),
        )?
        .into_keys(operation)
    }

    fn set_item(&mut self, key: &str, value: Value) -> Result<bool> {
        self.write_item(Operation::SetItem, key, value, |backend, key, value| {
            backend.set_item(key, value)
        })
    }

    fn set_items(&mut self, items: BTreeMap<String, Value>) -> Result<Vec<String>> {
        self.write_items(Operation::SetItems, items, |backend, items| {
            backend.set_items(items)
        })
    }

    fn add_item(&mut self, key: &str, value: Value) -> Result<bool> {
        self.write_item(Operation::AddItem, key, value, |backend, key, value| {
            backend.add_item(key, value)
        })
    }

    fn add_items(&mut self, items: BTreeMap<String, Value>) -> Result<Vec<String>> {
        self.write_items(Operation::AddItems, items, |backend, items| {
            backend.add_items(items)
        })
    }

    fn replace_item(&mut self, key: &str, value: Value) -> Result<bool> {
        self.write_item(Operation::ReplaceItem, key, value, |backend, key, value| {
            backend.replace_item(key, value)
        })
    }

    fn replace_items(&mut self, items: BTreeMap<String, Value>) -> Result<Vec<String>> {
        self.write_items(Operation::ReplaceItems, items, |backend, items| {
            backend.replace_items(items)
        })
    }

    fn check_and_set_item(&mut self, token: &CasToken, key: &str, value: Value) -> Result<bool> {
        self.validate_key(key)?;
        if !self.options.writable {
            return Ok(false);
        }

        let operation = Operation::CheckAndSetItem;
        let params = Params::CheckAndSet {
            token: token.as_value().clone(),
            key: key.to_string(),
            value,
        };
        self.run(operation, params, |backend, params| {
            let (token, key, value) = params.expect_check_and_set(operation)?;
            Ok(Outcome::Flag(
                backend.check_and_set_item(token, key, value.clone())?,
            ))
        })?
        .into_flag(operation)
    }

    fn touch_item(&mut self, key: &str) -> Result<bool> {
        self.validate_key(key)?;
        if !self.options.writable {
            return Ok(false);
        }

        let operation = Operation::TouchItem;
        self.run(
            operation,
            Params::Key { key: key.to_string() },
            |backend, params| Ok(Outcome::Flag(backend.touch_item(params.expect_key(operation)?)?)),
        )?
        .into_flag(operation)
    }

    fn touch_items(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        self.validate_keys(keys.iter().copied())?;
        if !self.options.writable {
            return Ok(owned_keys(keys));
        }

        let operation = Operation::TouchItems;
        self.run(
            operation,
            Params::Keys { keys: owned_keys(keys) },
            |backend, params| {
                Ok(Outcome::Keys(backend.touch_items(params.expect_keys(operation)?)?))
            },
        )?
        .into_keys(operation)
    }

    fn remove_item(&mut self, key: &str) -> Result<bool> {
        self.validate_key(key)?;
        if !self.options.writable {
            return Ok(false);
        }

        let operation = Operation::RemoveItem;
        self.run(
            operation,
            Params::Key { key: key.to_string() },
            |backend, params| Ok(Outcome::Flag(backend.remove_item(params.expect_key(operation)?)?)),
        )?
        .into_flag(operation)
    }

    fn remove_items(&mut self, keys: &[&str]) -> Result<Vec<String>> {
        self.validate_keys(keys.iter().copied())?;
        if !self.options.writable {
            return Ok(owned_keys(keys));
        }

        let operation = Operation::RemoveItems;
        self.run(
            operation,
            Params::Keys { keys: owned_keys(keys) },
            |backend, params| {
                Ok(Outcome::Keys(backend.remove_items(params.expect_keys(operation)?)?))
            },
        )?
        .into_keys(operation)
    }

    fn capabilities(&mut self) -> Result<Capabilities> {
        let operation = Operation::GetCapabilities;
        self.run(operation, Params::None, |backend, _| {
            Ok(Outcome::Capabilities(backend.capabilities()))
        })?
        .into_capabilities(operation)
    }

    fn as_plugin_aware(&mut self) -> Option<&mut dyn PluginAware> {
        Some(self)
    }

    fn as_flushable(&mut self) -> Option<&mut dyn Flushable> {
        self.backend.as_flushable()
    }

    fn as_clear_expired(&mut self) -> Option<&mut dyn ClearExpired> {
        self.backend.as_clear_expired()
    }

    fn as_clear_by_namespace(&mut self) -> Option<&mut dyn ClearByNamespace> {
        self.backend.as_clear_by_namespace()
    }

    fn as_clear_by_prefix(&mut self) -> Option<&mut dyn ClearByPrefix> {
        self.backend.as_clear_by_prefix()
    }

    fn as_taggable(&mut self) -> Option<&mut dyn Taggable> {
        self.backend.as_taggable()
    }

    fn as_total_space(&mut self) -> Option<&mut dyn TotalSpace> {
        self.backend.as_total_space()
    }

    fn as_available_space(&mut self) -> Option<&mut dyn AvailableSpace> {
        self.backend.as_available_space()
    }
}

impl StorageAdapter {
    fn write_item<F>(&mut self, operation: Operation, key: &str, value: Value, write: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Backend, &str, Value) -> Result<bool>,
    {
        self.validate_key(key)?;
        if !self.options.writable {
            return Ok(false);
        }

        let params = Params::Item {
            key: key.to_string(),
            value,
        };
        self.run(operation, params, |backend, params| {
            let (key, value) = params.expect_item(operation)?;
            Ok(Outcome::Flag(write(backend, key, value.clone())?))
        })?
        .into_flag(operation)
    }

    fn write_items<F>(
        &mut self,
        operation: Operation,
        items: BTreeMap<String, Value>,
        write: F,
    ) -> Result<Vec<String>>
    where
        F: FnOnce(&mut dyn Backend, &BTreeMap<String, Value>) -> Result<Vec<String>>,
    {
        self.validate_keys(items.keys().map(String::as_str))?;
        if !self.options.writable {
            return Ok(Self::unprocessed(&items));
        }

        self.run(operation, Params::Items { items }, |backend, params| {
            Ok(Outcome::Keys(write(backend, params.expect_items(operation)?)?))
        })?
        .into_keys(operation)
    }
}

impl PluginAware for StorageAdapter {
    fn add_plugin(&mut self, plugin: Arc<dyn Plugin>, priority: i32) -> Result<()> {
        if self.has_plugin(&plugin) {
            return Err(CacheError::plugin_already_registered(plugin.name()));
        }
        Arc::clone(&plugin).attach(&mut self.events, priority);
        debug!(plugin = plugin.name(), priority, "plugin attached");
        self.plugins.push((plugin, priority));
        Ok(())
    }

    fn remove_plugin(&mut self, plugin: &Arc<dyn Plugin>) -> bool {
        let Some(position) = self
            .plugins
            .iter()
            .position(|(attached, _)| same_instance(attached, plugin))
        else {
            return false;
        };
        let (removed, _) = self.plugins.remove(position);
        removed.detach(&mut self.events);
        debug!(plugin = removed.name(), "plugin detached");
        true
    }

    fn has_plugin(&self, plugin: &Arc<dyn Plugin>) -> bool {
        self.plugins
            .iter()
            .any(|(attached, _)| same_instance(attached, plugin))
    }

    fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .map(|(plugin, _)| Arc::clone(plugin))
            .collect()
    }
}

impl fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plugins: Vec<(&str, i32)> = self
            .plugins
            .iter()
            .map(|(plugin, priority)| (plugin.name(), *priority))
            .collect();
        f.debug_struct("StorageAdapter")
            .field("options", &self.options)
            .field("max_key_length", &self.max_key_length)
            .field("events", &self.events)
            .field("plugins", &plugins)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::storage::black_hole::BlackHoleBackend;
    use crate::storage::memory::MemoryBackend;

    fn memory() -> StorageAdapter {
        StorageAdapter::with_backend(MemoryBackend::default()).expect("adapter")
    }

    fn items(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn plural_operations_report_unprocessed_keys() {
        let mut storage = memory();
        storage.set_item("a", json!(1)).expect("set");

        let failed = storage
            .add_items(items(&[("a", json!(10)), ("b", json!(2))]))
            .expect("add items");
        assert_eq!(failed, vec!["a"]);

        let failed = storage
            .replace_items(items(&[("b", json!(20)), ("c", json!(3))]))
            .expect("replace items");
        assert_eq!(failed, vec!["c"]);

        assert_eq!(
            storage.get_items(&["a", "b", "c"]).expect("get items"),
            items(&[("a", json!(1)), ("b", json!(20))])
        );
        assert_eq!(storage.has_items(&["a", "c"]).expect("has items"), vec!["a"]);
        assert_eq!(storage.remove_items(&["a", "c"]).expect("remove"), vec!["c"]);
        assert_eq!(storage.touch_items(&["b", "a"]).expect("touch"), vec!["a"]);
    }

    #[test]
    fn check_and_set_uses_the_token_from_the_last_read() {
        let mut storage = memory();
        storage.set_item("k", json!("v1")).expect("set");

        let (_, token) = storage
            .get_item_with_token("k")
            .expect("get")
            .expect("hit");
        storage.set_item("k", json!("v2")).expect("concurrent write");
        assert!(!storage
            .check_and_set_item(&token, "k", json!("mine"))
            .expect("stale token"));

        let (_, token) = storage
            .get_item_with_token("k")
            .expect("get")
            .expect("hit");
        assert!(storage
            .check_and_set_item(&token, "k", json!("mine"))
            .expect("fresh token"));
        assert_eq!(storage.get_item("k").expect("get"), Some(json!("mine")));
    }

    #[test]
    fn invalid_keys_fail_before_any_hook() {
        let mut storage = memory();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        storage
            .events_mut()
            .attach(Operation::SetItem.pre(), 0, move |_event: &mut Event<'_>| {
                *counter.lock().expect("counter") += 1;
                Ok(())
            });

        let err = storage.set_item("", json!(1)).expect_err("empty key");
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
        assert_eq!(*fired.lock().expect("counter"), 0);
    }

    #[test]
    fn unreadable_and_unwritable_adapters_skip_the_backend() {
        let mut storage = memory();
        storage.set_item("k", json!(1)).expect("set");

        let mut options = storage.options().clone();
        options.readable = false;
        options.writable = false;
        storage.set_options(options).expect("options");

        assert_eq!(storage.get_item("k").expect("get"), None);
        assert!(!storage.has_item("k").expect("has"));
        assert!(!storage.set_item("k", json!(2)).expect("set"));
        assert_eq!(
            storage.set_items(items(&[("x", json!(1))])).expect("set items"),
            vec!["x"]
        );
        assert!(!storage.remove_item("k").expect("remove"));
    }

    #[test]
    fn pre_listener_can_short_circuit_the_backend() {
        let mut storage = StorageAdapter::with_backend(BlackHoleBackend).expect("adapter");
        storage
            .events_mut()
            .attach(Operation::GetItem.pre(), 0, |event: &mut Event<'_>| {
                event.set_result(Outcome::Item(Some(json!("from listener"))));
                event.stop_propagation();
                Ok(())
            });
        let seen_post = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&seen_post);
        storage
            .events_mut()
            .attach(Operation::GetItem.post(), 0, move |_event: &mut Event<'_>| {
                *flag.lock().expect("flag") = true;
                Ok(())
            });

        assert_eq!(
            storage.get_item("k").expect("get"),
            Some(json!("from listener"))
        );
        assert!(*seen_post.lock().expect("flag"));
    }

    #[test]
    fn post_listener_rewrites_the_result() {
        let mut storage = memory();
        storage.set_item("k", json!(1)).expect("set");
        storage
            .events_mut()
            .attach(Operation::GetItem.post(), 0, |event: &mut Event<'_>| {
                if let Some(Outcome::Item(Some(value))) = event.result_mut() {
                    *value = json!("rewritten");
                }
                Ok(())
            });
        assert_eq!(storage.get_item("k").expect("get"), Some(json!("rewritten")));
    }

    #[test]
    fn listener_with_wrong_result_shape_is_a_runtime_error() {
        let mut storage = memory();
        storage
            .events_mut()
            .attach(Operation::HasItem.post(), 0, |event: &mut Event<'_>| {
                event.set_result(Outcome::Keys(Vec::new()));
                Ok(())
            });
        let err = storage.has_item("k").expect_err("shape mismatch");
        assert!(matches!(err, CacheError::Runtime { .. }));
    }

    #[test]
    fn optional_interfaces_come_from_the_backend() {
        let mut memory = memory();
        assert!(memory.as_flushable().is_some());
        assert!(memory.as_taggable().is_some());
        assert!(memory.as_plugin_aware().is_some());

        let mut black_hole = StorageAdapter::with_backend(BlackHoleBackend).expect("adapter");
        assert!(black_hole.as_flushable().is_none());
        assert!(black_hole.as_plugin_aware().is_some());
    }

    struct ShortKeys(MemoryBackend);

    impl Backend for ShortKeys {
        fn capabilities(&self) -> Capabilities {
            let limit = std::num::NonZeroUsize::new(4).expect("non-zero");
            self.0
                .capabilities()
                .to_builder()
                .max_key_length(MaxKeyLength::Bounded(limit))
                .build()
                .expect("capabilities")
        }

        fn get_item(&mut self, key: &str) -> Result<Option<Value>> {
            self.0.get_item(key)
        }

        fn set_item(&mut self, key: &str, value: Value) -> Result<bool> {
            self.0.set_item(key, value)
        }

        fn remove_item(&mut self, key: &str) -> Result<bool> {
            self.0.remove_item(key)
        }
    }

    #[test]
    fn keys_longer_than_the_backend_limit_are_rejected() {
        let mut storage =
            StorageAdapter::with_backend(ShortKeys(MemoryBackend::default())).expect("adapter");

        assert!(storage.set_item("abcd", json!(1)).expect("set"));
        let err = storage.set_item("abcde", json!(1)).expect_err("too long");
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid argument: The key 'abcde' is longer than the maximum of 4 characters"
        );

        assert!(storage.get_item("abcde").is_err());
        assert!(storage.get_items(&["abcd", "abcde"]).is_err());
        assert_eq!(storage.get_item("abcd").expect("get"), Some(json!(1)));
    }
}
