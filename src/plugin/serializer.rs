//! Serializer plugin: values are encoded on the way in and decoded on the way out, so the
//! backend only ever sees strings.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::lock::mutex_lock;
use crate::service::registry::{Registry, SerializerConstructor};
use crate::storage::{
    Capabilities, DataType, DataTypeSupport, Event, EventPipeline, Operation, Outcome,
};

use super::{ListenerSet, Plugin, parse_options};

pub const DEFAULT_SERIALIZER: &str = "Json";

/// Codec used by the [`Serializer`] plugin.
pub trait SerializerAdapter: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<String>;

    fn unserialize(&self, encoded: &str) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct JsonSerializer {
    pub pretty: bool,
}

impl SerializerAdapter for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|err| CacheError::serialization_with_source("failed to encode value", err))
    }

    fn unserialize(&self, encoded: &str) -> Result<Value> {
        serde_json::from_str(encoded)
            .map_err(|err| CacheError::serialization_with_source("failed to decode value", err))
    }
}

pub type SerializerRegistry = Registry<SerializerConstructor>;

/// Registry holding the built-in serializers.
pub fn default_serializers() -> SerializerRegistry {
    let mut registry = SerializerRegistry::new();
    let json: SerializerConstructor = Arc::new(|options: &Map<String, Value>| {
        let serializer: JsonSerializer = serde_json::from_value(Value::Object(options.clone()))
            .map_err(|err| {
                CacheError::plugin_configuration(format!("invalid Json serializer options: {err}"))
            })?;
        Ok(Arc::new(serializer) as Arc<dyn SerializerAdapter>)
    });
    registry.register(DEFAULT_SERIALIZER, json);
    registry
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerializerPluginOptions {
    /// Registered serializer name.
    pub serializer: String,
    /// Handed to the serializer's constructor.
    pub serializer_options: Map<String, Value>,
}

impl Default for SerializerPluginOptions {
    fn default() -> Self {
        Self {
            serializer: DEFAULT_SERIALIZER.to_string(),
            serializer_options: Map::new(),
        }
    }
}

pub struct Serializer {
    serializers: Arc<SerializerRegistry>,
    options: SerializerPluginOptions,
    resolved: Mutex<Option<Arc<dyn SerializerAdapter>>>,
    listeners: ListenerSet,
}

impl Serializer {
    pub const NAME: &'static str = "Serializer";

    pub fn new(serializers: Arc<SerializerRegistry>, options: SerializerPluginOptions) -> Self {
        Self {
            serializers,
            options,
            resolved: Mutex::new(None),
            listeners: ListenerSet::new(),
        }
    }

    pub fn from_options(
        serializers: Arc<SerializerRegistry>,
        options: &Map<String, Value>,
    ) -> Result<Self> {
        Ok(Self::new(serializers, parse_options(Self::NAME, options)?))
    }

    /// Use a ready serializer instead of resolving one by name.
    pub fn with_serializer(serializer: Arc<dyn SerializerAdapter>) -> Self {
        Self {
            serializers: Arc::new(SerializerRegistry::new()),
            options: SerializerPluginOptions::default(),
            resolved: Mutex::new(Some(serializer)),
            listeners: ListenerSet::new(),
        }
    }

    pub fn options(&self) -> &SerializerPluginOptions {
        &self.options
    }

    /// The configured serializer, built on first use.
    pub fn serializer(&self) -> Result<Arc<dyn SerializerAdapter>> {
        let mut resolved = mutex_lock(&self.resolved, "plugin::serializer", "resolve");
        if let Some(serializer) = resolved.as_ref() {
            return Ok(Arc::clone(serializer));
        }

        let name = &self.options.serializer;
        let constructor = self.serializers.resolve(name).ok_or_else(|| {
            CacheError::plugin_configuration(format!("serializer \"{name}\" could not be found"))
        })?;
        let serializer = constructor(&self.options.serializer_options)?;
        debug!(serializer = %name, "serializer resolved");
        *resolved = Some(Arc::clone(&serializer));
        Ok(serializer)
    }

    fn on_read_item_post(&self, event: &mut Event<'_>) -> Result<()> {
        let Some(Outcome::Item(Some(stored))) = event.result_mut() else {
            return Ok(());
        };
        let serializer = self.serializer()?;
        *stored = decode(serializer.as_ref(), stored)?;
        Ok(())
    }

    fn on_read_items_post(&self, event: &mut Event<'_>) -> Result<()> {
        let Some(Outcome::Items(items)) = event.result_mut() else {
            return Ok(());
        };
        let serializer = self.serializer()?;
        for stored in items.values_mut() {
            *stored = decode(serializer.as_ref(), stored)?;
        }
        Ok(())
    }

    fn on_write_item_pre(&self, event: &mut Event<'_>) -> Result<()> {
        let serializer = self.serializer()?;
        let params = event.params_mut();
        if let Some(value) = params.value_mut() {
            *value = Value::String(serializer.serialize(value)?);
        }
        // the backend compares the token against what it stored, which is encoded
        if let Some(token) = params.token_mut() {
            *token = Value::String(serializer.serialize(token)?);
        }
        Ok(())
    }

    fn on_write_items_pre(&self, event: &mut Event<'_>) -> Result<()> {
        let serializer = self.serializer()?;
        if let Some(items) = event.params_mut().items_mut() {
            for value in items.values_mut() {
                *value = Value::String(serializer.serialize(value)?);
            }
        }
        Ok(())
    }

    fn on_get_capabilities_post(&self, event: &mut Event<'_>) -> Result<()> {
        if let Some(Outcome::Capabilities(capabilities)) = event.result_mut() {
            *capabilities = serialized_capabilities(capabilities);
        }
        Ok(())
    }
}

/// Every host value survives a round trip through a string, except handles.
fn serialized_capabilities(capabilities: &Capabilities) -> Capabilities {
    capabilities.with_supported_data_types(DataType::ALL.into_iter().map(|data_type| {
        let support = match data_type {
            DataType::Object => DataTypeSupport::ConvertedTo(DataType::Object),
            DataType::Resource => DataTypeSupport::Unsupported,
            _ => DataTypeSupport::Native,
        };
        (data_type, support)
    }))
}

fn decode(serializer: &dyn SerializerAdapter, stored: &Value) -> Result<Value> {
    match stored {
        Value::String(encoded) => serializer.unserialize(encoded),
        other => Err(CacheError::serialization(format!(
            "expected an encoded string, got {}",
            DataType::of(other)
        ))),
    }
}

impl Plugin for Serializer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn attach(self: Arc<Self>, events: &mut EventPipeline, priority: i32) {
        let listeners = &self.listeners;

        let plugin = Arc::clone(&self);
        listeners.on_post(events, Operation::GetItem, priority, move |event| {
            plugin.on_read_item_post(event)
        });
        let plugin = Arc::clone(&self);
        listeners.on_post(events, Operation::GetItems, priority, move |event| {
            plugin.on_read_items_post(event)
        });

        for operation in [
            Operation::SetItem,
            Operation::AddItem,
            Operation::ReplaceItem,
            Operation::CheckAndSetItem,
        ] {
            let plugin = Arc::clone(&self);
            listeners.on_pre(events, operation, priority, move |event| {
                plugin.on_write_item_pre(event)
            });
        }
        for operation in [
            Operation::SetItems,
            Operation::AddItems,
            Operation::ReplaceItems,
        ] {
            let plugin = Arc::clone(&self);
            listeners.on_pre(events, operation, priority, move |event| {
                plugin.on_write_items_pre(event)
            });
        }

        let plugin = Arc::clone(&self);
        listeners.on_post(events, Operation::GetCapabilities, priority, move |event| {
            plugin.on_get_capabilities_post(event)
        });
    }

    fn detach(&self, events: &mut EventPipeline) {
        self.listeners.detach_all(events);
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("options", &self.options)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::plugin::PluginAware;
    use crate::storage::{Backend, MemoryBackend, Storage, StorageAdapter};

    fn adapter_with(plugin: Serializer) -> (StorageAdapter, Arc<dyn Plugin>) {
        let mut adapter = StorageAdapter::with_backend(MemoryBackend::default()).expect("adapter");
        let plugin: Arc<dyn Plugin> = Arc::new(plugin);
        adapter
            .add_plugin(Arc::clone(&plugin), 1)
            .expect("attach serializer");
        (adapter, plugin)
    }

    fn json_plugin() -> Serializer {
        Serializer::new(
            Arc::new(default_serializers()),
            SerializerPluginOptions::default(),
        )
    }

    #[test]
    fn backend_only_sees_encoded_strings() {
        let (mut adapter, _) = adapter_with(json_plugin());
        let value = json!({ "list": [1, 2.5, null], "flag": true });
        adapter.set_item("k", value.clone()).expect("set");

        let raw = adapter.backend_mut().get_item("k").expect("raw get");
        assert_eq!(raw, Some(Value::String(value.to_string())));
        assert_eq!(adapter.get_item("k").expect("get"), Some(value));
    }

    #[test]
    fn plural_reads_and_writes_are_transformed() {
        let (mut adapter, _) = adapter_with(json_plugin());
        let items = BTreeMap::from([
            ("a".to_string(), json!([1, 2])),
            ("b".to_string(), json!("text")),
        ]);
        assert!(adapter.set_items(items.clone()).expect("set items").is_empty());
        assert_eq!(adapter.get_items(&["a", "b", "c"]).expect("get items"), items);
    }

    #[test]
    fn check_and_set_token_is_encoded_like_the_value() {
        let (mut adapter, _) = adapter_with(json_plugin());
        adapter.set_item("k", json!({ "v": 1 })).expect("set");

        let (_, token) = adapter
            .get_item_with_token("k")
            .expect("get")
            .expect("hit");
        assert!(adapter
            .check_and_set_item(&token, "k", json!({ "v": 2 }))
            .expect("cas"));
        assert_eq!(adapter.get_item("k").expect("get"), Some(json!({ "v": 2 })));
    }

    #[test]
    fn capabilities_are_rewritten_the_same_way_every_time() {
        let (mut adapter, _) = adapter_with(json_plugin());
        let first = adapter.capabilities().expect("capabilities");
        let second = adapter.capabilities().expect("capabilities");
        assert_eq!(first, second);

        assert_eq!(
            first.support_for(DataType::Object),
            DataTypeSupport::ConvertedTo(DataType::Object)
        );
        assert_eq!(first.support_for(DataType::Resource), DataTypeSupport::Unsupported);
        assert_eq!(first.support_for(DataType::Array), DataTypeSupport::Native);
        assert_eq!(first.ttl_precision(), 0.05);
    }

    #[test]
    fn unknown_serializer_fails_on_first_use() {
        let plugin = Serializer::new(
            Arc::new(default_serializers()),
            SerializerPluginOptions {
                serializer: "Igbinary".into(),
                serializer_options: Map::new(),
            },
        );
        let (mut adapter, _) = adapter_with(plugin);

        let err = adapter.set_item("k", json!(1)).expect_err("unknown serializer");
        assert!(matches!(err, CacheError::PluginConfiguration { .. }));
        assert!(!adapter.has_item("k").expect("has"));
    }

    #[test]
    fn stored_non_string_is_a_serialization_error() {
        let (mut adapter, _) = adapter_with(json_plugin());
        adapter.backend_mut().set_item("k", json!(42)).expect("raw set");

        let err = adapter.get_item("k").expect_err("not encoded");
        assert!(matches!(err, CacheError::Serialization { .. }));
    }

    #[test]
    fn removing_the_plugin_restores_raw_values() {
        let (mut adapter, plugin) = adapter_with(json_plugin());
        adapter.set_item("k", json!([1])).expect("set");

        assert!(adapter.remove_plugin(&plugin));
        assert!(!adapter.remove_plugin(&plugin));
        assert!(adapter.events().is_empty());
        assert_eq!(adapter.get_item("k").expect("get"), Some(json!("[1]")));
    }

    #[test]
    fn pretty_option_reaches_the_json_serializer() {
        let options = json!({ "serializer": "json", "serializer_options": { "pretty": true } });
        let Value::Object(options) = options else {
            unreachable!()
        };
        let plugin =
            Serializer::from_options(Arc::new(default_serializers()), &options).expect("plugin");
        let encoded = plugin
            .serializer()
            .expect("serializer")
            .serialize(&json!({ "a": 1 }))
            .expect("encode");
        assert!(encoded.contains('\n'));
    }
}
