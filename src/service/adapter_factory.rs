//! Validates storage configuration and assembles an adapter with its plugin stack.
//!
//! Accepted shape:
//!
//! ```json
//! {
//!   "adapter": "Memory",
//!   "options": { "ttl": 120, "namespace": "app" },
//!   "plugins": [
//!     { "name": "Serializer", "priority": 10 },
//!     { "name": "ClearExpiredByFactor" }
//!   ]
//! }
//! ```

use std::sync::Arc;

use metrics::counter;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::storage::{AdapterOptions, BlackHoleBackend, MemoryBackend, Storage, StorageAdapter};

use super::plugin_factory::PluginFactory;
use super::registry::{AdapterConstructor, Registry};

/// Priority for plugins whose configuration does not name one.
pub const DEFAULT_PLUGIN_PRIORITY: i32 = 1;

pub(crate) const METRIC_PLUGIN_ATTACHED_TOTAL: &str = "stowage_plugin_attached_total";

pub type AdapterRegistry = Registry<AdapterConstructor>;

/// One entry of the `plugins` list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PluginConfiguration {
    pub name: String,
    pub options: Map<String, Value>,
    pub priority: Option<i32>,
}

impl PluginConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Registry holding the built-in `Memory` and `BlackHole` adapters.
pub fn default_adapters() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    let memory: AdapterConstructor = Arc::new(|options: &Map<String, Value>| {
        let options = AdapterOptions::from_map(options)?;
        let adapter = StorageAdapter::new(Box::new(MemoryBackend::default()), options)?;
        Ok(Box::new(adapter) as Box<dyn Storage>)
    });
    let black_hole: AdapterConstructor = Arc::new(|options: &Map<String, Value>| {
        let options = AdapterOptions::from_map(options)?;
        let adapter = StorageAdapter::new(Box::new(BlackHoleBackend), options)?;
        Ok(Box::new(adapter) as Box<dyn Storage>)
    });
    registry
        .register("Memory", memory)
        .register("BlackHole", black_hole);
    registry
}

pub struct StorageAdapterFactory {
    adapters: AdapterRegistry,
    plugins: PluginFactory,
}

impl Default for StorageAdapterFactory {
    fn default() -> Self {
        Self::new(default_adapters(), PluginFactory::default())
    }
}

impl StorageAdapterFactory {
    pub fn new(adapters: AdapterRegistry, plugins: PluginFactory) -> Self {
        Self { adapters, plugins }
    }

    pub fn register_adapter(
        &mut self,
        name: impl Into<String>,
        constructor: AdapterConstructor,
    ) -> &mut Self {
        self.adapters.register(name, constructor);
        self
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn plugins(&self) -> &PluginFactory {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginFactory {
        &mut self.plugins
    }

    /// Structural validation only; nothing is built.
    pub fn assert_valid_configuration_structure(&self, configuration: &Value) -> Result<()> {
        let configuration = match configuration {
            Value::Object(map) if !map.is_empty() => map,
            _ => {
                return Err(CacheError::invalid_configuration(
                    "Configuration must be a non-empty array",
                ));
            }
        };

        let Some(adapter) = configuration.get("adapter") else {
            return Err(CacheError::invalid_configuration(
                "Configuration must contain a \"adapter\" key",
            ));
        };
        let adapter = match adapter.as_str() {
            Some(adapter) if !adapter.is_empty() => adapter,
            _ => {
                return Err(CacheError::invalid_configuration(
                    "Storage \"adapter\" has to be a non-empty string",
                ));
            }
        };

        if !matches!(
            configuration.get("options"),
            None | Some(Value::Null) | Some(Value::Object(_))
        ) {
            return Err(CacheError::invalid_configuration(
                "Storage \"options\" must be an array with string keys",
            ));
        }

        let plugins = match configuration.get("plugins") {
            None | Some(Value::Null) => return Ok(()),
            Some(Value::Array(plugins)) => plugins,
            Some(_) => {
                return Err(CacheError::invalid_configuration(
                    "Storage \"plugins\" must be a list of plugin configurations",
                ));
            }
        };

        if !plugins.iter().all(Value::is_object) {
            return Err(CacheError::invalid_configuration(
                "All plugin configurations are expected to be an array",
            ));
        }

        for plugin in plugins {
            self.plugins
                .assert_valid_configuration_structure(plugin)
                .map_err(|err| invalid_plugin(adapter, &err.to_string()))?;

            match plugin.get("priority") {
                None | Some(Value::Null) => {}
                Some(priority) if priority.is_i64() || priority.is_u64() => {
                    if parse_priority(priority).is_none() {
                        return Err(invalid_plugin(adapter, "Plugin priority is out of range"));
                    }
                }
                Some(_) => {
                    return Err(invalid_plugin(adapter, "Plugin priority has to be integer"));
                }
            }
        }
        Ok(())
    }

    /// Build the named adapter and attach `plugins` in list order.
    pub fn create(
        &self,
        name: &str,
        options: &Map<String, Value>,
        plugins: &[PluginConfiguration],
    ) -> Result<Box<dyn Storage>> {
        let constructor = self
            .adapters
            .resolve(name)
            .ok_or_else(|| CacheError::backend_not_found(name))?;
        let mut storage = constructor(options)?;
        debug!(adapter = name, plugins = plugins.len(), "storage adapter built");

        if plugins.is_empty() {
            return Ok(storage);
        }

        let Some(plugin_aware) = storage.as_plugin_aware() else {
            return Err(CacheError::runtime(format!(
                "storage adapter \"{name}\" is not plugin-aware and therefore can't handle plugins"
            )));
        };

        for configuration in plugins {
            let plugin = self
                .plugins
                .create(&configuration.name, &configuration.options)?;
            if plugin_aware.has_plugin(&plugin) {
                warn!(
                    adapter = name,
                    plugin = plugin.name(),
                    "plugin instance already attached, skipping"
                );
                continue;
            }

            let priority = configuration.priority.unwrap_or(DEFAULT_PLUGIN_PRIORITY);
            plugin_aware.add_plugin(Arc::clone(&plugin), priority)?;
            counter!(METRIC_PLUGIN_ATTACHED_TOTAL).increment(1);
            debug!(
                adapter = name,
                plugin = plugin.name(),
                priority,
                "plugin attached to storage adapter"
            );
        }

        Ok(storage)
    }

    /// Validate `configuration`, then build it with [`StorageAdapterFactory::create`].
    pub fn create_from_array_configuration(&self, configuration: &Value) -> Result<Box<dyn Storage>> {
        self.assert_valid_configuration_structure(configuration)?;

        let adapter = configuration
            .get("adapter")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let options = object_or_empty(configuration.get("options"));
        let plugins: Vec<PluginConfiguration> = configuration
            .get("plugins")
            .and_then(Value::as_array)
            .map(|plugins| {
                plugins
                    .iter()
                    .map(|plugin| PluginConfiguration {
                        name: plugin
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        options: object_or_empty(plugin.get("options")),
                        priority: plugin.get("priority").and_then(parse_priority),
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.create(adapter, &options, &plugins)
    }
}

impl std::fmt::Debug for StorageAdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapterFactory")
            .field("adapters", &self.adapters)
            .field("plugins", &self.plugins)
            .finish()
    }
}

fn invalid_plugin(adapter: &str, reason: &str) -> CacheError {
    CacheError::invalid_configuration(format!(
        "Plugin configuration for adapter \"{adapter}\" is invalid: {reason}"
    ))
}

fn parse_priority(priority: &Value) -> Option<i32> {
    priority.as_i64().and_then(|priority| i32::try_from(priority).ok())
}

fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}
