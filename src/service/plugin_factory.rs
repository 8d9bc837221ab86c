//! Builds single plugins from array-shaped configuration.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::plugin::serializer::{SerializerRegistry, default_serializers};
use crate::plugin::{ClearExpiredByFactor, Plugin, Serializer};

use super::registry::{PluginConstructor, Registry};

pub type PluginRegistry = Registry<PluginConstructor>;

pub struct PluginFactory {
    plugins: PluginRegistry,
    serializers: Arc<SerializerRegistry>,
}

impl Default for PluginFactory {
    fn default() -> Self {
        Self::with_serializers(Arc::new(default_serializers()))
    }
}

impl PluginFactory {
    /// Factory knowing the built-in plugins, with `Serializer` resolving codecs from `serializers`.
    pub fn with_serializers(serializers: Arc<SerializerRegistry>) -> Self {
        let mut plugins = PluginRegistry::new();

        let codecs = Arc::clone(&serializers);
        let serializer: PluginConstructor = Arc::new(move |options: &Map<String, Value>| {
            let plugin = Serializer::from_options(Arc::clone(&codecs), options)?;
            Ok(Arc::new(plugin) as Arc<dyn Plugin>)
        });
        let clear_expired: PluginConstructor = Arc::new(|options: &Map<String, Value>| {
            let plugin = ClearExpiredByFactor::from_options(options)?;
            Ok(Arc::new(plugin) as Arc<dyn Plugin>)
        });
        plugins
            .register(Serializer::NAME, serializer)
            .register(ClearExpiredByFactor::NAME, clear_expired);

        Self {
            plugins,
            serializers,
        }
    }

    /// Factory with no plugins registered.
    pub fn empty() -> Self {
        Self {
            plugins: PluginRegistry::new(),
            serializers: Arc::new(SerializerRegistry::new()),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: PluginConstructor) -> &mut Self {
        self.plugins.register(name, constructor);
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Check the shape `{name: non-empty string, options?: mapping}` without building anything.
    pub fn assert_valid_configuration_structure(&self, configuration: &Value) -> Result<()> {
        let configuration = match configuration {
            Value::Object(map) if !map.is_empty() => map,
            _ => {
                return Err(CacheError::invalid_configuration(
                    "Configuration must be a non-empty array",
                ));
            }
        };

        let Some(name) = configuration.get("name") else {
            return Err(CacheError::invalid_configuration(
                "Configuration must contain a \"name\" key",
            ));
        };
        if !name.as_str().is_some_and(|name| !name.is_empty()) {
            return Err(CacheError::invalid_configuration(
                "Plugin \"name\" has to be a non-empty string",
            ));
        }

        match configuration.get("options") {
            None | Some(Value::Null) | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(CacheError::invalid_configuration(
                "Plugin \"options\" must be an array with string keys",
            )),
        }
    }

    pub fn create(&self, name: &str, options: &Map<String, Value>) -> Result<Arc<dyn Plugin>> {
        let constructor = self
            .plugins
            .resolve(name)
            .ok_or_else(|| CacheError::plugin_not_found(name))?;
        let plugin = constructor(options)?;
        debug!(plugin = name, "plugin built");
        Ok(plugin)
    }

    pub fn create_from_array_configuration(&self, configuration: &Value) -> Result<Arc<dyn Plugin>> {
        self.assert_valid_configuration_structure(configuration)?;

        let name = configuration
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let options = match configuration.get("options") {
            Some(Value::Object(options)) => options.clone(),
            _ => Map::new(),
        };
        self.create(name, &options)
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory")
            .field("plugins", &self.plugins)
            .field("serializers", &self.serializers)
            .finish()
    }
}
