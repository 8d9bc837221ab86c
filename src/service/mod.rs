//! Name-based construction of storages and plugins.

pub mod adapter_factory;
pub mod plugin_factory;
pub mod registry;

pub use adapter_factory::{
    AdapterRegistry, DEFAULT_PLUGIN_PRIORITY, PluginConfiguration, StorageAdapterFactory,
    default_adapters,
};
pub use plugin_factory::{PluginFactory, PluginRegistry};
pub use registry::{
    AdapterConstructor, PluginConstructor, Registry, SerializerConstructor, normalize_name,
};
