//! Cross-cutting decorators attached to a storage adapter's event pipeline.
//!
//! A plugin registers its listeners through a [`ListenerSet`], which remembers every handle it
//! received so the plugin can later remove exactly its own registrations. Pre listeners attach at
//! the requested priority and post listeners at the negated priority: with the pipeline's
//! highest-first dispatch, the plugin whose pre step runs first is the one whose post step runs
//! last.

pub mod clear_expired;
pub mod serializer;

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};
use crate::lock::mutex_lock;
use crate::storage::{Event, EventPipeline, ListenerHandle, Operation};

pub use clear_expired::{ClearExpiredByFactor, ClearExpiredOptions};
pub use serializer::{JsonSerializer, Serializer, SerializerAdapter, SerializerPluginOptions};

pub trait Plugin: Send + Sync {
    /// Registry name, e.g. `"Serializer"`.
    fn name(&self) -> &'static str;

    /// Register all listeners of this plugin on `events`.
    fn attach(self: Arc<Self>, events: &mut EventPipeline, priority: i32);

    /// Remove every listener this plugin registered. Detaching twice is a no-op.
    fn detach(&self, events: &mut EventPipeline);
}

/// Storage that accepts plugins.
///
/// Plugins are identified by instance, not by name or value.
pub trait PluginAware {
    /// Fails with [`CacheError::PluginAlreadyRegistered`] if this exact instance is attached.
    fn add_plugin(&mut self, plugin: Arc<dyn Plugin>, priority: i32) -> Result<()>;

    /// Returns `false` for plugins that were not attached.
    fn remove_plugin(&mut self, plugin: &Arc<dyn Plugin>) -> bool;

    fn has_plugin(&self, plugin: &Arc<dyn Plugin>) -> bool;

    /// Attached plugins in attachment order.
    fn plugins(&self) -> Vec<Arc<dyn Plugin>>;
}

/// Whether two handles point at the same plugin instance.
pub fn same_instance(a: &Arc<dyn Plugin>, b: &Arc<dyn Plugin>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Handles a plugin received from one pipeline.
#[derive(Debug, Default)]
pub struct ListenerSet {
    handles: Mutex<Vec<ListenerHandle>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre<F>(&self, events: &mut EventPipeline, operation: Operation, priority: i32, f: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let handle = events.attach(operation.pre(), priority, f);
        mutex_lock(&self.handles, "plugin::ListenerSet", "on_pre").push(handle);
    }

    /// Attaches at `-priority`.
    pub fn on_post<F>(&self, events: &mut EventPipeline, operation: Operation, priority: i32, f: F)
    where
        F: Fn(&mut Event<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let handle = events.attach(operation.post(), priority.saturating_neg(), f);
        mutex_lock(&self.handles, "plugin::ListenerSet", "on_post").push(handle);
    }

    /// Detach every remembered handle and forget them. Returns how many were still attached.
    pub fn detach_all(&self, events: &mut EventPipeline) -> usize {
        let handles = std::mem::take(&mut *mutex_lock(
            &self.handles,
            "plugin::ListenerSet",
            "detach_all",
        ));
        handles
            .into_iter()
            .filter(|handle| events.detach(*handle))
            .count()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.handles, "plugin::ListenerSet", "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deserialize a plugin's option mapping into its typed options.
pub fn parse_options<T: DeserializeOwned>(plugin: &str, options: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|err| {
        CacheError::plugin_configuration(format!("invalid options for plugin \"{plugin}\": {err}"))
    })
}
