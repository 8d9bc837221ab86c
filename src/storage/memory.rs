//! In-process backend keeping items in nested hash maps, one table per namespace.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error};

use crate::error::{CacheError, Result};

use super::backend::Backend;
use super::capabilities::{Capabilities, DataType, DataTypeSupport, MaxKeyLength};
use super::contract::{
    AvailableSpace, ClearByNamespace, ClearByPrefix, ClearExpired, Flushable, Taggable, TotalSpace,
};
use super::options::AdapterOptions;

const TTL_PRECISION: f64 = 0.05;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    stored_at: Instant,
    tags: BTreeSet<String>,
    size: u64,
}

impl Entry {
    fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.stored_at) > ttl)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    namespace: String,
    ttl: Option<Duration>,
    /// Bytes; `0` is unlimited.
    memory_limit: u64,
    used_bytes: u64,
    data: HashMap<String, HashMap<String, Entry>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            namespace: super::options::DEFAULT_NAMESPACE.to_string(),
            ttl: None,
            memory_limit: 0,
            used_bytes: 0,
            data: HashMap::new(),
        }
    }
}

impl MemoryBackend {
    pub fn new(options: &AdapterOptions) -> Result<Self> {
        let mut backend = Self::default();
        backend.apply_options(options)?;
        Ok(backend)
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    fn table(&self) -> Option<&HashMap<String, Entry>> {
        self.data.get(&self.namespace)
    }

    fn live_entry(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        let ttl = self.ttl;
        let table = self.data.get_mut(&self.namespace)?;
        if table.get(key)?.is_expired(ttl, now) {
            if let Some(expired) = table.remove(key) {
                self.used_bytes = self.used_bytes.saturating_sub(expired.size);
            }
            return None;
        }
        table.get_mut(key)
    }

    fn drop_entries(&mut self, removed: u64) {
        self.used_bytes = self.used_bytes.saturating_sub(removed);
    }

    /// Remove entries of the current namespace matching `predicate`. Returns the count removed.
    fn retain_current(&mut self, mut predicate: impl FnMut(&str, &Entry) -> bool) -> usize {
        let Some(table) = self.data.get_mut(&self.namespace) else {
            return 0;
        };
        let before = table.len();
        let mut freed = 0;
        table.retain(|key, entry| {
            let remove = predicate(key, entry);
            if remove {
                freed += entry.size;
            }
            !remove
        });
        let removed = before - table.len();
        self.drop_entries(freed);
        removed
    }
}

fn entry_size(key: &str, value: &Value) -> u64 {
    (key.len() + value.to_string().len()) as u64
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities::builder()
            .max_key_length(MaxKeyLength::Unlimited)
            .ttl_supported(true)
            .ttl_precision(TTL_PRECISION)
            .namespace_is_prefix(false)
            .supported_data_types(
                DataType::ALL
                    .into_iter()
                    .map(|data_type| (data_type, DataTypeSupport::Native)),
            )
            .build()
            .unwrap_or_else(|err| {
                error!(error = %err, "memory backend capabilities rejected, using defaults");
                Capabilities::default()
            })
    }

    fn apply_options(&mut self, options: &AdapterOptions) -> Result<()> {
        self.namespace = options.namespace.clone();
        self.ttl = options.ttl();
        self.memory_limit = options.backend_option::<u64>("memory_limit")?.unwrap_or(0);
        Ok(())
    }

    fn get_item(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.live_entry(key).map(|entry| entry.value.clone()))
    }

    fn has_item(&mut self, key: &str) -> Result<bool> {
        Ok(self.live_entry(key).is_some())
    }

    fn set_item(&mut self, key: &str, value: Value) -> Result<bool> {
        let size = entry_size(key, &value);
        let replaced = self
            .table()
            .and_then(|table| table.get(key))
            .map_or(0, |entry| entry.size);
        let projected = self.used_bytes.saturating_sub(replaced) + size;
        if self.memory_limit > 0 && projected > self.memory_limit {
            return Err(CacheError::storage("Memory usage exceeds limit"));
        }

        let table = self.data.entry(self.namespace.clone()).or_default();
        let tags = table
            .remove(key)
            .map(|previous| previous.tags)
            .unwrap_or_default();
        table.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                tags,
                size,
            },
        );
        self.used_bytes = projected;
        Ok(true)
    }

    fn remove_item(&mut self, key: &str) -> Result<bool> {
        let removed = self
            .data
            .get_mut(&self.namespace)
            .and_then(|table| table.remove(key));
        match removed {
            Some(entry) => {
                self.drop_entries(entry.size);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn touch_item(&mut self, key: &str) -> Result<bool> {
        match self.live_entry(key) {
            Some(entry) => {
                entry.stored_at = Instant::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn as_flushable(&mut self) -> Option<&mut dyn Flushable> {
        Some(self)
    }

    fn as_clear_expired(&mut self) -> Option<&mut dyn ClearExpired> {
        Some(self)
    }

    fn as_clear_by_namespace(&mut self) -> Option<&mut dyn ClearByNamespace> {
        Some(self)
    }

    fn as_clear_by_prefix(&mut self) -> Option<&mut dyn ClearByPrefix> {
        Some(self)
    }

    fn as_taggable(&mut self) -> Option<&mut dyn Taggable> {
        Some(self)
    }

    fn as_total_space(&mut self) -> Option<&mut dyn TotalSpace> {
        Some(self)
    }

    fn as_available_space(&mut self) -> Option<&mut dyn AvailableSpace> {
        Some(self)
    }
}

impl Flushable for MemoryBackend {
    fn flush(&mut self) -> Result<bool> {
        self.data.clear();
        self.used_bytes = 0;
        Ok(true)
    }
}

impl ClearExpired for MemoryBackend {
    fn clear_expired(&mut self) -> Result<bool> {
        let Some(ttl) = self.ttl else {
            return Ok(true);
        };
        let now = Instant::now();
        let removed = self.retain_current(|_, entry| entry.is_expired(Some(ttl), now));
        debug!(namespace = %self.namespace, removed, "cleared expired items");
        Ok(true)
    }
}

impl ClearByNamespace for MemoryBackend {
    fn clear_by_namespace(&mut self, namespace: &str) -> Result<bool> {
        if namespace.is_empty() {
            return Err(CacheError::invalid_argument("No namespace given"));
        }
        if let Some(table) = self.data.remove(namespace) {
            let freed = table.values().map(|entry| entry.size).sum();
            self.drop_entries(freed);
        }
        Ok(true)
    }
}

impl ClearByPrefix for MemoryBackend {
    fn clear_by_prefix(&mut self, prefix: &str) -> Result<bool> {
        if prefix.is_empty() {
            return Err(CacheError::invalid_argument("No prefix given"));
        }
        self.retain_current(|key, _| key.starts_with(prefix));
        Ok(true)
    }
}

impl Taggable for MemoryBackend {
    fn set_tags(&mut self, key: &str, tags: &[&str]) -> Result<bool> {
        match self.live_entry(key) {
            Some(entry) => {
                entry.tags = tags.iter().map(|tag| (*tag).to_string()).collect();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_tags(&mut self, key: &str) -> Result<Option<BTreeSet<String>>> {
        Ok(self.live_entry(key).map(|entry| entry.tags.clone()))
    }

    fn clear_by_tags(&mut self, tags: &[&str], disjunction: bool) -> Result<bool> {
        if tags.is_empty() {
            return Ok(true);
        }
        self.retain_current(|_, entry| {
            if entry.tags.is_empty() {
                return false;
            }
            if disjunction {
                tags.iter().any(|tag| entry.tags.contains(*tag))
            } else {
                tags.iter().all(|tag| entry.tags.contains(*tag))
            }
        });
        Ok(true)
    }
}

impl TotalSpace for MemoryBackend {
    fn total_space(&mut self) -> Result<u64> {
        Ok(if self.memory_limit == 0 {
            u64::MAX
        } else {
            self.memory_limit
        })
    }
}

impl AvailableSpace for MemoryBackend {
    fn available_space(&mut self) -> Result<u64> {
        let total = self.total_space()?;
        Ok(total.saturating_sub(self.used_bytes))
    }
}
