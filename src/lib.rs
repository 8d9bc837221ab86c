//! Pluggable key/value cache storage.
//!
//! A [`storage::StorageAdapter`] wraps a backend with an event pipeline that plugins hook into
//! before and after every operation. [`service::StorageAdapterFactory`] assembles adapters and
//! their plugin stacks from array-shaped configuration:
//!
//! ```
//! use serde_json::json;
//! use stowage::service::StorageAdapterFactory;
//! use stowage::storage::Storage;
//!
//! let factory = StorageAdapterFactory::default();
//! let mut storage = factory
//!     .create_from_array_configuration(&json!({
//!         "adapter": "Memory",
//!         "plugins": [{ "name": "Serializer", "priority": 10 }]
//!     }))
//!     .expect("valid configuration");
//!
//! storage.set_item("answer", json!({ "value": 42 })).expect("stored");
//! assert_eq!(storage.get_item("answer").expect("read"), Some(json!({ "value": 42 })));
//! ```

pub mod config;
pub mod error;
mod lock;
pub mod plugin;
pub mod service;
pub mod storage;
pub mod telemetry;

pub use error::{CacheError, Result};
