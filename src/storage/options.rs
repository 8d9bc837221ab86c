//! Options shared by every storage adapter.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

pub const DEFAULT_NAMESPACE: &str = "stowage";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Seconds; `0` never expires.
    pub ttl: f64,
    pub namespace: String,
    /// Regular expression keys must match. Empty disables the check.
    pub key_pattern: String,
    pub readable: bool,
    pub writable: bool,
    /// Backend-specific settings, e.g. `memory_limit`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    compiled_pattern: Option<Regex>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            ttl: 0.0,
            namespace: DEFAULT_NAMESPACE.to_string(),
            key_pattern: String::new(),
            readable: true,
            writable: true,
            extra: Map::new(),
            compiled_pattern: None,
        }
    }
}

impl AdapterOptions {
    pub fn from_map(options: &Map<String, Value>) -> Result<Self> {
        let parsed: AdapterOptions = serde_json::from_value(Value::Object(options.clone()))
            .map_err(|err| CacheError::invalid_argument(format!("adapter options: {err}")))?;
        parsed.validated()
    }

    /// Check invariants and compile the key pattern.
    pub fn validated(mut self) -> Result<Self> {
        if !self.ttl.is_finite() || self.ttl < 0.0 {
            return Err(CacheError::invalid_argument(format!(
                "ttl must be a number >= 0, got {}",
                self.ttl
            )));
        }
        if Duration::try_from_secs_f64(self.ttl).is_err() {
            return Err(CacheError::invalid_argument(format!(
                "ttl {} is too large",
                self.ttl
            )));
        }
        self.compiled_pattern = if self.key_pattern.is_empty() {
            None
        } else {
            let regex = Regex::new(&self.key_pattern).map_err(|err| {
                CacheError::invalid_argument(format!(
                    "invalid key pattern \"{}\": {err}",
                    self.key_pattern
                ))
            })?;
            Some(regex)
        };
        Ok(self)
    }

    pub fn ttl(&self) -> Option<Duration> {
        if self.ttl > 0.0 {
            Duration::try_from_secs_f64(self.ttl).ok()
        } else {
            None
        }
    }

    pub fn validate_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::invalid_argument("An empty key isn't allowed"));
        }
        if let Some(pattern) = &self.compiled_pattern
            && !pattern.is_match(key)
        {
            return Err(CacheError::invalid_argument(format!(
                "The key '{key}' doesn't match against pattern '{}'",
                self.key_pattern
            )));
        }
        Ok(())
    }

    /// Deserialize one backend-specific option. Missing keys yield `None`.
    pub fn backend_option<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.extra.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone()).map(Some).map_err(|err| {
                CacheError::invalid_argument(format!("option \"{name}\": {err}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn options(raw: Value) -> Result<AdapterOptions> {
        match raw {
            Value::Object(map) => AdapterOptions::from_map(&map),
            other => panic!("test options must be an object, got {other}"),
        }
    }

    #[test]
    fn defaults_apply_to_missing_fields() {
        let parsed = options(json!({ "namespace": "app" })).expect("valid options");
        assert_eq!(parsed.namespace, "app");
        assert_eq!(parsed.ttl(), None);
        assert!(parsed.readable);
        assert!(parsed.writable);
    }

    #[test]
    fn unknown_fields_are_kept_as_backend_extras() {
        let parsed = options(json!({ "ttl": 120, "memory_limit": 2048 })).expect("valid options");
        assert_eq!(parsed.ttl(), Some(Duration::from_secs(120)));
        assert_eq!(
            parsed.backend_option::<u64>("memory_limit").expect("number"),
            Some(2048)
        );
        assert_eq!(parsed.backend_option::<u64>("absent").expect("absent"), None);
    }

    #[test]
    fn negative_ttl_is_rejected() {
        let err = options(json!({ "ttl": -1 })).expect_err("negative ttl");
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
    }

    #[test]
    fn ttl_beyond_duration_range_is_rejected() {
        let err = options(json!({ "ttl": 1e30 })).expect_err("ttl overflows a duration");
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
        assert!(err.to_string().ends_with("is too large"), "{err}");

        let mut unchecked = AdapterOptions::default();
        unchecked.ttl = f64::MAX;
        assert_eq!(unchecked.ttl(), None);
    }

    #[test]
    fn keys_are_checked_against_pattern() {
        let parsed = options(json!({ "key_pattern": "^[a-z]+$" })).expect("valid options");
        parsed.validate_key("abc").expect("matches");
        let err = parsed.validate_key("ABC").expect_err("does not match");
        assert_eq!(
            err.to_string(),
            "invalid argument: The key 'ABC' doesn't match against pattern '^[a-z]+$'"
        );
        let err = parsed.validate_key("").expect_err("empty key");
        assert_eq!(err.to_string(), "invalid argument: An empty key isn't allowed");
    }

    #[test]
    fn broken_pattern_is_rejected() {
        assert!(options(json!({ "key_pattern": "(" })).is_err());
    }
}
