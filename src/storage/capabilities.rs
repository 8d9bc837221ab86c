//! Backend capability descriptor.
//!
//! `Capabilities` is a value type. Nothing mutates an instance once built; a plugin that needs to
//! advertise different guarantees derives a new value through [`Capabilities::to_builder`] or one of
//! the `with_*` helpers and replaces the old one wholesale.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{CacheError, Result};

const DEFAULT_TTL_PRECISION: f64 = 1.0;

/// Host value categories a backend may or may not preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Null,
    Boolean,
    Integer,
    Double,
    String,
    Array,
    Object,
    Resource,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Null,
        DataType::Boolean,
        DataType::Integer,
        DataType::Double,
        DataType::String,
        DataType::Array,
        DataType::Object,
        DataType::Resource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Null => "NULL",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Array => "array",
            DataType::Object => "object",
            DataType::Resource => "resource",
        }
    }

    /// Classify a cache value. Resource handles have no value representation.
    pub fn of(value: &Value) -> DataType {
        match value {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Boolean,
            Value::Number(number) if number.is_f64() => DataType::Double,
            Value::Number(_) => DataType::Integer,
            Value::String(_) => DataType::String,
            Value::Array(_) => DataType::Array,
            Value::Object(_) => DataType::Object,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How a backend treats values of one [`DataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeSupport {
    Unsupported,
    /// Values round-trip with their type intact.
    Native,
    /// Values are stored but come back as the given type.
    ConvertedTo(DataType),
}

impl DataTypeSupport {
    pub fn is_supported(self) -> bool {
        !matches!(self, DataTypeSupport::Unsupported)
    }
}

impl From<bool> for DataTypeSupport {
    fn from(supported: bool) -> Self {
        if supported {
            DataTypeSupport::Native
        } else {
            DataTypeSupport::Unsupported
        }
    }
}

impl Serialize for DataTypeSupport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataTypeSupport::Unsupported => serializer.serialize_bool(false),
            DataTypeSupport::Native => serializer.serialize_bool(true),
            DataTypeSupport::ConvertedTo(data_type) => serializer.serialize_str(data_type.as_str()),
        }
    }
}

/// Maximum key length a backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxKeyLength {
    #[default]
    Unknown,
    Unlimited,
    Bounded(NonZeroUsize),
}

impl MaxKeyLength {
    /// Decode the conventional integer form: `-1` unknown, `0` unlimited, `n > 0` bounded.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            -1 => Ok(MaxKeyLength::Unknown),
            0 => Ok(MaxKeyLength::Unlimited),
            n if n > 0 => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(MaxKeyLength::Bounded)
                .ok_or_else(|| CacheError::invalid_argument(format!("key length {n} is out of range"))),
            n => Err(CacheError::invalid_argument(format!(
                "max key length must be -1, 0 or positive, got {n}"
            ))),
        }
    }

    pub fn as_raw(self) -> i64 {
        match self {
            MaxKeyLength::Unknown => -1,
            MaxKeyLength::Unlimited => 0,
            MaxKeyLength::Bounded(limit) => i64::try_from(limit.get()).unwrap_or(i64::MAX),
        }
    }

    pub fn allows(self, key_len: usize) -> bool {
        match self {
            MaxKeyLength::Bounded(limit) => key_len <= limit.get(),
            MaxKeyLength::Unknown | MaxKeyLength::Unlimited => true,
        }
    }
}

impl Serialize for MaxKeyLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_raw())
    }
}

fn default_data_types() -> BTreeMap<DataType, DataTypeSupport> {
    DataType::ALL
        .into_iter()
        .map(|data_type| {
            let support = DataTypeSupport::from(data_type == DataType::String);
            (data_type, support)
        })
        .collect()
}

fn fill_data_types(
    entries: impl IntoIterator<Item = (DataType, DataTypeSupport)>,
) -> BTreeMap<DataType, DataTypeSupport> {
    let mut types: BTreeMap<DataType, DataTypeSupport> = DataType::ALL
        .into_iter()
        .map(|data_type| (data_type, DataTypeSupport::Unsupported))
        .collect();
    types.extend(entries);
    types
}

/// Declared guarantees and limits of a storage backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    max_key_length: MaxKeyLength,
    ttl_supported: bool,
    namespace_is_prefix: bool,
    supported_data_types: BTreeMap<DataType, DataTypeSupport>,
    ttl_precision: f64,
    uses_request_time: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_key_length: MaxKeyLength::Unknown,
            ttl_supported: false,
            namespace_is_prefix: true,
            supported_data_types: default_data_types(),
            ttl_precision: DEFAULT_TTL_PRECISION,
            uses_request_time: false,
        }
    }
}

impl Capabilities {
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            inner: Capabilities::default(),
        }
    }

    /// Start a builder pre-filled with every field of `self`.
    pub fn to_builder(&self) -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            inner: self.clone(),
        }
    }

    /// Copy with a replaced data-type table; unspecified types become unsupported.
    pub fn with_supported_data_types(
        &self,
        entries: impl IntoIterator<Item = (DataType, DataTypeSupport)>,
    ) -> Capabilities {
        Capabilities {
            supported_data_types: fill_data_types(entries),
            ..self.clone()
        }
    }

    pub fn max_key_length(&self) -> MaxKeyLength {
        self.max_key_length
    }

    pub fn ttl_supported(&self) -> bool {
        self.ttl_supported
    }

    pub fn namespace_is_prefix(&self) -> bool {
        self.namespace_is_prefix
    }

    pub fn supported_data_types(&self) -> &BTreeMap<DataType, DataTypeSupport> {
        &self.supported_data_types
    }

    pub fn support_for(&self, data_type: DataType) -> DataTypeSupport {
        self.supported_data_types
            .get(&data_type)
            .copied()
            .unwrap_or(DataTypeSupport::Unsupported)
    }

    pub fn ttl_precision(&self) -> f64 {
        self.ttl_precision
    }

    pub fn uses_request_time(&self) -> bool {
        self.uses_request_time
    }
}

/// Copy-with builder for [`Capabilities`].
#[derive(Debug, Clone)]
pub struct CapabilitiesBuilder {
    inner: Capabilities,
}

impl CapabilitiesBuilder {
    pub fn max_key_length(mut self, max_key_length: MaxKeyLength) -> Self {
        self.inner.max_key_length = max_key_length;
        self
    }

    pub fn ttl_supported(mut self, supported: bool) -> Self {
        self.inner.ttl_supported = supported;
        self
    }

    pub fn namespace_is_prefix(mut self, is_prefix: bool) -> Self {
        self.inner.namespace_is_prefix = is_prefix;
        self
    }

    pub fn supported_data_types(
        mut self,
        entries: impl IntoIterator<Item = (DataType, DataTypeSupport)>,
    ) -> Self {
        self.inner.supported_data_types = fill_data_types(entries);
        self
    }

    pub fn ttl_precision(mut self, precision: f64) -> Self {
        self.inner.ttl_precision = precision;
        self
    }

    pub fn uses_request_time(mut self, uses_request_time: bool) -> Self {
        self.inner.uses_request_time = uses_request_time;
        self
    }

    pub fn build(self) -> Result<Capabilities> {
        let precision = self.inner.ttl_precision;
        if !precision.is_finite() || precision <= 0.0 {
            return Err(CacheError::invalid_argument(format!(
                "ttl precision must be a positive number, got {precision}"
            )));
        }
        Ok(self.inner)
    }
}
