//! Backend that stores nothing.

use serde_json::Value;
use tracing::error;

use crate::error::Result;

use super::backend::Backend;
use super::capabilities::{Capabilities, DataType, DataTypeSupport, MaxKeyLength};

#[derive(Debug, Default, Clone, Copy)]
pub struct BlackHoleBackend;

impl Backend for BlackHoleBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities::builder()
            .max_key_length(MaxKeyLength::Unlimited)
            .ttl_supported(true)
            .namespace_is_prefix(false)
            .supported_data_types(
                DataType::ALL
                    .into_iter()
                    .map(|data_type| (data_type, DataTypeSupport::Native)),
            )
            .build()
            .unwrap_or_else(|err| {
                error!(error = %err, "black hole capabilities rejected, using defaults");
                Capabilities::default()
            })
    }

    fn get_item(&mut self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn set_item(&mut self, _key: &str, _value: Value) -> Result<bool> {
        Ok(false)
    }

    fn remove_item(&mut self, _key: &str) -> Result<bool> {
        Ok(false)
    }
}
