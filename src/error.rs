use std::error::Error as StdError;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Structural configuration problem. The message is user facing and kept verbatim.
    #[error("{message}")]
    InvalidConfiguration { message: String },
    #[error("storage adapter \"{name}\" could not be found")]
    BackendNotFound { name: String },
    #[error("storage plugin \"{name}\" could not be found")]
    PluginNotFound { name: String },
    #[error("plugin configuration error: {message}")]
    PluginConfiguration { message: String },
    #[error("plugin \"{name}\" is already registered")]
    PluginAlreadyRegistered { name: String },
    #[error("{message}")]
    Runtime { message: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl CacheError {
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn backend_not_found(name: impl Into<String>) -> Self {
        Self::BackendNotFound { name: name.into() }
    }

    pub fn plugin_not_found(name: impl Into<String>) -> Self {
        Self::PluginNotFound { name: name.into() }
    }

    pub fn plugin_configuration(message: impl Into<String>) -> Self {
        Self::PluginConfiguration {
            message: message.into(),
        }
    }

    pub fn plugin_already_registered(name: impl Into<String>) -> Self {
        Self::PluginAlreadyRegistered { name: name.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a backend's native error, keeping it reachable through `source()`.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
            source: None,
        }
    }

    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn invalid_configuration_displays_message_verbatim() {
        let err = CacheError::invalid_configuration("Configuration must be a non-empty array");
        assert_eq!(err.to_string(), "Configuration must be a non-empty array");
        assert!(err.is_invalid_configuration());
    }

    #[test]
    fn storage_error_chains_native_source() {
        let native = io::Error::new(io::ErrorKind::BrokenPipe, "connection reset");
        let err = CacheError::storage_with_source("setItem failed", native);

        assert_eq!(err.to_string(), "storage error: setItem failed");
        let source = err.source().expect("native error should be chained");
        assert_eq!(source.to_string(), "connection reset");
    }
}
