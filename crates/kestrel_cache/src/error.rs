//! Error types for data store, cache, and configuration operations.

use kestrel_common::ShapeError;

/// Errors that can occur while reading or mutating tracked data.
///
/// Only [`CacheError::ImmutableData`] arises from normal use; the other
/// variants report a caller asking for something that is not there or
/// asking for it under the wrong type.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A mutation was attempted through a data store marked immutable.
    #[error("cannot mutate '{name}': data store is immutable")]
    ImmutableData {
        /// Name of the buffer (or operation) the mutation targeted.
        name: String,
    },

    /// A key or buffer name is not present.
    #[error("key not found: '{key}'")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// An entry exists but holds a different type than requested.
    #[error("entry '{key}' is not of type {expected}")]
    TypeMismatch {
        /// The key that was looked up.
        key: String,
        /// Name of the type the caller asked for.
        expected: &'static str,
    },

    /// A buffer operation was given an inconsistent shape or index.
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Errors that can occur when loading engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
}
