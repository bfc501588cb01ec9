//! Error types for tributary-core

use thiserror::Error;

/// Result type alias for tributary-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tributary-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Source descriptor failed validation
    #[error("invalid source '{name}': {message}")]
    InvalidDescriptor {
        /// Name of the source with the error
        name: String,
        /// Description of the error
        message: String,
    },

    /// Transform type is not present in the registry
    #[error("unknown transform type '{name}'")]
    UnknownTransform {
        /// The unrecognized type identifier
        name: String,
    },

    /// Transform execution error; the offending record is rejected
    #[error("transform error in '{transform}': {message}")]
    Transform {
        /// Name or type of the transform
        transform: String,
        /// Description of the error
        message: String,
    },

    /// A mapped source key or index could not be resolved in a record
    #[error("cannot extract column '{column}': {message}")]
    Extract {
        /// Destination column being populated
        column: String,
        /// Description of the error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
