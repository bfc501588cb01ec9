//! Error types for tributary-engine

use thiserror::Error;

/// Result type alias for tributary-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting a source
#[derive(Error, Debug)]
pub enum Error {
    /// Error from descriptor loading or field extraction
    #[error(transparent)]
    Core(#[from] tributary_core::Error),

    /// Error from the storage layer
    #[error(transparent)]
    Store(#[from] tributary_store::Error),

    /// An auth chain exceeded the nesting limit, which indicates a cycle
    #[error("auth chain exceeded depth {depth}; chains must not be cyclic")]
    AuthCycle {
        /// The depth limit that was exceeded
        depth: usize,
    },

    /// An `env[NAME]` placeholder referenced an unset variable
    #[error("environment variable '{name}' is not set")]
    MissingEnv {
        /// Variable name from the placeholder
        name: String,
    },

    /// A token_key path did not resolve in the token response
    #[error("token key '{path}' not found in auth response")]
    TokenKey {
        /// The configured dot-path
        path: String,
    },

    /// A resolved endpoint was not a usable URL
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Description of the problem
        message: String,
    },

    /// Transport-level failure (connect, timeout, TLS)
    #[error("network error: {message}")]
    Network {
        /// Description of the failure
        message: String,
    },

    /// A request completed with a non-success status
    #[error("request to {url} returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// A response body could not be interpreted as records
    #[error("unusable response body: {message}")]
    Body {
        /// Description of the problem
        message: String,
    },

    /// A request kept failing after rate-limit backoff
    #[error("request to {url} failed after {attempts} attempts")]
    RetriesExhausted {
        /// Request URL
        url: String,
        /// Attempts made
        attempts: u32,
    },

    /// Filesystem error while reading dataset files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited file
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
