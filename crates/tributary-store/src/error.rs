//! Error types for tributary-store

use thiserror::Error;

/// Result type alias for tributary-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tributary-store
#[derive(Error, Debug)]
pub enum Error {
    /// An identity-key lookup matched more than one stored row; the record
    /// is surfaced to the caller, never silently merged
    #[error("ambiguous identity: {matches} rows match keys [{keys}]")]
    AmbiguousIdentity {
        /// Number of candidate rows
        matches: usize,
        /// The identity key/value pairs that matched
        keys: String,
    },

    /// A column name is not usable as a SQL identifier
    #[error("invalid column name '{column}'")]
    InvalidColumn {
        /// The offending column
        column: String,
    },

    /// A stored row could not be decoded into a canonical row
    #[error("corrupt stored row {data_id}: {message}")]
    CorruptRow {
        /// Row id
        data_id: i64,
        /// Description of the problem
        message: String,
    },

    /// Database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
