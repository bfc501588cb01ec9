//! Storage trait
//!
//! The [`Store`] trait is the narrow seam between the reconciliation logic
//! and the persistence backend: registered sources, a data table whose
//! column set grows over time, and citations recording which source
//! contributed to which row.

use async_trait::async_trait;

use tributary_core::CanonicalRow;

use crate::error::Result;

/// Everything needed to register (or look up) a source
#[derive(Debug, Clone)]
pub struct SourceRegistration {
    /// Unique source name
    pub name: String,
    /// Source category rendered as text (`api`, `dataset`, `import`)
    pub source_type: String,
    /// Path of the descriptor file
    pub config_path: Option<String>,
    /// Configured identity columns (may be empty)
    pub unique_keys: Vec<String>,
}

/// A stored data row: id plus its canonical column values
pub type StoredRow = (i64, CanonicalRow);

/// Persistence backend for sources, data rows, and citations
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up or create a source by name; idempotent, returns the id
    async fn register_source(&self, registration: &SourceRegistration) -> Result<i64>;

    /// Add columns to the data table; additive and idempotent.
    ///
    /// Callers serialize through [`crate::SchemaManager`]; implementations
    /// only need the operation itself to be repeatable.
    async fn add_columns(&self, columns: &[String]) -> Result<()>;

    /// Current data-table columns (excluding id/timestamps)
    async fn columns(&self) -> Result<Vec<String>>;

    /// Rows whose stored values equal every `(column, value)` pair
    async fn find_by_values(&self, keys: &[(String, String)]) -> Result<Vec<StoredRow>>;

    /// Insert a new data row; returns its id
    async fn insert_row(&self, row: &CanonicalRow) -> Result<i64>;

    /// Overwrite the given columns of an existing row and bump its
    /// updated timestamp
    async fn update_row(&self, data_id: i64, row: &CanonicalRow) -> Result<()>;

    /// Record that a source contributed to a row; a repeat is a no-op
    async fn add_citation(&self, data_id: i64, source_id: i64) -> Result<()>;

    /// Number of data rows
    async fn count_rows(&self) -> Result<u64>;

    /// Source ids cited for a row, ascending
    async fn citations_for(&self, data_id: i64) -> Result<Vec<i64>>;
}
