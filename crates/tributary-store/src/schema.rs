//! Additive schema management
//!
//! Destination columns come from descriptor column maps, so new sources can
//! introduce new columns at any time. Columns are only ever added, never
//! dropped or retyped, and concurrent registration is serialized so two
//! sources declaring overlapping columns cannot race the backend.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::Store;

/// Serializes column additions against a shared [`Store`]
pub struct SchemaManager {
    store: Arc<dyn Store>,
    guard: Mutex<()>,
}

impl SchemaManager {
    /// Wrap a store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Make sure every named column exists on the data table.
    ///
    /// Idempotent: columns that already exist are left untouched, and
    /// repeat calls with the same set are no-ops.
    pub async fn ensure_columns(&self, columns: &[String]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let _guard = self.guard.lock().await;
        let existing = self.store.columns().await?;
        let missing: Vec<String> = columns
            .iter()
            .filter(|column| !existing.contains(column))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = missing.len(), "adding data columns");
        self.store.add_columns(&missing).await
    }

    /// Current data-table columns
    pub async fn columns(&self) -> Result<Vec<String>> {
        self.store.columns().await
    }
}
