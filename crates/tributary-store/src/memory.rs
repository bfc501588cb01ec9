//! In-memory store
//!
//! Backs development runs and the test suite. Behavior matches [`PgStore`]
//! through the shared [`Store`] contract: idempotent source registration,
//! additive columns, equality lookups, idempotent citations.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use tributary_core::CanonicalRow;

use crate::error::Result;
use crate::store::{SourceRegistration, Store, StoredRow};

#[derive(Default)]
struct Inner {
    next_source_id: i64,
    sources: BTreeMap<String, i64>,
    columns: BTreeSet<String>,
    next_data_id: i64,
    rows: BTreeMap<i64, CanonicalRow>,
    citations: BTreeSet<(i64, i64)>,
}

/// An in-process [`Store`] discarded on drop
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn register_source(&self, registration: &SourceRegistration) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        if let Some(id) = inner.sources.get(&registration.name) {
            return Ok(*id);
        }
        inner.next_source_id += 1;
        let id = inner.next_source_id;
        inner.sources.insert(registration.name.clone(), id);
        Ok(id)
    }

    async fn add_columns(&self, columns: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.columns.extend(columns.iter().cloned());
        Ok(())
    }

    async fn columns(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.columns.iter().cloned().collect())
    }

    async fn find_by_values(&self, keys: &[(String, String)]) -> Result<Vec<StoredRow>> {
        let inner = self.inner.lock().await;
        let matches = inner
            .rows
            .iter()
            .filter(|(_, row)| {
                keys.iter()
                    .all(|(column, value)| row.get(column) == Some(value.as_str()))
            })
            .map(|(id, row)| (*id, row.clone()))
            .collect();
        Ok(matches)
    }

    async fn insert_row(&self, row: &CanonicalRow) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        inner.next_data_id += 1;
        let id = inner.next_data_id;
        inner.rows.insert(id, row.clone());
        Ok(id)
    }

    async fn update_row(&self, data_id: i64, row: &CanonicalRow) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.rows.get_mut(&data_id) {
            Some(stored) => stored.merge(row),
            None => tracing::warn!(data_id, "update for unknown data row ignored"),
        }
        Ok(())
    }

    async fn add_citation(&self, data_id: i64, source_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.citations.insert((data_id, source_id));
        Ok(())
    }

    async fn count_rows(&self) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.rows.len() as u64)
    }

    async fn citations_for(&self, data_id: i64) -> Result<Vec<i64>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .citations
            .iter()
            .filter(|(d, _)| *d == data_id)
            .map(|(_, s)| *s)
            .collect())
    }
}
