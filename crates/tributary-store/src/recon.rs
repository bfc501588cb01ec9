//! Reconciliation engine
//!
//! Decides, per incoming record, whether it is a new entity or another
//! sighting of one already stored. Identity is driven by the source's
//! configured unique keys; sources without them fall back to matching on
//! every non-null value. Merges never let a null clobber known data, and
//! every accepted record leaves a citation tying the row to its source.

use std::sync::Arc;

use tokio::sync::Mutex;

use tributary_core::CanonicalRow;

use crate::error::{Error, Result};
use crate::store::Store;

/// How a row's identity values are derived for matching
#[derive(Debug, Clone)]
pub enum IdentityPolicy {
    /// Match on the named columns; a record missing any of them is new
    Configured(Vec<String>),
    /// Match on every non-null column of the record
    AllNonNull,
}

impl IdentityPolicy {
    /// Policy for a source's configured unique keys; an empty list means
    /// fall back to all-non-null matching
    pub fn for_keys(keys: &[String]) -> Self {
        if keys.is_empty() {
            IdentityPolicy::AllNonNull
        } else {
            IdentityPolicy::Configured(keys.to_vec())
        }
    }

    /// The `(column, value)` pairs identifying this record, or `None` when
    /// the record carries no usable identity and must become a new row
    pub fn identity_values(&self, row: &CanonicalRow) -> Option<Vec<(String, String)>> {
        match self {
            IdentityPolicy::Configured(keys) => {
                let mut values = Vec::with_capacity(keys.len());
                for key in keys {
                    values.push((key.clone(), row.get(key)?.to_string()));
                }
                Some(values)
            }
            IdentityPolicy::AllNonNull => {
                let values: Vec<(String, String)> = row
                    .non_null()
                    .map(|(column, value)| (column.to_string(), value.to_string()))
                    .collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values)
                }
            }
        }
    }
}

/// Upserts canonical rows into a [`Store`] with provenance
pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
    // Serializes the find/insert-or-update window so concurrent workers
    // cannot both insert the same entity.
    write_lock: Mutex<()>,
}

impl ReconciliationEngine {
    /// Wrap a store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Insert or merge one record and cite its source.
    ///
    /// Returns the id of the row the record landed in. A lookup that
    /// matches more than one stored row is an error; the record is left
    /// unwritten for the caller to report.
    pub async fn upsert(
        &self,
        row: &CanonicalRow,
        source_id: i64,
        policy: &IdentityPolicy,
    ) -> Result<i64> {
        let _guard = self.write_lock.lock().await;

        let data_id = match policy.identity_values(row) {
            None => self.store.insert_row(row).await?,
            Some(keys) => {
                let matches = self.store.find_by_values(&keys).await?;
                match matches.len() {
                    0 => self.store.insert_row(row).await?,
                    1 => {
                        let (data_id, _) = matches[0];
                        self.store.update_row(data_id, &row.non_null_row()).await?;
                        data_id
                    }
                    n => {
                        return Err(Error::AmbiguousIdentity {
                            matches: n,
                            keys: keys
                                .iter()
                                .map(|(k, v)| format!("{k}={v}"))
                                .collect::<Vec<_>>()
                                .join(", "),
                        });
                    }
                }
            }
        };

        self.store.add_citation(data_id, source_id).await?;
        Ok(data_id)
    }
}
