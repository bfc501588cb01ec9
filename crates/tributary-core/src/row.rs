//! Canonical rows
//!
//! A canonical row is one record expressed in the shared destination column
//! space: column name → optional text value. Merge semantics live here so
//! the reconciliation engine and every store agree on them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A record in the shared destination column space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    columns: BTreeMap<String, Option<String>>,
}

impl CanonicalRow {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value
    pub fn set(&mut self, column: impl Into<String>, value: Option<String>) {
        self.columns.insert(column.into(), value);
    }

    /// Get a column value; `None` when the column is absent or null
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(|v| v.as_deref())
    }

    /// Whether the row carries the column at all (null or not)
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Iterate over all columns
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Columns carrying a non-null value
    pub fn non_null(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// A copy holding only the non-null columns
    pub fn non_null_row(&self) -> CanonicalRow {
        let mut row = CanonicalRow::new();
        for (column, value) in self.non_null() {
            row.set(column, Some(value.to_string()));
        }
        row
    }

    /// Number of columns in the row
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Merge `incoming` into this row: each non-null incoming field
    /// overwrites the stored field (last write wins); null incoming fields
    /// never overwrite stored values.
    pub fn merge(&mut self, incoming: &CanonicalRow) {
        for (column, value) in incoming.non_null() {
            self.columns
                .insert(column.to_string(), Some(value.to_string()));
        }
    }
}

impl FromIterator<(String, Option<String>)> for CanonicalRow {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Option<&str>)]) -> CanonicalRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_merge_non_null_overwrites() {
        let mut stored = row(&[("name", Some("Acme")), ("address", Some("old"))]);
        let incoming = row(&[("address", Some("123 Main"))]);
        stored.merge(&incoming);
        assert_eq!(stored.get("name"), Some("Acme"));
        assert_eq!(stored.get("address"), Some("123 Main"));
    }

    #[test]
    fn test_merge_null_never_overwrites() {
        let mut stored = row(&[("name", Some("Acme"))]);
        let incoming = row(&[("name", None), ("address", None)]);
        stored.merge(&incoming);
        assert_eq!(stored.get("name"), Some("Acme"));
        assert!(stored.get("address").is_none());
    }

    #[test]
    fn test_merge_adds_new_columns() {
        let mut stored = row(&[("license_number", Some("L1")), ("name", Some("Acme"))]);
        let incoming = row(&[("license_number", Some("L1")), ("address", Some("123 Main"))]);
        stored.merge(&incoming);
        assert_eq!(stored.get("name"), Some("Acme"));
        assert_eq!(stored.get("address"), Some("123 Main"));
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn test_non_null_row_drops_nulls() {
        let full = row(&[("a", Some("1")), ("b", None)]);
        let trimmed = full.non_null_row();
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed.get("a"), Some("1"));
        assert!(!trimmed.contains("b"));
    }
}
