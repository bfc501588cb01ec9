//! Field extraction
//!
//! A [`FieldExtractor`] is a column map compiled against the transform
//! registry. Compilation resolves every transform up front so configuration
//! errors surface at load time; extraction then applies the map to one raw
//! record at a time, producing a [`CanonicalRow`].
//!
//! Raw records come in two shapes: JSON objects (APIs, tabular files with a
//! header row) addressed by dot-path, and JSON arrays (header-less tabular
//! files) addressed by position.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::descriptor::{ExtractionSpec, SourceRef};
use crate::error::{Error, Result};
use crate::row::CanonicalRow;
use crate::transform::{Transform, TransformRegistry};
use crate::value::{get_path, scalar_to_text};

struct CompiledColumn {
    column: String,
    source: SourceRef,
    transform: Option<Box<dyn Transform>>,
}

/// A compiled column map, ready to extract rows
pub struct FieldExtractor {
    columns: Vec<CompiledColumn>,
}

impl FieldExtractor {
    /// Compile a column map against the registry.
    ///
    /// Fails if any declared transform is unknown or misconfigured.
    pub fn compile(
        column_map: &BTreeMap<String, ExtractionSpec>,
        registry: &TransformRegistry,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(column_map.len());
        for (column, spec) in column_map {
            let transform = spec.transform().map(|t| registry.build(t)).transpose()?;
            columns.push(CompiledColumn {
                column: column.clone(),
                source: spec.source().clone(),
                transform,
            });
        }
        Ok(Self { columns })
    }

    /// Apply the compiled map to one raw record.
    ///
    /// A missing key/index or a failing transform rejects the record with
    /// an error; it does not silently null the column.
    pub fn extract(&self, record: &Value) -> Result<CanonicalRow> {
        let mut row = CanonicalRow::new();
        for compiled in &self.columns {
            let raw = resolve_source(record, &compiled.source, &compiled.column)?;
            let value = match &compiled.transform {
                Some(transform) => transform.apply(raw)?,
                None => raw.clone(),
            };
            row.set(compiled.column.clone(), scalar_to_text(&value));
        }
        Ok(row)
    }

    /// Destination columns this extractor produces
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.column.as_str())
    }
}

fn resolve_source<'a>(record: &'a Value, source: &SourceRef, column: &str) -> Result<&'a Value> {
    match (record, source) {
        (Value::Array(items), SourceRef::Index(index)) => {
            items.get(*index).ok_or_else(|| Error::Extract {
                column: column.to_string(),
                message: format!("index {} out of bounds for {}-field record", index, items.len()),
            })
        }
        // A header-less row addressed by a numeric string.
        (Value::Array(items), SourceRef::Path(path)) => {
            let index = path.parse::<usize>().map_err(|_| Error::Extract {
                column: column.to_string(),
                message: format!("'{}' is not a positional index", path),
            })?;
            items.get(index).ok_or_else(|| Error::Extract {
                column: column.to_string(),
                message: format!("index {} out of bounds for {}-field record", index, items.len()),
            })
        }
        (record, SourceRef::Path(path)) => get_path(record, path).ok_or_else(|| Error::Extract {
            column: column.to_string(),
            message: format!("path '{}' not found in record", path),
        }),
        (_, SourceRef::Index(index)) => Err(Error::Extract {
            column: column.to_string(),
            message: format!("index {} used against a non-array record", index),
        }),
    }
}
