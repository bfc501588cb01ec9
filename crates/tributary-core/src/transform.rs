//! Value transforms
//!
//! Transforms turn an extracted raw value into its canonical form. They are
//! pure: one value in, one value out, no surrounding record context.
//!
//! # Built-in Transforms
//!
//! - `date_format` - reparse a date string (`from` pattern) and re-emit it
//!   (`to` pattern); patterns use `YYYY`/`YY`/`MM`/`DD`/`HH`/`mm`/`ss` tokens
//! - `multiply` - scale a numeric value by `factor`
//!
//! The registry is open for extension: register a builder under a new type
//! name and descriptors can use it. An unknown type is a configuration
//! error at load time, never a per-record failure.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::descriptor::TransformSpec;
use crate::error::{Error, Result};

/// A pure value transformation
pub trait Transform: Send + Sync {
    /// Transform one extracted value.
    ///
    /// Null passes through untouched; a value the transform cannot handle
    /// is a [`Error::Transform`], which rejects the whole record.
    fn apply(&self, value: &Value) -> Result<Value>;
}

/// Builder resolving a [`TransformSpec`]'s parameters into a transform
pub type TransformBuilder =
    fn(&serde_json::Map<String, Value>) -> Result<Box<dyn Transform>>;

/// Registry of transform builders keyed by type name
pub struct TransformRegistry {
    builders: HashMap<String, TransformBuilder>,
}

impl TransformRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in transforms
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("date_format", build_date_format);
        registry.register("multiply", build_multiply);
        registry
    }

    /// Register a builder under a transform type name
    pub fn register(&mut self, name: impl Into<String>, builder: TransformBuilder) {
        self.builders.insert(name.into(), builder);
    }

    /// Build a transform from a spec.
    ///
    /// Fails with [`Error::UnknownTransform`] for an unregistered type and
    /// surfaces parameter errors from the builder.
    pub fn build(&self, spec: &TransformSpec) -> Result<Box<dyn Transform>> {
        let builder = self
            .builders
            .get(&spec.kind)
            .ok_or_else(|| Error::UnknownTransform {
                name: spec.kind.clone(),
            })?;
        builder(&spec.params)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn transform_err(transform: &str, message: impl Into<String>) -> Error {
    Error::Transform {
        transform: transform.to_string(),
        message: message.into(),
    }
}

/// Convert `YYYY`/`YY`/`MM`/`DD`/`HH`/`mm`/`ss` pattern tokens into a
/// chrono format string. Tokens are case-sensitive: `MM` is the month,
/// `mm` the minute.
fn to_chrono_format(pattern: &str) -> String {
    pattern
        .replace("YYYY", "%Y")
        .replace("YY", "%y")
        .replace("MM", "%m")
        .replace("DD", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

struct DateFormat {
    from: String,
    to: String,
    has_time: bool,
}

impl Transform for DateFormat {
    fn apply(&self, value: &Value) -> Result<Value> {
        let text = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(s) => s,
            other => {
                return Err(transform_err(
                    "date_format",
                    format!("expected a date string, got {}", other),
                ))
            }
        };

        let formatted = if self.has_time {
            NaiveDateTime::parse_from_str(text, &self.from)
                .map_err(|err| {
                    transform_err("date_format", format!("cannot parse '{}': {}", text, err))
                })?
                .format(&self.to)
                .to_string()
        } else {
            NaiveDate::parse_from_str(text, &self.from)
                .map_err(|err| {
                    transform_err("date_format", format!("cannot parse '{}': {}", text, err))
                })?
                .format(&self.to)
                .to_string()
        };
        Ok(Value::String(formatted))
    }
}

fn required_str(
    params: &serde_json::Map<String, Value>,
    transform: &str,
    name: &str,
) -> Result<String> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| transform_err(transform, format!("missing required parameter '{}'", name)))
}

fn build_date_format(params: &serde_json::Map<String, Value>) -> Result<Box<dyn Transform>> {
    let from = to_chrono_format(&required_str(params, "date_format", "from")?);
    let to = to_chrono_format(&required_str(params, "date_format", "to")?);
    let has_time = ["%H", "%M", "%S"].iter().any(|token| from.contains(token));
    Ok(Box::new(DateFormat { from, to, has_time }))
}

struct Multiply {
    factor: f64,
}

impl Transform for Multiply {
    fn apply(&self, value: &Value) -> Result<Value> {
        let input = match value {
            Value::Null => return Ok(Value::Null),
            Value::Number(n) => n.as_f64().ok_or_else(|| {
                transform_err("multiply", format!("value {} is not representable", n))
            })?,
            // Tabular sources deliver numbers as strings.
            Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                transform_err("multiply", format!("'{}' is not numeric", s))
            })?,
            other => {
                return Err(transform_err(
                    "multiply",
                    format!("expected a number, got {}", other),
                ))
            }
        };

        let product = input * self.factor;
        let number = if product.fract() == 0.0 && product.abs() < i64::MAX as f64 {
            serde_json::Number::from(product as i64)
        } else {
            serde_json::Number::from_f64(product).ok_or_else(|| {
                transform_err("multiply", format!("product {} is not representable", product))
            })?
        };
        Ok(Value::Number(number))
    }
}

fn build_multiply(params: &serde_json::Map<String, Value>) -> Result<Box<dyn Transform>> {
    let factor = params
        .get("factor")
        .and_then(Value::as_f64)
        .ok_or_else(|| transform_err("multiply", "missing numeric parameter 'factor'"))?;
    Ok(Box::new(Multiply { factor }))
}
