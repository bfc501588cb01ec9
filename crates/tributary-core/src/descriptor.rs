//! Source descriptors
//!
//! A source descriptor declares everything needed to ingest one source:
//! where records come from (endpoint or local folder), how raw fields map
//! into canonical columns, pagination and rate-limit behavior, and which
//! columns identify a record during reconciliation.
//!
//! Descriptors are loaded from JSON files and are immutable for the
//! duration of a run. All structural validation happens here, at load time,
//! so a malformed descriptor disables its source without touching others.
//!
//! # Example
//!
//! ```json
//! {
//!   "endpoint": "https://api.example.com/licenses",
//!   "records_path": "data.items",
//!   "column_map": {
//!     "license_number": "license.number",
//!     "fee_dollars": {"key": "fee_cents", "transform": {"type": "multiply", "factor": 0.01}}
//!   },
//!   "pagination": {"skip_records_param": "offset", "batch_size": 100, "total_records_key": "meta.total"},
//!   "rate_limit": {"requests_per_minute": 30},
//!   "unique_keys": ["license_number"]
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::transform::TransformRegistry;

static COLUMN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid column-name regex"));

/// Category of a data source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Live paginated API
    #[default]
    Api,
    /// Static tabular files on disk
    Dataset,
    /// Bulk-download import (one fetched file)
    Import,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Api => write!(f, "api"),
            SourceType::Dataset => write!(f, "dataset"),
            SourceType::Import => write!(f, "import"),
        }
    }
}

/// A string-valued configuration field that may be an auth chain
///
/// Plain strings resolve to themselves (after `env[NAME]` substitution).
/// A sequence mixes literal fragments with sub-requests whose extracted
/// tokens are concatenated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthValue {
    /// Literal string (may contain `env[NAME]` placeholders)
    Literal(String),
    /// Ordered sequence of literals and token-producing sub-requests
    Chain(Vec<AuthPart>),
}

impl AuthValue {
    /// Construct a literal value
    pub fn literal(s: impl Into<String>) -> Self {
        AuthValue::Literal(s.into())
    }
}

/// One element of an [`AuthValue::Chain`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthPart {
    /// Literal fragment
    Literal(String),
    /// Nested request producing a token
    Request(SubRequest),
}

/// A nested fetch issued while resolving an auth chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubRequest {
    /// Request URL (itself resolvable, so chains may nest)
    pub endpoint: AuthValue,

    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, AuthValue>,

    /// Request body
    #[serde(default)]
    pub body: Option<AuthValue>,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Dot-path locating the token in the response; absent means the whole
    /// response body is the token
    #[serde(default)]
    pub token_key: Option<String>,
}

pub(crate) fn default_method() -> String {
    "GET".to_string()
}

/// Reference to a field in a raw record: a dot-path for object records or a
/// positional index for array records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SourceRef {
    /// Positional index into an array-form record
    Index(usize),
    /// Dot-path into an object-form record
    Path(String),
}

/// Transform invocation from a column_map entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSpec {
    /// Transform type name, resolved against the registry
    #[serde(rename = "type")]
    pub kind: String,

    /// Remaining parameters, interpreted by the transform builder
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// How one destination column is produced from a raw record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionSpec {
    /// Bare key, dot-path, or positional index
    Direct(SourceRef),

    /// Key/column reference plus an optional transform
    Detailed {
        /// Source field reference (`key` and `column` are synonyms)
        #[serde(alias = "column")]
        key: SourceRef,
        /// Transform applied to the extracted value
        #[serde(default)]
        transform: Option<TransformSpec>,
    },
}

impl ExtractionSpec {
    /// The source field reference of this spec
    pub fn source(&self) -> &SourceRef {
        match self {
            ExtractionSpec::Direct(r) => r,
            ExtractionSpec::Detailed { key, .. } => key,
        }
    }

    /// The transform of this spec, if any
    pub fn transform(&self) -> Option<&TransformSpec> {
        match self {
            ExtractionSpec::Direct(_) => None,
            ExtractionSpec::Detailed { transform, .. } => transform.as_ref(),
        }
    }
}

/// Pagination configuration for API sources
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PaginationConfig {
    /// Dot-path to the next-page cursor URL in the response
    #[serde(default)]
    pub next_page_url: Option<String>,

    /// Dot-path to the total record count in the response
    #[serde(default)]
    pub total_records_key: Option<String>,

    /// Query parameter carrying a 1-based page number
    #[serde(default)]
    pub page_num_param: Option<String>,

    /// Query parameter carrying the number of records to skip
    #[serde(default)]
    pub skip_records_param: Option<String>,

    /// Expected page size; a shorter page ends offset/page pagination
    #[serde(default)]
    pub batch_size: Option<u64>,

    /// Starting offset for APIs that count from 1 instead of 0
    #[serde(default)]
    pub initial_offset: u64,
}

impl PaginationConfig {
    /// Whether offset or page-number pagination is configured
    pub fn uses_params(&self) -> bool {
        self.page_num_param.is_some() || self.skip_records_param.is_some()
    }
}

/// Rate-limit configuration for a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Rolling-window budget
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Response header carrying a server-signaled retry delay in seconds
    #[serde(default = "default_retry_after_header")]
    pub retry_after_header: String,

    /// Sources naming the same key draw on one shared limiter
    #[serde(default)]
    pub shared_limit_key: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            retry_after_header: default_retry_after_header(),
            shared_limit_key: None,
        }
    }
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_retry_after_header() -> String {
    "retry-after".to_string()
}

/// A fully-loaded source descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source name, derived from the descriptor file or folder
    #[serde(skip)]
    pub name: String,

    /// Source category, derived from the descriptor's directory
    #[serde(skip)]
    pub source_type: SourceType,

    /// Path of the descriptor file this source was loaded from
    #[serde(skip)]
    pub config_path: String,

    /// Folder holding the data files of a dataset source
    #[serde(skip)]
    pub folder: Option<PathBuf>,

    /// Request URL (api and import sources)
    #[serde(default)]
    pub endpoint: Option<AuthValue>,

    /// Request headers
    #[serde(default)]
    pub headers: BTreeMap<String, AuthValue>,

    /// Request body
    #[serde(default)]
    pub body: Option<AuthValue>,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Dot-path locating the record array inside an API response body
    #[serde(default)]
    pub records_path: Option<String>,

    /// Destination column → extraction spec
    pub column_map: BTreeMap<String, ExtractionSpec>,

    /// Pagination behavior (api sources)
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,

    /// Rate-limit budget for this source
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Identity columns for reconciliation; empty means all non-null fields
    #[serde(default)]
    pub unique_keys: Vec<String>,

    /// Whether tabular files carry a header row
    #[serde(default)]
    pub has_header: bool,

    /// Field delimiter for tabular files (defaults by file extension)
    #[serde(default)]
    pub delimiter: Option<char>,

    /// Explicit data file names inside a dataset folder
    #[serde(default)]
    pub file_names: Vec<String>,

    /// Regex patterns selecting data files inside a dataset folder
    #[serde(default)]
    pub file_patterns: Vec<String>,
}

impl SourceDescriptor {
    /// Destination columns declared by this source, in stable order
    pub fn destination_columns(&self) -> Vec<String> {
        self.column_map.keys().cloned().collect()
    }

    /// Validate the descriptor against the transform registry.
    ///
    /// Fails on: missing endpoint for api/import sources, destination
    /// columns that are not valid identifiers, unique keys not present in
    /// the column map, conflicting pagination signals, and transforms that
    /// are unknown or misconfigured. A failed source never aborts others.
    pub fn validate(&self, registry: &TransformRegistry) -> Result<()> {
        let fail = |message: String| {
            Err(Error::InvalidDescriptor {
                name: self.name.clone(),
                message,
            })
        };

        match self.source_type {
            SourceType::Api | SourceType::Import => {
                if self.endpoint.is_none() {
                    return fail("missing required field 'endpoint'".to_string());
                }
            }
            SourceType::Dataset => {
                if self.folder.is_none() {
                    return fail("dataset source has no data folder".to_string());
                }
            }
        }

        if self.column_map.is_empty() {
            return fail("column_map must not be empty".to_string());
        }

        for column in self.column_map.keys() {
            if !COLUMN_NAME.is_match(column) {
                return fail(format!("destination column '{}' is not a valid identifier", column));
            }
        }

        for key in &self.unique_keys {
            if !self.column_map.contains_key(key) {
                return fail(format!("unique key '{}' is not a mapped column", key));
            }
        }

        if let Some(pagination) = &self.pagination {
            if pagination.next_page_url.is_some() && pagination.uses_params() {
                return fail(
                    "pagination may use either next_page_url or offset/page parameters, not both"
                        .to_string(),
                );
            }
            if pagination.page_num_param.is_some() && pagination.skip_records_param.is_some() {
                return fail(
                    "pagination may use either page_num_param or skip_records_param, not both"
                        .to_string(),
                );
            }
            if pagination.skip_records_param.is_some() && pagination.batch_size.is_none() {
                return fail("skip_records_param requires batch_size".to_string());
            }
        }

        for pattern in &self.file_patterns {
            if let Err(err) = Regex::new(pattern) {
                return fail(format!("invalid file pattern '{}': {}", pattern, err));
            }
        }

        // Build every declared transform so unknown types and bad
        // parameters surface at load time, not per record.
        for (column, spec) in &self.column_map {
            if let Some(transform) = spec.transform() {
                registry.build(transform).map_err(|err| Error::InvalidDescriptor {
                    name: self.name.clone(),
                    message: format!("column '{}': {}", column, err),
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor_from_json(value: serde_json::Value) -> SourceDescriptor {
        let mut descriptor: SourceDescriptor = serde_json::from_value(value).unwrap();
        descriptor.name = "test_source".to_string();
        descriptor
    }

    #[test]
    fn test_parse_minimal_api_descriptor() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "column_map": {"license_number": "license.number"}
        }));
        assert_eq!(descriptor.method, "GET");
        assert_eq!(descriptor.rate_limit.requests_per_minute, 60);
        assert_eq!(descriptor.rate_limit.retry_after_header, "retry-after");
        match descriptor.column_map["license_number"].source() {
            SourceRef::Path(p) => assert_eq!(p, "license.number"),
            other => panic!("Expected path reference, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_positional_column_map() {
        let descriptor = descriptor_from_json(json!({
            "column_map": {"name": 0, "address": {"column": 2, "transform": null}}
        }));
        assert_eq!(descriptor.column_map["name"].source(), &SourceRef::Index(0));
        assert_eq!(descriptor.column_map["address"].source(), &SourceRef::Index(2));
    }

    #[test]
    fn test_parse_transform_spec() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "column_map": {
                "fee": {"key": "fee_cents", "transform": {"type": "multiply", "factor": 0.01}}
            }
        }));
        let transform = descriptor.column_map["fee"].transform().unwrap();
        assert_eq!(transform.kind, "multiply");
        assert_eq!(transform.params["factor"], json!(0.01));
    }

    #[test]
    fn test_parse_auth_chain_header() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "headers": {
                "authorization": [
                    "Bearer ",
                    {"endpoint": "https://auth.example.com/token", "token_key": "access_token"}
                ]
            },
            "column_map": {"id": "id"}
        }));
        match &descriptor.headers["authorization"] {
            AuthValue::Chain(parts) => {
                assert_eq!(parts.len(), 2);
                match &parts[1] {
                    AuthPart::Request(req) => {
                        assert_eq!(req.method, "GET");
                        assert_eq!(req.token_key.as_deref(), Some("access_token"));
                    }
                    other => panic!("Expected sub-request, got {:?}", other),
                }
            }
            other => panic!("Expected chain, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_requires_endpoint_for_api() {
        let descriptor = descriptor_from_json(json!({
            "column_map": {"id": "id"}
        }));
        let registry = TransformRegistry::builtin();
        let err = descriptor.validate(&registry).unwrap_err();
        assert!(err.to_string().contains("endpoint"));
        assert!(err.to_string().contains("test_source"));
    }

    #[test]
    fn test_validate_rejects_bad_column_name() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "column_map": {"bad-name": "x"}
        }));
        let registry = TransformRegistry::builtin();
        let err = descriptor.validate(&registry).unwrap_err();
        assert!(err.to_string().contains("bad-name"));
    }

    #[test]
    fn test_validate_rejects_unknown_unique_key() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "column_map": {"id": "id"},
            "unique_keys": ["license_number"]
        }));
        let registry = TransformRegistry::builtin();
        let err = descriptor.validate(&registry).unwrap_err();
        assert!(err.to_string().contains("license_number"));
    }

    #[test]
    fn test_validate_rejects_conflicting_pagination() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "column_map": {"id": "id"},
            "pagination": {
                "next_page_url": "links.next",
                "skip_records_param": "offset",
                "batch_size": 100
            }
        }));
        let registry = TransformRegistry::builtin();
        let err = descriptor.validate(&registry).unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn test_validate_rejects_unknown_transform() {
        let descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "column_map": {
                "id": {"key": "id", "transform": {"type": "uppercase"}}
            }
        }));
        let registry = TransformRegistry::builtin();
        let err = descriptor.validate(&registry).unwrap_err();
        assert!(err.to_string().contains("uppercase"));
    }

    #[test]
    fn test_validate_accepts_well_formed_descriptor() {
        let mut descriptor = descriptor_from_json(json!({
            "endpoint": "https://api.example.com/data",
            "records_path": "data.items",
            "column_map": {
                "license_number": "license.number",
                "issued": {"key": "issued", "transform": {
                    "type": "date_format", "from": "MM/DD/YYYY", "to": "YYYY-MM-DD"
                }}
            },
            "pagination": {"skip_records_param": "offset", "batch_size": 2, "total_records_key": "meta.total"},
            "unique_keys": ["license_number"]
        }));
        descriptor.source_type = SourceType::Api;
        let registry = TransformRegistry::builtin();
        descriptor.validate(&registry).unwrap();
    }
}
