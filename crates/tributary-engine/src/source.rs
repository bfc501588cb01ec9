//! Record sources

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A lazy sequence of raw records.
///
/// Implementations pull pages or files on demand; the ingestor never holds
/// more than one page of records at a time.
#[async_trait]
pub trait RecordSource: Send {
    /// The next raw record, or `None` when the source is exhausted
    async fn next_record(&mut self) -> Result<Option<Value>>;
}
