//! Tributary Ingestion Engine
//!
//! Everything between a source descriptor and a stream of raw records:
//! - [`HttpClient`]: the transport seam, with a reqwest implementation
//! - [`AuthResolver`]: literal and chained credential resolution
//! - [`RateLimiter`]: rolling per-minute budgets plus server cooldowns
//! - [`PaginationDriver`]: cursor, offset, and page-number paging
//! - [`FetchEngine`]: lazily pulls API records page by page
//! - Dataset and import sources for tabular files
//! - [`Ingestor`]: drives every source through extraction into the store

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod error;
pub mod fetch;
pub mod http;
pub mod ingest;
pub mod limiter;
pub mod pagination;
pub mod source;
pub mod tabular;

pub use auth::AuthResolver;
pub use error::{Error, Result};
pub use fetch::FetchEngine;
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use ingest::{IngestReport, Ingestor};
pub use limiter::{LimiterRegistry, RateLimiter};
pub use pagination::{Advance, PaginationDriver};
pub use source::RecordSource;
pub use tabular::{DatasetSource, ImportSource};
