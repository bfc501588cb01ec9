//! Tributary Storage Layer
//!
//! This crate owns everything persisted by the ingestion pipeline:
//! - The [`Store`] trait: sources, a dynamic-column data table, citations
//! - [`MemoryStore`] for development and tests
//! - [`PgStore`] backed by PostgreSQL via sqlx
//! - [`SchemaManager`]: additive, idempotent column registration
//! - [`ReconciliationEngine`]: identity-key matching, merge, provenance
//!
//! # Usage
//!
//! ```rust,ignore
//! use tributary_store::{MemoryStore, ReconciliationEngine, SchemaManager};
//!
//! let store = std::sync::Arc::new(MemoryStore::new());
//! SchemaManager::new(store.clone()).ensure_columns(&columns).await?;
//! let engine = ReconciliationEngine::new(store);
//! let data_id = engine.upsert(&row, source_id, &policy).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod recon;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use recon::{IdentityPolicy, ReconciliationEngine};
pub use schema::SchemaManager;
pub use store::{SourceRegistration, Store, StoredRow};
