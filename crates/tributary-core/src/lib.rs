//! Tributary Core Library
//!
//! This crate provides the data model shared by the Tributary ingestion
//! pipeline:
//! - Source descriptor parsing and validation
//! - Transform registry and built-in transforms
//! - Field extraction into canonical rows
//! - Dot-path navigation over JSON values
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Descriptor  │────▶│  Extractor  │────▶│  Canonical  │
//! │   (JSON)    │     │ + Transforms│     │     Row     │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tributary_core::{Config, TransformRegistry};
//!
//! let registry = TransformRegistry::builtin();
//! let config = Config::load("./my-project")?;
//! let sources = config.load_sources(&registry)?;
//! for source in &sources.descriptors {
//!     println!("Source: {}", source.name);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod row;
pub mod transform;
pub mod value;

pub use config::Config;
pub use descriptor::{SourceDescriptor, SourceType};
pub use error::{Error, Result};
pub use extract::FieldExtractor;
pub use row::CanonicalRow;
pub use transform::TransformRegistry;
