//! CLI command implementations

pub mod run;
pub mod sources;
pub mod validate;
