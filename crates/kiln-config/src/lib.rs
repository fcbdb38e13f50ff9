//! # kiln-config
//!
//! Typed project configuration for kiln worker builds: the resolved values the
//! build pipeline consumes, plus discovery of `kiln.toml` / `kiln.json` files
//! layered with `KILN_*` environment overrides.

pub mod config;
pub mod discovery;
pub mod error;
pub mod validation;

// Re-export main types
pub use config::*;
pub use error::*;

// Re-export discovery and validation
pub use discovery::{ConfigDiscovery, discover};
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_fs, validate_schema};
