//! Command implementations.
//!
//! - [`build`] - one-shot deploy build
//! - [`dev`] - watch-mode dev session
//!
//! Each command exposes an `execute` function taking its parsed arguments.

pub mod build;
pub mod dev;
pub(crate) mod utils;

pub use build::execute as build_execute;
pub use dev::execute as dev_execute;
