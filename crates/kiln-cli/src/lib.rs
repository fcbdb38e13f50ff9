//! Kiln CLI - builds worker bundles and runs watch-mode dev sessions.
//!
//! # Architecture
//!
//! - [`cli`] - clap argument definitions
//! - [`commands`] - `kiln build` and `kiln dev`
//! - [`dev`] - the dev session orchestrator that keeps a build manifest
//!   current while sources change
//! - [`error`] - CLI errors and their miette rendering
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - terminal status lines
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::dev::{DevSessionOptions, start_dev_session};
//!
//! # async fn run() -> kiln_cli::Result<()> {
//! let config = kiln_config::discover(".")?;
//! let session = start_dev_session(DevSessionOptions::new(config)).await?;
//!
//! if let Some(manifest) = session.manifest() {
//!     println!("{} task files", manifest.files.len());
//! }
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
