//! Error handling for the kiln CLI.
//!
//! [`CliError`] wraps the library errors via `From`, so commands can use `?`
//! throughout. `main` renders the final error with [`cli_error_to_miette`].

mod miette;

use std::path::PathBuf;

use thiserror::Error;

pub use self::miette::cli_error_to_miette;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading or validating project settings failed
    #[error("Configuration error: {0}")]
    Config(#[from] kiln_config::ConfigError),

    /// Bundling, extensions or manifest handling failed
    #[error(transparent)]
    Bundler(#[from] kiln_bundler::Error),

    /// The project directory given with `--cwd` does not exist
    #[error("Project directory not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Attach context to fallible results.
pub trait ResultExt<T> {
    /// Turn a "not found" I/O error into [`CliError::ProjectNotFound`].
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                CliError::ProjectNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}
