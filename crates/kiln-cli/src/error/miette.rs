//! Miette rendering for CLI errors.

use ::miette::{MietteDiagnostic, Report};
use kiln_config::ConfigError;

use crate::error::CliError;

/// Convert a [`CliError`] into a report for `main` to print.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        // The bundler error carries its own codes and help
        CliError::Bundler(e) => Report::new(e),
        CliError::Config(e) => config_error_to_miette(e),
        CliError::ProjectNotFound(path) => Report::new(
            MietteDiagnostic::new(format!("Project directory not found: {}", path.display()))
                .with_code("PROJECT_NOT_FOUND")
                .with_help("Pass an existing directory with --cwd"),
        ),
        other => Report::new(MietteDiagnostic::new(other.to_string()).with_code("CLI_ERROR")),
    }
}

fn config_error_to_miette(err: ConfigError) -> Report {
    let mut diagnostic =
        MietteDiagnostic::new(format!("Configuration error: {}", err)).with_code("CONFIG_ERROR");
    if let Some(hint) = err.hint() {
        diagnostic = diagnostic.with_help(hint);
    }
    Report::new(diagnostic)
}
