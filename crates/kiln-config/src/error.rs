//! Error types for configuration validation and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // Filesystem validation errors (for CLI use)
    #[error("task directory not found: {}", .0.display())]
    TaskDirNotFound(PathBuf),

    #[error("entry point not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    // Config parsing/loading errors
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    // Schema validation errors (no filesystem checks)
    #[error("no project reference configured")]
    MissingProject,

    #[error("no task directories configured")]
    NoTaskDirs,

    #[error("schema validation failed: {message}")]
    SchemaValidation {
        message: String,
        hint: Option<String>,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Actionable hint for the user, when one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            ConfigError::MissingProject => Some(
                "Set `project` in kiln.toml or export KILN_PROJECT=<project ref>".to_string(),
            ),
            ConfigError::NoTaskDirs => {
                Some("Add at least one directory to `dirs`, e.g. dirs = [\"src/tasks\"]".to_string())
            }
            ConfigError::TaskDirNotFound(path) => Some(format!(
                "Create {} or point `dirs` at an existing directory",
                path.display()
            )),
            ConfigError::SchemaValidation { hint, .. } => hint.clone(),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::InvalidValue(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_dir_not_found_message() {
        let err = ConfigError::TaskDirNotFound(PathBuf::from("src/tasks"));
        assert!(err.to_string().contains("src/tasks"));
        assert!(err.hint().is_some());
    }

    #[test]
    fn test_schema_validation_hint_passthrough() {
        let err = ConfigError::SchemaValidation {
            message: "bad".to_string(),
            hint: Some("fix it".to_string()),
        };
        assert_eq!(err.hint().as_deref(), Some("fix it"));
        assert!(ConfigError::InvalidValue("x".into()).hint().is_none());
    }
}
