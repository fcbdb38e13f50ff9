//! Pluggable config validation strategies
//!
//! Separates filesystem validation (for CLI use) from schema validation (for library use).

use crate::config::ResolvedConfig;
use crate::error::{ConfigError, Result};

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    /// Validate a resolved configuration
    fn validate(&self, config: &ResolvedConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// # Example
///
/// ```
/// use kiln_config::{ConfigValidator, ResolvedConfig, SchemaValidator};
///
/// let config = ResolvedConfig::new("proj_123", "/project");
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &ResolvedConfig) -> Result<()> {
        if config.project.trim().is_empty() {
            return Err(ConfigError::MissingProject);
        }

        if config.dirs.is_empty() {
            return Err(ConfigError::NoTaskDirs);
        }

        for external in &config.build.external {
            if external.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "external package names cannot be empty".to_string(),
                    hint: Some("Remove empty strings from the 'build.external' array".to_string()),
                });
            }
        }

        if config.build.jsx.factory.trim().is_empty() {
            return Err(ConfigError::SchemaValidation {
                message: "jsx factory cannot be empty".to_string(),
                hint: Some("Use e.g. factory = \"React.createElement\"".to_string()),
            });
        }

        Ok(())
    }
}

/// Filesystem validator (for CLI use)
///
/// Validates that task directories and custom entry points exist on disk.
/// Expects a config that already went through [`ResolvedConfig::resolve`].
pub struct FsValidator;

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &ResolvedConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        for dir in config.task_dirs() {
            if !dir.is_dir() {
                return Err(ConfigError::TaskDirNotFound(dir));
            }
        }

        let entries = [
            config.config_file.as_ref(),
            config.build.entry_points.worker.as_ref(),
            config.build.entry_points.loader.as_ref(),
        ];
        for entry in entries.into_iter().flatten() {
            if !entry.is_file() {
                return Err(ConfigError::EntryNotFound(entry.clone()));
            }
        }

        Ok(())
    }
}

/// Validate without touching the filesystem.
pub fn validate_schema(config: &ResolvedConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

/// Validate schema and on-disk paths.
pub fn validate_fs(config: &ResolvedConfig) -> Result<()> {
    FsValidator.validate(config)
}
