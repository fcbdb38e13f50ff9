//! File-based config discovery for CLI use
//!
//! Finds the project config file and merges it with defaults and the
//! environment. Priority: environment > config file > defaults.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};

use crate::config::ResolvedConfig;
use crate::error::{ConfigError, Result};
use crate::validation::validate_fs;

/// Config file names searched in the project root, in priority order.
pub const SETTINGS_FILE_NAMES: &[&str] = &["kiln.toml", "kiln.json"];

/// Prefix for environment overrides (`KILN_PROJECT`, `KILN_DEV__DEBOUNCE_MS`, ...).
pub const ENV_PREFIX: &str = "KILN_";

/// File-based configuration discovery
///
/// # Example
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// println!("building {}", config.project);
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
    file: Option<PathBuf>,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            file: None,
        }
    }

    /// Use an explicit settings file instead of searching the root
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Find the settings file: the explicit one, else the first of
    /// [`SETTINGS_FILE_NAMES`] present in the root.
    pub fn find(&self) -> Option<PathBuf> {
        if let Some(file) = &self.file {
            let file = if file.is_absolute() {
                file.clone()
            } else {
                self.root.join(file)
            };
            return Some(file);
        }

        SETTINGS_FILE_NAMES
            .iter()
            .map(|name| self.root.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Build the layered figment without extracting it.
    pub fn figment(&self) -> Result<Figment> {
        let mut figment =
            Figment::new().merge(Serialized::defaults(ResolvedConfig::new("", &self.root)));

        if let Some(path) = self.find() {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path));
            }

            tracing::debug!(path = %path.display(), "loading kiln settings");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(&path)),
                Some("json") => figment.merge(Json::file(&path)),
                other => {
                    return Err(ConfigError::UnsupportedFormat(
                        other.unwrap_or("<none>").to_string(),
                    ));
                }
            };
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load, resolve and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if an explicit file is missing, and
    /// validation errors for missing projects or task directories.
    pub fn load(&self) -> Result<ResolvedConfig> {
        let mut config: ResolvedConfig = self.figment()?.extract()?;
        if config.working_dir.as_os_str().is_empty() {
            config.working_dir = self.root.clone();
        } else if config.working_dir.is_relative() {
            config.working_dir = self.root.join(&config.working_dir);
        }

        let config = config.resolve();
        validate_fs(&config)?;
        Ok(config)
    }
}

/// Discover and load the configuration for the project rooted at `root`.
pub fn discover(root: impl AsRef<Path>) -> Result<ResolvedConfig> {
    let root = std::fs::canonicalize(root.as_ref())?;
    ConfigDiscovery::new(root).load()
}
