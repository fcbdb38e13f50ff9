//! Resolved project configuration consumed by the build pipeline.
//!
//! A `ResolvedConfig` is what remains after discovery, merging and path
//! resolution: every path in it is absolute and rooted at `working_dir`.

use indexmap::IndexMap;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Runtime used when the project does not pick one.
pub const DEFAULT_RUNTIME: BuildRuntime = BuildRuntime::Node;

/// User config modules picked up as the config entry point, in priority order.
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "kiln.config.ts",
    "kiln.config.mts",
    "kiln.config.js",
    "kiln.config.mjs",
];

/// Directory (relative to the working dir) holding kiln's own scratch state.
pub const KILN_DIR: &str = ".kiln";

/// JavaScript runtime the worker bundle targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildRuntime {
    #[default]
    Node,
    Bun,
}

impl BuildRuntime {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildRuntime::Node => "node",
            BuildRuntime::Bun => "bun",
        }
    }
}

impl fmt::Display for BuildRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildRuntime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node" => Ok(BuildRuntime::Node),
            "bun" => Ok(BuildRuntime::Bun),
            other => Err(format!("Invalid runtime: {}", other)),
        }
    }
}

/// Fully resolved project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Project reference the worker is deployed under
    #[serde(default)]
    pub project: String,

    /// Project root; all relative paths resolve against it
    #[serde(default)]
    pub working_dir: PathBuf,

    /// Directories containing task modules
    #[serde(default = "default_dirs")]
    pub dirs: Vec<PathBuf>,

    /// Runtime override (defaults to [`DEFAULT_RUNTIME`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<BuildRuntime>,

    /// User config module bundled as the config entry point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub dev: DevSettings,
}

impl ResolvedConfig {
    /// Configuration with defaults for a project rooted at `working_dir`.
    pub fn new(project: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            working_dir: working_dir.into(),
            dirs: default_dirs(),
            runtime: None,
            config_file: None,
            build: BuildSettings::default(),
            dev: DevSettings::default(),
        }
    }

    /// The configured runtime, falling back to [`DEFAULT_RUNTIME`].
    pub fn runtime(&self) -> BuildRuntime {
        self.runtime.unwrap_or(DEFAULT_RUNTIME)
    }

    /// Resolve a possibly relative path against the working directory.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf().clean()
        } else {
            self.working_dir.join(path).clean()
        }
    }

    /// Absolute task directories.
    pub fn task_dirs(&self) -> Vec<PathBuf> {
        self.dirs.iter().map(|dir| self.resolve_path(dir)).collect()
    }

    /// Whether `path` is a task module: inside a task dir, not a dependency
    /// and not kiln's own scratch space.
    pub fn is_task_file(&self, path: &Path) -> bool {
        let excluded = path
            .components()
            .any(|c| c.as_os_str() == "node_modules" || c.as_os_str() == KILN_DIR);
        !excluded && self.task_dirs().iter().any(|dir| path.starts_with(dir))
    }

    /// Root under which ephemeral build directories are allocated.
    pub fn tmp_root(&self) -> PathBuf {
        self.working_dir.join(KILN_DIR).join("tmp")
    }

    /// Make every path absolute and pick up a conventional config module.
    pub fn resolve(mut self) -> Self {
        self.working_dir = self.working_dir.clean();
        self.dirs = self.task_dirs();
        self.config_file = self.config_file.take().map(|p| self.resolve_path(p));
        if self.config_file.is_none() {
            self.config_file = self.detect_config_file();
        }
        self.build.entry_points.worker = self
            .build
            .entry_points
            .worker
            .take()
            .map(|p| self.resolve_path(p));
        self.build.entry_points.loader = self
            .build
            .entry_points
            .loader
            .take()
            .map(|p| self.resolve_path(p));
        self
    }

    /// First of [`CONFIG_FILE_NAMES`] present in the working directory.
    pub fn detect_config_file(&self) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.working_dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

/// Settings that shape the bundle itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSettings {
    #[serde(default)]
    pub jsx: JsxOptions,

    /// Packages left as runtime imports instead of being inlined
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external: Vec<String>,

    #[serde(default)]
    pub entry_points: EntryPointSettings,

    /// Environment exposed to build commands
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Commands run by deploy tooling before the image is built
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
}

/// JSX transform settings handed to the bundling engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsxOptions {
    #[serde(default = "default_jsx_factory")]
    pub factory: String,

    #[serde(default = "default_jsx_fragment")]
    pub fragment: String,

    #[serde(default = "default_jsx_automatic")]
    pub automatic: bool,
}

impl Default for JsxOptions {
    fn default() -> Self {
        Self {
            factory: default_jsx_factory(),
            fragment: default_jsx_fragment(),
            automatic: default_jsx_automatic(),
        }
    }
}

/// Custom entry points replacing the built-in worker shims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<PathBuf>,
}

/// Dev-session behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevSettings {
    /// Quiet period used to coalesce bursts of file changes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Path patterns the watcher ignores (`node_modules`, `*.log`, ...)
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// Leave ephemeral build directories on disk for debugging
    #[serde(default)]
    pub keep_tmp_dirs: bool,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ignore: default_ignore(),
            keep_tmp_dirs: false,
        }
    }
}

pub fn default_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("src/tasks")]
}

pub fn default_jsx_factory() -> String {
    "React.createElement".to_string()
}

pub fn default_jsx_fragment() -> String {
    "React.Fragment".to_string()
}

pub fn default_jsx_automatic() -> bool {
    true
}

pub fn default_debounce_ms() -> u64 {
    100
}

pub fn default_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        KILN_DIR.to_string(),
        ".git".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_default_and_parse() {
        let config = ResolvedConfig::new("proj_123", "/project");
        assert_eq!(config.runtime(), BuildRuntime::Node);
        assert_eq!("BUN".parse::<BuildRuntime>().unwrap(), BuildRuntime::Bun);
        assert!("deno".parse::<BuildRuntime>().is_err());
        assert_eq!(BuildRuntime::Bun.to_string(), "bun");
    }

    #[test]
    fn test_resolve_makes_paths_absolute() {
        let mut config = ResolvedConfig::new("proj_123", "/project");
        config.dirs = vec![PathBuf::from("./jobs"), PathBuf::from("/abs/tasks")];
        config.config_file = Some(PathBuf::from("kiln.config.ts"));
        config.build.entry_points.loader = Some(PathBuf::from("src/../loader.mjs"));

        let resolved = config.resolve();
        assert_eq!(
            resolved.dirs,
            vec![PathBuf::from("/project/jobs"), PathBuf::from("/abs/tasks")]
        );
        assert_eq!(
            resolved.config_file,
            Some(PathBuf::from("/project/kiln.config.ts"))
        );
        assert_eq!(
            resolved.build.entry_points.loader,
            Some(PathBuf::from("/project/loader.mjs"))
        );
    }

    #[test]
    fn test_is_task_file() {
        let config = ResolvedConfig::new("proj_123", "/project");
        assert!(config.is_task_file(Path::new("/project/src/tasks/email.ts")));
        assert!(!config.is_task_file(Path::new("/project/src/lib/email.ts")));
        assert!(!config.is_task_file(Path::new(
            "/project/src/tasks/node_modules/pkg/index.js"
        )));
    }

    #[test]
    fn test_is_task_file_skips_kiln_dir() {
        let mut config = ResolvedConfig::new("proj_123", "/project");
        config.dirs = vec![PathBuf::from(".")];
        assert!(config.is_task_file(Path::new("/project/a.ts")));
        assert!(!config.is_task_file(Path::new("/project/.kiln/tmp/build-x/a.ts")));
    }

    #[test]
    fn test_tmp_root_under_kiln_dir() {
        let config = ResolvedConfig::new("proj_123", "/project");
        assert_eq!(config.tmp_root(), PathBuf::from("/project/.kiln/tmp"));
    }

    #[test]
    fn test_jsx_defaults() {
        let jsx = JsxOptions::default();
        assert_eq!(jsx.factory, "React.createElement");
        assert_eq!(jsx.fragment, "React.Fragment");
        assert!(jsx.automatic);
    }
}
