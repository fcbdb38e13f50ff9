//! The build manifest: a serializable description of one buildable worker.
//!
//! The worker runtime and deploy tooling consume this file; everything they
//! need to load the bundle (entry points, outputs, externals, environment)
//! lives here.

mod builder;

pub use builder::{ManifestBuilder, compute_content_hash, copy_manifest_to_dir};

use indexmap::IndexMap;
use kiln_config::ResolvedConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use kiln_config::{BuildRuntime, DEFAULT_RUNTIME};

use crate::{Error, Result};

/// Built-in worker entry used when the bundle has no custom one.
pub const DEV_ENTRY_POINT: &str = "@kiln/worker/entry-points/dev-run-worker.mjs";

/// Built-in telemetry loader used when the bundle has no custom one.
pub const TELEMETRY_LOADER: &str = "@kiln/worker/entry-points/loader.mjs";

/// File name used when a manifest is written next to its outputs.
pub const MANIFEST_FILE_NAME: &str = "build-manifest.json";

/// What the bundle is built for. Fixed for the lifetime of a build context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTarget {
    Dev,
    Deploy,
}

impl BuildTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTarget::Dev => "dev",
            BuildTarget::Deploy => "deploy",
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task module and the output it was bundled into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFile {
    /// Source path, relative to the project working directory
    pub entry: PathBuf,
    /// Absolute output path under the manifest's `outputPath`
    pub out: PathBuf,
}

/// A dependency left out of the bundle and installed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildExternal {
    pub name: String,
    pub version: String,
}

impl BuildExternal {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySection {
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
}

/// Canonical description of a buildable worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    pub target: BuildTarget,
    pub runtime: BuildRuntime,
    pub files: Vec<BuildFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub externals: Option<Vec<BuildExternal>>,
    pub config: ResolvedConfig,
    pub output_path: PathBuf,
    pub worker_entry_path: String,
    pub worker_fork_path: String,
    pub loader_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    pub deploy: DeploySection,
    pub build: BuildSection,
    /// blake3 over the output files, empty until computed
    #[serde(default)]
    pub content_hash: String,
}

impl BuildManifest {
    /// Output paths relative to `output_path`, in manifest order.
    pub fn relative_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|file| {
                file.out
                    .strip_prefix(&self.output_path)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| file.out.clone())
            })
            .collect()
    }

    /// Every file must live under `output_path` and exist on disk.
    pub fn verify_outputs(&self) -> Result<()> {
        for file in &self.files {
            if !file.out.starts_with(&self.output_path) || !file.out.is_file() {
                return Err(Error::MissingOutput(file.out.clone()));
            }
        }
        if let Some(config_path) = &self.config_path {
            if !config_path.is_file() {
                return Err(Error::MissingOutput(config_path.clone()));
            }
        }
        Ok(())
    }

    /// Add an external, replacing any existing entry with the same name.
    pub fn add_external(&mut self, external: BuildExternal) {
        let externals = self.externals.get_or_insert_with(Vec::new);
        externals.retain(|e| e.name != external.name);
        externals.push(external);
        externals.sort();
    }

    /// Append a build command, creating the list on first use.
    pub fn push_build_command(&mut self, command: impl Into<String>) {
        self.build
            .commands
            .get_or_insert_with(Vec::new)
            .push(command.into());
    }

    /// Write the manifest as pretty JSON into `dir`, returning the file path.
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    pub async fn read_from(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
