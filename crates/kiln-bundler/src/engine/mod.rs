//! Bundling engines.
//!
//! An engine takes the project's entry points and writes one pass of
//! outputs into an output directory. It never fails outright: problems are
//! reported as diagnostics on the [`RawBuildResult`] so the build owner can
//! decide what a failed pass means.

mod scan;
mod staging;

pub use scan::{ImportRef, is_bare, package_name, scan_imports};
pub use staging::{StagingEngine, is_node_builtin};
pub(crate) use staging::find_package;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kiln_config::ResolvedConfig;

use crate::diagnostics::{BuildDiagnostic, DiagnosticKind};
use crate::plugins::PluginChain;

/// Source extensions the engine bundles, in probe order.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "js", "jsx", "mjs", "cjs"];

/// Role of an entry point or output within the worker bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// A task module from one of the task directories
    Task,
    /// The user's config module
    Config,
    /// Custom worker entry point
    Worker,
    /// Custom telemetry loader
    Loader,
    /// A module reached only through imports
    Chunk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub kind: OutputKind,
    pub path: PathBuf,
}

/// One file written by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub kind: OutputKind,
    /// Absolute source path the output was produced from
    pub source: PathBuf,
    /// Absolute output path
    pub path: PathBuf,
}

/// Everything one bundling pass produced.
#[derive(Debug, Clone, Default)]
pub struct RawBuildResult {
    pub working_dir: PathBuf,
    pub out_dir: PathBuf,
    pub outputs: Vec<OutputFile>,
    pub errors: Vec<BuildDiagnostic>,
    pub warnings: Vec<BuildDiagnostic>,
}

impl RawBuildResult {
    /// A pass that produced nothing but errors.
    pub fn failed(working_dir: &Path, out_dir: &Path, errors: Vec<BuildDiagnostic>) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            out_dir: out_dir.to_path_buf(),
            outputs: Vec::new(),
            errors,
            warnings: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn outputs_of(&self, kind: OutputKind) -> impl Iterator<Item = &OutputFile> {
        self.outputs.iter().filter(move |o| o.kind == kind)
    }
}

/// Inputs to a single pass.
///
/// Compile settings travel on `config`: an engine that transforms sources
/// takes JSX handling from `config.build.jsx` and the target runtime from
/// `config.runtime()`.
pub struct EngineRequest<'a> {
    pub config: &'a ResolvedConfig,
    pub out_dir: &'a Path,
    pub entries: &'a [EntryPoint],
    pub plugins: &'a PluginChain,
}

#[async_trait]
pub trait BundleEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Run one pass, writing outputs under `request.out_dir`.
    async fn bundle(&self, request: EngineRequest<'_>) -> RawBuildResult;
}

/// Entry points for `config`: every task module, then the config module and
/// any custom worker entry points.
///
/// Task modules are source files under the task directories, excluding
/// declaration files and `*.test.*` / `*.spec.*` files. Outputs never feed
/// back in: `.kiln` and `out_dir` are skipped even when a task dir contains
/// them. Missing task directories are reported as diagnostics.
pub fn collect_entry_points(
    config: &ResolvedConfig,
    out_dir: &Path,
) -> (Vec<EntryPoint>, Vec<BuildDiagnostic>) {
    let mut entries = Vec::new();
    let mut errors = Vec::new();
    let out_dir = config.resolve_path(out_dir);

    for dir in config.task_dirs() {
        if !dir.is_dir() {
            errors.push(BuildDiagnostic::error(
                DiagnosticKind::UnresolvedEntry,
                format!("Task directory not found: {}", dir.display()),
            ));
            continue;
        }

        // Only an out dir nested inside the task dir is pruned
        let skip_out = out_dir.starts_with(&dir) && out_dir != dir;
        let mut tasks: Vec<PathBuf> = walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_entry(|e| !(skip_out && e.path().starts_with(&out_dir)))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| config.is_task_file(p) && is_task_module(p))
            .collect();
        tasks.sort();
        entries.extend(tasks.into_iter().map(|path| EntryPoint {
            kind: OutputKind::Task,
            path,
        }));
    }

    let extras = [
        (OutputKind::Config, config.config_file.as_ref()),
        (OutputKind::Worker, config.build.entry_points.worker.as_ref()),
        (OutputKind::Loader, config.build.entry_points.loader.as_ref()),
    ];
    for (kind, path) in extras {
        if let Some(path) = path {
            entries.push(EntryPoint {
                kind,
                path: config.resolve_path(path),
            });
        }
    }

    (entries, errors)
}

fn is_task_module(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.ends_with(".d.ts") || name.contains(".test.") || name.contains(".spec.") {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
