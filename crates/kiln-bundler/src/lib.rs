//! # kiln-bundler
//!
//! Kiln bundler - turns a project's task modules into a worker bundle and
//! describes it with a [`BuildManifest`].
//!
//! The pipeline is: a [`Bundler`] drives a [`BundleEngine`] (one-shot or in
//! watch mode), producing a [`BundleResult`]; a [`ManifestBuilder`] turns that
//! into a manifest, optionally copying the outputs into a dedicated worker
//! directory; and a [`BuildContext`] lets [`BuildExtension`]s register
//! bundler plugins and post-process every manifest.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kiln_bundler::{BuildTarget, BundleOptions, Bundler, ManifestBuilder, PluginRegistry, tmp_dir};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = kiln_config::discover(".")?;
//! let out = tmp_dir(&config.working_dir, "build", false)?;
//!
//! let outcome = Bundler::default()
//!     .build(BundleOptions::new(config.clone(), out.path()), PluginRegistry::new())
//!     .await?;
//!
//! if let Some(bundle) = outcome.bundle {
//!     let manifest = ManifestBuilder::new(BuildTarget::Deploy)
//!         .from_bundle(&bundle, out.path(), &config, None)
//!         .await?;
//!     println!("{} task files", manifest.files.len());
//! }
//! # Ok(()) }
//! ```

pub mod bundle;
pub mod diagnostics;
pub mod engine;
pub mod ephemeral;
pub mod extensions;
pub mod manifest;
pub mod plugins;
pub mod watcher;

pub use bundle::{
    BuildOutcome, BundleOptions, BundleResult, Bundler, StopHandle, WatchSource,
};
pub use diagnostics::{BuildDiagnostic, DiagnosticKind, DiagnosticSeverity};
pub use engine::{
    BundleEngine, EngineRequest, EntryPoint, OutputFile, OutputKind, RawBuildResult,
    StagingEngine, collect_entry_points,
};
pub use ephemeral::{EphemeralDirectory, tmp_dir};
pub use extensions::{
    BuildContext, BuildExtension, ExternalsExtension, Placement, SharedExtension,
};
pub use manifest::{
    BuildExternal, BuildFile, BuildManifest, BuildRuntime, BuildSection, BuildTarget,
    DEV_ENTRY_POINT, DeploySection, MANIFEST_FILE_NAME, ManifestBuilder, TELEMETRY_LOADER,
    copy_manifest_to_dir,
};
pub use plugins::{
    BundlerPlugin, ImportKind, PluginChain, PluginPhase, PluginRegistry, ResolveArgs,
    ResolveDecision, SharedPlugin,
};
pub use watcher::{FileChange, FileWatcher};

/// Error types for kiln-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A non-watch bundling pass reported errors.
    #[error("Build failed: {}", format_build_error(.errors))]
    Build {
        errors: Vec<BuildDiagnostic>,
        warnings: Vec<BuildDiagnostic>,
    },

    /// An extension's start or complete hook failed.
    #[error("Extension '{extension}' failed in {hook} hook: {source:#}")]
    ExtensionHook {
        extension: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The same extension was registered twice.
    #[error("Extension '{0}' is already registered")]
    DuplicateExtension(String),

    /// Turning a bundle into a manifest failed.
    #[error("Manifest update failed: {0}")]
    ManifestUpdate(String),

    /// A manifest names an output that is not on disk.
    #[error("Missing build output: {}", .0.display())]
    MissingOutput(std::path::PathBuf),

    /// The file watcher could not be started.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the config crate.
    #[error("Config error: {0}")]
    Config(#[from] kiln_config::ConfigError),
}

/// Result type alias for kiln-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a failing extension hook.
    pub fn extension_hook(extension: &str, hook: &'static str, source: anyhow::Error) -> Self {
        Error::ExtensionHook {
            extension: extension.to_string(),
            hook,
            source,
        }
    }

    /// Whether this error means a manifest could not be produced for an
    /// otherwise successful bundle.
    pub fn is_manifest_failure(&self) -> bool {
        matches!(
            self,
            Error::ManifestUpdate(_) | Error::MissingOutput(_) | Error::Io(_) | Error::Json(_)
        )
    }
}

fn format_build_error(errors: &[BuildDiagnostic]) -> String {
    match errors {
        [] => "Unknown build error".to_string(),
        [single] => single.to_string(),
        many => format!(
            "{} errors: {}",
            many.len(),
            many.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Build { .. } => "BUILD_ERROR",
            Error::ExtensionHook { .. } => "EXTENSION_ERROR",
            Error::DuplicateExtension(_) => "DUPLICATE_EXTENSION",
            Error::ManifestUpdate(_) => "MANIFEST_UPDATE_FAILURE",
            Error::MissingOutput(_) => "MISSING_OUTPUT",
            Error::Watch(_) => "WATCH_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Build { errors, .. } if errors.len() > 1 => Some(Box::new(
                "Multiple build errors occurred. Fix the first one and rebuild.".to_string(),
            )),
            Error::ExtensionHook { extension, .. } => Some(Box::new(format!(
                "The '{}' extension is configured in your project settings. Check its options or remove it.",
                extension
            ))),
            Error::DuplicateExtension(name) => Some(Box::new(format!(
                "Register '{}' once; extensions run for every build pass.",
                name
            ))),
            Error::MissingOutput(path) => Some(Box::new(format!(
                "'{}' was expected in the build output. Another process may have removed the temporary build directory.",
                path.display()
            ))),
            Error::Watch(_) => Some(Box::new(
                "The file watcher could not start. On Linux, check fs.inotify.max_user_watches."
                    .to_string(),
            )),
            Error::Config(err) => err.hint().map(|h| Box::new(h) as Box<dyn std::fmt::Display>),
            _ => None,
        }
    }
}
