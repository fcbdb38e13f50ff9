//! Keeps configured packages out of the bundle and records them in the
//! manifest so the worker image can install them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{BuildContext, BuildExtension};
use crate::engine::{find_package, package_name};
use crate::manifest::{BuildExternal, BuildManifest};
use crate::plugins::{BundlerPlugin, PluginPhase, ResolveArgs, ResolveDecision};

/// Version recorded when neither the installed package nor the project's
/// `package.json` names one.
pub const UNKNOWN_VERSION: &str = "*";

/// Whether `package` matches one of `patterns`: an exact name, or a
/// `@scope/*` pattern covering every package in the scope.
pub fn matches_external(patterns: &[String], package: &str) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_suffix("/*") {
        Some(scope) => package
            .strip_prefix(scope)
            .is_some_and(|rest| rest.starts_with('/')),
        None => pattern == package,
    })
}

type Recorded = Arc<Mutex<BTreeMap<String, String>>>;

/// Extension marking `build.external` packages as runtime dependencies.
pub struct ExternalsExtension {
    patterns: Vec<String>,
    recorded: Recorded,
}

impl ExternalsExtension {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            patterns,
            recorded: Arc::default(),
        }
    }

    pub fn from_config(config: &kiln_config::ResolvedConfig) -> Self {
        Self::new(config.build.external.clone())
    }
}

#[async_trait]
impl BuildExtension for ExternalsExtension {
    fn name(&self) -> &str {
        "externals"
    }

    async fn on_build_start(&self, context: &mut BuildContext) -> anyhow::Result<()> {
        let plugin = ExternalsPlugin {
            patterns: self.patterns.clone(),
            working_dir: context.config().working_dir.clone(),
            recorded: self.recorded.clone(),
        };
        context.register_plugin(Arc::new(plugin));
        Ok(())
    }

    async fn on_build_complete(
        &self,
        _context: &BuildContext,
        mut manifest: BuildManifest,
    ) -> anyhow::Result<BuildManifest> {
        let recorded = self.recorded.lock().clone();
        for (name, version) in recorded {
            manifest.add_external(BuildExternal::new(name, version));
        }
        Ok(manifest)
    }
}

/// Resolve-phase plugin doing the classification for [`ExternalsExtension`].
pub struct ExternalsPlugin {
    patterns: Vec<String>,
    working_dir: std::path::PathBuf,
    recorded: Recorded,
}

#[async_trait]
impl BundlerPlugin for ExternalsPlugin {
    fn name(&self) -> &str {
        "externals"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Resolve
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        self.recorded.lock().clear();
        Ok(())
    }

    async fn resolve(&self, args: &ResolveArgs<'_>) -> anyhow::Result<ResolveDecision> {
        if args.specifier.starts_with("node:") {
            return Ok(ResolveDecision::External);
        }

        let package = package_name(args.specifier);
        if !matches_external(&self.patterns, package) {
            return Ok(ResolveDecision::Continue);
        }

        if !self.recorded.lock().contains_key(package) {
            let version = resolve_version(args.importer, &self.working_dir, package).await;
            self.recorded.lock().insert(package.to_string(), version);
        }
        Ok(ResolveDecision::External)
    }
}

#[derive(Deserialize)]
struct PackageJson {
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, String>,
}

async fn read_package_json(path: &Path) -> Option<PackageJson> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Installed version first, then the range the project depends on.
async fn resolve_version(importer: &Path, working_dir: &Path, package: &str) -> String {
    if let Some(dir) = find_package(importer, working_dir, package) {
        if let Some(version) = read_package_json(&dir.join("package.json"))
            .await
            .and_then(|p| p.version)
        {
            return version;
        }
    }

    if let Some(project) = read_package_json(&working_dir.join("package.json")).await {
        let range = [
            &project.dependencies,
            &project.optional_dependencies,
            &project.dev_dependencies,
        ]
        .into_iter()
        .find_map(|deps| deps.get(package).cloned());
        if let Some(range) = range {
            return range;
        }
    }

    tracing::warn!(package, "external package version unknown; recording '{}'", UNKNOWN_VERSION);
    UNKNOWN_VERSION.to_string()
}
