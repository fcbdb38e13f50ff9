use std::path::{Path, PathBuf};

use kiln_config::ResolvedConfig;

use super::{
    BuildManifest, BuildSection, BuildTarget, DEV_ENTRY_POINT, DeploySection, TELEMETRY_LOADER,
};
use crate::bundle::BundleResult;
use crate::{Error, Result};

/// Turns bundle results into manifests for a fixed target.
#[derive(Debug, Clone, Copy)]
pub struct ManifestBuilder {
    target: BuildTarget,
}

impl ManifestBuilder {
    pub fn new(target: BuildTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> BuildTarget {
        self.target
    }

    /// Build a manifest describing `bundle`, whose outputs live in `destination`.
    ///
    /// With a `worker_dir`, the whole destination tree is copied there and the
    /// manifest is rewritten to point at the copy. Every output is checked to
    /// exist before the manifest is returned, and the content hash is filled
    /// in last.
    pub async fn from_bundle(
        &self,
        bundle: &BundleResult,
        destination: &Path,
        config: &ResolvedConfig,
        worker_dir: Option<&Path>,
    ) -> Result<BuildManifest> {
        let mut manifest = BuildManifest {
            target: self.target,
            runtime: config.runtime(),
            files: bundle.files.clone(),
            externals: Some(Vec::new()),
            config: config.clone(),
            output_path: destination.to_path_buf(),
            worker_entry_path: entry_or(&bundle.worker_dev_path, DEV_ENTRY_POINT),
            worker_fork_path: entry_or(&bundle.worker_dev_path, DEV_ENTRY_POINT),
            loader_path: entry_or(&bundle.loader_path, TELEMETRY_LOADER),
            config_path: bundle.config_path.clone(),
            deploy: DeploySection::default(),
            build: self.build_section(config),
            content_hash: String::new(),
        };

        if let Some(worker_dir) = worker_dir {
            manifest = copy_manifest_to_dir(manifest, destination, worker_dir).await?;
        }

        manifest.verify_outputs()?;
        manifest.content_hash = compute_content_hash(&manifest).await?;

        tracing::debug!(
            target = %self.target,
            files = manifest.files.len(),
            output = %manifest.output_path.display(),
            hash = %manifest.content_hash,
            "built manifest"
        );

        Ok(manifest)
    }

    fn build_section(&self, config: &ResolvedConfig) -> BuildSection {
        match self.target {
            BuildTarget::Dev => BuildSection::default(),
            BuildTarget::Deploy => BuildSection {
                env: (!config.build.env.is_empty()).then(|| config.build.env.clone()),
                commands: (!config.build.commands.is_empty())
                    .then(|| config.build.commands.clone()),
            },
        }
    }
}

fn entry_or(path: &Option<PathBuf>, fallback: &str) -> String {
    path.as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

/// Copy the tree at `source` into `destination` and rewrite every path in
/// `manifest` that pointed into `source`.
///
/// Bare package specifiers (the built-in entry points) are left untouched.
/// Any copy failure aborts the whole operation; a partially copied tree is
/// never described by a manifest.
pub async fn copy_manifest_to_dir(
    manifest: BuildManifest,
    source: &Path,
    destination: &Path,
) -> Result<BuildManifest> {
    let from = source.to_path_buf();
    let to = destination.to_path_buf();

    tokio::task::spawn_blocking(move || copy_tree(&from, &to))
        .await
        .map_err(|e| Error::ManifestUpdate(format!("copy task failed: {}", e)))??;

    let rebase_path = |path: &Path| -> PathBuf {
        match path.strip_prefix(source) {
            Ok(rel) => destination.join(rel),
            Err(_) => path.to_path_buf(),
        }
    };
    let rebase_entry = |entry: &str| -> String {
        let path = Path::new(entry);
        if path.is_absolute() {
            rebase_path(path).to_string_lossy().into_owned()
        } else {
            entry.to_string()
        }
    };

    let mut manifest = manifest;
    for file in &mut manifest.files {
        file.out = rebase_path(&file.out);
    }
    manifest.config_path = manifest.config_path.as_deref().map(rebase_path);
    manifest.worker_entry_path = rebase_entry(&manifest.worker_entry_path);
    manifest.worker_fork_path = rebase_entry(&manifest.worker_fork_path);
    manifest.loader_path = rebase_entry(&manifest.loader_path);
    manifest.output_path = destination.to_path_buf();

    Ok(manifest)
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)?;

    for entry in walkdir::WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| {
            Error::ManifestUpdate(format!("failed to walk {}: {}", source.display(), e))
        })?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::ManifestUpdate(e.to_string()))?;
        let target = destination.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| {
                Error::ManifestUpdate(format!(
                    "failed to copy {} to {}: {}",
                    entry.path().display(),
                    target.display(),
                    e
                ))
            })?;
        }
    }

    Ok(())
}

/// blake3 over every output (relative path and bytes) plus the config bundle.
pub async fn compute_content_hash(manifest: &BuildManifest) -> Result<String> {
    let mut outputs: Vec<(PathBuf, PathBuf)> = manifest
        .relative_files()
        .into_iter()
        .zip(manifest.files.iter().map(|f| f.out.clone()))
        .collect();
    outputs.sort();

    let mut hasher = blake3::Hasher::new();
    for (rel, abs) in outputs {
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(&tokio::fs::read(&abs).await?);
    }
    if let Some(config_path) = &manifest.config_path {
        hasher.update(&tokio::fs::read(config_path).await?);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
