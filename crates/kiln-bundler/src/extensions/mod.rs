//! Build extensions and the context that runs them.
//!
//! Extensions are registered once per session. Before the first pass each
//! one gets a start hook (where it may register bundler plugins); after every
//! successful pass the manifest is threaded through their complete hooks in
//! registration order, each hook returning the manifest the next one sees.

mod externals;

pub use externals::{ExternalsExtension, ExternalsPlugin, matches_external};

use std::sync::Arc;

use async_trait::async_trait;
use kiln_config::ResolvedConfig;

use crate::manifest::{BuildManifest, BuildTarget};
use crate::plugins::{PluginRegistry, SharedPlugin};
use crate::{Error, Result};

#[async_trait]
pub trait BuildExtension: Send + Sync {
    fn name(&self) -> &str;

    /// Runs once before the first pass. Register plugins here.
    async fn on_build_start(&self, _context: &mut BuildContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after every successful pass. Return the manifest downstream
    /// extensions (and finally the session) should see.
    async fn on_build_complete(
        &self,
        _context: &BuildContext,
        manifest: BuildManifest,
    ) -> anyhow::Result<BuildManifest> {
        Ok(manifest)
    }
}

pub type SharedExtension = Arc<dyn BuildExtension>;

/// Where [`BuildContext::register`] puts an extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    #[default]
    Append,
    Prepend,
}

/// The ordered extensions of one session plus the plugins they registered.
pub struct BuildContext {
    target: BuildTarget,
    config: ResolvedConfig,
    extensions: Vec<SharedExtension>,
    plugins: PluginRegistry,
}

impl BuildContext {
    pub fn new(target: BuildTarget, config: ResolvedConfig) -> Self {
        Self {
            target,
            config,
            extensions: Vec::new(),
            plugins: PluginRegistry::new(),
        }
    }

    pub fn target(&self) -> BuildTarget {
        self.target
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Add an extension. The same instance, or another extension with the
    /// same name, cannot be registered twice.
    pub fn register(&mut self, extension: SharedExtension, placement: Placement) -> Result<()> {
        let duplicate = self
            .extensions
            .iter()
            .any(|e| Arc::ptr_eq(e, &extension) || e.name() == extension.name());
        if duplicate {
            return Err(Error::DuplicateExtension(extension.name().to_string()));
        }

        tracing::debug!(extension = extension.name(), ?placement, "registered extension");
        match placement {
            Placement::Append => self.extensions.push(extension),
            Placement::Prepend => self.extensions.insert(0, extension),
        }
        Ok(())
    }

    pub fn add_extension(&mut self, extension: SharedExtension) -> Result<()> {
        self.register(extension, Placement::Append)
    }

    pub fn prepend_extension(&mut self, extension: SharedExtension) -> Result<()> {
        self.register(extension, Placement::Prepend)
    }

    /// Add a bundler plugin. Meant to be called from start hooks.
    pub fn register_plugin(&mut self, plugin: SharedPlugin) {
        tracing::debug!(plugin = plugin.name(), phase = ?plugin.phase(), "registered plugin");
        self.plugins.add(plugin);
    }

    /// Run every start hook in order. The first failure stops the sequence.
    pub async fn notify_build_start(&mut self) -> Result<()> {
        let extensions = self.extensions.clone();
        for extension in extensions {
            extension
                .on_build_start(self)
                .await
                .map_err(|e| Error::extension_hook(extension.name(), "build start", e))?;
        }
        Ok(())
    }

    /// Fold the manifest through every complete hook in order.
    pub async fn notify_build_complete(&self, manifest: BuildManifest) -> Result<BuildManifest> {
        let mut manifest = manifest;
        for extension in &self.extensions {
            manifest = extension
                .on_build_complete(self, manifest)
                .await
                .map_err(|e| Error::extension_hook(extension.name(), "build complete", e))?;
        }
        Ok(manifest)
    }

    /// Plugins registered so far, in registration order.
    pub fn collect_plugins(&self) -> PluginRegistry {
        self.plugins.clone()
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("target", &self.target)
            .field("extensions", &self.extension_names())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
