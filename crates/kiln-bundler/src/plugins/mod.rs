//! Bundler plugins.
//!
//! A plugin hooks into every bundling pass: once before it starts, once per
//! bare import to classify it, and once after the pass with its result.
//! Extensions install plugins; the build owner installs a single
//! [`PluginPhase::Terminal`] plugin to receive results.

mod registry;

pub use registry::{PluginChain, PluginPhase, PluginRegistry};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::RawBuildResult;

/// How an import appeared in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Static,
    Dynamic,
    Require,
}

/// A bare import handed to [`BundlerPlugin::resolve`].
#[derive(Debug, Clone)]
pub struct ResolveArgs<'a> {
    pub specifier: &'a str,
    pub importer: &'a Path,
    pub kind: ImportKind,
}

/// What a plugin decided about an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveDecision {
    /// Not mine; ask the next plugin, then fall back to the engine.
    Continue,
    /// Leave the import in place; it is loaded at runtime.
    External,
    /// Treat the import as this local module.
    Resolved(PathBuf),
}

#[async_trait]
pub trait BundlerPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn phase(&self) -> PluginPhase {
        PluginPhase::Default
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn resolve(&self, _args: &ResolveArgs<'_>) -> anyhow::Result<ResolveDecision> {
        Ok(ResolveDecision::Continue)
    }

    async fn on_end(&self, _result: &RawBuildResult) -> anyhow::Result<()> {
        Ok(())
    }
}

pub type SharedPlugin = Arc<dyn BundlerPlugin>;
