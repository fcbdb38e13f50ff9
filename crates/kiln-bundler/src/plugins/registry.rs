//! Plugin registry with execution phases.
//!
//! Extensions register plugins from their start hooks in no particular
//! order; the registry puts them into phase order once, when the chain for a
//! build is frozen.

use std::sync::Arc;

use crate::diagnostics::BuildDiagnostic;
use crate::engine::RawBuildResult;

use super::{ResolveArgs, ResolveDecision, SharedPlugin};

/// Plugin execution phases
///
/// Plugins run in phase order (lower numbers first). Within a phase they
/// keep registration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginPhase {
    /// Runs before everything else (virtual modules, aliases)
    Early = 0,

    /// Import classification: externals, redirects
    Resolve = 10,

    #[default]
    Default = 50,

    /// Observers that need every other plugin to have run
    Late = 90,

    /// Reserved for the build owner's result handler
    ///
    /// Its `on_end` sees the pass after every other plugin's `on_end`.
    Terminal = 100,
}

/// Plugin registry that maintains plugins in phase order
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<(PluginPhase, SharedPlugin)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin at the phase it declares.
    pub fn add(&mut self, plugin: SharedPlugin) {
        let phase = plugin.phase();
        self.plugins.push((phase, plugin));
    }

    /// Add a plugin with an explicit phase, overriding the declared one.
    pub fn add_with_phase(&mut self, plugin: SharedPlugin, phase: PluginPhase) {
        self.plugins.push((phase, plugin));
    }

    /// Freeze the registry into a phase-ordered chain.
    ///
    /// Sorting happens here (once) and is stable, so plugins in the same
    /// phase run in the order they were added.
    pub fn into_chain(mut self) -> PluginChain {
        self.plugins.sort_by_key(|(phase, _)| *phase);
        PluginChain {
            plugins: self.plugins.into_iter().map(|(_, plugin)| plugin).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// The ordered, immutable plugin list used for every pass of one build.
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Arc<[SharedPlugin]>,
}

impl PluginChain {
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every `on_start` hook in order; failures become error diagnostics.
    pub async fn run_start(&self) -> Vec<BuildDiagnostic> {
        let mut errors = Vec::new();
        for plugin in self.plugins.iter() {
            if let Err(err) = plugin.on_start().await {
                errors.push(BuildDiagnostic::from_plugin_error(
                    plugin.name(),
                    "on_start",
                    &err,
                ));
            }
        }
        errors
    }

    /// Ask plugins in order how to treat an import. The first decision other
    /// than [`ResolveDecision::Continue`] wins.
    pub async fn resolve(
        &self,
        args: &ResolveArgs<'_>,
    ) -> Result<ResolveDecision, BuildDiagnostic> {
        for plugin in self.plugins.iter() {
            match plugin.resolve(args).await {
                Ok(ResolveDecision::Continue) => continue,
                Ok(decision) => {
                    tracing::trace!(
                        plugin = plugin.name(),
                        specifier = args.specifier,
                        ?decision,
                        "import resolved by plugin"
                    );
                    return Ok(decision);
                }
                Err(err) => {
                    return Err(
                        BuildDiagnostic::from_plugin_error(plugin.name(), "resolve", &err)
                            .with_location(args.importer, None),
                    );
                }
            }
        }
        Ok(ResolveDecision::Continue)
    }

    /// Await every `on_end` hook in order. Failures are logged; the pass
    /// result has already been decided.
    pub async fn run_end(&self, result: &RawBuildResult) {
        for plugin in self.plugins.iter() {
            if let Err(err) = plugin.on_end(result).await {
                tracing::error!(plugin = plugin.name(), "on_end hook failed: {:#}", err);
            }
        }
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("plugins", &self.names())
            .finish()
    }
}
