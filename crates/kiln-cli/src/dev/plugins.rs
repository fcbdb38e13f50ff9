//! Bundler plugins the dev session installs around every pass.

use std::sync::Arc;

use async_trait::async_trait;
use kiln_bundler::{BundlerPlugin, PluginPhase, RawBuildResult};

use super::session::SessionCore;

/// Holds a rebuild back until the session is done with the previous
/// manifest. Runs before every other plugin's start hook, so per-pass state
/// (recorded externals) is not reset while a manifest is still being made
/// from it.
pub(crate) struct RebuildGate {
    core: Arc<SessionCore>,
}

impl RebuildGate {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl BundlerPlugin for RebuildGate {
    fn name(&self) -> &str {
        "kiln:rebuild-gate"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Early
    }

    async fn on_start(&self) -> anyhow::Result<()> {
        // The initial pass runs while the session itself holds the pipeline
        if !self.core.awaiting_first_result() {
            self.core.wait_for_pipeline().await;
        }
        Ok(())
    }
}

/// Receives every pass result after all other plugins have seen it.
///
/// The first result belongs to whoever called `Bundler::build` and is
/// skipped here. Every later result is turned into a manifest.
pub(crate) struct SessionPlugin {
    core: Arc<SessionCore>,
}

impl SessionPlugin {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl BundlerPlugin for SessionPlugin {
    fn name(&self) -> &str {
        "kiln:dev-session"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Terminal
    }

    async fn on_end(&self, result: &RawBuildResult) -> anyhow::Result<()> {
        if self.core.take_first_result() {
            return Ok(());
        }
        self.core.process_rebuild(result).await;
        Ok(())
    }
}
