//! The dev session orchestrator.
//!
//! [`start_dev_session`] registers extensions, runs their start hooks,
//! bundles once in watch mode and publishes the first manifest. From then on
//! every successful rebuild is materialised into a fresh worker directory,
//! folded through the extensions' complete hooks and published in place of
//! the previous manifest.
//!
//! Manifest processing is serialised by one async mutex (the "pipeline"),
//! which also owns the live worker directories. A rebuild only starts once
//! the previous manifest has been published or dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_bundler::{
    BuildContext, BuildManifest, BuildTarget, BundleOptions, BundleResult, EphemeralDirectory,
    ExternalsExtension, ManifestBuilder, PluginRegistry, RawBuildResult, StopHandle, tmp_dir,
};
use kiln_config::ResolvedConfig;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::DevSessionOptions;
use super::plugins::{RebuildGate, SessionPlugin};
use super::state::{ResultPhase, SessionPhase};
use crate::error::Result;

/// The currently published manifest, if any.
pub type ManifestReceiver = watch::Receiver<Option<Arc<BuildManifest>>>;

/// State shared between the session handle and its bundler plugins.
pub(crate) struct SessionCore {
    context: BuildContext,
    config: ResolvedConfig,
    destination: PathBuf,
    phase: Mutex<SessionPhase>,
    results: Mutex<ResultPhase>,
    pipeline: tokio::sync::Mutex<Vec<EphemeralDirectory>>,
    manifest: watch::Sender<Option<Arc<BuildManifest>>>,
}

impl SessionCore {
    fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock() = phase;
        tracing::debug!(?phase, "dev session phase");
    }

    fn is_live(&self) -> bool {
        self.phase().is_live()
    }

    pub(crate) fn awaiting_first_result(&self) -> bool {
        *self.results.lock() == ResultPhase::AwaitingFirstResult
    }

    /// Flip to steady state. True for the first result only, failed or not.
    pub(crate) fn take_first_result(&self) -> bool {
        self.results.lock().advance()
    }

    pub(crate) async fn wait_for_pipeline(&self) {
        drop(self.pipeline.lock().await);
    }

    async fn derive_manifest(
        &self,
        bundle: &BundleResult,
        worker_dir: Option<&Path>,
    ) -> kiln_bundler::Result<BuildManifest> {
        let manifest = ManifestBuilder::new(BuildTarget::Dev)
            .from_bundle(bundle, &self.destination, &self.config, worker_dir)
            .await?;
        self.context.notify_build_complete(manifest).await
    }

    /// Replace the current manifest. Refused once the session is stopping.
    fn publish(&self, manifest: BuildManifest) -> bool {
        if !self.is_live() {
            tracing::debug!("session stopping, manifest not published");
            return false;
        }
        tracing::debug!(
            files = manifest.files.len(),
            output = %manifest.output_path.display(),
            hash = %manifest.content_hash,
            "manifest updated"
        );
        self.manifest.send_replace(Some(Arc::new(manifest)));
        true
    }

    /// Turn a rebuild result into the next manifest. Never fails: errors are
    /// logged and the current manifest stays in place.
    pub(crate) async fn process_rebuild(&self, result: &RawBuildResult) {
        if result.has_errors() {
            tracing::debug!(
                errors = result.errors.len(),
                "rebuild failed, keeping the current manifest"
            );
            return;
        }

        let mut workers = self.pipeline.lock().await;
        if !self.is_live() {
            tracing::debug!("session stopping, rebuild ignored");
            return;
        }

        let worker = match tmp_dir(
            &self.config.working_dir,
            "worker",
            self.config.dev.keep_tmp_dirs,
        ) {
            Ok(worker) => worker,
            Err(error) => {
                tracing::error!(%error, "could not allocate a worker directory");
                return;
            }
        };

        let bundle = BundleResult::from_build(result);
        match self.derive_manifest(&bundle, Some(worker.path())).await {
            Ok(manifest) => {
                if self.publish(manifest) {
                    workers.push(worker);
                }
            }
            Err(error) => {
                tracing::error!(%error, "failed to update manifest after rebuild");
            }
        }
    }
}

/// A running dev session.
///
/// Dropping the handle stops watching and removes the build directory;
/// [`DevSession::stop`] does the same and waits for an in-flight rebuild.
pub struct DevSession {
    core: Arc<SessionCore>,
    destination: Mutex<Option<EphemeralDirectory>>,
    stop_handle: Mutex<Option<StopHandle>>,
}

impl DevSession {
    /// The manifest currently published, if a build has succeeded yet.
    pub fn manifest(&self) -> Option<Arc<BuildManifest>> {
        self.core.manifest.borrow().clone()
    }

    /// Receiver notified on every published manifest.
    pub fn subscribe(&self) -> ManifestReceiver {
        self.core.manifest.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.core.phase()
    }

    /// Shared build directory every pass writes into.
    pub fn destination(&self) -> &Path {
        &self.core.destination
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.core.config
    }

    /// Stop watching and remove the build and worker directories.
    ///
    /// Best-effort: teardown errors are logged, never returned. Calling it
    /// again is a no-op.
    pub async fn stop(&self) {
        {
            let mut phase = self.core.phase.lock();
            if !phase.is_live() {
                return;
            }
            *phase = SessionPhase::Stopping;
        }
        tracing::debug!(project = %self.core.config.project, "stopping dev session");

        let handle = self.stop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(error) = handle.stop().await {
                tracing::debug!(%error, "watcher did not stop cleanly");
            }
        }

        let workers: Vec<EphemeralDirectory> = self.core.pipeline.lock().await.drain(..).collect();
        for mut worker in workers {
            if let Err(error) = worker.release() {
                tracing::debug!(%error, path = %worker.path().display(), "could not remove worker directory");
            }
        }

        let destination = self.destination.lock().take();
        if let Some(mut destination) = destination {
            if let Err(error) = destination.release() {
                tracing::debug!(%error, "could not remove build directory");
            }
        }

        self.core.set_phase(SessionPhase::Stopped);
        tracing::debug!("dev session stopped");
    }
}

impl std::fmt::Debug for DevSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevSession")
            .field("phase", &self.phase())
            .field("destination", &self.core.destination)
            .field("context", &self.core.context)
            .finish()
    }
}

/// Start a dev session and publish its first manifest.
///
/// Failures before the first bundling pass (a start hook, a duplicate
/// extension, the build directory or the watcher) are returned and leave
/// nothing behind on disk. A failed first pass is not: the session keeps
/// watching and publishes once a rebuild succeeds.
pub async fn start_dev_session(options: DevSessionOptions) -> Result<DevSession> {
    let DevSessionOptions {
        config,
        extensions,
        bundler,
        watch: source,
        debounce,
    } = options;

    tracing::debug!(project = %config.project, root = %config.working_dir.display(), "starting dev session");

    // Removed on drop, so every early return below cleans up
    let destination = tmp_dir(&config.working_dir, "build", config.dev.keep_tmp_dirs)?;

    let mut context = BuildContext::new(BuildTarget::Dev, config.clone());
    context.add_extension(Arc::new(ExternalsExtension::from_config(&config)))?;
    for (extension, placement) in extensions {
        context.register(extension, placement)?;
    }
    context.notify_build_start().await?;
    let plugins = context.collect_plugins();

    let (manifest, _) = watch::channel(None);
    let core = Arc::new(SessionCore {
        context,
        config: config.clone(),
        destination: destination.path().to_path_buf(),
        phase: Mutex::new(SessionPhase::Starting),
        results: Mutex::new(ResultPhase::AwaitingFirstResult),
        pipeline: tokio::sync::Mutex::new(Vec::new()),
        manifest,
    });

    let plugins = with_session_plugins(plugins, &core);
    let mut bundle_options = BundleOptions::new(config, destination.path()).watch(source);
    if let Some(debounce) = debounce {
        bundle_options = bundle_options.debounce(debounce);
    }

    core.set_phase(SessionPhase::Bundling);
    let stop_handle = {
        // Rebuilds wait for the first manifest
        let _pipeline = core.pipeline.lock().await;
        let outcome = bundler.build(bundle_options, plugins).await?;

        if let Some(bundle) = &outcome.bundle {
            match core.derive_manifest(bundle, None).await {
                Ok(manifest) => {
                    core.publish(manifest);
                }
                Err(error) => {
                    tracing::error!(%error, "failed to build the initial manifest");
                }
            }
        }
        core.set_phase(SessionPhase::Watching);
        outcome.stop
    };

    Ok(DevSession {
        core,
        destination: Mutex::new(Some(destination)),
        stop_handle: Mutex::new(stop_handle),
    })
}

fn with_session_plugins(mut plugins: PluginRegistry, core: &Arc<SessionCore>) -> PluginRegistry {
    plugins.add(Arc::new(RebuildGate::new(core.clone())));
    plugins.add(Arc::new(SessionPlugin::new(core.clone())));
    plugins
}
