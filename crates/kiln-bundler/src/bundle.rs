//! One-shot and watch-mode bundling.
//!
//! [`Bundler::build`] runs an initial pass and, in watch mode, keeps a
//! background task that re-runs the pass whenever sources change. Passes
//! never overlap: each one (including every plugin's `on_end`) finishes
//! before the next change is looked at.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_config::ResolvedConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::diagnostics::{log_build_failure, log_build_warnings};
use crate::engine::{
    BundleEngine, EngineRequest, OutputKind, RawBuildResult, StagingEngine, collect_entry_points,
};
use crate::manifest::BuildFile;
use crate::plugins::{PluginChain, PluginRegistry};
use crate::watcher::{FileChange, FileWatcher};
use crate::{Error, Result};

/// Where rebuild triggers come from.
#[derive(Debug, Default)]
pub enum WatchSource {
    /// Build once.
    #[default]
    Off,
    /// Watch the project root on disk.
    Filesystem,
    /// Rebuild on changes sent by the caller.
    Channel(mpsc::Receiver<FileChange>),
}

impl WatchSource {
    pub fn is_watching(&self) -> bool {
        !matches!(self, WatchSource::Off)
    }
}

pub struct BundleOptions {
    pub config: ResolvedConfig,
    pub out_dir: PathBuf,
    pub watch: WatchSource,
    /// Quiet period used to coalesce bursts of changes into one rebuild
    pub debounce: Duration,
}

impl BundleOptions {
    pub fn new(config: ResolvedConfig, out_dir: impl AsRef<Path>) -> Self {
        let debounce = Duration::from_millis(config.dev.debounce_ms);
        Self {
            config,
            out_dir: out_dir.as_ref().to_path_buf(),
            watch: WatchSource::Off,
            debounce,
        }
    }

    pub fn watch(mut self, source: WatchSource) -> Self {
        self.watch = source;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// The parts of a successful pass a manifest is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleResult {
    /// Task modules and their outputs
    pub files: Vec<BuildFile>,
    /// Bundled config module, if the project has one
    pub config_path: Option<PathBuf>,
    /// Bundled custom worker entry point
    pub worker_dev_path: Option<PathBuf>,
    /// Bundled custom telemetry loader
    pub loader_path: Option<PathBuf>,
}

impl BundleResult {
    pub fn from_build(result: &RawBuildResult) -> Self {
        let files = result
            .outputs_of(OutputKind::Task)
            .map(|output| BuildFile {
                entry: output
                    .source
                    .strip_prefix(&result.working_dir)
                    .unwrap_or(&output.source)
                    .to_path_buf(),
                out: output.path.clone(),
            })
            .collect();
        let first = |kind| result.outputs_of(kind).next().map(|o| o.path.clone());

        Self {
            files,
            config_path: first(OutputKind::Config),
            worker_dev_path: first(OutputKind::Worker),
            loader_path: first(OutputKind::Loader),
        }
    }
}

/// What [`Bundler::build`] hands back.
pub struct BuildOutcome {
    /// The initial pass's result; `None` when it failed in watch mode
    pub bundle: Option<BundleResult>,
    /// Present in watch mode
    pub stop: Option<StopHandle>,
}

/// Stops a watch-mode build.
///
/// Dropping the handle also stops the watcher, without waiting for it.
pub struct StopHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StopHandle {
    /// Stop watching and wait for an in-flight pass to finish.
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(true);
        self.task
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("watch task failed: {}", e))))
    }
}

#[derive(Clone)]
pub struct Bundler {
    engine: Arc<dyn BundleEngine>,
}

impl Default for Bundler {
    fn default() -> Self {
        Self::new(Arc::new(StagingEngine::new()))
    }
}

impl Bundler {
    pub fn new(engine: Arc<dyn BundleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Run the initial pass and, in watch mode, start rebuilding on change.
    ///
    /// Without watch mode a failed pass is returned as [`Error::Build`]. In
    /// watch mode failures are only reported (through plugins and logs) and
    /// watching continues.
    pub async fn build(&self, options: BundleOptions, plugins: PluginRegistry) -> Result<BuildOutcome> {
        let BundleOptions {
            config,
            out_dir,
            watch: source,
            debounce,
        } = options;
        let chain = plugins.into_chain();

        // Subscribe before the first pass so edits made during it still trigger a rebuild
        let changes = match source {
            WatchSource::Off => None,
            WatchSource::Filesystem => {
                let (watcher, rx) = FileWatcher::new(
                    config.working_dir.clone(),
                    config.dev.ignore.clone(),
                    config.dev.debounce_ms,
                )?;
                Some((Some(watcher), rx))
            }
            WatchSource::Channel(rx) => Some((None, rx)),
        };

        let watching = changes.is_some();
        let initial = run_pass(self.engine.as_ref(), &config, &out_dir, &chain, watching).await;

        let Some((watcher, rx)) = changes else {
            if initial.has_errors() {
                return Err(Error::Build {
                    errors: initial.errors,
                    warnings: initial.warnings,
                });
            }
            return Ok(BuildOutcome {
                bundle: Some(BundleResult::from_build(&initial)),
                stop: None,
            });
        };

        let bundle = (!initial.has_errors()).then(|| BundleResult::from_build(&initial));

        let (stop_tx, stop_rx) = watch::channel(false);
        let rebuild = RebuildLoop {
            engine: self.engine.clone(),
            config,
            out_dir,
            chain,
            debounce,
            _watcher: watcher,
        };
        let task = tokio::spawn(rebuild.run(rx, stop_rx));

        Ok(BuildOutcome {
            bundle,
            stop: Some(StopHandle { stop_tx, task }),
        })
    }
}

/// One full pass: start hooks, engine, report, end hooks.
///
/// Failures are logged only when `report_failures` is set; a one-shot build
/// returns them to the caller instead.
async fn run_pass(
    engine: &dyn BundleEngine,
    config: &ResolvedConfig,
    out_dir: &Path,
    chain: &PluginChain,
    report_failures: bool,
) -> RawBuildResult {
    let started = Instant::now();

    let start_errors = chain.run_start().await;
    let result = if !start_errors.is_empty() {
        RawBuildResult::failed(&config.working_dir, out_dir, start_errors)
    } else {
        let (entries, entry_errors) = collect_entry_points(config, out_dir);
        if entry_errors.is_empty() {
            engine
                .bundle(EngineRequest {
                    config,
                    out_dir,
                    entries: &entries,
                    plugins: chain,
                })
                .await
        } else {
            RawBuildResult::failed(&config.working_dir, out_dir, entry_errors)
        }
    };

    if report_failures || !result.has_errors() {
        report(&result);
    }
    chain.run_end(&result).await;

    tracing::debug!(
        engine = engine.name(),
        outputs = result.outputs.len(),
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "bundling pass finished"
    );
    result
}

fn report(result: &RawBuildResult) {
    if result.has_errors() {
        log_build_failure(&result.errors, &result.warnings);
    } else if !result.warnings.is_empty() {
        log_build_warnings(&result.warnings);
    }
}

struct RebuildLoop {
    engine: Arc<dyn BundleEngine>,
    config: ResolvedConfig,
    out_dir: PathBuf,
    chain: PluginChain,
    debounce: Duration,
    /// Kept alive for as long as the loop runs
    _watcher: Option<FileWatcher>,
}

impl RebuildLoop {
    async fn run(self, mut changes: mpsc::Receiver<FileChange>, mut stop: watch::Receiver<bool>) {
        while let Some(batch) = self.next_batch(&mut changes, &mut stop).await {
            tracing::info!(
                files = batch.len(),
                first = %batch[0].path().display(),
                "change detected, rebuilding"
            );
            run_pass(self.engine.as_ref(), &self.config, &self.out_dir, &self.chain, true).await;

            if *stop.borrow() {
                break;
            }
        }
        tracing::debug!("watch loop stopped");
    }

    /// Wait for a change, then gather everything that arrives until the
    /// channel has been quiet for one debounce period. `None` means stop.
    async fn next_batch(
        &self,
        changes: &mut mpsc::Receiver<FileChange>,
        stop: &mut watch::Receiver<bool>,
    ) -> Option<Vec<FileChange>> {
        if *stop.borrow() {
            return None;
        }

        let first = tokio::select! {
            biased;
            _ = stop.changed() => return None,
            change = changes.recv() => change?,
        };
        let mut batch = vec![first];

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => return None,
                change = changes.recv() => match change {
                    Some(change) => {
                        if !batch.contains(&change) {
                            batch.push(change);
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep(self.debounce) => break,
            }
        }

        Some(batch)
    }
}
