//! Shared test utilities for kiln-bundler tests
//!
//! Project fixtures on disk and a scripted engine for deterministic passes.

#![allow(dead_code)]

use async_trait::async_trait;
use kiln_bundler::{
    BuildDiagnostic, BundleEngine, BundlerPlugin, DiagnosticKind, EngineRequest, ImportKind,
    OutputFile, OutputKind, PluginPhase, RawBuildResult, ResolveArgs, ResolveDecision,
};
use kiln_config::ResolvedConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// A throwaway project directory.
pub struct Project {
    _temp: TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp.path()).unwrap();
        std::fs::create_dir_all(root.join("src/tasks")).unwrap();
        Self { _temp: temp, root }
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Install a fake package under `node_modules`.
    pub fn install(&self, name: &str, version: &str) {
        self.write(
            &format!("node_modules/{}/package.json", name),
            &format!(r#"{{"name":"{}","version":"{}"}}"#, name, version),
        );
    }

    pub fn config(&self) -> ResolvedConfig {
        ResolvedConfig::new("proj_test", &self.root).resolve()
    }
}

/// One scripted pass: the outputs to write, bare imports to run through the
/// plugin chain, and errors to report.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPass {
    pub outputs: Vec<(OutputKind, String)>,
    pub imports: Vec<String>,
    pub errors: Vec<String>,
}

impl ScriptedPass {
    /// A clean pass producing the given task outputs.
    pub fn tasks(files: &[&str]) -> Self {
        Self {
            outputs: files
                .iter()
                .map(|f| (OutputKind::Task, f.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            errors: vec![message.to_string()],
            ..Default::default()
        }
    }

    pub fn with_import(mut self, specifier: &str) -> Self {
        self.imports.push(specifier.to_string());
        self
    }

    pub fn with_output(mut self, kind: OutputKind, rel: &str) -> Self {
        self.outputs.push((kind, rel.to_string()));
        self
    }
}

/// Engine replaying [`ScriptedPass`]es in order. Once the script runs out,
/// the last pass repeats.
pub struct ScriptedEngine {
    passes: Mutex<VecDeque<ScriptedPass>>,
    last: Mutex<ScriptedPass>,
    runs: Mutex<usize>,
}

impl ScriptedEngine {
    pub fn new(passes: Vec<ScriptedPass>) -> Arc<Self> {
        Arc::new(Self {
            passes: Mutex::new(passes.into()),
            last: Mutex::new(ScriptedPass::default()),
            runs: Mutex::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        *self.runs.lock()
    }
}

#[async_trait]
impl BundleEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn bundle(&self, request: EngineRequest<'_>) -> RawBuildResult {
        *self.runs.lock() += 1;
        let pass = {
            let next = self.passes.lock().pop_front();
            match next {
                Some(pass) => {
                    *self.last.lock() = pass.clone();
                    pass
                }
                None => self.last.lock().clone(),
            }
        };

        let working_dir = &request.config.working_dir;
        let mut result = RawBuildResult {
            working_dir: working_dir.clone(),
            out_dir: request.out_dir.to_path_buf(),
            ..Default::default()
        };

        let importer = working_dir.join("src/tasks/index.ts");
        for specifier in &pass.imports {
            let args = ResolveArgs {
                specifier,
                importer: &importer,
                kind: ImportKind::Static,
            };
            if let Err(diag) = request.plugins.resolve(&args).await {
                result.errors.push(diag);
            }
        }

        for message in &pass.errors {
            result
                .errors
                .push(BuildDiagnostic::error(DiagnosticKind::Other("Scripted".into()), message.clone()));
        }
        if result.has_errors() {
            return result;
        }

        for (kind, rel) in &pass.outputs {
            let path = request.out_dir.join(rel);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(&path, format!("// {}", rel)).await.unwrap();
            result.outputs.push(OutputFile {
                kind: *kind,
                source: working_dir.join(rel),
                path,
            });
        }
        result
    }
}

/// Terminal plugin forwarding every pass result to a channel.
pub struct ResultTap {
    tx: mpsc::UnboundedSender<RawBuildResult>,
}

impl ResultTap {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RawBuildResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl BundlerPlugin for ResultTap {
    fn name(&self) -> &str {
        "result-tap"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Terminal
    }

    async fn on_end(&self, result: &RawBuildResult) -> anyhow::Result<()> {
        let _ = self.tx.send(result.clone());
        Ok(())
    }
}

/// Plugin sending every bare import to the engine as external.
pub struct AllExternal;

#[async_trait]
impl BundlerPlugin for AllExternal {
    fn name(&self) -> &str {
        "all-external"
    }

    async fn resolve(&self, _args: &ResolveArgs<'_>) -> anyhow::Result<ResolveDecision> {
        Ok(ResolveDecision::External)
    }
}

/// Relative paths of `paths` under `root`, sorted.
pub fn relative_sorted(root: &Path, paths: impl IntoIterator<Item = PathBuf>) -> Vec<String> {
    let mut rel: Vec<String> = paths
        .into_iter()
        .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
        .collect();
    rel.sort();
    rel
}

/// In-memory log sink for asserting on what a pass reported.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Capture every event on the current thread until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_target(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Terminal plugin logging a marker from its end hook.
pub struct EndMarker;

#[async_trait]
impl BundlerPlugin for EndMarker {
    fn name(&self) -> &str {
        "end-marker"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Terminal
    }

    async fn on_end(&self, _result: &RawBuildResult) -> anyhow::Result<()> {
        tracing::info!("end hook ran");
        Ok(())
    }
}
