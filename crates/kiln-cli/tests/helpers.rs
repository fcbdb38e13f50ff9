//! Shared fixtures for kiln-cli tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kiln_bundler::{
    BuildContext, BuildDiagnostic, BuildExtension, BundleEngine, BundlerPlugin, DiagnosticKind,
    EngineRequest, OutputFile, OutputKind, PluginPhase, RawBuildResult,
};
use kiln_config::ResolvedConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

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

    pub fn config(&self) -> ResolvedConfig {
        ResolvedConfig::new("proj_dev", &self.root).resolve()
    }

    /// Entries currently under `.kiln/tmp`.
    pub fn tmp_entries(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.root.join(".kiln/tmp")) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// One scripted pass: task outputs to write or errors to report.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPass {
    pub tasks: Vec<String>,
    pub errors: Vec<String>,
}

impl ScriptedPass {
    pub fn tasks(files: &[&str]) -> Self {
        Self {
            tasks: files.iter().map(|f| f.to_string()).collect(),
            errors: Vec::new(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            tasks: Vec::new(),
            errors: vec![message.to_string()],
        }
    }
}

/// Replays passes in order, repeating the last one once the script ends.
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

        if !pass.errors.is_empty() {
            result.errors = pass
                .errors
                .iter()
                .map(|m| BuildDiagnostic::error(DiagnosticKind::Other("Scripted".into()), m.clone()))
                .collect();
            return result;
        }

        for rel in &pass.tasks {
            let path = request.out_dir.join(rel);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(&path, format!("// {}", rel)).await.unwrap();
            result.outputs.push(OutputFile {
                kind: OutputKind::Task,
                source: working_dir.join(rel),
                path,
            });
        }
        result
    }
}

/// Terminal plugin forwarding every pass result.
pub struct ResultTap {
    tx: mpsc::UnboundedSender<RawBuildResult>,
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

/// Extension that installs a [`ResultTap`] from its start hook.
pub struct TapExtension {
    tx: mpsc::UnboundedSender<RawBuildResult>,
}

impl TapExtension {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RawBuildResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl BuildExtension for TapExtension {
    fn name(&self) -> &str {
        "result-tap"
    }

    async fn on_build_start(&self, context: &mut BuildContext) -> anyhow::Result<()> {
        context.register_plugin(Arc::new(ResultTap {
            tx: self.tx.clone(),
        }));
        Ok(())
    }
}

pub async fn next_result(rx: &mut mpsc::UnboundedReceiver<RawBuildResult>) -> RawBuildResult {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("pass result in time")
        .expect("result channel open")
}
