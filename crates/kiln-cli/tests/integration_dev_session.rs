//! Integration tests for the dev session orchestrator.
//!
//! Rebuilds are driven through a channel and a scripted engine, so every
//! pass is deterministic.

mod helpers;

use async_trait::async_trait;
use helpers::{Project, ScriptedEngine, ScriptedPass, TapExtension, next_result};
use kiln_bundler::{
    BuildContext, BuildExtension, BuildExternal, BuildManifest, Bundler, FileChange, WatchSource,
};
use kiln_cli::CliError;
use kiln_cli::dev::{
    DevSessionOptions, ManifestReceiver, SessionPhase, start_dev_session,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

fn scripted(
    project: &Project,
    engine: &Arc<ScriptedEngine>,
) -> (DevSessionOptions, mpsc::Sender<FileChange>) {
    let (tx, rx) = mpsc::channel(16);
    let options = DevSessionOptions::new(project.config())
        .bundler(Bundler::new(engine.clone()))
        .watch(WatchSource::Channel(rx))
        .debounce(Duration::from_millis(10));
    (options, tx)
}

async fn touch(tx: &mpsc::Sender<FileChange>, project: &Project) {
    tx.send(FileChange::Modified(project.root.join("src/tasks/a.ts")))
        .await
        .unwrap();
}

async fn next_manifest(rx: &mut ManifestReceiver) -> Arc<BuildManifest> {
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("manifest published in time")
        .expect("session alive");
    rx.borrow_and_update().clone().expect("a manifest")
}

fn relative(manifest: &BuildManifest) -> Vec<String> {
    manifest
        .relative_files()
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

struct AddsSharp;

#[async_trait]
impl BuildExtension for AddsSharp {
    fn name(&self) -> &str {
        "A"
    }

    async fn on_build_complete(
        &self,
        _context: &BuildContext,
        mut manifest: BuildManifest,
    ) -> anyhow::Result<BuildManifest> {
        manifest.add_external(BuildExternal::new("sharp", "1.0.0"));
        Ok(manifest)
    }
}

struct ExcludesExternals;

#[async_trait]
impl BuildExtension for ExcludesExternals {
    fn name(&self) -> &str {
        "B"
    }

    async fn on_build_complete(
        &self,
        _context: &BuildContext,
        mut manifest: BuildManifest,
    ) -> anyhow::Result<BuildManifest> {
        let names: Vec<String> = manifest
            .externals
            .iter()
            .flatten()
            .map(|e| e.name.clone())
            .collect();
        manifest
            .deploy
            .env
            .insert("EXCLUDE".to_string(), names.join(","));
        Ok(manifest)
    }
}

struct FailsOn {
    start: bool,
}

#[async_trait]
impl BuildExtension for FailsOn {
    fn name(&self) -> &str {
        if self.start { "broken-start" } else { "broken-complete" }
    }

    async fn on_build_start(&self, _context: &mut BuildContext) -> anyhow::Result<()> {
        if self.start {
            anyhow::bail!("cannot reach registry");
        }
        Ok(())
    }

    async fn on_build_complete(
        &self,
        _context: &BuildContext,
        _manifest: BuildManifest,
    ) -> anyhow::Result<BuildManifest> {
        anyhow::bail!("complete hook exploded")
    }
}

/// Lets the first manifest through, then stalls every rebuild's complete
/// hook, announcing when it starts.
struct SlowRebuilds {
    calls: AtomicUsize,
    started: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl BuildExtension for SlowRebuilds {
    fn name(&self) -> &str {
        "slow-rebuilds"
    }

    async fn on_build_complete(
        &self,
        _context: &BuildContext,
        manifest: BuildManifest,
    ) -> anyhow::Result<BuildManifest> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            let _ = self.started.send(());
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(manifest)
    }
}

#[tokio::test]
async fn test_initial_manifest_lists_bundle_outputs() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![ScriptedPass::tasks(&[
        "src/tasks/a.mjs",
        "src/tasks/b.mjs",
    ])]);
    let (options, _tx) = scripted(&project, &engine);

    let session = start_dev_session(options).await.unwrap();
    assert_eq!(session.phase(), SessionPhase::Watching);

    let manifest = session.manifest().expect("initial manifest");
    assert_eq!(manifest.output_path, session.destination());
    assert_eq!(relative(&manifest), vec!["src/tasks/a.mjs", "src/tasks/b.mjs"]);
    assert_eq!(manifest.externals, Some(Vec::new()));
    for file in &manifest.files {
        assert!(file.out.is_file());
    }

    session.stop().await;
}

#[tokio::test]
async fn test_rebuilds_publish_into_fresh_worker_dirs() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![
        ScriptedPass::tasks(&["src/tasks/a.mjs"]),
        ScriptedPass::tasks(&["src/tasks/a.mjs", "src/tasks/b.mjs"]),
    ]);
    let (options, tx) = scripted(&project, &engine);
    let session = start_dev_session(options).await.unwrap();
    let mut manifests = session.subscribe();
    let destination = session.destination().to_path_buf();

    touch(&tx, &project).await;
    let first = next_manifest(&mut manifests).await;
    assert_eq!(relative(&first), vec!["src/tasks/a.mjs", "src/tasks/b.mjs"]);
    assert_ne!(first.output_path, destination);
    let name = first.output_path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("worker-"), "unexpected worker dir {}", name);
    for file in &first.files {
        assert!(file.out.starts_with(&first.output_path));
        assert!(file.out.is_file());
    }

    // Same bundle again: new directory, same relative layout and content
    touch(&tx, &project).await;
    let second = next_manifest(&mut manifests).await;
    assert_ne!(second.output_path, first.output_path);
    assert_eq!(relative(&second), relative(&first));
    assert_eq!(second.content_hash, first.content_hash);
    assert!(first.output_path.is_dir(), "older worker dirs stay until stop");

    session.stop().await;
    assert!(!destination.exists());
    assert!(!first.output_path.exists());
    assert!(!second.output_path.exists());
}

#[tokio::test]
async fn test_errors_never_publish_until_a_rebuild_succeeds() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![
        ScriptedPass::failing("syntax error"),
        ScriptedPass::failing("still broken"),
        ScriptedPass::tasks(&["src/tasks/a.mjs"]),
    ]);
    let (tap, mut results) = TapExtension::new();
    let (options, tx) = scripted(&project, &engine);
    let session = start_dev_session(options.extension(tap)).await.unwrap();
    let mut manifests = session.subscribe();

    assert!(next_result(&mut results).await.has_errors());
    assert!(session.manifest().is_none());
    assert_eq!(session.phase(), SessionPhase::Watching);

    // First rebuild fails too
    touch(&tx, &project).await;
    assert!(next_result(&mut results).await.has_errors());
    assert!(session.manifest().is_none());

    // Second rebuild succeeds and publishes
    touch(&tx, &project).await;
    let manifest = next_manifest(&mut manifests).await;
    assert_eq!(relative(&manifest), vec!["src/tasks/a.mjs"]);
    manifest.verify_outputs().unwrap();

    session.stop().await;
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_manifest() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![
        ScriptedPass::tasks(&["src/tasks/a.mjs"]),
        ScriptedPass::failing("type error"),
    ]);
    let (tap, mut results) = TapExtension::new();
    let (options, tx) = scripted(&project, &engine);
    let session = start_dev_session(options.extension(tap)).await.unwrap();
    let before = session.manifest().expect("initial manifest");
    next_result(&mut results).await;

    touch(&tx, &project).await;
    assert!(next_result(&mut results).await.has_errors());
    // Give the session plugin a moment after the tap
    tokio::time::sleep(Duration::from_millis(20)).await;

    let after = session.manifest().expect("manifest kept");
    assert!(Arc::ptr_eq(&before, &after));

    session.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_ends_watching() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![ScriptedPass::tasks(&["src/tasks/a.mjs"])]);
    let (options, tx) = scripted(&project, &engine);
    let session = start_dev_session(options).await.unwrap();
    let destination = session.destination().to_path_buf();
    assert!(destination.is_dir());

    session.stop().await;
    assert_eq!(session.phase(), SessionPhase::Stopped);
    assert!(!destination.exists());

    // A directory reappearing at the same path is not touched again
    std::fs::create_dir_all(&destination).unwrap();
    session.stop().await;
    assert!(destination.exists());
    assert_eq!(session.phase(), SessionPhase::Stopped);

    let _ = tx
        .send(FileChange::Modified(project.root.join("src/tasks/a.ts")))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.runs(), 1);
}

#[tokio::test]
async fn test_stop_during_rebuild_keeps_manifest_and_cleans_up() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![
        ScriptedPass::tasks(&["src/tasks/a.mjs"]),
        ScriptedPass::tasks(&["src/tasks/a.mjs", "src/tasks/b.mjs"]),
    ]);
    let (started_tx, mut started) = mpsc::unbounded_channel();
    let slow = Arc::new(SlowRebuilds {
        calls: AtomicUsize::new(0),
        started: started_tx,
    });
    let (options, tx) = scripted(&project, &engine);
    let session = start_dev_session(options.extension(slow)).await.unwrap();
    let before = session.manifest().expect("initial manifest");

    touch(&tx, &project).await;
    tokio::time::timeout(Duration::from_secs(5), started.recv())
        .await
        .expect("rebuild reached the complete hook")
        .expect("hook alive");

    // Stop while the rebuild's manifest is still being derived
    tokio::time::timeout(Duration::from_secs(5), session.stop())
        .await
        .expect("stop returns while a rebuild is in flight");

    assert_eq!(session.phase(), SessionPhase::Stopped);
    let after = session.manifest().expect("manifest kept");
    assert!(Arc::ptr_eq(&before, &after));
    let leftover = project.tmp_entries();
    assert!(leftover.is_empty(), "tmp entries left behind: {leftover:?}");
    assert_eq!(engine.runs(), 2);
}

#[tokio::test]
async fn test_extension_chain_scenario() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![ScriptedPass::tasks(&["index.js", "chunk-1.js"])]);
    let (options, _tx) = scripted(&project, &engine);
    let options = options
        .extension(Arc::new(AddsSharp))
        .extension(Arc::new(ExcludesExternals));

    let session = start_dev_session(options).await.unwrap();
    let manifest = session.manifest().expect("initial manifest");

    assert_eq!(
        manifest.externals,
        Some(vec![BuildExternal::new("sharp", "1.0.0")])
    );
    assert_eq!(
        manifest.deploy.env.get("EXCLUDE").map(String::as_str),
        Some("sharp")
    );
    assert_eq!(relative(&manifest), vec!["index.js", "chunk-1.js"]);

    session.stop().await;
}

#[tokio::test]
async fn test_start_hook_failure_is_fatal_and_leaves_nothing() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![ScriptedPass::tasks(&["src/tasks/a.mjs"])]);
    let (options, _tx) = scripted(&project, &engine);

    let result = start_dev_session(options.extension(Arc::new(FailsOn { start: true }))).await;
    match result {
        Err(CliError::Bundler(kiln_bundler::Error::ExtensionHook { extension, hook, .. })) => {
            assert_eq!(extension, "broken-start");
            assert_eq!(hook, "build start");
        }
        other => panic!("expected start hook failure, got {:?}", other.map(|s| s.phase())),
    }
    assert_eq!(engine.runs(), 0);
    assert_eq!(project.tmp_entries(), Vec::<PathBuf>::new());
}

#[tokio::test]
async fn test_initial_complete_failure_keeps_session_alive() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![ScriptedPass::tasks(&["src/tasks/a.mjs"])]);
    let (options, _tx) = scripted(&project, &engine);

    let session = start_dev_session(options.extension(Arc::new(FailsOn { start: false })))
        .await
        .unwrap();
    assert!(session.manifest().is_none());
    assert_eq!(session.phase(), SessionPhase::Watching);

    session.stop().await;
}

#[tokio::test]
async fn test_duplicate_extension_is_rejected() {
    let project = Project::new();
    let engine = ScriptedEngine::new(vec![ScriptedPass::tasks(&["src/tasks/a.mjs"])]);
    let (options, _tx) = scripted(&project, &engine);
    let extension: kiln_bundler::SharedExtension = Arc::new(AddsSharp);

    let result = start_dev_session(options.extension(extension.clone()).extension(extension)).await;
    assert!(matches!(
        result,
        Err(CliError::Bundler(kiln_bundler::Error::DuplicateExtension(name))) if name == "A"
    ));
    assert!(project.tmp_entries().is_empty());
}

#[tokio::test]
async fn test_filesystem_watch_with_staging_engine() {
    let project = Project::new();
    project.write("src/tasks/a.ts", "export const a = 1;\n");
    let session = start_dev_session(
        DevSessionOptions::new(project.config()).debounce(Duration::from_millis(50)),
    )
    .await
    .unwrap();
    let mut manifests = session.subscribe();
    assert_eq!(
        relative(&session.manifest().expect("initial manifest")),
        vec!["src/tasks/a.ts"]
    );

    project.write("src/tasks/b.ts", "export const b = 2;\n");
    let manifest = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let manifest = next_manifest(&mut manifests).await;
            if manifest.files.len() == 2 {
                return manifest;
            }
        }
    })
    .await
    .expect("rebuild picked up the new task");
    assert_eq!(relative(&manifest), vec!["src/tasks/a.ts", "src/tasks/b.ts"]);

    session.stop().await;
}
