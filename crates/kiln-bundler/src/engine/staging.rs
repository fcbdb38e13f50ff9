//! The default engine: resolves the module graph and stages it.
//!
//! Every module reachable from the entry points through relative imports is
//! copied into the output directory, keeping its path relative to the
//! project root. Bare imports go through the plugin chain; anything no
//! plugin claims must be a Node builtin or an installed package. Outputs are
//! only written when the whole pass is clean, and unchanged outputs are not
//! rewritten.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use path_clean::PathClean;
use rustc_hash::{FxHashMap, FxHashSet};

use super::scan::{is_bare, package_name, scan_imports};
use super::{BundleEngine, EngineRequest, OutputFile, OutputKind, RawBuildResult, SOURCE_EXTENSIONS};
use crate::diagnostics::{BuildDiagnostic, DiagnosticKind};
use crate::plugins::{ImportKind, ResolveArgs, ResolveDecision};

/// Node builtins that resolve without a `node:` prefix.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "crypto",
    "dgram",
    "dns",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "querystring",
    "readline",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

pub fn is_node_builtin(specifier: &str) -> bool {
    specifier.starts_with("node:") || NODE_BUILTINS.contains(&package_name(specifier))
}

/// Default engine: copies the module graph reachable from the entries into
/// the out dir unchanged. Sources are not transformed, so `build.jsx` has
/// no effect here.
#[derive(Default)]
pub struct StagingEngine {
    /// Content hash of every output written by an earlier pass, per out dir
    written: Mutex<FxHashMap<PathBuf, FxHashMap<PathBuf, blake3::Hash>>>,
}

impl StagingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve_import(
        &self,
        request: &EngineRequest<'_>,
        importer: &Path,
        specifier: &str,
        kind: ImportKind,
    ) -> Result<Option<PathBuf>, String> {
        if !is_bare(specifier) {
            return resolve_local(importer, specifier)
                .map(Some)
                .ok_or_else(|| format!("Could not resolve \"{}\"", specifier));
        }

        let args = ResolveArgs {
            specifier,
            importer,
            kind,
        };
        match request.plugins.resolve(&args).await {
            Ok(ResolveDecision::External) => Ok(None),
            Ok(ResolveDecision::Resolved(path)) if path.is_file() => Ok(Some(path)),
            Ok(ResolveDecision::Resolved(path)) => Err(format!(
                "Could not resolve \"{}\": plugin pointed at missing file {}",
                specifier,
                path.display()
            )),
            Ok(ResolveDecision::Continue) if is_node_builtin(specifier) => Ok(None),
            Ok(ResolveDecision::Continue) => {
                let package = package_name(specifier);
                if find_package(importer, &request.config.working_dir, package).is_some() {
                    Ok(None)
                } else {
                    Err(format!(
                        "Could not resolve \"{}\". You can mark \"{}\" as external to exclude it from the bundle",
                        specifier, package
                    ))
                }
            }
            Err(diagnostic) => Err(diagnostic.message),
        }
    }

    /// Write staged outputs whose contents changed and remove outputs of
    /// `out_dir` that are no longer produced.
    async fn flush(&self, out_dir: &Path, staged: &[(PathBuf, Vec<u8>)]) -> std::io::Result<()> {
        let pending: Vec<(&PathBuf, &Vec<u8>, blake3::Hash)> = {
            let written = self.written.lock();
            let previous = written.get(out_dir);
            staged
                .iter()
                .map(|(path, bytes)| (path, bytes, blake3::hash(bytes)))
                .filter(|(path, _, hash)| {
                    previous.and_then(|p| p.get(*path)) != Some(hash) || !path.is_file()
                })
                .collect()
        };

        for (path, bytes, _) in &pending {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, bytes).await?;
        }

        let current: FxHashSet<&PathBuf> = staged.iter().map(|(path, _)| path).collect();
        let stale: Vec<PathBuf> = {
            let mut all = self.written.lock();
            let written = all.entry(out_dir.to_path_buf()).or_default();
            for (path, _, hash) in &pending {
                written.insert((*path).clone(), *hash);
            }
            let stale: Vec<PathBuf> = written
                .keys()
                .filter(|path| !current.contains(path))
                .cloned()
                .collect();
            for path in &stale {
                written.remove(path);
            }
            stale
        };

        for path in stale {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::trace!(path = %path.display(), "removed stale output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            written = pending.len(),
            unchanged = staged.len() - pending.len(),
            "flushed outputs"
        );
        Ok(())
    }
}

#[async_trait]
impl BundleEngine for StagingEngine {
    fn name(&self) -> &str {
        "staging"
    }

    async fn bundle(&self, request: EngineRequest<'_>) -> RawBuildResult {
        let working_dir = request.config.working_dir.clone();
        let mut result = RawBuildResult {
            working_dir: working_dir.clone(),
            out_dir: request.out_dir.to_path_buf(),
            ..Default::default()
        };

        let mut queue: VecDeque<(PathBuf, OutputKind)> = VecDeque::new();
        for entry in request.entries {
            if entry.path.is_file() {
                queue.push_back((entry.path.clean(), entry.kind));
            } else {
                result.errors.push(BuildDiagnostic::error(
                    DiagnosticKind::UnresolvedEntry,
                    format!("Entry point not found: {}", entry.path.display()),
                ));
            }
        }

        let mut seen: FxHashSet<PathBuf> = FxHashSet::default();
        let mut staged: Vec<(PathBuf, Vec<u8>)> = Vec::new();
        let mut outputs: Vec<OutputFile> = Vec::new();

        while let Some((source, kind)) = queue.pop_front() {
            if !seen.insert(source.clone()) {
                continue;
            }

            let Ok(rel) = source.strip_prefix(&working_dir) else {
                result.errors.push(
                    BuildDiagnostic::error(
                        DiagnosticKind::UnresolvedImport,
                        "Module is outside the project root",
                    )
                    .with_location(&source, None),
                );
                continue;
            };
            let out = request.out_dir.join(rel);

            let bytes = match tokio::fs::read(&source).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    result.errors.push(
                        BuildDiagnostic::error(DiagnosticKind::Io, e.to_string())
                            .with_location(&source, None),
                    );
                    continue;
                }
            };

            if is_source_file(&source) {
                let text = String::from_utf8_lossy(&bytes);
                for import in scan_imports(&text) {
                    let Some(specifier) = import.specifier.as_deref() else {
                        result.warnings.push(
                            BuildDiagnostic::warning(
                                DiagnosticKind::DynamicImport,
                                "This import() cannot be analyzed and its target will not be bundled",
                            )
                            .with_location(rel, Some(import.line)),
                        );
                        continue;
                    };

                    match self
                        .resolve_import(&request, &source, specifier, import.kind)
                        .await
                    {
                        Ok(Some(path)) => queue.push_back((path, OutputKind::Chunk)),
                        Ok(None) => {}
                        Err(message) => result.errors.push(
                            BuildDiagnostic::error(DiagnosticKind::UnresolvedImport, message)
                                .with_location(rel, Some(import.line)),
                        ),
                    }
                }
            }

            outputs.push(OutputFile {
                kind,
                source: source.clone(),
                path: out.clone(),
            });
            staged.push((out, bytes));
        }

        if result.has_errors() {
            return result;
        }

        if let Err(e) = self.flush(request.out_dir, &staged).await {
            result.errors.push(BuildDiagnostic::error(
                DiagnosticKind::Io,
                format!("Failed to write outputs: {}", e),
            ));
            return result;
        }

        result.outputs = outputs;
        result
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Resolve a relative or absolute import the way bundlers do: the exact
/// file, then with each source extension, then a TypeScript source for a
/// `.js` specifier, then a directory index.
fn resolve_local(importer: &Path, specifier: &str) -> Option<PathBuf> {
    let base = importer.parent().unwrap_or(Path::new("/"));
    let candidate = if specifier.starts_with('/') {
        PathBuf::from(specifier).clean()
    } else {
        base.join(specifier).clean()
    };

    if candidate.is_file() {
        return Some(candidate);
    }

    let with_ext = |ext: &str| {
        let mut name = candidate.clone().into_os_string();
        name.push(".");
        name.push(ext);
        PathBuf::from(name)
    };
    if let Some(found) = SOURCE_EXTENSIONS
        .iter()
        .chain(std::iter::once(&"json"))
        .map(|ext| with_ext(*ext))
        .find(|p| p.is_file())
    {
        return Some(found);
    }

    let ts_twin = match candidate.extension().and_then(|e| e.to_str()) {
        Some("js") => Some("ts"),
        Some("jsx") => Some("tsx"),
        Some("mjs") => Some("mts"),
        Some("cjs") => Some("cts"),
        _ => None,
    };
    if let Some(ext) = ts_twin {
        let twin = candidate.with_extension(ext);
        if twin.is_file() {
            return Some(twin);
        }
    }

    SOURCE_EXTENSIONS
        .iter()
        .map(|ext| candidate.join(format!("index.{}", ext)))
        .find(|p| p.is_file())
}

/// Find `node_modules/<package>` walking up from the importer, stopping at
/// the project root's parent.
pub(crate) fn find_package(importer: &Path, working_dir: &Path, package: &str) -> Option<PathBuf> {
    let stop = working_dir.parent();
    for dir in importer.ancestors().skip(1) {
        let candidate = dir.join("node_modules").join(package);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if Some(dir) == stop {
            break;
        }
    }
    None
}
