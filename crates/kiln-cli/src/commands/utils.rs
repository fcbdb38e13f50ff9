//! Helpers shared by commands.

use std::path::{Path, PathBuf};

use kiln_config::{ConfigDiscovery, ResolvedConfig};

use crate::error::{Result, ResultExt};

/// Canonical project root: `--cwd` if given, else the current directory.
pub(crate) fn project_root(cwd: Option<&Path>) -> Result<PathBuf> {
    let root = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    std::fs::canonicalize(&root).with_path(&root)
}

/// Load and validate the project settings.
pub(crate) fn load_config(cwd: Option<&Path>, file: Option<&Path>) -> Result<ResolvedConfig> {
    let root = project_root(cwd)?;
    let mut discovery = ConfigDiscovery::new(&root);
    if let Some(file) = file {
        discovery = discovery.with_file(file);
    }
    let config = discovery.load()?;

    tracing::debug!(
        project = %config.project,
        root = %config.working_dir.display(),
        dirs = config.dirs.len(),
        "loaded project settings"
    );
    Ok(config)
}

/// Resolve `path` against the project root unless it is absolute.
pub(crate) fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
