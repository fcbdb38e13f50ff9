//! Scoped temporary build directories.
//!
//! Every directory handed out here lives under `<project>/.kiln/tmp` and is
//! owned by exactly one [`EphemeralDirectory`]. The handle removes the
//! directory once: on [`EphemeralDirectory::release`] or, failing that, on
//! drop. Directories created with `keep = true` are left on disk.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::Result;

/// Owned handle to a temporary build directory.
#[derive(Debug)]
pub struct EphemeralDirectory {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl EphemeralDirectory {
    /// Create `<root>/<prefix>-XXXXXX`, creating `root` first if needed.
    pub fn create_in(root: &Path, prefix: &str, keep: bool) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir_in(root)?;
        let path = std::fs::canonicalize(dir.path())?;

        tracing::debug!(path = %path.display(), keep, "allocated ephemeral directory");

        let dir = if keep {
            let _ = dir.keep();
            None
        } else {
            Some(dir)
        };

        Ok(Self { path, dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the directory has been removed (or was never owned).
    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the directory. Later calls are no-ops.
    pub fn release(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            dir.close()?;
            tracing::debug!(path = %self.path.display(), "removed ephemeral directory");
        }
        Ok(())
    }
}

impl Drop for EphemeralDirectory {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            tracing::debug!(path = %self.path.display(), %error, "failed to remove ephemeral directory");
        }
    }
}

/// Allocate a directory for `prefix` (`build`, `worker`, ...) under the
/// project's `.kiln/tmp` root.
pub fn tmp_dir(project_root: &Path, prefix: &str, keep: bool) -> Result<EphemeralDirectory> {
    let root = project_root.join(kiln_config::KILN_DIR).join("tmp");
    EphemeralDirectory::create_in(&root, prefix, keep)
}
