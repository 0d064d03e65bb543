//! PID file bookkeeping for external process supervision.

use anyhow::Context;
use std::fs;
use std::path::PathBuf;

/// A PID file that is written on creation and removed when dropped.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn write(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, std::process::id().to_string())
            .with_context(|| format!("Failed to write PID file: {}", path.display()))?;
        tracing::info!(path = %path.display(), pid = std::process::id(), "PID file written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove PID file");
        }
    }
}
