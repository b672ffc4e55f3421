//! Per-request workspace management.
//!
//! Each conversion request gets an isolated, uniquely named directory under
//! the configured temp root. The directory holds exactly one input file and
//! one output file and is removed when the [`Workspace`] is dropped, on every
//! exit path. Cleanup failures are logged and never surfaced to the caller.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;
use crate::mapping::TargetFormat;

/// Isolated working directory for a single conversion request.
pub struct Workspace {
    temp_dir: TempDir,
    input_path: PathBuf,
}

impl Workspace {
    /// Create a new workspace under `temp_root` for a source file with the
    /// given extension (lowercase, no dot).
    pub fn create(temp_root: &Path, source_ext: &str) -> Result<Self> {
        std::fs::create_dir_all(temp_root)?;

        let temp_dir = tempfile::Builder::new()
            .prefix("imagemill-")
            .tempdir_in(temp_root)?;

        let input_path = temp_dir.path().join(format!("input.{source_ext}"));

        tracing::debug!("Created workspace {:?}", temp_dir.path());

        Ok(Self {
            temp_dir,
            input_path,
        })
    }

    /// Path the uploaded bytes are written to.
    pub fn input(&self) -> &Path {
        &self.input_path
    }

    /// Path the converter writes its result to for the given target.
    pub fn output_for(&self, format: TargetFormat) -> PathBuf {
        self.temp_dir
            .path()
            .join(format!("output.{}", format.as_str()))
    }

    /// The workspace directory itself.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Remove the workspace immediately, logging failures.
    pub fn cleanup(self) {
        let path = self.temp_dir.path().to_path_buf();
        if let Err(e) = self.temp_dir.close() {
            tracing::warn!("Failed to remove workspace {:?}: {}", path, e);
        }
    }
}
