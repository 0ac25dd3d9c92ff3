//! Local storage for fetched artifacts

use std::path::{Path, PathBuf};

/// Directory holding fetched observation letters
///
/// Artifact names are deterministic, `{application}_obs_{n}.pdf` with `/`
/// in the application number replaced by `_` and `n` counting from one, so a
/// re-run can tell which artifacts it already has.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the store directory if needed
    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// File name of the artifact at zero-based `position` of `item_id`
    pub fn file_name(item_id: &str, position: usize) -> String {
        format!("{}_obs_{}.pdf", item_id.trim().replace('/', "_"), position + 1)
    }

    pub fn path_for(&self, item_id: &str, position: usize) -> PathBuf {
        self.root.join(Self::file_name(item_id, position))
    }

    /// Returns true if a non-empty artifact is already stored for this position
    pub fn exists(&self, item_id: &str, position: usize) -> bool {
        std::fs::metadata(self.path_for(item_id, position))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }
}
