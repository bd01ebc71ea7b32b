//! Local filesystem workspace storage.
//!
//! Implements the `WorkspaceFiles` port with files stored at
//! `{base_dir}/workspaces/{workspace_id}/files/{relative_path}`. Relative
//! paths never escape the workspace root.

use std::path::{Component, Path, PathBuf};

use runlet_core::repository::WorkspaceFiles;
use runlet_types::error::RepositoryError;
use uuid::Uuid;

/// Filesystem-backed workspace storage.
pub struct WorkspaceStorage {
    base_dir: PathBuf,
}

impl WorkspaceStorage {
    /// Create storage rooted at `base_dir`. Files for a workspace live
    /// under `{base_dir}/workspaces/{workspace_id}/files/`.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The files directory for one workspace.
    fn workspace_files_dir(&self, workspace_id: &Uuid) -> PathBuf {
        self.base_dir
            .join("workspaces")
            .join(workspace_id.to_string())
            .join("files")
    }

    /// Reject absolute paths and any `..` component.
    fn validate_relative(path: &str) -> Result<(), RepositoryError> {
        let p = Path::new(path);
        let escapes = p.is_absolute()
            || p.components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        if escapes {
            return Err(RepositoryError::Query(format!(
                "path '{path}' escapes workspace storage"
            )));
        }
        Ok(())
    }
}

impl WorkspaceFiles for WorkspaceStorage {
    async fn read(
        &self,
        workspace_id: &Uuid,
        relative_path: &str,
    ) -> Result<Vec<u8>, RepositoryError> {
        Self::validate_relative(relative_path)?;
        let path = self.workspace_files_dir(workspace_id).join(relative_path);

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(RepositoryError::NotFound)
            }
            Err(err) => Err(RepositoryError::Query(format!(
                "read {}: {err}",
                path.display()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
