//! Scoped temporary workspace.
//!
//! Downloads and staged files live in a `rigup-*` directory that is removed
//! when the workspace is dropped, whichever way the run ends.

use std::path::Path;

use tempfile::TempDir;

use crate::error::Result;

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("rigup-").tempdir()?;
        tracing::debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Create the workspace under `parent` instead of the system temp dir.
    #[cfg(test)]
    pub fn create_in(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("rigup-").tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace now, reporting removal errors instead of ignoring them.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!("Removed workspace {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_close() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::create_in(parent.path()).unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(workspace.path().join("artifact.deb"), b"deb").unwrap();
        assert!(path.exists());

        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let workspace = Workspace::create_in(parent.path()).unwrap();
            std::fs::create_dir_all(workspace.path().join("nested/dir")).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_names_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = Workspace::create_in(parent.path()).unwrap();
        let b = Workspace::create_in(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("rigup-"));
    }
}
