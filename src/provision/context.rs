//! Host context shared by the installers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::expand_path;
use crate::error::Result;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec, Privilege};
use crate::net::Downloader;
use crate::preflight::OsRelease;

/// Everything an installer needs to act on the machine.
pub struct Host {
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) privilege: Privilege,
    pub(crate) downloader: Downloader,
    pub(crate) workspace: PathBuf,
    pub(crate) user: String,
    pub(crate) home: PathBuf,
    pub(crate) os: OsRelease,
}

impl Host {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        privilege: Privilege,
        downloader: Downloader,
        workspace: PathBuf,
        user: String,
        home: PathBuf,
        os: OsRelease,
    ) -> Self {
        Self {
            runner,
            privilege,
            downloader,
            workspace,
            user,
            home,
            os,
        }
    }

    pub fn expand(&self, raw: &str) -> PathBuf {
        expand_path(raw, &self.home)
    }

    pub fn workspace_file(&self, name: &str) -> PathBuf {
        self.workspace.join(name)
    }

    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        self.runner.resolve(program)
    }

    /// Run a command and return its output whatever the exit status.
    pub async fn output(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.runner.run(&spec).await
    }

    /// Run a command; a non-zero exit is an error.
    pub async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let output = self.runner.run(&spec).await?;
        output.into_result(&spec)
    }

    /// Run a command through the privilege capability; a non-zero exit is an error.
    pub async fn run_privileged(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.run(self.privilege.wrap(spec)).await
    }

    /// Copy a staged file into a root-owned location with the given mode.
    pub async fn install_file(&self, src: &Path, dest: &Path, mode: &str) -> Result<()> {
        self.run_privileged(
            CommandSpec::new("install")
                .args(["-m", mode])
                .arg(src.to_string_lossy())
                .arg(dest.to_string_lossy()),
        )
        .await?;
        Ok(())
    }

    /// Create a root-owned directory (and parents) with the given mode.
    pub async fn ensure_dir(&self, dir: &Path, mode: &str) -> Result<()> {
        self.run_privileged(
            CommandSpec::new("install")
                .args(["-m", mode, "-d"])
                .arg(dir.to_string_lossy()),
        )
        .await?;
        Ok(())
    }
}
