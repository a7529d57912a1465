//! rbenv, ruby-build and the pinned Ruby versions.
//!
//! Everything here runs as the invoking user inside their home directory;
//! nothing is escalated.

use std::path::{Path, PathBuf};

use futures::FutureExt;

use super::context::Host;
use super::policy::StepPolicy;
use super::profile::{self, BlockChange, ManagedBlock};
use super::types::StepOutcome;
use crate::config::RubyConfig;
use crate::error::{ProvisionError, Result};
use crate::exec::{CommandSpec, QUERY_TIMEOUT};

/// Text that shows rbenv was already wired into a profile by hand.
const LEGACY_MARKER: &str = "rbenv init";

/// Summary of a version loop.
#[derive(Debug, Default, PartialEq)]
pub struct VersionReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct RubyInstaller<'a> {
    host: &'a Host,
    config: &'a RubyConfig,
}

impl<'a> RubyInstaller<'a> {
    pub const GEM_POLICY: StepPolicy = StepPolicy::WarnOnly;
    pub const REHASH_POLICY: StepPolicy = StepPolicy::WarnOnly;

    pub fn new(host: &'a Host, config: &'a RubyConfig) -> Self {
        Self { host, config }
    }

    pub fn root(&self) -> PathBuf {
        self.host.expand(&self.config.rbenv_root)
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.root().join("plugins").join("ruby-build")
    }

    fn rbenv_bin(&self) -> PathBuf {
        self.root().join("bin").join("rbenv")
    }

    fn rbenv(&self) -> CommandSpec {
        CommandSpec::new(self.rbenv_bin().to_string_lossy())
            .env("RBENV_ROOT", self.root().to_string_lossy())
    }

    pub fn init_block(&self) -> ManagedBlock {
        let root = self.config.rbenv_root.replacen('~', "$HOME", 1);
        ManagedBlock::new(
            "rbenv",
            format!(
                "export RBENV_ROOT=\"{root}\"\nexport PATH=\"$RBENV_ROOT/bin:$PATH\"\neval \"$(rbenv init -)\""
            ),
        )
        .with_legacy_marker(LEGACY_MARKER)
    }

    pub async fn install(&self) -> Result<StepOutcome> {
        let mut changes = Vec::new();

        if self.clone_if_absent(&self.config.rbenv_repo, &self.root()).await? {
            changes.push("cloned rbenv".to_string());
        }
        if self
            .clone_if_absent(&self.config.ruby_build_repo, &self.plugin_dir())
            .await?
        {
            changes.push("cloned ruby-build".to_string());
        }

        let wired = self.wire_profiles()?;
        if !wired.is_empty() {
            changes.push(format!("wired {}", wired.join(", ")));
        }

        let report = self.install_versions().await?;
        if !report.installed.is_empty() {
            changes.push(format!("installed ruby {}", report.installed.join(", ")));
        }

        self.set_global().await?;

        if changes.is_empty() {
            Ok(StepOutcome::unchanged(format!(
                "ruby {} already present, global {}",
                self.config.versions.join(", "),
                self.config.default_version
            )))
        } else {
            Ok(StepOutcome::changed(changes.join("; ")))
        }
    }

    /// Returns whether a clone happened.
    async fn clone_if_absent(&self, repo: &str, dest: &Path) -> Result<bool> {
        if dest.exists() {
            tracing::info!("{} already exists, skipping clone", dest.display());
            return Ok(false);
        }

        tracing::info!("Cloning {} into {}", repo, dest.display());
        self.host
            .run(
                CommandSpec::new("git")
                    .args(["clone", "--depth", "1", repo])
                    .arg(dest.to_string_lossy())
                    .streaming(),
            )
            .await
            .map_err(|e| ProvisionError::install(repo, e))?;
        Ok(true)
    }

    /// Add the init block to every configured profile that lacks it.
    ///
    /// Returns the files that changed.
    pub fn wire_profiles(&self) -> Result<Vec<String>> {
        let block = self.init_block();
        let mut changed = Vec::new();

        for raw in &self.config.profiles {
            let path = self.host.expand(raw);
            match profile::ensure_block(&path, &block)? {
                BlockChange::Unchanged => {
                    tracing::debug!("{} already initializes rbenv", path.display());
                }
                change => {
                    tracing::info!("rbenv init {:?} in {}", change, path.display());
                    changed.push(raw.clone());
                }
            }
        }

        if changed.is_empty() {
            tracing::warn!("rbenv is already configured in every profile; nothing was added");
        }
        Ok(changed)
    }

    pub async fn installed_versions(&self) -> Result<Vec<String>> {
        if !self.rbenv_bin().exists() {
            return Ok(Vec::new());
        }

        let output = self
            .host
            .run(
                self.rbenv()
                    .args(["versions", "--bare"])
                    .timeout(QUERY_TIMEOUT),
            )
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    pub async fn install_versions(&self) -> Result<VersionReport> {
        let mut report = VersionReport::default();

        for version in &self.config.versions {
            if self.installed_versions().await?.contains(version) {
                tracing::info!("Ruby {} is already installed, skipping", version);
                report.skipped.push(version.clone());
                continue;
            }

            let what = format!("ruby {}", version);
            tracing::info!("Installing Ruby {} (this compiles from source)", version);
            self.host
                .run(self.rbenv().args(["install", version.as_str()]).streaming())
                .await
                .map_err(|e| ProvisionError::install(&what, e))?;

            if !self.installed_versions().await?.contains(version) {
                return Err(ProvisionError::install(
                    &what,
                    ProvisionError::Other(anyhow::anyhow!(
                        "rbenv does not list {} after install",
                        version
                    )),
                ));
            }

            self.install_gems(version).await?;
            self.rehash().await?;
            report.installed.push(version.clone());
        }

        Ok(report)
    }

    async fn install_gems(&self, version: &str) -> Result<()> {
        for gem in &self.config.gems {
            let spec = self
                .rbenv()
                .env("RBENV_VERSION", version)
                .args(["exec", "gem", "install", gem.as_str()]);
            Self::GEM_POLICY
                .apply(
                    &format!("gem install {} for Ruby {}", gem, version),
                    || self.host.run(spec.clone()).map(|r| r.map(|_| ())).boxed(),
                    None,
                )
                .await?;
        }
        Ok(())
    }

    async fn rehash(&self) -> Result<()> {
        Self::REHASH_POLICY
            .apply(
                "rbenv rehash",
                || {
                    self.host
                        .run(self.rbenv().arg("rehash"))
                        .map(|r| r.map(|_| ()))
                        .boxed()
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn set_global(&self) -> Result<()> {
        tracing::info!("Setting global Ruby to {}", self.config.default_version);
        self.host
            .run(self.rbenv().args(["global", self.config.default_version.as_str()]))
            .await?;
        Ok(())
    }
}
