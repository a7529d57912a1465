//! Debian package manager wrapper (`apt-get`, `dpkg`, `dpkg-query`).

use std::path::Path;

use super::context::Host;
use crate::error::{ProvisionError, Result};
use crate::exec::{CommandSpec, QUERY_TIMEOUT};

const INSTALLED_STATUS: &str = "install ok installed";

pub struct PackageManager<'a> {
    host: &'a Host,
}

impl<'a> PackageManager<'a> {
    pub fn new(host: &'a Host) -> Self {
        Self { host }
    }

    fn apt_get() -> CommandSpec {
        CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
    }

    pub async fn update(&self) -> Result<()> {
        self.host
            .run_privileged(Self::apt_get().arg("update").streaming())
            .await?;
        Ok(())
    }

    pub async fn refresh_and_upgrade(&self) -> Result<()> {
        tracing::info!("Refreshing package index");
        self.update().await?;

        tracing::info!("Upgrading installed packages");
        self.host
            .run_privileged(Self::apt_get().args(["upgrade", "-y"]).streaming())
            .await?;
        Ok(())
    }

    /// Install `packages` in one transaction. Failure names the whole set.
    pub async fn install(&self, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }

        tracing::info!("Installing {}", packages.join(" "));
        self.host
            .run_privileged(
                Self::apt_get()
                    .args(["install", "-y"])
                    .args(packages.iter().cloned())
                    .streaming(),
            )
            .await
            .map_err(|e| ProvisionError::install(packages.join(", "), e))?;
        Ok(())
    }

    pub async fn remove(&self, package: &str) -> Result<()> {
        self.host
            .run_privileged(Self::apt_get().args(["remove", "-y", package]))
            .await?;
        Ok(())
    }

    /// Whether dpkg reports `package` as installed. Unknown packages are not installed.
    pub async fn is_installed(&self, package: &str) -> Result<bool> {
        let output = self
            .host
            .output(CommandSpec::new("dpkg-query")
                    .args(["-W", "-f=${Status}", package])
                    .timeout(QUERY_TIMEOUT))
            .await?;
        Ok(output.success() && output.stdout.contains(INSTALLED_STATUS))
    }

    pub async fn install_deb(&self, path: &Path) -> Result<()> {
        self.host
            .run_privileged(
                CommandSpec::new("dpkg")
                    .arg("-i")
                    .arg(path.to_string_lossy())
                    .streaming(),
            )
            .await?;
        Ok(())
    }

    /// Let apt pull in whatever a half-installed package is missing.
    pub async fn fix_broken(&self) -> Result<()> {
        tracing::info!("Repairing package dependencies");
        self.host
            .run_privileged(Self::apt_get().args(["install", "-f", "-y"]).streaming())
            .await?;
        Ok(())
    }

    pub async fn architecture(&self) -> Result<String> {
        let output = self
            .host
            .run(
                CommandSpec::new("dpkg")
                    .arg("--print-architecture")
                    .timeout(QUERY_TIMEOUT),
            )
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}
