//! Docker Engine from the vendor apt repository.

use std::path::PathBuf;

use futures::FutureExt;

use super::apt::PackageManager;
use super::context::Host;
use super::policy::StepPolicy;
use super::types::StepOutcome;
use crate::config::DockerConfig;
use crate::error::{ProvisionError, Result};
use crate::exec::{CommandSpec, QUERY_TIMEOUT};

const KEY_FILE: &str = "docker.asc";

pub struct DockerInstaller<'a> {
    host: &'a Host,
    config: &'a DockerConfig,
}

impl<'a> DockerInstaller<'a> {
    /// Removing a conflicting distro package must never abort the run.
    pub const LEGACY_REMOVAL_POLICY: StepPolicy = StepPolicy::WarnOnly;

    pub fn new(host: &'a Host, config: &'a DockerConfig) -> Self {
        Self { host, config }
    }

    /// First match on the search path wins; there is no version check.
    pub fn is_installed(&self) -> Option<PathBuf> {
        self.host.resolve("docker")
    }

    pub fn key_path(&self) -> PathBuf {
        self.host.expand(&self.config.keyring_dir).join(KEY_FILE)
    }

    pub async fn install(&self) -> Result<StepOutcome> {
        if let Some(path) = self.is_installed() {
            tracing::info!("Docker already installed at {}, skipping", path.display());
            return Ok(StepOutcome::unchanged(format!(
                "docker found at {}",
                path.display()
            )));
        }

        let apt = PackageManager::new(self.host);

        self.remove_legacy_packages(&apt).await?;
        self.configure_repository(&apt).await?;

        apt.install(&self.config.packages).await?;

        let group_added = self.ensure_group_membership().await?;
        let detail = if group_added {
            format!("installed, {} added to group {}", self.host.user, self.config.group)
        } else {
            "installed".to_string()
        };
        Ok(StepOutcome::changed(detail))
    }

    /// Remove conflicting packages that are actually installed.
    ///
    /// Packages dpkg does not know as installed are skipped without calling
    /// apt, so "not installed" is always a success.
    pub async fn remove_legacy_packages(&self, apt: &PackageManager<'_>) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        for package in &self.config.legacy_packages {
            if !apt.is_installed(package).await? {
                tracing::debug!("{} not installed, nothing to remove", package);
                continue;
            }

            tracing::info!("Removing conflicting package {}", package);
            let applied = Self::LEGACY_REMOVAL_POLICY
                .apply(
                    &format!("Removing {}", package),
                    || apt.remove(package).boxed(),
                    None,
                )
                .await?;
            if !applied.is_tolerated() {
                removed.push(package.clone());
            }
        }

        Ok(removed)
    }

    /// Add the signing key and source entry unless the key is already present.
    pub async fn configure_repository(&self, apt: &PackageManager<'_>) -> Result<bool> {
        let keyring_dir = self.host.expand(&self.config.keyring_dir);
        self.host.ensure_dir(&keyring_dir, "0755").await?;

        let key_path = self.key_path();
        if key_path.exists() {
            tracing::info!("Docker signing key already present at {}", key_path.display());
            return Ok(false);
        }

        let distro = self.host.os.repo_distro();
        let codename = self.host.os.codename().ok_or_else(|| {
            ProvisionError::Preflight(
                "os-release has no release codename; cannot configure the Docker repository"
                    .to_string(),
            )
        })?;

        let key_url = self.config.key_url_for(distro);
        tracing::info!("Fetching Docker signing key from {}", key_url);
        let staged_key = self.host.workspace_file(KEY_FILE);
        self.host.downloader.download(&key_url, &staged_key).await?;
        self.host.install_file(&staged_key, &key_path, "0644").await?;

        let arch = apt.architecture().await?;
        let entry = source_entry(
            &arch,
            &key_path.to_string_lossy(),
            &self.config.repo_url_for(distro),
            codename,
        );

        let staged_list = self.host.workspace_file("docker.list");
        std::fs::write(&staged_list, &entry)?;
        let source_list = self.host.expand(&self.config.source_list);
        self.host
            .install_file(&staged_list, &source_list, "0644")
            .await?;
        tracing::info!("Added Docker repository: {}", entry.trim_end());

        apt.update().await?;
        Ok(true)
    }

    pub async fn is_group_member(&self) -> Result<bool> {
        let output = self
            .host
            .run(
                CommandSpec::new("id")
                    .args(["-nG", self.host.user.as_str()])
                    .timeout(QUERY_TIMEOUT),
            )
            .await?;
        Ok(output
            .stdout
            .split_whitespace()
            .any(|g| g == self.config.group))
    }

    /// Returns whether the user was added.
    async fn ensure_group_membership(&self) -> Result<bool> {
        if self.is_group_member().await? {
            tracing::info!("{} is already in group {}", self.host.user, self.config.group);
            return Ok(false);
        }

        self.host
            .run_privileged(
                CommandSpec::new("usermod").args(["-aG", self.config.group.as_str(), self.host.user.as_str()]),
            )
            .await?;
        tracing::warn!(
            "Added {} to group {}. Log out and back in for it to take effect.",
            self.host.user,
            self.config.group
        );
        Ok(true)
    }
}

fn source_entry(arch: &str, key_path: &str, repo_url: &str, codename: &str) -> String {
    format!(
        "deb [arch={} signed-by={}] {} {} stable\n",
        arch, key_path, repo_url, codename
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::exec::fake::ScriptedRunner;
    use crate::provision::context::testing;

    fn config(server: &MockServer, root: &std::path::Path) -> DockerConfig {
        DockerConfig {
            key_url: format!("{}/linux/{{distro}}/gpg", server.uri()),
            repo_url: "https://download.docker.com/linux/{distro}".to_string(),
            keyring_dir: root.join("keyrings").to_string_lossy().to_string(),
            source_list: root.join("docker.list").to_string_lossy().to_string(),
            ..DockerConfig::default()
        }
    }

    #[test]
    fn test_legacy_removal_is_best_effort() {
        assert_eq!(DockerInstaller::LEGACY_REMOVAL_POLICY, StepPolicy::WarnOnly);
    }

    #[test]
    fn test_source_entry_format() {
        assert_eq!(
            source_entry(
                "amd64",
                "/etc/apt/keyrings/docker.asc",
                "https://download.docker.com/linux/ubuntu",
                "noble"
            ),
            "deb [arch=amd64 signed-by=/etc/apt/keyrings/docker.asc] https://download.docker.com/linux/ubuntu noble stable\n"
        );
    }

    #[tokio::test]
    async fn test_already_installed_does_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.resolvable("docker");
        let host = testing::host(runner.clone(), temp_dir.path());
        let config = config(&server, temp_dir.path());

        let outcome = DockerInstaller::new(&host, &config).install().await.unwrap();

        assert!(!outcome.changed);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_install() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/linux/ubuntu/gpg"))
            .respond_with(ResponseTemplate::new(200).set_body_string("-----BEGIN PGP PUBLIC KEY BLOCK-----"))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("dpkg-query -W -f=${Status} runc", "install ok installed");
        runner.fail("dpkg-query", 1, "no packages found");
        runner.ok("dpkg --print-architecture", "amd64\n");
        runner.ok("id -nG dev", "dev adm sudo\n");
        let host = testing::host(runner.clone(), temp_dir.path());
        let config = config(&server, temp_dir.path());

        let outcome = DockerInstaller::new(&host, &config).install().await.unwrap();
        assert!(outcome.changed);
        assert!(outcome.detail.contains("added to group docker"));

        // Only the installed legacy package reaches apt.
        assert_eq!(runner.count("apt-get remove"), 1);
        assert_eq!(runner.count("apt-get remove -y runc"), 1);

        let keyrings = temp_dir.path().join("keyrings");
        assert_eq!(
            runner.count(&format!("sudo install -m 0755 -d {}", keyrings.display())),
            1
        );
        assert_eq!(
            runner.count(&format!("{}", keyrings.join("docker.asc").display())),
            1
        );

        let staged = std::fs::read_to_string(temp_dir.path().join("work").join("docker.list")).unwrap();
        assert!(staged.contains("arch=amd64"));
        assert!(staged.contains("https://download.docker.com/linux/ubuntu noble stable"));

        let update = runner.position("apt-get update").unwrap();
        let install = runner.position("apt-get install -y docker-ce docker-ce-cli containerd.io").unwrap();
        let usermod = runner.position("sudo usermod -aG docker dev").unwrap();
        assert!(update < install && install < usermod);
    }

    #[tokio::test]
    async fn test_existing_key_skips_repository_setup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let keyrings = temp_dir.path().join("keyrings");
        std::fs::create_dir_all(&keyrings).unwrap();
        std::fs::write(keyrings.join("docker.asc"), "key").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("dpkg-query", 1, "no packages found");
        runner.ok("id -nG dev", "dev docker\n");
        let host = testing::host(runner.clone(), temp_dir.path());
        let config = config(&server, temp_dir.path());

        let outcome = DockerInstaller::new(&host, &config).install().await.unwrap();

        assert_eq!(outcome.detail, "installed");
        assert_eq!(runner.count("apt-get update"), 0);
        assert_eq!(runner.count("dpkg --print-architecture"), 0);
        assert_eq!(runner.count("usermod"), 0);
        assert_eq!(runner.count("apt-get install -y docker-ce"), 1);
    }

    #[tokio::test]
    async fn test_failed_legacy_removal_is_tolerated() {
        let server = MockServer::start().await;
        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("dpkg-query -W -f=${Status} docker.io", "install ok installed");
        runner.fail("dpkg-query", 1, "no packages found");
        runner.fail("apt-get remove -y docker.io", 100, "E: held package");
        let host = testing::host(runner.clone(), temp_dir.path());
        let config = config(&server, temp_dir.path());

        let apt = PackageManager::new(&host);
        let removed = DockerInstaller::new(&host, &config)
            .remove_legacy_packages(&apt)
            .await
            .unwrap();

        assert!(removed.is_empty());
        assert_eq!(runner.count("apt-get remove"), 1);
    }

    #[tokio::test]
    async fn test_package_install_failure_is_fatal() {
        let server = MockServer::start().await;
        let temp_dir = tempfile::tempdir().unwrap();
        let keyrings = temp_dir.path().join("keyrings");
        std::fs::create_dir_all(&keyrings).unwrap();
        std::fs::write(keyrings.join("docker.asc"), "key").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("dpkg-query", 1, "no packages found");
        runner.fail("apt-get install -y docker-ce", 100, "E: Unable to locate package docker-ce");
        let host = testing::host(runner.clone(), temp_dir.path());
        let config = config(&server, temp_dir.path());

        let err = DockerInstaller::new(&host, &config)
            .install()
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), 100);
        assert_eq!(runner.count("usermod"), 0);
    }
}
