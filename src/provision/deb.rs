//! Install a `.deb` straight from a download URL.

use futures::FutureExt;

use super::apt::PackageManager;
use super::context::Host;
use super::policy::{Applied, StepPolicy};
use super::types::StepOutcome;
use crate::config::DebArtifact;
use crate::error::{ProvisionError, Result};
use crate::utils::format_bytes;

pub struct DebInstaller<'a> {
    host: &'a Host,
}

impl<'a> DebInstaller<'a> {
    /// `dpkg -i` gets one dependency repair and one retry.
    pub const INSTALL_POLICY: StepPolicy = StepPolicy::RetryThenFatal;

    pub fn new(host: &'a Host) -> Self {
        Self { host }
    }

    pub async fn install(&self, artifact: &DebArtifact) -> Result<StepOutcome> {
        let apt = PackageManager::new(self.host);

        if apt.is_installed(&artifact.package).await? {
            tracing::info!("{} is already installed, skipping", artifact.package);
            return Ok(StepOutcome::unchanged(format!(
                "{} already installed",
                artifact.package
            )));
        }

        let dest = self.host.workspace_file(&artifact_file_name(artifact));
        tracing::info!("Downloading {}", artifact.url);
        let size = self
            .host
            .downloader
            .download(&artifact.url, &dest)
            .await
            .map_err(|e| ProvisionError::install(&artifact.package, e))?;
        tracing::info!("Downloaded {} ({})", artifact.package, format_bytes(size));

        let label = format!("dpkg -i {}", artifact.package);
        let applied = Self::INSTALL_POLICY
            .apply(
                &label,
                || apt.install_deb(&dest).boxed(),
                Some(apt.fix_broken().boxed()),
            )
            .await
            .map_err(|e| ProvisionError::install(&artifact.package, e))?;

        let detail = match applied {
            Applied::AfterRepair(_) => format!("{} installed after dependency repair", artifact.package),
            _ => format!("{} installed", artifact.package),
        };
        tracing::info!("{}", detail);
        Ok(StepOutcome::changed(detail))
    }
}

/// File name for the downloaded artifact: the URL's last segment, or the package name.
fn artifact_file_name(artifact: &DebArtifact) -> String {
    let from_url = artifact
        .url
        .split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|name| name.ends_with(".deb"));

    match from_url {
        Some(name) => name.to_string(),
        None => format!("{}.deb", artifact.package),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::exec::fake::ScriptedRunner;
    use crate::provision::context::testing;

    fn artifact(server: &MockServer) -> DebArtifact {
        DebArtifact {
            package: "google-chrome-stable".to_string(),
            url: format!("{}/linux/direct/google-chrome-stable_current_amd64.deb", server.uri()),
        }
    }

    async fn serve_deb(server: &MockServer, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/linux/direct/google-chrome-stable_current_amd64.deb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"!<arch>".to_vec()))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[test]
    fn test_install_policy_is_retry_then_fatal() {
        assert_eq!(DebInstaller::INSTALL_POLICY, StepPolicy::RetryThenFatal);
    }

    #[test]
    fn test_artifact_file_name() {
        let a = DebArtifact {
            package: "pkg".to_string(),
            url: "https://example.com/dl/pkg_1.0_amd64.deb?token=abc".to_string(),
        };
        assert_eq!(artifact_file_name(&a), "pkg_1.0_amd64.deb");

        let b = DebArtifact {
            package: "pkg".to_string(),
            url: "https://example.com/download".to_string(),
        };
        assert_eq!(artifact_file_name(&b), "pkg.deb");
    }

    #[tokio::test]
    async fn test_already_installed_skips_download() {
        let server = MockServer::start().await;
        serve_deb(&server, 0).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("dpkg-query", "install ok installed");
        let host = testing::host(runner.clone(), temp_dir.path());

        let outcome = DebInstaller::new(&host).install(&artifact(&server)).await.unwrap();

        assert!(!outcome.changed);
        assert_eq!(runner.count("dpkg -i"), 0);
    }

    #[tokio::test]
    async fn test_installs_into_workspace() {
        let server = MockServer::start().await;
        serve_deb(&server, 1).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("dpkg-query", 1, "no packages found");
        let host = testing::host(runner.clone(), temp_dir.path());

        let outcome = DebInstaller::new(&host).install(&artifact(&server)).await.unwrap();

        assert!(outcome.changed);
        let staged = temp_dir
            .path()
            .join("work")
            .join("google-chrome-stable_current_amd64.deb");
        assert!(staged.exists());
        assert_eq!(
            runner.count(&format!("sudo dpkg -i {}", staged.display())),
            1
        );
        assert_eq!(runner.count("apt-get install -f -y"), 0);
    }

    #[tokio::test]
    async fn test_repairs_and_retries_once() {
        let server = MockServer::start().await;
        serve_deb(&server, 1).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("dpkg-query", 1, "no packages found");
        runner.fail("dpkg -i", 1, "dependency problems - leaving unconfigured");
        runner.ok("dpkg -i", "");
        let host = testing::host(runner.clone(), temp_dir.path());

        let outcome = DebInstaller::new(&host).install(&artifact(&server)).await.unwrap();

        assert!(outcome.detail.contains("after dependency repair"));
        assert_eq!(runner.count("dpkg -i"), 2);
        let repair = runner.position("apt-get install -f -y").unwrap();
        let calls = runner.calls();
        let dpkg_positions: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| c.contains("dpkg -i"))
            .map(|(i, _)| i)
            .collect();
        assert!(dpkg_positions[0] < repair && repair < dpkg_positions[1]);
    }

    #[tokio::test]
    async fn test_second_failure_is_fatal() {
        let server = MockServer::start().await;
        serve_deb(&server, 1).await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("dpkg-query", 1, "no packages found");
        runner.fail("dpkg -i", 1, "dependency problems");
        let host = testing::host(runner.clone(), temp_dir.path());

        let err = DebInstaller::new(&host)
            .install(&artifact(&server))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("google-chrome-stable"));
        assert_eq!(runner.count("dpkg -i"), 2);
    }

    #[tokio::test]
    async fn test_download_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.fail("dpkg-query", 1, "no packages found");
        let host = testing::host(runner.clone(), temp_dir.path());

        let err = DebInstaller::new(&host)
            .install(&artifact(&server))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("503"));
        assert_eq!(runner.count("dpkg -i"), 0);
    }
}
