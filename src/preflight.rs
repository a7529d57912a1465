//! Pre-flight checks before provisioning.
//!
//! Nothing on the host is touched until all of these pass:
//! 1. not running as the superuser
//! 2. the privilege escalation command is on `PATH`
//! 3. `/etc/os-release` names a supported distribution family
//! 4. the probe URL is reachable

use std::path::Path;

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::net::Downloader;

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// The fields of `os-release(5)` rigup cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsRelease {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_codename: Option<String>,
    pub ubuntu_codename: Option<String>,
    pub pretty_name: Option<String>,
}

impl OsRelease {
    pub fn parse(content: &str) -> Self {
        let mut os = OsRelease::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();

            match key.trim() {
                "ID" => os.id = value.to_lowercase(),
                "ID_LIKE" => {
                    os.id_like = value
                        .split_whitespace()
                        .map(|s| s.to_lowercase())
                        .collect()
                }
                "VERSION_CODENAME" if !value.is_empty() => os.version_codename = Some(value),
                "UBUNTU_CODENAME" if !value.is_empty() => os.ubuntu_codename = Some(value),
                "PRETTY_NAME" => os.pretty_name = Some(value),
                _ => {}
            }
        }

        os
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Preflight(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self::parse(&content))
    }

    /// The first of `supported` this release is, or is like.
    pub fn family<'a>(&self, supported: &'a [String]) -> Option<&'a str> {
        supported
            .iter()
            .find(|s| self.id == **s || self.id_like.iter().any(|l| l == *s))
            .map(String::as_str)
    }

    /// Which vendor repository flavour (`ubuntu` or `debian`) fits this release.
    ///
    /// Derivatives like Linux Mint are `ID_LIKE=ubuntu` and use Ubuntu's repos.
    pub fn repo_distro(&self) -> &str {
        if self.id == "ubuntu" || self.id_like.iter().any(|l| l == "ubuntu") {
            "ubuntu"
        } else {
            "debian"
        }
    }

    /// Release codename for the vendor repository.
    pub fn codename(&self) -> Option<&str> {
        if self.repo_distro() == "ubuntu" {
            self.ubuntu_codename
                .as_deref()
                .or(self.version_codename.as_deref())
        } else {
            self.version_codename.as_deref()
        }
    }

    pub fn display_name(&self) -> &str {
        self.pretty_name.as_deref().unwrap_or(&self.id)
    }
}

pub fn check_not_root(euid: u32) -> Result<()> {
    if euid == 0 {
        return Err(ProvisionError::Preflight(
            "Do not run rigup as root. Run it as your regular user; it escalates with sudo where needed."
                .to_string(),
        ));
    }
    Ok(())
}

pub fn check_distribution<'a>(os: &OsRelease, supported: &'a [String]) -> Result<&'a str> {
    os.family(supported).ok_or_else(|| {
        ProvisionError::Preflight(format!(
            "Unsupported distribution '{}'. Supported families: {}",
            os.display_name(),
            supported.join(", ")
        ))
    })
}

pub async fn check_network(downloader: &Downloader, probe_url: &str) -> Result<()> {
    downloader.probe(probe_url).await.map_err(|e| {
        ProvisionError::Preflight(format!("Network check against {} failed: {}", probe_url, e))
    })
}

pub fn check_escalator(command: &str) -> Result<()> {
    which::which(command).map(|_| ()).map_err(|_| {
        ProvisionError::Preflight(format!(
            "'{}' not found on PATH. Install it or set privilege.command in the config.",
            command
        ))
    })
}

/// The invoking account, from the passwd database or `$USER`.
pub fn current_user() -> Result<String> {
    #[cfg(unix)]
    {
        let uid = nix::unistd::getuid();
        if let Ok(Some(user)) = nix::unistd::User::from_uid(uid) {
            return Ok(user.name);
        }
    }

    std::env::var("USER")
        .map_err(|_| ProvisionError::Preflight("Cannot determine the current user".to_string()))
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    nix::unistd::geteuid().as_raw()
}

#[cfg(not(unix))]
fn effective_uid() -> u32 {
    u32::MAX
}

/// Run every check in order. Returns the parsed release for later steps.
pub async fn run(config: &ProvisionConfig, downloader: &Downloader) -> Result<OsRelease> {
    check_not_root(effective_uid())?;
    check_escalator(&config.privilege.command)?;

    let os = OsRelease::load(Path::new(OS_RELEASE_PATH))?;
    let family = check_distribution(&os, &config.preflight.supported_distros)?;
    tracing::info!("Detected {} ({} family)", os.display_name(), family);

    check_network(downloader, &config.preflight.probe_url).await?;
    tracing::info!("Network reachable");

    Ok(os)
}
