use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub preflight: PreflightConfig,
    pub privilege: PrivilegeConfig,
    pub prerequisites: Vec<String>,
    pub browser: DebArtifact,
    pub docker: DockerConfig,
    pub ruby: RubyConfig,
    pub shell: ShellConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            preflight: PreflightConfig::default(),
            privilege: PrivilegeConfig::default(),
            prerequisites: default_prerequisites(),
            browser: DebArtifact::default(),
            docker: DockerConfig::default(),
            ruby: RubyConfig::default(),
            shell: ShellConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Build tools plus the headers ruby-build needs to compile every pinned version.
fn default_prerequisites() -> Vec<String> {
    strings(&[
        "ca-certificates",
        "curl",
        "git",
        "gnupg",
        "build-essential",
        "autoconf",
        "bison",
        "patch",
        "libssl-dev",
        "libyaml-dev",
        "libreadline-dev",
        "zlib1g-dev",
        "libgmp-dev",
        "libncurses-dev",
        "libffi-dev",
        "libgdbm-dev",
        "libdb-dev",
        "uuid-dev",
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Distribution families accepted in `ID` / `ID_LIKE`.
    pub supported_distros: Vec<String>,
    pub probe_url: String,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            supported_distros: vec!["debian".to_string(), "ubuntu".to_string()],
            probe_url: "https://www.google.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    pub command: String,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            command: "sudo".to_string(),
        }
    }
}

/// A `.deb` installed straight from a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebArtifact {
    pub package: String,
    pub url: String,
}

impl Default for DebArtifact {
    fn default() -> Self {
        Self {
            package: "google-chrome-stable".to_string(),
            url: "https://dl.google.com/linux/direct/google-chrome-stable_current_amd64.deb"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub packages: Vec<String>,
    /// Distribution packages that conflict with Docker CE.
    pub legacy_packages: Vec<String>,
    /// `{distro}` is replaced with `debian` or `ubuntu`.
    pub key_url: String,
    pub repo_url: String,
    pub keyring_dir: String,
    pub source_list: String,
    pub group: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            packages: strings(&[
                "docker-ce",
                "docker-ce-cli",
                "containerd.io",
                "docker-buildx-plugin",
                "docker-compose-plugin",
            ]),
            legacy_packages: strings(&[
                "docker.io",
                "docker-doc",
                "docker-compose",
                "podman-docker",
                "containerd",
                "runc",
            ]),
            key_url: "https://download.docker.com/linux/{distro}/gpg".to_string(),
            repo_url: "https://download.docker.com/linux/{distro}".to_string(),
            keyring_dir: "/etc/apt/keyrings".to_string(),
            source_list: "/etc/apt/sources.list.d/docker.list".to_string(),
            group: "docker".to_string(),
        }
    }
}

impl DockerConfig {
    pub fn key_url_for(&self, distro: &str) -> String {
        self.key_url.replace("{distro}", distro)
    }

    pub fn repo_url_for(&self, distro: &str) -> String {
        self.repo_url.replace("{distro}", distro)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RubyConfig {
    pub rbenv_root: String,
    pub rbenv_repo: String,
    pub ruby_build_repo: String,
    /// Installed in this order.
    pub versions: Vec<String>,
    pub default_version: String,
    pub gems: Vec<String>,
    /// Startup files that receive the rbenv init block.
    pub profiles: Vec<String>,
}

impl Default for RubyConfig {
    fn default() -> Self {
        Self {
            rbenv_root: "~/.rbenv".to_string(),
            rbenv_repo: "https://github.com/rbenv/rbenv.git".to_string(),
            ruby_build_repo: "https://github.com/rbenv/ruby-build.git".to_string(),
            versions: strings(&["2.6.10", "3.3.5", "3.4.1"]),
            default_version: "3.4.1".to_string(),
            gems: strings(&["bundler", "rake"]),
            profiles: strings(&["~/.bashrc", "~/.profile", "~/.zshrc"]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomizationMode {
    /// Keep one copy of the block, replacing it in place on re-runs.
    #[default]
    Managed,
    /// Append the block on every run.
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub rc_file: String,
    pub mode: CustomizationMode,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            rc_file: "~/.bashrc".to_string(),
            mode: CustomizationMode::Managed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect: String,
    pub download: String,
    /// Upper bound for a single external command (Ruby builds are the slow ones).
    pub command: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: "10s".to_string(),
            download: "10m".to_string(),
            command: "2h".to_string(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        parse_duration(&self.connect).unwrap_or(Duration::from_secs(10))
    }

    pub fn download(&self) -> Duration {
        parse_duration(&self.download).unwrap_or(Duration::from_secs(600))
    }

    pub fn command(&self) -> Duration {
        parse_duration(&self.command).unwrap_or(Duration::from_secs(7200))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ProvisionConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ProvisionError::Config("Could not determine home directory".to_string()))?;
        Ok(home.join(".config").join("rigup"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Resolve which file to read: an explicit path wins over the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<(PathBuf, bool)> {
        match explicit {
            Some(path) => Ok((path.to_path_buf(), true)),
            None => Ok((Self::default_path()?, false)),
        }
    }

    /// Load the configuration.
    ///
    /// A missing default file yields the built-in defaults; a missing file
    /// that was asked for explicitly is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, is_explicit) = Self::resolve_path(explicit)?;

        if !path.exists() {
            if is_explicit {
                return Err(ProvisionError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!("No config at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let config = Self::from_file(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| ProvisionError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| ProvisionError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.privilege.command.trim().is_empty() {
            return Err(ProvisionError::Config(
                "privilege.command must not be empty".to_string(),
            ));
        }

        if self.preflight.supported_distros.is_empty() {
            return Err(ProvisionError::Config(
                "preflight.supported_distros must list at least one distribution".to_string(),
            ));
        }

        if self.ruby.versions.is_empty() {
            return Err(ProvisionError::Config(
                "ruby.versions must list at least one version".to_string(),
            ));
        }

        if !self.ruby.versions.contains(&self.ruby.default_version) {
            return Err(ProvisionError::Config(format!(
                "ruby.default_version '{}' is not in ruby.versions {:?}",
                self.ruby.default_version, self.ruby.versions
            )));
        }

        let urls = [
            ("preflight.probe_url", self.preflight.probe_url.clone()),
            ("browser.url", self.browser.url.clone()),
            ("docker.key_url", self.docker.key_url_for("debian")),
            ("docker.repo_url", self.docker.repo_url_for("debian")),
        ];
        for (field, url) in urls {
            if let Err(e) = reqwest::Url::parse(&url) {
                return Err(ProvisionError::Config(format!(
                    "Invalid URL for {} '{}': {}",
                    field, url, e
                )));
            }
        }

        let durations = [
            ("timeouts.connect", &self.timeouts.connect),
            ("timeouts.download", &self.timeouts.download),
            ("timeouts.command", &self.timeouts.command),
        ];
        for (field, value) in durations {
            if parse_duration(value).is_none() {
                return Err(ProvisionError::Config(format!(
                    "Invalid {} '{}'. Use format like '2h', '30m', or '3600'",
                    field, value
                )));
            }
        }

        Ok(())
    }
}

/// Expand `~` against the given home directory.
pub fn expand_path(raw: &str, home: &Path) -> PathBuf {
    let home = home.to_string_lossy();
    let expanded = shellexpand::tilde_with_context(raw, || Some(home.as_ref()));
    PathBuf::from(expanded.as_ref())
}

fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
