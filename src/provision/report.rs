//! Read-only views of the pipeline: what would run, and what is already there.

use serde::Serialize;

use super::apt::PackageManager;
use super::context::Host;
use super::customize::customization_block;
use super::deb::DebInstaller;
use super::docker::DockerInstaller;
use super::policy::StepPolicy;
use super::rbenv::RubyInstaller;
use super::types::StepId;
use crate::config::ProvisionConfig;
use crate::error::Result;

/// A step as it would run with the current configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub id: StepId,
    pub name: &'static str,
    pub description: &'static str,
    pub policy: StepPolicy,
    pub skipped: bool,
    pub inputs: Vec<String>,
    /// Operations inside the step that carry their own policy.
    pub operations: Vec<(String, StepPolicy)>,
}

pub fn plan(config: &ProvisionConfig, skip: &[StepId]) -> Vec<PlannedStep> {
    StepId::ORDER
        .into_iter()
        .map(|id| {
            let (inputs, operations) = match id {
                StepId::SystemUpdate => (
                    vec!["apt-get update".to_string(), "apt-get upgrade -y".to_string()],
                    vec![],
                ),
                StepId::Prerequisites => (config.prerequisites.clone(), vec![]),
                StepId::Browser => (
                    vec![config.browser.package.clone(), config.browser.url.clone()],
                    vec![("dpkg -i".to_string(), DebInstaller::INSTALL_POLICY)],
                ),
                StepId::ShellCustomizations => (
                    vec![
                        config.shell.rc_file.clone(),
                        format!("mode: {:?}", config.shell.mode).to_lowercase(),
                    ],
                    vec![],
                ),
                StepId::Docker => {
                    let mut inputs = config.docker.packages.clone();
                    inputs.push(format!("group: {}", config.docker.group));
                    (
                        inputs,
                        vec![(
                            "legacy package removal".to_string(),
                            DockerInstaller::LEGACY_REMOVAL_POLICY,
                        )],
                    )
                }
                StepId::Ruby => {
                    let mut inputs: Vec<String> = config
                        .ruby
                        .versions
                        .iter()
                        .map(|v| format!("ruby {}", v))
                        .collect();
                    inputs.push(format!("global: {}", config.ruby.default_version));
                    inputs.push(format!("gems: {}", config.ruby.gems.join(", ")));
                    (
                        inputs,
                        vec![
                            ("gem install".to_string(), RubyInstaller::GEM_POLICY),
                            ("rbenv rehash".to_string(), RubyInstaller::REHASH_POLICY),
                        ],
                    )
                }
            };

            PlannedStep {
                id,
                name: id.name(),
                description: id.description(),
                policy: id.policy(),
                skipped: skip.contains(&id),
                inputs,
                operations,
            }
        })
        .collect()
}

/// What a probe found for one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: StepId,
    pub name: &'static str,
    /// `None` when the step has no observable end state.
    pub satisfied: Option<bool>,
    pub detail: String,
}

impl StepReport {
    fn new(id: StepId, satisfied: Option<bool>, detail: impl Into<String>) -> Self {
        Self {
            id,
            name: id.name(),
            satisfied,
            detail: detail.into(),
        }
    }
}

/// Probe the host for every step without changing anything.
pub async fn inspect(host: &Host, config: &ProvisionConfig) -> Result<Vec<StepReport>> {
    let apt = PackageManager::new(host);
    let mut reports = Vec::with_capacity(StepId::ORDER.len());

    reports.push(StepReport::new(
        StepId::SystemUpdate,
        None,
        "runs on every invocation",
    ));

    let mut missing = Vec::new();
    for package in &config.prerequisites {
        if !apt.is_installed(package).await? {
            missing.push(package.as_str());
        }
    }
    reports.push(if missing.is_empty() {
        StepReport::new(
            StepId::Prerequisites,
            Some(true),
            format!("{} packages installed", config.prerequisites.len()),
        )
    } else {
        StepReport::new(
            StepId::Prerequisites,
            Some(false),
            format!("missing: {}", missing.join(", ")),
        )
    });

    let browser = apt.is_installed(&config.browser.package).await?;
    reports.push(StepReport::new(
        StepId::Browser,
        Some(browser),
        if browser {
            format!("{} installed", config.browser.package)
        } else {
            format!("{} not installed", config.browser.package)
        },
    ));

    let rc_file = host.expand(&config.shell.rc_file);
    let customized = std::fs::read_to_string(&rc_file)
        .map(|content| customization_block().is_present(&content))
        .unwrap_or(false);
    reports.push(StepReport::new(
        StepId::ShellCustomizations,
        Some(customized),
        if customized {
            format!("block present in {}", rc_file.display())
        } else {
            format!("no block in {}", rc_file.display())
        },
    ));

    let docker = DockerInstaller::new(host, &config.docker);
    reports.push(match docker.is_installed() {
        Some(path) => {
            let member = docker.is_group_member().await.unwrap_or(false);
            StepReport::new(
                StepId::Docker,
                Some(true),
                format!(
                    "{}{}",
                    path.display(),
                    if member {
                        String::new()
                    } else {
                        format!(", {} not in group {}", host.user, config.docker.group)
                    }
                ),
            )
        }
        None => StepReport::new(StepId::Docker, Some(false), "docker not found on PATH"),
    });

    let ruby = RubyInstaller::new(host, &config.ruby);
    let installed = ruby.installed_versions().await?;
    let pending: Vec<&str> = config
        .ruby
        .versions
        .iter()
        .filter(|v| !installed.contains(*v))
        .map(String::as_str)
        .collect();
    reports.push(if !ruby.root().exists() {
        StepReport::new(
            StepId::Ruby,
            Some(false),
            format!("rbenv not found at {}", ruby.root().display()),
        )
    } else if pending.is_empty() {
        StepReport::new(
            StepId::Ruby,
            Some(true),
            format!("ruby {} installed", config.ruby.versions.join(", ")),
        )
    } else {
        StepReport::new(
            StepId::Ruby,
            Some(false),
            format!("missing ruby {}", pending.join(", ")),
        )
    });

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::exec::fake::ScriptedRunner;
    use crate::provision::context::testing;

    #[test]
    fn test_plan_follows_step_order() {
        let config = ProvisionConfig::default();
        let plan = plan(&config, &[StepId::Docker]);

        let ids: Vec<StepId> = plan.iter().map(|s| s.id).collect();
        assert_eq!(ids, StepId::ORDER.to_vec());
        assert!(plan.iter().all(|s| s.policy == StepPolicy::Fatal));
        assert!(plan.iter().find(|s| s.id == StepId::Docker).unwrap().skipped);
        assert!(!plan.iter().find(|s| s.id == StepId::Ruby).unwrap().skipped);
    }

    #[test]
    fn test_plan_lists_inner_policies() {
        let plan = plan(&ProvisionConfig::default(), &[]);
        let browser = plan.iter().find(|s| s.id == StepId::Browser).unwrap();
        assert_eq!(
            browser.operations,
            vec![("dpkg -i".to_string(), StepPolicy::RetryThenFatal)]
        );

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json[0]["id"], "system-update");
        assert_eq!(json[0]["policy"], "fatal");
    }

    #[tokio::test]
    async fn test_inspect_runs_only_queries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("dpkg-query -W -f=${Status} git", "install ok installed");
        runner.fail("dpkg-query", 1, "no packages found");
        runner.resolvable("docker");
        runner.ok("id -nG dev", "dev sudo\n");
        let host = testing::host(runner.clone(), temp_dir.path());
        let config = ProvisionConfig::default();

        let reports = inspect(&host, &config).await.unwrap();

        assert_eq!(reports.len(), StepId::ORDER.len());
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.starts_with("dpkg-query") || c.starts_with("id ")));

        let by_id = |id: StepId| reports.iter().find(|r| r.id == id).unwrap();
        assert_eq!(by_id(StepId::Prerequisites).satisfied, Some(false));
        assert!(!by_id(StepId::Prerequisites).detail.contains("git,"));
        assert_eq!(by_id(StepId::Docker).satisfied, Some(true));
        assert!(by_id(StepId::Docker).detail.contains("not in group docker"));
        assert_eq!(by_id(StepId::Ruby).satisfied, Some(false));
        assert_eq!(by_id(StepId::ShellCustomizations).satisfied, Some(false));
    }
}
