//! Provisioner - runs the steps in order and tracks their state.

use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;

use super::apt::PackageManager;
use super::context::Host;
use super::customize::ShellCustomizer;
use super::deb::DebInstaller;
use super::docker::DockerInstaller;
use super::policy::Applied;
use super::rbenv::RubyInstaller;
use super::types::{ProvisionState, StepId, StepOutcome, StepStatus};
use crate::config::ProvisionConfig;
use crate::error::Result;

pub struct Provisioner<'a> {
    host: &'a Host,
    config: &'a ProvisionConfig,
    skip: HashSet<StepId>,
    state: Arc<RwLock<ProvisionState>>,
}

impl<'a> Provisioner<'a> {
    pub fn new(host: &'a Host, config: &'a ProvisionConfig) -> Self {
        Self {
            host,
            config,
            skip: HashSet::new(),
            state: Arc::new(RwLock::new(ProvisionState::default())),
        }
    }

    pub fn skip(mut self, steps: impl IntoIterator<Item = StepId>) -> Self {
        self.skip.extend(steps);
        self
    }

    /// Shared handle on the step state; stays readable if the run is cancelled.
    pub fn state(&self) -> Arc<RwLock<ProvisionState>> {
        self.state.clone()
    }

    async fn update(&self, id: StepId, status: StepStatus, detail: Option<String>) {
        self.state.write().await.update(id, status, detail);
    }

    /// Run every step in order. The first fatal failure stops the run.
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.started = true;
            state.completed = false;
            state.started_at = Some(chrono::Utc::now());
            state.completed_at = None;
        }

        let total = StepId::ORDER.len();
        for (index, id) in StepId::ORDER.into_iter().enumerate() {
            if self.skip.contains(&id) {
                tracing::info!("[{}/{}] {}: skipped", index + 1, total, id.name());
                self.update(id, StepStatus::Skipped, Some("skipped by request".to_string()))
                    .await;
                continue;
            }

            tracing::info!("[{}/{}] {}", index + 1, total, id.name());
            self.update(id, StepStatus::Running, None).await;

            let (host, config) = (self.host, self.config);
            let result = id
                .policy()
                .apply(id.name(), || run_step(host, config, id).boxed(), None)
                .await;

            match result {
                Ok(Applied::Done(outcome)) | Ok(Applied::AfterRepair(outcome)) => {
                    let status = if outcome.changed {
                        StepStatus::Done
                    } else {
                        StepStatus::AlreadySatisfied
                    };
                    self.update(id, status, Some(outcome.detail)).await;
                }
                Ok(Applied::Tolerated(e)) => {
                    self.update(id, StepStatus::Failed(e.to_string()), None).await;
                }
                // Reported once, by the top-level handler.
                Err(e) => {
                    self.update(id, StepStatus::Failed(e.to_string()), None).await;
                    return Err(e);
                }
            }
        }

        {
            let mut state = self.state.write().await;
            state.completed = true;
            state.completed_at = Some(chrono::Utc::now());
        }

        tracing::info!("Provisioning completed successfully");
        tracing::info!(
            "Open a new terminal (or log out and back in) so profile, PATH and group changes take effect"
        );
        Ok(())
    }
}

async fn run_step(host: &Host, config: &ProvisionConfig, id: StepId) -> Result<StepOutcome> {
    match id {
        StepId::SystemUpdate => {
            PackageManager::new(host).refresh_and_upgrade().await?;
            Ok(StepOutcome::changed("package index refreshed, packages upgraded"))
        }
        StepId::Prerequisites => {
            PackageManager::new(host)
                .install(&config.prerequisites)
                .await?;
            Ok(StepOutcome::changed(format!(
                "{} packages ensured",
                config.prerequisites.len()
            )))
        }
        StepId::Browser => DebInstaller::new(host).install(&config.browser).await,
        StepId::ShellCustomizations => ShellCustomizer::new(host, &config.shell).apply(),
        StepId::Docker => DockerInstaller::new(host, &config.docker).install().await,
        StepId::Ruby => RubyInstaller::new(host, &config.ruby).install().await,
    }
}
