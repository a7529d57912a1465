//! Core types for the provisioning pipeline.

use serde::{Deserialize, Serialize};

use super::policy::StepPolicy;

/// Top-level provisioning steps, in the order they run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    SystemUpdate,
    Prerequisites,
    Browser,
    ShellCustomizations,
    Docker,
    Ruby,
}

impl StepId {
    pub const ORDER: [StepId; 6] = [
        StepId::SystemUpdate,
        StepId::Prerequisites,
        StepId::Browser,
        StepId::ShellCustomizations,
        StepId::Docker,
        StepId::Ruby,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            StepId::SystemUpdate => "system-update",
            StepId::Prerequisites => "prerequisites",
            StepId::Browser => "browser",
            StepId::ShellCustomizations => "shell-customizations",
            StepId::Docker => "docker",
            StepId::Ruby => "ruby",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepId::SystemUpdate => "System update",
            StepId::Prerequisites => "Prerequisites",
            StepId::Browser => "Browser",
            StepId::ShellCustomizations => "Shell customizations",
            StepId::Docker => "Docker",
            StepId::Ruby => "rbenv + Ruby",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StepId::SystemUpdate => "Refresh the package index and upgrade installed packages",
            StepId::Prerequisites => "Build tools and libraries",
            StepId::Browser => "Browser package from its vendor .deb",
            StepId::ShellCustomizations => "Prompt, helpers and aliases in the shell rc file",
            StepId::Docker => "Docker Engine from the vendor repository",
            StepId::Ruby => "rbenv, ruby-build and the pinned Ruby versions",
        }
    }

    /// Failure policy of the step as a whole.
    ///
    /// Every top-level step aborts the run; best-effort and retrying
    /// operations live inside the installers.
    pub fn policy(&self) -> StepPolicy {
        StepPolicy::Fatal
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Status of a single step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    #[default]
    Pending,
    /// Currently running
    Running,
    /// Finished and changed something
    Done,
    /// Finished without changes; the host was already in the desired state
    AlreadySatisfied,
    /// Skipped on request
    Skipped,
    /// Failed; the run stopped here
    Failed(String),
}

/// What an installer did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub changed: bool,
    pub detail: String,
}

impl StepOutcome {
    pub fn changed(detail: impl Into<String>) -> Self {
        Self {
            changed: true,
            detail: detail.into(),
        }
    }

    pub fn unchanged(detail: impl Into<String>) -> Self {
        Self {
            changed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub id: StepId,
    pub name: &'static str,
    pub description: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl StepRecord {
    fn pending(id: StepId) -> Self {
        Self {
            id,
            name: id.name(),
            description: id.description(),
            status: StepStatus::Pending,
            detail: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn elapsed_secs(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

/// Overall provisioning state
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionState {
    pub started: bool,
    pub completed: bool,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for ProvisionState {
    fn default() -> Self {
        Self {
            started: false,
            completed: false,
            steps: StepId::ORDER.iter().copied().map(StepRecord::pending).collect(),
            started_at: None,
            completed_at: None,
        }
    }
}

impl ProvisionState {
    pub fn step(&self, id: StepId) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn update(&mut self, id: StepId, status: StepStatus, detail: Option<String>) {
        let now = chrono::Utc::now();
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            match status {
                StepStatus::Running => step.started_at = Some(now),
                StepStatus::Pending => {}
                _ => step.finished_at = Some(now),
            }
            step.status = status;
            if detail.is_some() {
                step.detail = detail;
            }
        }
    }
}
