//! Failure policies for provisioning operations.

use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPolicy {
    /// A failure aborts the run.
    Fatal,
    /// A failure is logged as a warning and the run continues.
    WarnOnly,
    /// On failure run the repair action, then retry exactly once; a second failure aborts.
    RetryThenFatal,
}

/// Result of applying a policy.
#[derive(Debug)]
pub enum Applied<T> {
    Done(T),
    /// First attempt failed; the retry after repair succeeded.
    AfterRepair(T),
    /// Failed under `WarnOnly`.
    Tolerated(ProvisionError),
}

impl<T> Applied<T> {
    pub fn is_tolerated(&self) -> bool {
        matches!(self, Applied::Tolerated(_))
    }
}

impl StepPolicy {
    /// Run `attempt` under this policy.
    ///
    /// `repair` is only used by `RetryThenFatal`; a failing repair is logged
    /// and the retry still happens.
    pub async fn apply<'f, T, F>(
        self,
        label: &str,
        attempt: F,
        repair: Option<BoxFuture<'f, Result<()>>>,
    ) -> Result<Applied<T>>
    where
        F: Fn() -> BoxFuture<'f, Result<T>>,
    {
        match self {
            StepPolicy::Fatal => attempt().await.map(Applied::Done),
            StepPolicy::WarnOnly => match attempt().await {
                Ok(value) => Ok(Applied::Done(value)),
                Err(e) => {
                    tracing::warn!("{} failed, continuing: {}", label, e);
                    Ok(Applied::Tolerated(e))
                }
            },
            StepPolicy::RetryThenFatal => match attempt().await {
                Ok(value) => Ok(Applied::Done(value)),
                Err(first) => {
                    tracing::warn!("{} failed ({}), repairing and retrying once", label, first);
                    if let Some(repair) = repair {
                        if let Err(e) = repair.await {
                            tracing::warn!("Repair for {} failed: {}", label, e);
                        }
                    }
                    attempt().await.map(Applied::AfterRepair)
                }
            },
        }
    }
}

impl std::fmt::Display for StepPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepPolicy::Fatal => "fatal",
            StepPolicy::WarnOnly => "warn-only",
            StepPolicy::RetryThenFatal => "retry-then-fatal",
        };
        f.write_str(s)
    }
}
