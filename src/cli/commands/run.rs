use std::time::Instant;

use console::style;

use super::{print_banner, status_label, system_host};
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::net::Downloader;
use crate::preflight;
use crate::provision::{Host, ProvisionState, Provisioner, StepId, StepStatus};
use crate::utils::{first_line, format_duration, truncate};
use crate::workspace::Workspace;

pub async fn execute(config: &ProvisionConfig, skip: &[StepId]) -> Result<()> {
    print_banner();

    let downloader = Downloader::new(&config.timeouts)?;
    let os = preflight::run(config, &downloader).await?;

    let workspace = Workspace::create()?;
    let host = system_host(config, downloader, workspace.path(), os)?;
    provision(&host, config, skip, workspace).await
}

/// Run the pipeline on `host`. `workspace` is removed however the run ends.
async fn provision(
    host: &Host,
    config: &ProvisionConfig,
    skip: &[StepId],
    workspace: Workspace,
) -> Result<()> {
    let provisioner = Provisioner::new(host, config).skip(skip.iter().copied());
    let state = provisioner.state();

    let started = Instant::now();
    // Losing the race drops the pipeline future: running children are killed
    // and the workspace goes away with `workspace` below.
    let result = tokio::select! {
        result = provisioner.run() => result,
        interrupted = shutdown_signal() => {
            tracing::warn!("{}, stopping", interrupted);
            Err(interrupted)
        }
    };

    print_summary(&*state.read().await, started.elapsed().as_secs() as i64);

    if let Err(e) = workspace.close() {
        tracing::warn!("Could not remove workspace: {}", e);
    }

    if result.is_err() {
        tracing::warn!("Installation did not complete. Fix the problem above and run rigup again.");
    }
    result
}

async fn shutdown_signal() -> ProvisionError {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ProvisionError::Interrupted {
                signal: "SIGINT",
                code: 130,
            },
            Err(e) => {
                tracing::debug!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                ProvisionError::Interrupted {
                    signal: "SIGTERM",
                    code: 143,
                }
            }
            Err(e) => {
                tracing::debug!("Cannot listen for SIGTERM: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ProvisionError>();

    tokio::select! {
        e = interrupt => e,
        e = terminate => e,
    }
}

fn print_summary(state: &ProvisionState, elapsed_secs: i64) {
    println!();
    println!("{}", style("Summary").bold().cyan());
    for step in &state.steps {
        let detail = match &step.status {
            StepStatus::Failed(reason) => first_line(reason).to_string(),
            _ => step.detail.clone().unwrap_or_default(),
        };
        let took = step
            .elapsed_secs()
            .filter(|_| !matches!(step.status, StepStatus::Skipped))
            .map(|s| format!(" ({})", format_duration(s)))
            .unwrap_or_default();

        println!(
            "  {:<22} {:<8} {}{}",
            step.name,
            status_label(&step.status),
            style(truncate(&detail, 80)).dim(),
            style(took).dim()
        );
    }
    println!();
    println!("  {} {}", style("Total").dim(), format_duration(elapsed_secs));
}
