pub mod config;
pub mod plan;
pub mod preflight;
pub mod run;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use console::style;

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::exec::{Privilege, SystemRunner};
use crate::net::Downloader;
use crate::preflight::{current_user, OsRelease};
use crate::provision::{Host, StepStatus};

/// Host bound to the real machine, staging files in `workspace`.
pub(crate) fn system_host(
    config: &ProvisionConfig,
    downloader: Downloader,
    workspace: &Path,
    os: OsRelease,
) -> Result<Host> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProvisionError::Preflight("Could not determine home directory".to_string()))?;

    Ok(Host::new(
        Arc::new(SystemRunner::new(Some(config.timeouts.command()))),
        Privilege::new(&config.privilege.command),
        downloader,
        workspace.to_path_buf(),
        current_user()?,
        home,
        os,
    ))
}

pub(crate) fn print_banner() {
    println!(
        "{} {}",
        style("rigup").cyan().bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
    );
    println!();
}

pub(crate) fn status_label(status: &StepStatus) -> console::StyledObject<&'static str> {
    match status {
        StepStatus::Pending => style("pending").dim(),
        StepStatus::Running => style("running").yellow(),
        StepStatus::Done => style("done").green(),
        StepStatus::AlreadySatisfied => style("present").green(),
        StepStatus::Skipped => style("skipped").dim(),
        StepStatus::Failed(_) => style("failed").red().bold(),
    }
}
