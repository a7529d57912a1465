use std::path::Path;

use console::style;

use super::system_host;
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::net::Downloader;
use crate::preflight::{OsRelease, OS_RELEASE_PATH};
use crate::provision;
use crate::utils::truncate;
use crate::workspace::Workspace;

pub async fn execute(config: &ProvisionConfig, json: bool) -> Result<()> {
    let os = OsRelease::load(Path::new(OS_RELEASE_PATH))?;
    let workspace = Workspace::create()?;
    let host = system_host(config, Downloader::new(&config.timeouts)?, workspace.path(), os)?;

    let reports = provision::inspect(&host, config).await?;
    workspace.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("{}", style("Workstation status").bold().cyan());
    println!();
    for report in &reports {
        let icon = match report.satisfied {
            Some(true) => style("●").green().bold(),
            Some(false) => style("○").yellow(),
            None => style("·").dim(),
        };
        println!(
            "  {} {:<22} {}",
            icon,
            report.name,
            style(truncate(&report.detail, 90)).dim()
        );
    }

    let pending = reports
        .iter()
        .filter(|r| r.satisfied == Some(false))
        .count();
    println!();
    if pending == 0 {
        println!("  {}", style("Everything is in place.").green());
    } else {
        println!(
            "  {} step(s) pending. Run {} to apply them.",
            pending,
            style("rigup run").cyan()
        );
    }

    Ok(())
}
