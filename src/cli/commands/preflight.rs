use console::style;

use super::print_banner;
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::net::Downloader;
use crate::preflight;

pub async fn execute(config: &ProvisionConfig) -> Result<()> {
    print_banner();

    let downloader = Downloader::new(&config.timeouts)?;
    let os = preflight::run(config, &downloader).await?;

    println!(
        "  {} {}",
        style("✓").green().bold(),
        style("Preflight checks passed").bold()
    );
    println!("  {}   {}", style("System").dim(), os.display_name());
    println!(
        "  {} {}",
        style("Codename").dim(),
        os.codename().unwrap_or("(unknown)")
    );
    println!("  {}     {}", style("User").dim(), preflight::current_user()?);

    Ok(())
}
