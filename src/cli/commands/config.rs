use std::path::Path;

use console::style;
use dialoguer::Confirm;

use crate::config::ProvisionConfig;
use crate::error::Result;

pub fn show(explicit: Option<&Path>) -> Result<()> {
    let (path, _) = ProvisionConfig::resolve_path(explicit)?;
    let config = ProvisionConfig::load(explicit)?;

    println!("{}", style("Current Configuration").bold().cyan());
    if path.exists() {
        println!("{}", style(format!("# {}", path.display())).dim());
    } else {
        println!(
            "{}",
            style(format!("# built-in defaults ({} not found)", path.display())).dim()
        );
    }
    println!();
    print!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}

pub fn path(explicit: Option<&Path>) -> Result<()> {
    let (path, _) = ProvisionConfig::resolve_path(explicit)?;
    println!("{}", path.display());
    Ok(())
}

pub fn init(explicit: Option<&Path>, force: bool) -> Result<()> {
    let (path, _) = ProvisionConfig::resolve_path(explicit)?;

    if path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} exists. Overwrite it with the defaults?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("{}", style("Left the existing configuration untouched.").dim());
            return Ok(());
        }
    }

    ProvisionConfig::default().save(&path)?;

    println!(
        "{} Wrote default configuration to {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    println!(
        "Edit it, then run {} to review the steps.",
        style("rigup plan").cyan()
    );

    Ok(())
}
