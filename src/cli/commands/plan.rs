use console::style;

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::provision::{self, StepId};

pub fn execute(config: &ProvisionConfig, skip: &[StepId], json: bool) -> Result<()> {
    let steps = provision::plan(config, skip);

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    println!("{}", style("Provisioning plan").bold().cyan());
    println!();

    for (index, step) in steps.iter().enumerate() {
        let marker = if step.skipped {
            style("skip".to_string()).dim()
        } else {
            style(step.policy.to_string()).yellow()
        };
        println!(
            "  {}. {} {} {}",
            index + 1,
            style(step.name).white().bold(),
            style(format!("[{}]", step.id)).dim(),
            marker
        );
        println!("     {}", style(step.description).dim());
        for input in &step.inputs {
            println!("       {}", input);
        }
        for (operation, policy) in &step.operations {
            println!(
                "       {} {}",
                style(format!("{}:", operation)).dim(),
                policy
            );
        }
    }

    Ok(())
}
