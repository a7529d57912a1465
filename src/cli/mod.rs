pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::provision::StepId;

#[derive(Parser)]
#[command(name = "rigup")]
#[command(version)]
#[command(about = "Provision a Debian or Ubuntu developer workstation")]
#[command(long_about = "Update the system, install build tools, a browser, Docker and rbenv with pinned Ruby versions, and customize the shell.\n\nSafe to re-run: steps that are already satisfied are skipped.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.config/rigup/config.yaml)
    #[arg(short, long, global = true, env = "RIGUP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full provisioning pipeline
    Run {
        /// Skip a step (repeatable)
        #[arg(long, value_enum)]
        skip: Vec<StepId>,
    },

    /// Run the preflight checks only
    Preflight,

    /// Show the steps that would run and their failure policies
    Plan {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Mark a step as skipped (repeatable)
        #[arg(long, value_enum)]
        skip: Vec<StepId>,
    },

    /// Report which steps are already satisfied on this machine
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file without asking
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config_path = self.config.as_deref();

        match self.command {
            Commands::Run { skip } => {
                let config = ProvisionConfig::load(config_path)?;
                commands::run::execute(&config, &skip).await
            }
            Commands::Preflight => {
                let config = ProvisionConfig::load(config_path)?;
                commands::preflight::execute(&config).await
            }
            Commands::Plan { json, skip } => {
                let config = ProvisionConfig::load(config_path)?;
                commands::plan::execute(&config, &skip, json)
            }
            Commands::Status { json } => {
                let config = ProvisionConfig::load(config_path)?;
                commands::status::execute(&config, json).await
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => commands::config::show(config_path),
                ConfigCommands::Path => commands::config::path(config_path),
                ConfigCommands::Init { force } => commands::config::init(config_path, force),
            },
        }
    }
}
