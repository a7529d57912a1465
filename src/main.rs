mod cli;
mod config;
mod error;
mod exec;
mod logging;
mod net;
mod preflight;
mod provision;
mod utils;
mod workspace;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code().clamp(1, 255) as u8)
        }
    }
}
