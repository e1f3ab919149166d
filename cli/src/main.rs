mod cli_interface;
mod commands;
mod console;

use casebatch::{level_for_verbosity, setup_logger};
use clap::Parser;

use crate::{
    cli_interface::{Commands, CLI},
    commands::{apply::handle_apply_command, plan::handle_plan_command},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::parse();

    setup_logger(level_for_verbosity(cli.verbose));

    match cli.command {
        Commands::Apply(details) => handle_apply_command(details).await,
        Commands::Plan(details) => handle_plan_command(details),
    }
}
