mod cli;
mod commands;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_file)?;

    info!("qsphere CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = match cli.command {
        Commands::Generate(args) => commands::generate::run(args),
        Commands::Geem(args) => commands::geem::run(args),
        Commands::Flip(args) => commands::flip::run(args),
        Commands::Subsample(args) => commands::subsample::run(args),
        Commands::Order(args) => commands::order::run(args),
        Commands::Combine(args) => commands::combine::run(args),
        Commands::Stats(args) => commands::stats::run(args),
        Commands::Pipeline(args) => commands::pipeline::run(args),
    };

    match &command_result {
        Ok(_) => info!("✅ Command completed successfully."),
        Err(e) => {
            error!("❌ Command failed: {}", e);
            eprintln!("❌ Command failed: {}", e);
        }
    }

    command_result
}
