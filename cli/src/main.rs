//! `hl`: send and search Hyperlane messages from the command line.

use clap::Parser;
use color_eyre::Result;
use colored::*;
use mailbox_cli::settings::Settings;

use crate::args::{Args, Commands};

mod action;
mod args;
mod output;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    if let Err(err) = run().await {
        eprintln!("{}", "Failed".red().underline());
        output::failure("Error", err.as_ref());
        std::process::exit(1);
    }

    Ok(())
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    settings.tracing.start_tracing()?;
    output::banner();

    match args.command {
        Commands::Send(send) => action::send(&settings, send).await,
        Commands::Search(search) => action::search(settings, search).await,
        Commands::Chains => action::chains(&settings),
    }
}
