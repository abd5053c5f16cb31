use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsString;

mod args;
mod batch;
mod checkpoint;
mod config;
mod csv_input;
mod env;
mod http;
mod import;
mod logging;
mod runner;
mod status;
mod ui;
mod update;
mod utils;

use crate::args::{BaseArgs, CLIArgs};

const DEFAULT_DEV_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-dev");
const CLI_VERSION: &str = match option_env!("CRM_BATCH_VERSION_STRING") {
    Some(version) => version,
    None => DEFAULT_DEV_VERSION,
};

#[derive(Debug, Parser)]
#[command(
    name = "crm-batch",
    about = "Bulk CSV import and update for CRM teams and contacts",
    version = CLI_VERSION
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create records from a CSV file, one batch call at a time
    Import(CLIArgs<import::ImportArgs>),
    /// Update existing records from a CSV file
    Update(CLIArgs<update::UpdateArgs>),
    /// List recorded runs and where they stopped
    Status(CLIArgs<status::StatusArgs>),
    /// View and modify config
    Config(CLIArgs<config::ConfigArgs>),
}

impl Commands {
    fn base(&self) -> &BaseArgs {
        match self {
            Commands::Import(cmd) => &cmd.base,
            Commands::Update(cmd) => &cmd.base,
            Commands::Status(cmd) => &cmd.base,
            Commands::Config(cmd) => &cmd.base,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<OsString> = std::env::args_os().collect();
    env::bootstrap_from_args(&argv)?;
    let cli = Cli::parse_from(argv);
    logging::init(cli.command.base().verbose);

    match cli.command {
        Commands::Import(cmd) => import::run(cmd.base, cmd.args).await?,
        Commands::Update(cmd) => update::run(cmd.base, cmd.args).await?,
        Commands::Status(cmd) => status::run(cmd.base, cmd.args)?,
        Commands::Config(cmd) => config::run(cmd.base, cmd.args)?,
    }

    Ok(())
}
