//! LeadRevive CLI: import lead lists and manage the local lead store.
//!
//! Reads CSV lead files, validates them row by row, and writes the valid
//! leads in batches to the embedded database or the hosted backend.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
