//! fieldsync CLI - offline-first capture and sync for field work data
//!
//! Thin front end over fieldsync-core: store records, drive sync, inspect
//! conflicts, and run device recovery from the terminal.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    if let Err(error) = commands::run(cli).await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}
