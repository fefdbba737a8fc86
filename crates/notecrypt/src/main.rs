#![forbid(unsafe_code)]

mod auth;
mod commands;
mod config;
mod exit_code;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{decrypt, derive, encrypt, probe};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "notecrypt")]
#[command(author, version, about = "Encrypt, decrypt and inspect note sync payloads")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, env = "NOTECRYPT_CONFIG", global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive master keys from a password and key parameters
    Derive(derive::Args),

    /// Encrypt items for sync or local storage
    Encrypt(encrypt::Args),

    /// Decrypt a batch of items
    Decrypt(decrypt::Args),

    /// Check which items a candidate password can decrypt
    Probe(probe::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code::GENERAL_ERROR)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let config = Config::load(cli.config.as_deref())?;

    // Set up tracing based on verbosity
    let verbosity = cli.verbose.max(config.defaults.verbosity.unwrap_or(0));
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Derive(args) => derive::execute(args, &config),
        Commands::Encrypt(args) => encrypt::execute(args, &config),
        Commands::Decrypt(args) => decrypt::execute(args, &config),
        Commands::Probe(args) => probe::execute(args, &config),
    }
}
