use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

/// kvsync: Development tool for kvsync stores.
///
/// Inspect, export, and edit the records of SQLite-backed stores from the
/// command line.
#[derive(Parser)]
#[command(name = "kvsync", version, about, long_about = None)]
struct Cli {
    /// Path to a kvsync.toml file. Defaults to ./kvsync.toml if present.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database file. Overrides the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Store name. Overrides the config file.
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every store in the database with record and version counts.
    Status,

    /// Inspect one record's envelope, or list the records of a store.
    Inspect {
        /// Record key. If omitted, lists the store's records.
        key: Option<String>,
    },

    /// Export decoded values as JSON.
    Export {
        /// Export every store, not just the selected one.
        #[arg(long)]
        all: bool,
    },

    /// Print one record's value as JSON.
    Get {
        /// Record key.
        key: String,
    },

    /// Write a JSON value, tagged with the configured version.
    Set {
        /// Record key.
        key: String,
        /// JSON value, e.g. '"dark"' or '{"n": 1}'.
        value: String,
    },

    /// Remove one record.
    Delete {
        /// Record key.
        key: String,
    },

    /// Remove every record of the selected store.
    Clear {
        /// Required to confirm.
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "kvsync=debug,kvsync_store=debug,kvsync_migrate=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> commands::Result {
    let config = config::CliConfig::resolve(cli.config.as_deref(), cli.db, cli.store)?;
    let target = commands::Target::open(&config)?;

    match cli.command {
        Commands::Status => commands::status(&target).await,
        Commands::Inspect { key } => commands::inspect(&target, key.as_deref()).await,
        Commands::Export { all } => commands::export(&target, all).await,
        Commands::Get { key } => commands::get(&target, &key).await,
        Commands::Set { key, value } => commands::set(&target, &key, &value).await,
        Commands::Delete { key } => commands::delete(&target, &key).await,
        Commands::Clear { yes } => commands::clear(&target, yes).await,
    }
}
