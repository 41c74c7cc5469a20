use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "wayfare",
    about = "Wayfare travel marketplace: bookings on a permissioned ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Load and validate a configuration file
    CheckConfig(CheckConfigArgs),
    /// Rebuild wallets from their journal and print balances
    ReplayWallets(ReplayWalletsArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Configuration file; built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override `server.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Use the in-process ledger simulator, seeded with demo data
    #[arg(long)]
    pub in_memory: bool,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct ReplayWalletsArgs {
    /// Directory holding the wallet journal
    #[arg(long)]
    pub data_dir: PathBuf,
    /// Rewrite the journal without damaged records afterwards
    #[arg(long)]
    pub compact: bool,
}
