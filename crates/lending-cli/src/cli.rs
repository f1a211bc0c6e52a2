use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lending",
    about = "Library lending engine: stock, borrow and return workflows",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Print the default configuration, or validate a config file
    Config(ConfigArgs),
    /// Walk through the borrow/return workflow against an in-memory store
    Demo(DemoArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Validate this file instead of printing the defaults
    #[arg(long, value_name = "PATH")]
    pub check: Option<PathBuf>,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Copies to stock for the demo title
    #[arg(long, default_value = "2")]
    pub copies: u32,
}
