use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "licita")]
#[command(version, about = "Tender analysis and proposal generation server")]
pub struct Cli {
    /// Path to licita.toml (optional; defaults apply when missing)
    #[arg(long, global = true, default_value = licita::config::CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Listen port. Overrides licita.toml and LICITA_PORT.
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Data directory holding workspaces and the database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Permissive CORS for a local front-end dev server
        #[arg(long)]
        dev: bool,
    },
    /// Create the data directories and the database
    Init,
    /// View or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the resolved configuration as TOML
    Show,
    /// Write a default licita.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { dev } => cmd::cmd_serve(&cli, *dev).await?,
        Commands::Init => cmd::cmd_init(&cli)?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
