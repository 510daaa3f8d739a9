//! Data directory initialization (`licita init`).

use anyhow::{Context, Result};
use licita::store::StoreDb;

use super::resolve_config;
use crate::Cli;

pub fn cmd_init(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    let workspaces = config.storage.workspaces_dir();
    let db_path = config.storage.db_path();

    std::fs::create_dir_all(&workspaces).with_context(|| {
        format!(
            "Failed to create workspaces directory: {}",
            workspaces.display()
        )
    })?;
    StoreDb::new(&db_path)
        .with_context(|| format!("Failed to initialize database at {}", db_path.display()))?;

    println!("Initialized licita data directory");
    println!("  workspaces: {}", workspaces.display());
    println!("  database:   {}", db_path.display());

    if !cli.config.exists() {
        println!();
        println!("Run 'licita config init' to create a licita.toml file.");
    }
    Ok(())
}
