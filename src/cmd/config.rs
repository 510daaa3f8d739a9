//! Configuration view and creation commands (`licita config`).

use anyhow::Result;
use licita::config::Config;

use super::resolve_config;
use crate::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = &cli.config;

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = resolve_config(cli)?;
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No {} found; showing defaults", config_path.display());
            }
            println!("# Effective values (with env/CLI overrides)");
            println!();
            print!("{}", config.to_toml()?);
        }
        Some(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                println!("{} already exists.", config_path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }
            if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Config::default().save(config_path)?;

            println!("Created {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev_mode");
            println!("  - [storage] data_dir, workspaces_dir, db_path");
            println!("  - [services] ocr_url, ollama_url, ollama_model, docx_url");
            println!("  - [timeouts] and [retry] for the external services");
        }
    }

    Ok(())
}
