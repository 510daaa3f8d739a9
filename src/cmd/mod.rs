//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `init`   | `Init`           |
//! | `config` | `Config`         |

pub mod config;
pub mod init;
pub mod serve;

pub use config::cmd_config;
pub use init::cmd_init;
pub use serve::cmd_serve;

use anyhow::Result;
use licita::config::Config;

use super::Cli;

/// Defaults, then licita.toml, then `LICITA_*` variables, then CLI flags.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(&cli.config)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.apply_cli(cli.port, cli.data_dir.clone());
    Ok(config)
}
