//! HTTP server command (`licita serve`).

use anyhow::Result;

use super::resolve_config;
use crate::Cli;

pub async fn cmd_serve(cli: &Cli, dev: bool) -> Result<()> {
    let mut config = resolve_config(cli)?;
    if dev {
        config.server.dev_mode = true;
    }

    // Held for the whole process so the file layer flushes on exit.
    let _log_guard = licita::logging::init(&config.logging)?;
    tracing::info!(
        port = config.server.port,
        dev_mode = config.server.dev_mode,
        ocr = %config.services.ocr_url,
        ollama = %config.services.ollama_url,
        model = %config.services.ollama_model,
        docx = %config.services.docx_url,
        "starting licita"
    );

    licita::http::start_server(config).await
}
