use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState};
use crate::config::Config;
use crate::pipeline::Pipelines;
use crate::services::Services;
use crate::store::{DbHandle, StoreDb};

/// Build the full application router.
pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    let mut app = api::api_router()
        .layer(DefaultBodyLimit::max(
            config.server.max_upload_mb.saturating_mul(1024 * 1024),
        ))
        .with_state(state);
    if config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open the store, wire the collaborators and serve until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let db_path = config.storage.db_path();
    let db = StoreDb::new(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let services = Services::from_config(&config).context("Failed to build service clients")?;

    let config = Arc::new(config);
    let pipelines = Pipelines::new(config.clone(), services, DbHandle::new(db));
    let state = Arc::new(AppState { pipelines });
    let app = build_router(state, &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        workspaces = %config.storage.workspaces_dir().display(),
        db = %db_path.display(),
        "licita listening"
    );
    println!("licita running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
