use std::sync::Arc;

use better_images::{load_config, Config, ImageService};
use better_images_server::config::ServerConfig;
use better_images_server::retention::spawn_retention_sweep;
use better_images_server::router::build_app_router;
use better_images_server::state::AppState;
use better_images_server::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let server_config = ServerConfig::from_env()?;
    init_tracing(server_config.log_format)?;

    let config = match &server_config.config_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            load_config(path)?
        }
        None => Config::default(),
    };
    tracing::info!(
        workers = config.worker_count,
        uploads = %config.upload_directory.display(),
        outputs = %config.output_directory.display(),
        "Loaded configuration"
    );

    // --- Service ---
    let service = Arc::new(ImageService::with_local_provider(config)?);
    let sweeper = spawn_retention_sweep(Arc::clone(&service));

    // --- Router ---
    let app = build_app_router(AppState::new(Arc::clone(&service)), &server_config);

    // --- Start server ---
    let addr = server_config.socket_addr()?;
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, waiting for running jobs");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tokio::task::spawn_blocking(move || service.shutdown()).await?;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
