use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyforge_api::background;
use keyforge_api::config::ServerConfig;
use keyforge_api::router::build_app_router;
use keyforge_api::state::AppState;
use keyforge_comfyui::engine::ComfyUIEngine;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "keyforge_api=debug,keyforge_comfyui=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        comfyui_url = %config.comfyui_url,
        image_output_dir = %config.image_output_dir.display(),
        "Loaded server configuration"
    );

    // --- Image output directory ---
    tokio::fs::create_dir_all(&config.image_output_dir)
        .await
        .expect("Failed to create image output directory");

    // --- Rendering engine ---
    let engine = Arc::new(ComfyUIEngine::new(&config.comfyui_url));

    // --- App state ---
    let state = AppState::new(config.clone(), engine);

    // --- Record retention ---
    let retention_cancel = tokio_util::sync::CancellationToken::new();
    let retention_handle = tokio::spawn(background::record_retention::run(
        Arc::clone(&state.store),
        config.record_retention(),
        config.retention_sweep_interval(),
        retention_cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Record retention job stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
