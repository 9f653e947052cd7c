use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use banana_api::config::ServerConfig;
use banana_api::state::AppState;
use banana_api::{app, background, engine};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "banana_api=debug,banana_backend=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Backend ---
    let backend = engine::build_backend(&config.backend);
    let host = engine::build_host(&config.backend);
    tracing::info!(
        backend = backend.name(),
        upload_services = config.backend.upload_targets.len(),
        fallback = config.backend.fallback_enabled,
        timeout_secs = config.engine.backend_timeout.as_secs(),
        "Image backend ready"
    );

    // --- App state ---
    let state = AppState::new(config.clone(), backend, host);

    // --- Task retention ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = config.engine.task_retention.map(|retention| {
        tokio::spawn(background::task_retention::run(
            Arc::clone(state.orchestrator.tracker()),
            Arc::clone(state.batches.registry()),
            retention,
            config.engine.retention_sweep_interval,
            retention_cancel.clone(),
        ))
    });
    if retention_handle.is_none() {
        tracing::info!("Task retention disabled, finished tasks are kept");
    }

    // --- Router ---
    let app = app::build_router(state);

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
    if let Some(handle) = retention_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Task retention job stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
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
