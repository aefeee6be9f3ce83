//! Session Gate
//!
//! Single-binary auth service that:
//! 1. Registers identities into a file-backed credential store
//! 2. Issues short-lived signed access tokens and single-use refresh tokens
//! 3. Rotates refresh tokens atomically and revokes them on logout
//! 4. Rate limits login attempts per client

mod api;
mod client_key;
mod config;
mod error;
mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use session::{SessionManager, SystemClock};
use session_store::{FileCredentialStore, MemoryStore, spawn_sweep_task};
use session_token::TokenCodec;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client_key::ClientKeyPolicy;
use crate::config::Config;

/// Upper bound on in-flight request draining after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    manager: Arc<SessionManager>,
    client_key: Arc<ClientKeyPolicy>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/auth/register", post(api::register))
        .route("/auth/login", post(api::login))
        .route("/auth/refresh", post(api::refresh))
        .route("/auth/logout", post(api::logout))
        .route("/auth/me", get(api::me))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting session-gate");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        algorithm = %config.tokens.algorithm,
        credentials_path = %config.accounts.credentials_path.display(),
        client_key = ?config.client_key.source,
        "configuration loaded"
    );

    let signing_key = config
        .tokens
        .signing_key
        .as_ref()
        .context("signing key missing after config load")?;
    let codec = TokenCodec::new(
        signing_key.expose().as_bytes(),
        config.algorithm()?,
        config.access_ttl(),
    )
    .context("failed to build token codec")?;

    let credentials = FileCredentialStore::load(config.accounts.credentials_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load credential store {}",
                config.accounts.credentials_path.display()
            )
        })?;
    info!(accounts = credentials.len().await, "credential store loaded");

    let ephemeral = Arc::new(MemoryStore::new());
    let sweep_handle = spawn_sweep_task(ephemeral.clone(), config.sweep_interval());

    let manager = SessionManager::new(
        config.session_config(),
        codec,
        Arc::new(credentials),
        ephemeral,
        Arc::new(SystemClock),
    )
    .context("failed to build session manager")?;

    let app_state = AppState {
        manager: Arc::new(manager),
        client_key: Arc::new(config.client_key_policy()?),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    sweep_handle.abort();

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: status and uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        })
        .to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
