//! HTTP surface: router assembly, shared state, and the background tasks
//! the server runs alongside it. Public routes merged with an auth-gated
//! router, wrapped in a `TraceLayer`. No version prefix — every route here
//! is listed bare.

pub mod applications;
pub mod dns;
pub mod login;
pub mod state;
pub mod terminal;
pub mod vps;

pub use state::AppState;

use std::time::Duration;

use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Settings;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    repository: &'static str,
}

async fn version_info() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        repository: env!("CARGO_PKG_REPOSITORY"),
    })
}

pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let state = AppState::new(&settings).await?;

    let reaper_state = state.clone();
    let reaper_interval = Duration::from_secs(settings.ssh.reaper_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reaper_interval);
        loop {
            ticker.tick().await;
            reaper_state.ssh.reap_idle().await;
        }
    });

    let public = Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version_info))
        .route("/login", get(login::login_page).post(login::login))
        .route("/logout", get(login::logout))
        .route("/ws/terminal/{uuid}", get(terminal::upgrade));

    let protected = Router::new()
        .merge(vps::routes())
        .merge(dns::routes())
        .merge(applications::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::middleware::auth_middleware));

    let app = public
        .merge(protected)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "xanthus listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
