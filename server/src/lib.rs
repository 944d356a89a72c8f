//! HTTP front end for `wds-signups`.
//!
//! Routes:
//! - `POST /api/submit`: store one waitlist or sponsor record.
//! - `GET /api/list?kind=…&key=…`: admin CSV (or `format=json`) export;
//!   `diag=1` reports connection settings without touching the store.
//! - `GET /healthz`: liveness.

pub mod config;
mod error;
mod routes;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use wds_signups::Signups;

pub use config::{Backend, ConfigError, ServerConfig};
pub use error::ApiError;

/// Non-secret connection settings reported by `diag=1`.
#[derive(Debug, Clone)]
pub struct ConnectionSummary {
    pub has_token: bool,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: String,
    pub backend: Backend,
}

impl ConnectionSummary {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            has_token: config.github.has_token(),
            owner: config.github.owner.clone(),
            repo: config.github.repo.clone(),
            branch: config.github.branch.clone(),
            backend: config.backend,
        }
    }
}

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub signups: Arc<Signups>,
    pub admin_key: Option<String>,
    pub summary: ConnectionSummary,
}

impl AppState {
    pub fn new(signups: Signups, admin_key: Option<String>, summary: ConnectionSummary) -> Self {
        Self {
            signups: Arc::new(signups),
            admin_key,
            summary,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.build_signups(),
            config.admin_key.clone(),
            ConnectionSummary::from_config(config),
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/submit", post(routes::submit))
        .route("/api/list", get(routes::list))
        .route("/healthz", get(routes::healthz))
        .fallback(routes::not_found)
        .layer(axum::middleware::from_fn(routes::cors))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, backend = state.summary.backend.as_str(), "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
