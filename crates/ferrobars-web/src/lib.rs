//! # Ferrobars Web
//!
//! Read API over the merge store.
//!
//! | Route | Auth | Response |
//! |-------|------|----------|
//! | `GET /` | no | capability listing |
//! | `GET /health` | no | liveness and storage path |
//! | `GET /quote?symbol=S` | yes | latest bar and percent change, trailing month |
//! | `GET /chart?symbol=S&period=P` | yes | `image/svg+xml` close with EMA overlays |
//!
//! When an API key is configured, protected routes require a matching
//! `X-API-Key` header and answer `401` otherwise.

pub mod auth;
pub mod chart;
pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use axum::{middleware, Extension, Router};
use ferrobars_core::{AppConfig, Warehouse, WindowQuery};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use auth::{ApiKey, API_KEY_HEADER};
pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub query: WindowQuery,
    pub db_path: PathBuf,
}

impl AppState {
    pub fn new(warehouse: Warehouse) -> Self {
        Self {
            db_path: warehouse.db_path().to_path_buf(),
            query: WindowQuery::new(warehouse),
        }
    }
}

/// Assemble the API router. `api_key` of `None` disables authentication.
pub fn router(state: AppState, api_key: Option<String>) -> Router {
    let protected = Router::new()
        .route("/quote", get(routes::quote))
        .route("/chart", get(routes::chart))
        .route_layer(middleware::from_fn(auth::require_api_key));

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .merge(protected)
        .layer(Extension(ApiKey(api_key.unwrap_or_default())))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(config: &AppConfig, warehouse: Warehouse) -> std::io::Result<()> {
    let app = router(AppState::new(warehouse), config.api_key.clone());
    let addr: SocketAddr = config.bind_addr;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        db_path = %config.db_path.display(),
        auth_enabled = config.auth_enabled(),
        "read api listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "could not listen for Ctrl+C; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
