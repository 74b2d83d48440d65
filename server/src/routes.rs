//! Route definitions for the oracle server API

use axum::{routing::get, Router};

use crate::app_state::AppState;
use crate::handlers::*;

/// Full API router with state applied.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(oracle_routes())
        .with_state(state)
}

// Oracle routes
pub fn oracle_routes() -> Router<AppState> {
    Router::new()
        .route("/api", get(api_root))
        .route("/api/oracles", get(list_oracles))
        .route("/api/metrics", get(get_metrics))
}

async fn root() -> &'static str {
    "FlightSurety Oracle Server"
}

async fn health_check() -> &'static str {
    "OK"
}
