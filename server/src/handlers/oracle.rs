use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{ApiResponse, Oracle};
use crate::services::{CoordinatorMetrics, CoordinatorState, MetricsSnapshot, OracleCoordinator};

#[derive(Debug, Serialize)]
pub struct OraclesView {
    pub state: CoordinatorState,
    pub count: usize,
    pub oracles: Vec<Oracle>,
}

pub async fn api_root() -> Json<Value> {
    Json(json!({
        "message": "An API for use with your Dapp!"
    }))
}

/// Registered oracles and their assigned indexes
pub async fn list_oracles(
    State(coordinator): State<Arc<OracleCoordinator>>,
) -> Json<ApiResponse<OraclesView>> {
    let pool = coordinator.pool();
    Json(ApiResponse::ok(OraclesView {
        state: coordinator.state(),
        count: pool.len(),
        oracles: pool.oracles().to_vec(),
    }))
}

pub async fn get_metrics(
    State(metrics): State<Arc<CoordinatorMetrics>>,
) -> Json<ApiResponse<MetricsSnapshot>> {
    Json(ApiResponse::ok(metrics.snapshot()))
}
