//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::services::{CoordinatorMetrics, OracleCoordinator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<OracleCoordinator>,
    pub metrics: Arc<CoordinatorMetrics>,
}

impl AppState {
    pub fn new(coordinator: Arc<OracleCoordinator>) -> Self {
        let metrics = coordinator.metrics();
        Self {
            coordinator,
            metrics,
        }
    }
}

impl FromRef<AppState> for Arc<OracleCoordinator> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.coordinator.clone()
    }
}

impl FromRef<AppState> for Arc<CoordinatorMetrics> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.metrics.clone()
    }
}
