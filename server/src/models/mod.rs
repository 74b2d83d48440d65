//! Data models for the FlightSurety oracle server

pub mod oracle;

use serde::Serialize;

pub use oracle::{
    Address, FlightStatusInfo, LedgerEvent, Oracle, OracleIndexes, OracleReport, RequestEvent,
    ResponseSubmission, StatusCode,
};

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
