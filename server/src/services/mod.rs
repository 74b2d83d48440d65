//! Business logic services for the oracle server

pub mod metrics;
pub mod oracle_pool;
pub mod oracle_service;

pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use oracle_pool::{OraclePool, PoolError};
pub use oracle_service::{
    CoordinatorError, CoordinatorSettings, CoordinatorState, OracleCoordinator,
    RegistrationFailure, RegistrationReport, SubmissionOutcome,
};
