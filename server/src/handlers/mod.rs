//! API handlers for the oracle server

pub mod oracle;

pub use oracle::{api_root, get_metrics, list_oracles, OraclesView};
