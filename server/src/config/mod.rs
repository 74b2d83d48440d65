//! Environment-driven configuration.
//!
//! `main` loads `.env` through `dotenvy` first, so every key below can live
//! either in the process environment or in a local `.env` file.

pub mod contracts;

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub use contracts::ContractsConfig;

/// Reads one configuration key.
pub(crate) type Lookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_ORACLE_COUNT: usize = 25;
const DEFAULT_GAS: u64 = 10_000_000;
const DEFAULT_GAS_PRICE: u64 = 20_000_000;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Connection and transaction settings for the ledger node.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub contracts: ContractsConfig,
    pub gas: u64,
    pub gas_price: u64,
    pub receipt_poll_attempts: u32,
    pub receipt_poll_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// Upper bound on simulated oracles registered at startup.
    pub oracle_count: usize,
    pub registration_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub oracles: OracleConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self, ConfigError> {
        let rpc_url = lookup("ETH_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let ws_url = lookup("ETH_WS_URL").unwrap_or_else(|| ws_url_for(&rpc_url));

        let ledger = LedgerConfig {
            rpc_url,
            ws_url,
            contracts: ContractsConfig::from_lookup(lookup)?,
            gas: parse_or(lookup, "ORACLE_GAS", DEFAULT_GAS)?,
            gas_price: parse_or(lookup, "ORACLE_GAS_PRICE", DEFAULT_GAS_PRICE)?,
            receipt_poll_attempts: parse_or(lookup, "RECEIPT_POLL_ATTEMPTS", 20)?,
            receipt_poll_interval: Duration::from_millis(parse_or(
                lookup,
                "RECEIPT_POLL_INTERVAL_MS",
                250,
            )?),
        };

        let oracles = OracleConfig {
            oracle_count: parse_or(lookup, "ORACLE_COUNT", DEFAULT_ORACLE_COUNT)?,
            registration_retries: parse_or(lookup, "REGISTRATION_RETRIES", 3)?,
        };

        let server = ServerConfig {
            port: parse_or(lookup, "PORT", DEFAULT_PORT)?,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:8000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        };

        Ok(Self {
            ledger,
            oracles,
            server,
        })
    }
}

/// The node serves WebSocket on the same host and port as HTTP.
fn ws_url_for(rpc_url: &str) -> String {
    rpc_url.replacen("http", "ws", 1)
}

fn parse_or<T>(lookup: &Lookup<'_>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}
