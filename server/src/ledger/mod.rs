//! Boundary to the FlightSurety contracts on the ledger node.
//!
//! Calls go through [`LedgerClient`]; pushed contract events arrive through
//! [`EventSource`] subscriptions. Both are traits so the coordinator can run
//! against the real node ([`rpc::Web3Client`], [`subscription::WsEventSource`])
//! or an in-memory double.

pub mod abi;
pub mod rpc;
pub mod subscription;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::models::{Address, LedgerEvent, OracleIndexes, ResponseSubmission};

pub use rpc::Web3Client;
pub use subscription::WsEventSource;

/// Fee amounts, in wei.
pub type Wei = u128;

/// Hex-encoded transaction hash as returned by the node.
pub type TxHash = String;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },

    #[error("abi decode error: {0}")]
    Decode(String),

    #[error("invalid node response: {0}")]
    InvalidResponse(String),

    #[error("ledger call panicked: {0}")]
    Panicked(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LedgerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

/// Calls against the FlightSuretyApp contract.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Accounts the node can sign for.
    async fn accounts(&self) -> Result<Vec<Address>, LedgerError>;

    /// The contract's `REGISTRATION_FEE` constant.
    async fn registration_fee(&self) -> Result<Wei, LedgerError>;

    /// Register `identity` as an oracle, paying `fee`, and return its assigned indexes.
    async fn register_oracle(&self, identity: Address, fee: Wei)
        -> Result<OracleIndexes, LedgerError>;

    /// Send one oracle response, signed by `submission.oracle`.
    async fn submit_oracle_response(
        &self,
        submission: &ResponseSubmission,
    ) -> Result<TxHash, LedgerError>;
}

/// Named contract event channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    OracleRequest,
    FlightStatusInfo,
    OracleReport,
}

impl EventChannel {
    pub const ALL: [EventChannel; 3] = [
        EventChannel::OracleRequest,
        EventChannel::FlightStatusInfo,
        EventChannel::OracleReport,
    ];

    /// Solidity event signature, used to derive the log topic.
    pub fn signature(self) -> &'static str {
        match self {
            EventChannel::OracleRequest => "OracleRequest(uint8,address,string,uint256)",
            EventChannel::FlightStatusInfo => "FlightStatusInfo(address,string,uint256,uint8)",
            EventChannel::OracleReport => "OracleReport(address,string,uint256,uint8)",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventChannel::OracleRequest => "OracleRequest",
            EventChannel::FlightStatusInfo => "FlightStatusInfo",
            EventChannel::OracleReport => "OracleReport",
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback invoked once per event delivered on a channel.
pub type EventHandler = Arc<dyn Fn(LedgerEvent) + Send + Sync>;

/// Push-based contract event subscriptions.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(
        &self,
        channel: EventChannel,
        handler: EventHandler,
    ) -> Result<Subscription, LedgerError>;
}

/// Handle to a live subscription.
///
/// Dropping the handle cancels the subscription.
pub struct Subscription {
    channel: EventChannel,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), LedgerError>>>,
}

impl Subscription {
    /// Wrap a delivery task. The task must finish promptly once `cancel` fires.
    pub fn new(
        channel: EventChannel,
        cancel: oneshot::Sender<()>,
        task: JoinHandle<Result<(), LedgerError>>,
    ) -> Self {
        Self {
            channel,
            cancel: Some(cancel),
            task: Some(task),
        }
    }

    pub fn channel(&self) -> EventChannel {
        self.channel
    }

    /// Wait until the event stream ends. An `Err` means the stream was lost.
    pub async fn closed(&mut self) -> Result<(), LedgerError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = match task.await {
            Ok(result) => result,
            Err(join_error) => Err(LedgerError::Transport(format!(
                "{} subscription task failed: {join_error}",
                self.channel
            ))),
        };
        self.task = None;
        result
    }

    /// Stop delivery and wait for the delivery task to wind down.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("active", &self.task.is_some())
            .finish()
    }
}
