//! JSON-RPC over HTTP against an Ethereum-style development node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::abi;
use super::{LedgerClient, LedgerError, TxHash, Wei};
use crate::config::LedgerConfig;
use crate::models::{Address, OracleIndexes, ResponseSubmission};

pub struct Web3Client {
    rpc_url: String,
    app_address: Address,
    gas: u64,
    gas_price: u64,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
    http: Client,
    next_id: AtomicU64,
}

impl Web3Client {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            rpc_url: config.rpc_url.clone(),
            app_address: config.contracts.app_address,
            gas: config.gas,
            gas_price: config.gas_price,
            receipt_poll_attempts: config.receipt_poll_attempts,
            receipt_poll_interval: config.receipt_poll_interval,
            http: Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        rpc_result(response)
    }

    /// `eth_call` against the app contract, returning the raw return data.
    async fn call(&self, from: Option<Address>, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let mut tx = json!({
            "to": self.app_address,
            "data": abi::encode_hex(&data),
        });
        if let Some(from) = from {
            tx["from"] = json!(from);
        }

        let result = self.rpc_call("eth_call", json!([tx, "latest"])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| LedgerError::InvalidResponse(format!("eth_call returned {result}")))?;
        abi::decode_hex(raw)
    }

    /// `eth_sendTransaction` from an unlocked account, then wait for the receipt.
    async fn send_transaction(
        &self,
        from: Address,
        value: Wei,
        data: Vec<u8>,
    ) -> Result<TxHash, LedgerError> {
        let tx = json!({
            "from": from,
            "to": self.app_address,
            "value": abi::quantity(value),
            "gas": abi::quantity(u128::from(self.gas)),
            "gasPrice": abi::quantity(u128::from(self.gas_price)),
            "data": abi::encode_hex(&data),
        });

        let result = self.rpc_call("eth_sendTransaction", json!([tx])).await?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| {
                LedgerError::InvalidResponse(format!("eth_sendTransaction returned {result}"))
            })?
            .to_string();

        self.wait_for_receipt(&tx_hash).await?;
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<(), LedgerError> {
        for attempt in 0..self.receipt_poll_attempts {
            // The transaction is already sent, so a failed poll only delays the answer.
            let receipt = match self
                .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(receipt) => receipt,
                Err(err) => {
                    warn!(tx_hash, attempt, error = %err, "receipt poll failed; retrying");
                    Value::Null
                }
            };

            if !receipt.is_null() {
                return match receipt.get("status").and_then(Value::as_str) {
                    Some("0x0") => Err(LedgerError::Reverted {
                        tx_hash: tx_hash.to_string(),
                    }),
                    _ => Ok(()),
                };
            }

            debug!(tx_hash, attempt, "receipt not yet available");
            sleep(self.receipt_poll_interval).await;
        }

        warn!(
            tx_hash,
            attempts = self.receipt_poll_attempts,
            "no receipt yet; treating transaction as submitted"
        );
        Ok(())
    }
}

/// Unwrap a JSON-RPC envelope into its `result`.
pub(crate) fn rpc_result(mut response: Value) -> Result<Value, LedgerError> {
    if let Some(err) = response.get("error") {
        return Err(LedgerError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(LedgerError::InvalidResponse(
            "no result in RPC response".to_string(),
        )),
    }
}

#[async_trait]
impl LedgerClient for Web3Client {
    async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        let result = self.rpc_call("eth_accounts", json!([])).await?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::InvalidResponse(format!("eth_accounts: {e}")))
    }

    async fn registration_fee(&self) -> Result<Wei, LedgerError> {
        let data = self
            .call(None, abi::encode_call(abi::REGISTRATION_FEE, &[]))
            .await?;
        abi::decode_uint256(&data)
    }

    async fn register_oracle(
        &self,
        identity: Address,
        fee: Wei,
    ) -> Result<OracleIndexes, LedgerError> {
        self.send_transaction(identity, fee, abi::encode_call(abi::REGISTER_ORACLE, &[]))
            .await?;

        let data = self
            .call(Some(identity), abi::encode_call(abi::GET_MY_INDEXES, &[]))
            .await?;
        abi::decode_indexes(&data)
    }

    async fn submit_oracle_response(
        &self,
        submission: &ResponseSubmission,
    ) -> Result<TxHash, LedgerError> {
        self.send_transaction(submission.oracle, 0, abi::encode_submission(submission))
            .await
    }
}
