//! `eth_subscribe` log subscriptions over the node's WebSocket endpoint.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::rpc::rpc_result;
use super::{abi, EventChannel, EventHandler, EventSource, LedgerError, Subscription};
use crate::config::LedgerConfig;
use crate::models::{Address, LedgerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIBE_ID: u64 = 1;
const UNSUBSCRIBE_ID: u64 = 2;

pub struct WsEventSource {
    ws_url: String,
    app_address: Address,
}

impl WsEventSource {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            app_address: config.contracts.app_address,
        }
    }
}

#[async_trait]
impl EventSource for WsEventSource {
    async fn subscribe(
        &self,
        channel: EventChannel,
        handler: EventHandler,
    ) -> Result<Subscription, LedgerError> {
        let (mut ws, _) = connect_async(self.ws_url.as_str()).await?;

        let request = json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_ID,
            "method": "eth_subscribe",
            "params": ["logs", {
                "address": self.app_address,
                "topics": [abi::encode_hex(&abi::event_topic(channel))],
            }],
        });
        ws.send(Message::Text(request.to_string())).await?;

        let subscription_id = read_subscription_id(&mut ws).await?;
        info!(%channel, subscription_id = %subscription_id, "subscribed to contract events");

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(deliver(ws, channel, subscription_id, handler, cancel_rx));

        Ok(Subscription::new(channel, cancel_tx, task))
    }
}

async fn read_subscription_id(ws: &mut WsStream) -> Result<String, LedgerError> {
    while let Some(message) = ws.next().await {
        let Message::Text(text) = message? else {
            continue;
        };
        let response: Value = serde_json::from_str(&text)
            .map_err(|e| LedgerError::InvalidResponse(format!("eth_subscribe: {e}")))?;
        if response.get("id").and_then(Value::as_u64) != Some(SUBSCRIBE_ID) {
            continue;
        }

        let result = rpc_result(response)?;
        return result
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("eth_subscribe returned {result}")));
    }

    Err(LedgerError::Transport(
        "connection closed before eth_subscribe was acknowledged".to_string(),
    ))
}

async fn deliver(
    mut ws: WsStream,
    channel: EventChannel,
    subscription_id: String,
    handler: EventHandler,
    mut cancel: oneshot::Receiver<()>,
) -> Result<(), LedgerError> {
    loop {
        tokio::select! {
            _ = &mut cancel => {
                let unsubscribe = json!({
                    "jsonrpc": "2.0",
                    "id": UNSUBSCRIBE_ID,
                    "method": "eth_unsubscribe",
                    "params": [subscription_id],
                });
                let _ = ws.send(Message::Text(unsubscribe.to_string())).await;
                let _ = ws.close(None).await;
                debug!(%channel, "subscription cancelled");
                return Ok(());
            }
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match decode_notification(&text, &subscription_id, channel) {
                        Ok(Some(event)) => handler(event),
                        Ok(None) => {}
                        Err(err) => warn!(%channel, error = %err, "skipping undecodable log"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(LedgerError::Transport(format!(
                        "{channel} stream closed by node: {frame:?}"
                    )));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(LedgerError::Transport(format!("{channel} stream ended")));
                }
            }
        }
    }
}

/// Turn one WebSocket text frame into an event for `channel`.
///
/// Frames for other subscriptions, non-notifications and logs removed by a
/// reorg yield `Ok(None)`.
fn decode_notification(
    text: &str,
    subscription_id: &str,
    channel: EventChannel,
) -> Result<Option<LedgerEvent>, LedgerError> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| LedgerError::InvalidResponse(format!("notification: {e}")))?;

    if frame.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return Ok(None);
    }
    let Some(params) = frame.get("params") else {
        return Ok(None);
    };
    if params.get("subscription").and_then(Value::as_str) != Some(subscription_id) {
        return Ok(None);
    }

    let log = params
        .get("result")
        .ok_or_else(|| LedgerError::InvalidResponse("notification without result".into()))?;
    if log.get("removed").and_then(Value::as_bool) == Some(true) {
        return Ok(None);
    }

    let topic = log
        .pointer("/topics/0")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::InvalidResponse("log without topics".into()))?;
    if abi::channel_for_topic(&abi::decode_hex(topic)?) != Some(channel) {
        return Ok(None);
    }

    let data = log
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::InvalidResponse("log without data".into()))?;
    abi::decode_event(channel, &abi::decode_hex(data)?).map(Some)
}
