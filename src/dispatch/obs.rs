//! # OBS Websocket Client
//!
//! One-shot requests against an obs-websocket v5 server. Each call opens
//! a connection, completes the Hello/Identify handshake, sends a single
//! request and waits for its response.
//!
//! ## Handshake
//!
//! | op | Direction | Message |
//! |----|-----------|---------|
//! | 0 | server → client | Hello (optional auth challenge + salt) |
//! | 1 | client → server | Identify |
//! | 2 | server → client | Identified |
//! | 6 | client → server | Request |
//! | 7 | server → client | RequestResponse |

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::DispatchError;

const RPC_VERSION: u64 = 1;

const OP_HELLO: u64 = 0;
const OP_IDENTIFY: u64 = 1;
const OP_IDENTIFIED: u64 = 2;
const OP_REQUEST: u64 = 6;
const OP_REQUEST_RESPONSE: u64 = 7;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsSettings {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    pub password: Option<String>,
    /// Upper bound for connect, handshake and response together.
    pub timeout: Duration,
}

impl Default for ObsSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4455".to_string(),
            password: None,
            timeout: Duration::from_secs(3),
        }
    }
}

/// Computes the Identify `authentication` string.
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
#[must_use]
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    BASE64.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}

fn obs_err(err: impl std::fmt::Display) -> DispatchError {
    DispatchError::Obs(err.to_string())
}

/// obs-websocket client.
#[derive(Debug, Default)]
pub struct ObsClient {
    settings: ObsSettings,
    next_id: AtomicU64,
}

impl ObsClient {
    #[must_use]
    pub fn new(settings: ObsSettings) -> Self {
        Self {
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ObsSettings {
        &self.settings
    }

    /// Sends one request and returns its `responseData` (or `Null`).
    ///
    /// # Arguments
    ///
    /// * `request_type` - obs-websocket request name, e.g. `StartRecord`
    /// * `data` - optional `requestData` object
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Obs`] if the connection or handshake fails,
    /// the server requires a password that is not configured, the request
    /// status is unsuccessful, or the timeout elapses.
    pub async fn call(&self, request_type: &str, data: Option<Value>) -> Result<Value, DispatchError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        tokio::time::timeout(self.settings.timeout, self.exchange(request_type, &request_id, data))
            .await
            .map_err(|_| {
                DispatchError::Obs(format!(
                    "no response within {} ms",
                    self.settings.timeout.as_millis()
                ))
            })?
    }

    async fn exchange(
        &self,
        request_type: &str,
        request_id: &str,
        data: Option<Value>,
    ) -> Result<Value, DispatchError> {
        let (mut socket, _) = connect_async(self.settings.url.as_str()).await.map_err(obs_err)?;

        let hello = expect_op(&mut socket, OP_HELLO).await?;
        let mut identify = json!({ "rpcVersion": RPC_VERSION });
        if let Some(auth) = hello.get("authentication") {
            let password = self
                .settings
                .password
                .as_deref()
                .ok_or_else(|| DispatchError::Obs("server requires a password".to_string()))?;
            let challenge = auth.get("challenge").and_then(Value::as_str).unwrap_or_default();
            let salt = auth.get("salt").and_then(Value::as_str).unwrap_or_default();
            identify["authentication"] = Value::String(auth_response(password, salt, challenge));
        }
        send(&mut socket, OP_IDENTIFY, identify).await?;
        expect_op(&mut socket, OP_IDENTIFIED).await?;

        let mut request = json!({ "requestType": request_type, "requestId": request_id });
        if let Some(data) = data {
            request["requestData"] = data;
        }
        send(&mut socket, OP_REQUEST, request).await?;
        debug!(request_type, request_id, "OBS request sent");

        loop {
            let response = expect_op(&mut socket, OP_REQUEST_RESPONSE).await?;
            if response.get("requestId").and_then(Value::as_str) != Some(request_id) {
                continue;
            }
            let _ = socket.close(None).await;

            let status = &response["requestStatus"];
            if status["result"].as_bool() != Some(true) {
                let comment = status["comment"].as_str().unwrap_or("request failed");
                return Err(DispatchError::Obs(format!(
                    "{} (code {})",
                    comment,
                    status["code"].as_i64().unwrap_or_default()
                )));
            }
            return Ok(response.get("responseData").cloned().unwrap_or(Value::Null));
        }
    }
}

async fn send(socket: &mut Socket, op: u64, d: Value) -> Result<(), DispatchError> {
    let text = json!({ "op": op, "d": d }).to_string();
    socket.send(Message::Text(text)).await.map_err(obs_err)
}

/// Reads text frames until one with opcode `op` arrives; returns its `d`.
async fn expect_op(socket: &mut Socket, op: u64) -> Result<Value, DispatchError> {
    while let Some(message) = socket.next().await {
        let text = match message.map_err(obs_err)? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let mut frame: Value = serde_json::from_str(&text).map_err(obs_err)?;
        if frame["op"].as_u64() == Some(op) {
            return Ok(frame["d"].take());
        }
    }
    Err(DispatchError::Obs("connection closed by server".to_string()))
}
