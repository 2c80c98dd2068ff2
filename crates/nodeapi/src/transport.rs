//! A minimal JSON-RPC transport shared by every era adapter.
//!
//! The concrete wire codec for any given era's node protocol is out of scope
//! (spec.md focuses on the indexer-internal type universe adapters translate
//! *into*, not the bytes on the wire); this transport is the seam a real
//! decoder would plug into. It assumes the upstream node exposes a plain
//! JSON-RPC 2.0 endpoint, matching the teacher's own `reqwest`-based RPC
//! clients (e.g. `consensus/debug-client`).

use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;

use crate::error::NodeApiError;

/// A JSON-RPC 2.0 client against a single upstream node endpoint.
#[derive(Clone)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl JsonRpcTransport {
    /// Connect to `endpoint`. No handshake is performed eagerly; the first
    /// call establishes the connection.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into() }
    }

    /// Invoke `method` with `params`, decoding the JSON-RPC `result` field as `R`.
    pub async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, NodeApiError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let envelope: JsonRpcResponse<R> = response.json().await.map_err(NodeApiError::Transport)?;
        if let Some(err) = envelope.error {
            return Err(NodeApiError::OutOfRange(err.message));
        }
        envelope.result.ok_or_else(|| NodeApiError::OutOfRange(format!("{method}: empty result")))
    }
}

#[derive(serde::Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(serde::Deserialize)]
struct JsonRpcError {
    message: String,
}
