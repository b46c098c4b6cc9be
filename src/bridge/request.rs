//! Request batch construction.
//!
//! Each invocation talks to a fresh process, so the `initialize` handshake is
//! sent every time, in the same batch and ahead of the real call.

use super::types::{JsonRpcRequest, Operation, INIT_ID_PREFIX};

/// Default MCP protocol revision announced in the handshake.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Builds `[handshake, call]` batches.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    protocol_version: String,
    client_name: String,
    client_version: String,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROTOCOL_VERSION,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
    }
}

impl RequestBuilder {
    pub fn new(protocol_version: &str, client_name: &str, client_version: &str) -> Self {
        Self {
            protocol_version: protocol_version.to_string(),
            client_name: client_name.to_string(),
            client_version: client_version.to_string(),
        }
    }

    /// Build the batch using the current wall-clock time for ids.
    pub fn build_batch(&self, operation: &Operation) -> [JsonRpcRequest; 2] {
        self.build_batch_at(chrono::Utc::now().timestamp_millis(), operation)
    }

    /// Build the batch with an explicit timestamp (milliseconds).
    pub fn build_batch_at(&self, now_ms: i64, operation: &Operation) -> [JsonRpcRequest; 2] {
        let handshake = JsonRpcRequest::new(
            format!("{INIT_ID_PREFIX}{now_ms}"),
            "initialize",
            serde_json::json!({
                "protocolVersion": self.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": self.client_name,
                    "version": self.client_version,
                },
            }),
        );
        let call = JsonRpcRequest::new(now_ms.to_string(), operation.method(), operation.params());
        [handshake, call]
    }

    /// Serialize a batch into the payload written to the process.
    pub fn encode(batch: &[JsonRpcRequest; 2]) -> String {
        // Only string keys and JSON values: serialization cannot fail.
        serde_json::to_string(batch).unwrap_or_else(|_| "[]".to_string())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
