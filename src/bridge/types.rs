//! Shared types for the bridge.
//!
//! JSON-RPC 2.0 message types, the settings document, and the inbound and
//! outbound shapes exchanged with the HTTP layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::{BridgeError, ErrorKind};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// Prefix that marks the handshake request id. Responses carrying it are never
/// accepted as the answer to the real call.
pub const INIT_ID_PREFIX: &str = "init-";

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<String>, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Well-known JSON-RPC / MCP error codes.
pub mod error_codes {
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ─── Settings Document ───────────────────────────────────────────────────────

/// Launch configuration for one MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    /// Filled from the key of the `mcpServers` map.
    #[serde(skip)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub cwd: Option<String>,
}

impl ServerConfig {
    /// Create a config with no extra environment or working directory.
    pub fn new(name: &str, command: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Command line for diagnostics.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The external settings document: `{ "mcpServers": { <name>: ServerConfig } }`.
///
/// Entries are decoded one at a time, on lookup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsDocument {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: serde_json::Map<String, serde_json::Value>,
}

impl SettingsDocument {
    /// Remove and decode the entry for `name`; `None` when there is none.
    pub fn take_server(&mut self, name: &str) -> Option<Result<ServerConfig, serde_json::Error>> {
        let entry = self.mcp_servers.remove(name)?;
        Some(
            serde_json::from_value::<ServerConfig>(entry).map(|mut config| {
                config.name = name.to_string();
                config
            }),
        )
    }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Read a resource from a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub server_name: String,
    pub uri: String,
}

/// Call a tool on a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub server_name: String,
    pub tool_name: String,
    #[serde(default = "empty_object")]
    pub arguments: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Inbound request body from the HTTP layer, either operation kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundRequest {
    Tool(ToolInvocation),
    Resource(ResourceAccess),
}

impl InboundRequest {
    pub fn server_name(&self) -> &str {
        match self {
            InboundRequest::Tool(t) => &t.server_name,
            InboundRequest::Resource(r) => &r.server_name,
        }
    }

    pub fn into_operation(self) -> Operation {
        match self {
            InboundRequest::Tool(t) => t.into(),
            InboundRequest::Resource(r) => r.into(),
        }
    }
}

/// The real call carried in the batch after the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ReadResource { uri: String },
    CallTool {
        name: String,
        arguments: serde_json::Value,
    },
}

impl Operation {
    /// JSON-RPC method name.
    pub fn method(&self) -> &'static str {
        match self {
            Operation::ReadResource { .. } => "resources/read",
            Operation::CallTool { .. } => "tools/call",
        }
    }

    /// JSON-RPC params object.
    pub fn params(&self) -> serde_json::Value {
        match self {
            Operation::ReadResource { uri } => serde_json::json!({ "uri": uri }),
            Operation::CallTool { name, arguments } => serde_json::json!({
                "name": name,
                "arguments": arguments,
            }),
        }
    }
}

impl From<ResourceAccess> for Operation {
    fn from(access: ResourceAccess) -> Self {
        Operation::ReadResource { uri: access.uri }
    }
}

impl From<ToolInvocation> for Operation {
    fn from(call: ToolInvocation) -> Self {
        Operation::CallTool {
            name: call.tool_name,
            arguments: call.arguments,
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Captured output of one server process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The single normalized output of a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeResult {
    pub value: serde_json::Value,
}

/// Body returned to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundResponse {
    Success {
        result: serde_json::Value,
    },
    Failure {
        message: String,
        kind: ErrorKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<serde_json::Value>,
    },
}

impl From<Result<BridgeResult, BridgeError>> for OutboundResponse {
    fn from(outcome: Result<BridgeResult, BridgeError>) -> Self {
        match outcome {
            Ok(result) => OutboundResponse::Success {
                result: result.value,
            },
            Err(err) => OutboundResponse::Failure {
                message: err.to_string(),
                kind: err.kind(),
                error: err.public_error(),
            },
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
