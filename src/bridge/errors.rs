//! Bridge error types.
//!
//! Every failure of an invocation maps onto exactly one [`ErrorKind`]. The
//! `Display` text is safe to return to callers; anything that could leak local
//! paths, command lines or raw process output lives behind [`BridgeError::detail`]
//! and is meant for logs only.

use serde::Serialize;
use thiserror::Error;

/// Upper bound for diagnostic text (stderr, raw stdout) kept on an error.
const MAX_DETAIL_CHARS: usize = 2000;

/// Stable classification of a bridge failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigNotFound,
    ConfigInvalid,
    ServerNotFound,
    UnsupportedServer,
    ProcessSpawnError,
    ProcessExitError,
    ProcessTimeout,
    ResponseParseError,
    RpcError,
}

impl ErrorKind {
    /// Stable snake_case code, identical to the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConfigNotFound => "config_not_found",
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::ServerNotFound => "server_not_found",
            ErrorKind::UnsupportedServer => "unsupported_server",
            ErrorKind::ProcessSpawnError => "process_spawn_error",
            ErrorKind::ProcessExitError => "process_exit_error",
            ErrorKind::ProcessTimeout => "process_timeout",
            ErrorKind::ResponseParseError => "response_parse_error",
            ErrorKind::RpcError => "rpc_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during a single bridge invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The settings document could not be read.
    #[error("server settings are unavailable")]
    ConfigNotFound { path: String, reason: String },

    /// The settings document is not valid JSON of the expected shape.
    #[error("server settings are malformed")]
    ConfigInvalid { path: String, reason: String },

    /// The server name is not present in the settings document.
    #[error("unknown MCP server: '{name}'")]
    ServerNotFound { name: String },

    /// The server is configured but not on the allow-list.
    #[error("MCP server '{name}' is not supported")]
    UnsupportedServer { name: String },

    /// The server command could not be started.
    #[error("failed to start MCP server '{name}'")]
    ProcessSpawnError {
        name: String,
        command: String,
        reason: String,
    },

    /// The server process exited with a non-zero status (or was signalled).
    #[error("MCP server '{name}' exited with {}", describe_exit(.exit_code))]
    ProcessExitError {
        name: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The server process did not finish within the configured bound.
    #[error("MCP server '{name}' timed out after {timeout_ms}ms")]
    ProcessTimeout { name: String, timeout_ms: u64 },

    /// No usable JSON-RPC response could be recovered from stdout.
    #[error("could not parse a response from MCP server '{name}'")]
    ResponseParseError { name: String, raw_output: String },

    /// The server answered with a JSON-RPC error object.
    #[error("MCP server error [{code}]: {message}")]
    RpcError {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
}

impl BridgeError {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::ConfigNotFound { .. } => ErrorKind::ConfigNotFound,
            BridgeError::ConfigInvalid { .. } => ErrorKind::ConfigInvalid,
            BridgeError::ServerNotFound { .. } => ErrorKind::ServerNotFound,
            BridgeError::UnsupportedServer { .. } => ErrorKind::UnsupportedServer,
            BridgeError::ProcessSpawnError { .. } => ErrorKind::ProcessSpawnError,
            BridgeError::ProcessExitError { .. } => ErrorKind::ProcessExitError,
            BridgeError::ProcessTimeout { .. } => ErrorKind::ProcessTimeout,
            BridgeError::ResponseParseError { .. } => ErrorKind::ResponseParseError,
            BridgeError::RpcError { .. } => ErrorKind::RpcError,
        }
    }

    /// Internal diagnostics for logging. Never send this to untrusted callers.
    pub fn detail(&self) -> Option<String> {
        match self {
            BridgeError::ConfigNotFound { path, reason }
            | BridgeError::ConfigInvalid { path, reason } => Some(format!("{path}: {reason}")),
            BridgeError::ProcessSpawnError {
                command, reason, ..
            } => Some(format!("command '{command}': {reason}")),
            BridgeError::ProcessExitError { stderr, .. } if !stderr.is_empty() => {
                Some(stderr.clone())
            }
            BridgeError::ResponseParseError { raw_output, .. } => Some(raw_output.clone()),
            BridgeError::RpcError { data: Some(data), .. } => Some(data.to_string()),
            _ => None,
        }
    }

    /// Remote error payload that may be echoed back to the caller.
    pub fn public_error(&self) -> Option<serde_json::Value> {
        match self {
            BridgeError::RpcError {
                code,
                message,
                data,
            } => {
                let mut obj = serde_json::json!({ "code": code, "message": message });
                if let Some(data) = data {
                    obj["data"] = data.clone();
                }
                Some(obj)
            }
            _ => None,
        }
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Truncate diagnostic text to a bounded size on a char boundary.
pub(crate) fn truncate_detail(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}...(truncated)", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_distinct() {
        let not_found = BridgeError::ServerNotFound { name: "x".into() };
        let unsupported = BridgeError::UnsupportedServer { name: "x".into() };
        assert_eq!(not_found.kind().as_str(), "server_not_found");
        assert_eq!(unsupported.kind().as_str(), "unsupported_server");
        assert_ne!(not_found.kind(), unsupported.kind());
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::ResponseParseError).unwrap();
        assert_eq!(json, "\"response_parse_error\"");
    }

    #[test]
    fn test_display_hides_stderr() {
        let err = BridgeError::ProcessExitError {
            name: "fs".into(),
            exit_code: Some(2),
            stderr: "/home/user/secret/path: permission denied".into(),
        };
        let msg = err.to_string();
        assert_eq!(msg, "MCP server 'fs' exited with status 2");
        assert!(err.detail().unwrap().contains("permission denied"));
    }

    #[test]
    fn test_signal_exit_message() {
        let err = BridgeError::ProcessExitError {
            name: "fs".into(),
            exit_code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().ends_with("a signal"));
        assert!(err.detail().is_none());
    }

    #[test]
    fn test_public_error_only_for_rpc() {
        let rpc = BridgeError::RpcError {
            code: -32601,
            message: "Method not found".into(),
            data: None,
        };
        assert_eq!(rpc.public_error().unwrap()["code"], -32601);

        let parse = BridgeError::ResponseParseError {
            name: "fs".into(),
            raw_output: "garbage".into(),
        };
        assert!(parse.public_error().is_none());
    }

    #[test]
    fn test_truncate_detail() {
        let long = "é".repeat(MAX_DETAIL_CHARS + 10);
        let out = truncate_detail(&long);
        assert!(out.ends_with("...(truncated)"));
        assert_eq!(out.chars().count(), MAX_DETAIL_CHARS + "...(truncated)".len());
        assert_eq!(truncate_detail("  short \n"), "short");
    }
}
