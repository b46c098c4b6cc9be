//! Bridge façade: one call in, one classified outcome out.
//!
//! Steps per invocation:
//! 1. Load the server config (fresh every time)
//! 2. Enforce the allow-list
//! 3. Build the `[initialize, call]` batch
//! 4. Run one process and collect its output
//! 5. Recover the call response and normalize its payload
//!
//! Any step's failure short-circuits; nothing is retried.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use super::errors::{truncate_detail, BridgeError};
use super::extract;
use super::invoker::{self, ProcessInvoker};
use super::parser;
use super::registry::{JsonFileRegistry, ServerRegistry};
use super::request::RequestBuilder;
use super::types::{
    BridgeResult, InboundRequest, Operation, OutboundResponse, ResourceAccess, ToolInvocation,
};
use crate::config::BridgeConfig;

// ─── McpBridge ───────────────────────────────────────────────────────────────

/// Invokes MCP servers as one-shot processes.
///
/// Holds only immutable configuration; safe to share across tasks.
#[derive(Clone)]
pub struct McpBridge {
    registry: Arc<dyn ServerRegistry>,
    invoker: Arc<dyn ProcessInvoker>,
    requests: RequestBuilder,
    /// `None` allows every configured server.
    allowed_servers: Option<HashSet<String>>,
}

impl McpBridge {
    /// Create a bridge that allows every configured server.
    pub fn new(registry: Arc<dyn ServerRegistry>, invoker: Arc<dyn ProcessInvoker>) -> Self {
        Self {
            registry,
            invoker,
            requests: RequestBuilder::default(),
            allowed_servers: None,
        }
    }

    /// Build a bridge from the runtime configuration.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let registry = Arc::new(JsonFileRegistry::new(&config.settings_path));
        let invoker = invoker::invoker_for(config.transport, config.timeout(), config.temp_dir.clone());
        let bridge = Self::new(registry, invoker).with_request_builder(RequestBuilder::new(
            &config.protocol_version,
            &config.client_name,
            &config.client_version,
        ));

        match &config.allowed_servers {
            Some(names) => bridge.with_allowed_servers(names.iter().cloned()),
            None => bridge,
        }
    }

    /// Restrict invocations to the given server names.
    pub fn with_allowed_servers(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.allowed_servers = Some(names.into_iter().collect());
        self
    }

    /// Override handshake parameters.
    pub fn with_request_builder(mut self, requests: RequestBuilder) -> Self {
        self.requests = requests;
        self
    }

    /// Whether `server_name` passes the allow-list.
    pub fn is_allowed(&self, server_name: &str) -> bool {
        self.allowed_servers
            .as_ref()
            .map_or(true, |allowed| allowed.contains(server_name))
    }

    // ─── Invocation ──────────────────────────────────────────────────────

    /// Run `operation` against `server_name` and return the normalized result.
    ///
    /// Dropping the returned future kills the server process.
    pub async fn invoke(
        &self,
        server_name: &str,
        operation: Operation,
    ) -> Result<BridgeResult, BridgeError> {
        let span = tracing::info_span!(
            "mcp_invoke",
            invocation_id = %Uuid::new_v4(),
            server = server_name,
            method = operation.method(),
        );

        let start = Instant::now();
        let outcome = self
            .invoke_inner(server_name, &operation)
            .instrument(span.clone())
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        span.in_scope(|| match &outcome {
            Ok(_) => tracing::info!(elapsed_ms, "invocation succeeded"),
            Err(e) => {
                let detail = e.detail().unwrap_or_default();
                tracing::warn!(
                    elapsed_ms,
                    kind = %e.kind(),
                    error = %e,
                    detail = %detail,
                    "invocation failed"
                );
            }
        });
        outcome
    }

    async fn invoke_inner(
        &self,
        server_name: &str,
        operation: &Operation,
    ) -> Result<BridgeResult, BridgeError> {
        let config = self.registry.load(server_name)?;

        if !self.is_allowed(server_name) {
            return Err(BridgeError::UnsupportedServer {
                name: server_name.to_string(),
            });
        }

        let batch = self.requests.build_batch(operation);
        let payload = RequestBuilder::encode(&batch);
        tracing::debug!(call_id = %batch[1].id, bytes = payload.len(), "sending batch");

        let output = self.invoker.run(&config, &payload).await?;

        if !output.success() {
            return Err(BridgeError::ProcessExitError {
                name: server_name.to_string(),
                exit_code: output.exit_code,
                stderr: truncate_detail(&output.stderr),
            });
        }
        if !output.stderr.trim().is_empty() {
            tracing::debug!(stderr = %truncate_detail(&output.stderr), "server stderr");
        }

        let call_id = batch[1].id.as_str();
        let response = parser::parse_response(server_name, &output.stdout, Some(call_id))?;
        let shape = extract::classify(&response);
        tracing::debug!(shape = shape.label(), "extracted result");

        Ok(BridgeResult {
            value: shape.into_value(),
        })
    }

    /// Read a resource (`resources/read`).
    pub async fn read_resource(&self, access: &ResourceAccess) -> Result<BridgeResult, BridgeError> {
        self.invoke(&access.server_name, access.clone().into()).await
    }

    /// Call a tool (`tools/call`).
    pub async fn call_tool(&self, call: &ToolInvocation) -> Result<BridgeResult, BridgeError> {
        self.invoke(&call.server_name, call.clone().into()).await
    }

    /// Serve an inbound request body and produce the outbound body.
    pub async fn handle(&self, request: InboundRequest) -> OutboundResponse {
        let server_name = request.server_name().to_string();
        self.invoke(&server_name, request.into_operation()).await.into()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
