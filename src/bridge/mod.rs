//! MCP tool bridge: one-shot JSON-RPC invocations of MCP server processes.
//!
//! This module handles:
//! - Resolving server launch configs from the settings document
//! - Building the `initialize` + real-call request batch
//! - Running the server process over a stdin pipe or a redirected file
//! - Recovering the correlated response from log-polluted stdout
//! - Normalizing result payload shapes and classifying failures
//!
//! No process, config or result is kept between invocations.

pub mod client;
pub mod errors;
pub mod extract;
pub mod invoker;
pub mod parser;
pub mod registry;
pub mod request;
pub mod types;

// Re-exports for convenience
pub use client::McpBridge;
pub use errors::{BridgeError, ErrorKind};
pub use extract::ResultShape;
pub use invoker::{FileRedirect, PipedStdin, ProcessInvoker, TransportKind};
pub use registry::{JsonFileRegistry, ServerRegistry};
pub use request::RequestBuilder;
pub use types::{
    BridgeResult, InboundRequest, Operation, OutboundResponse, ProcessOutput, ResourceAccess,
    ServerConfig, ToolInvocation,
};
