//! MCP over Streamable HTTP: JSON-RPC envelopes, method dispatch and the
//! axum handlers that carry them.

pub mod jsonrpc;
pub mod protocol;
pub mod transport;
pub mod types;

pub use jsonrpc::{ErrorData, JsonRpcMessage, JsonRpcResponse, RequestId};
pub use protocol::dispatch;
pub use transport::{post_handler, stream_handler, SESSION_HEADER};
pub use types::{CallToolResult, Implementation, Tool, PROTOCOL_VERSION};

use crate::tools::ToolRouter;

const INSTRUCTIONS: &str = "Personal hierarchical notes. Start with notes.list_paths to see what \
exists, then notes.get the paths you need. Parents hold short roll-up summaries of their \
children: when you write a child with notes.set, also send the parent's updated roll-up as \
parentRollup. Updates need the version from the most recent notes.get; on CONFLICT, re-read \
and try again.";

/// Shared state for the MCP endpoints.
#[derive(Debug, Clone)]
pub struct McpState {
    pub router: ToolRouter,
    pub server_info: Implementation,
    pub instructions: Option<String>,
}

impl McpState {
    pub fn new(router: ToolRouter) -> Self {
        Self {
            router,
            server_info: Implementation::new("notehub", env!("CARGO_PKG_VERSION")),
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}
