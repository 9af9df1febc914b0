//! Method dispatch.
//!
//! Spans follow the OpenTelemetry JSON-RPC conventions (`rpc.system`,
//! `rpc.method`, `rpc.jsonrpc.*`), plus `mcp.session_id` and `user.id`.

use serde_json::{json, Value};
use tracing::Instrument;

use super::jsonrpc::{ErrorData, JsonRpcMessage};
use super::types::{CallToolParams, CallToolResult, InitializeResult, ServerCapabilities, PROTOCOL_VERSION};
use super::McpState;
use crate::auth::UserIdentity;
use crate::tools::ToolRouter;

/// Run one request and produce its `result` value or a JSON-RPC error.
pub async fn dispatch(
    state: &McpState,
    identity: &UserIdentity,
    session_id: &str,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    let request_id = message
        .id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();

    let span = tracing::info_span!(
        "mcp.dispatch",
        rpc.system = "jsonrpc",
        rpc.method = %message.method,
        rpc.jsonrpc.version = "2.0",
        rpc.jsonrpc.request_id = %request_id,
        mcp.session_id = %session_id,
        user.id = %identity.user_id,
        error.type = tracing::field::Empty,
        rpc.jsonrpc.error_code = tracing::field::Empty,
        rpc.jsonrpc.error_message = tracing::field::Empty,
    );

    async {
        let result = dispatch_inner(state, identity, message).await;
        if let Err(ref error) = result {
            let span = tracing::Span::current();
            span.record("error.type", error.error_type());
            span.record("rpc.jsonrpc.error_code", error.code);
            span.record("rpc.jsonrpc.error_message", error.message.as_str());
        }
        result
    }
    .instrument(span)
    .await
}

async fn dispatch_inner(
    state: &McpState,
    identity: &UserIdentity,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    match message.method.as_str() {
        "initialize" => initialize(state),
        "ping" => Ok(json!({})),

        "tools/list" => to_value(&json!({ "tools": ToolRouter::definitions() })),
        "tools/call" => call_tool(state, identity, message).await,

        // No resources or prompts; answer with empty listings so generic clients don't trip.
        "resources/list" => Ok(json!({ "resources": [] })),
        "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
        "prompts/list" => Ok(json!({ "prompts": [] })),
        "prompts/get" => Ok(json!({ "description": "", "messages": [] })),

        other => Err(ErrorData::method_not_found(other)),
    }
}

fn initialize(state: &McpState) -> Result<Value, ErrorData> {
    to_value(&InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities::tools_only(),
        server_info: state.server_info.clone(),
        instructions: state.instructions.clone(),
    })
}

async fn call_tool(
    state: &McpState,
    identity: &UserIdentity,
    message: &JsonRpcMessage,
) -> Result<Value, ErrorData> {
    let params: CallToolParams = message
        .params
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ErrorData::invalid_params(format!("Invalid call params: {}", e)))?
        .ok_or_else(|| ErrorData::invalid_params("Missing call params"))?;

    let name = params
        .name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ErrorData::invalid_params("Missing tool name"))?;

    let tool_span = tracing::info_span!("mcp.tool.call", mcp.tool.name = %name);
    let outcome = state
        .router
        .invoke(identity, &name, params.arguments.unwrap_or(Value::Null))
        .instrument(tool_span)
        .await;

    to_value(&CallToolResult::json(outcome.value, outcome.is_error))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ErrorData> {
    serde_json::to_value(value)
        .map_err(|e| ErrorData::internal_error(format!("Failed to serialize result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notestore::NodeStore;

    fn state() -> McpState {
        McpState::new(ToolRouter::new(NodeStore::in_memory()))
    }

    fn who() -> UserIdentity {
        UserIdentity::new("u1", "u1@example.com", "U")
    }

    async fn run(method: &str, params: Value) -> Result<Value, ErrorData> {
        dispatch(&state(), &who(), "s1", &JsonRpcMessage::request(1_i64, method, params)).await
    }

    #[tokio::test]
    async fn test_initialize() {
        let result = run("initialize", json!({})).await.unwrap();
        assert_eq!(result["protocolVersion"], "2025-06-18");
        assert_eq!(result["serverInfo"]["name"], "notehub");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["instructions"].as_str().unwrap().contains("notes.list_paths"));
    }

    #[tokio::test]
    async fn test_empty_listings() {
        assert_eq!(run("ping", json!({})).await.unwrap(), json!({}));
        assert_eq!(run("resources/list", json!({})).await.unwrap()["resources"], json!([]));
        assert_eq!(
            run("resources/templates/list", json!({})).await.unwrap()["resourceTemplates"],
            json!([])
        );
        assert_eq!(run("prompts/list", json!({})).await.unwrap()["prompts"], json!([]));
        assert_eq!(run("prompts/get", json!({ "name": "x" })).await.unwrap()["messages"], json!([]));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let result = run("tools/list", json!({})).await.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[0]["name"], "notes.list_paths");
        assert_eq!(tools[0]["inputSchema"]["type"], "object");
        assert_eq!(tools[0]["annotations"]["readOnlyHint"], true);
    }

    #[tokio::test]
    async fn test_tools_call() {
        let state = state();
        let set = JsonRpcMessage::request(
            2_i64,
            "tools/call",
            json!({ "name": "notes.set", "arguments": { "path": "inbox", "content": "hi" } }),
        );
        let result = dispatch(&state, &who(), "s1", &set).await.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["ok"], true);

        let get = JsonRpcMessage::request(
            3_i64,
            "tools/call",
            json!({ "name": "notes.get", "arguments": { "path": "inbox" } }),
        );
        let result = dispatch(&state, &who(), "s1", &get).await.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        let node: Value = serde_json::from_str(text).unwrap();
        assert_eq!(node["content"], "hi");
    }

    #[tokio::test]
    async fn test_tool_failure_is_a_result() {
        let result = run(
            "tools/call",
            json!({ "name": "notes.set", "arguments": { "path": "a/b", "content": "x" } }),
        )
        .await
        .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"]["code"], "PARENT_REQUIRED");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let err = run("tools/call", json!({ "arguments": {} })).await.unwrap_err();
        assert_eq!(err.code, ErrorData::INVALID_PARAMS);

        let err = run("resources/read", json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorData::METHOD_NOT_FOUND);
        assert_eq!(err.error_type(), "method_not_found");
    }
}
