//! Streamable HTTP transport.
//!
//! - `POST /mcp`: one JSON-RPC message in, one JSON response out (202 for notifications)
//! - `GET /mcp`, `GET /mcp/sse`: a single `notifications/initialized` event for SSE clients
//!
//! Every response carries an `mcp-session-id` header, echoed from the request
//! or freshly minted.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::jsonrpc::{ErrorData, JsonRpcMessage, JsonRpcResponse};
use super::McpState;
use crate::auth::UserIdentity;

pub const SESSION_HEADER: &str = "mcp-session-id";

const SSE_READY_EVENT: &str =
    "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\",\"params\":{}}\n\n";

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn with_session(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

#[tracing::instrument(skip_all, fields(session_id = tracing::field::Empty))]
pub async fn post_handler(
    State(state): State<Arc<McpState>>,
    Extension(identity): Extension<UserIdentity>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = session_id(&headers);
    tracing::Span::current().record("session_id", session_id.as_str());

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            let response = JsonRpcResponse::from_result(
                Value::Null,
                Err(ErrorData::parse_error(format!("Parse error: {}", e))),
            );
            return with_session(
                (StatusCode::BAD_REQUEST, Json(response)).into_response(),
                &session_id,
            );
        }
    };

    let request_id = raw.get("id").cloned().unwrap_or(Value::Null);
    let message: JsonRpcMessage = match serde_json::from_value(raw) {
        Ok(m) => m,
        Err(e) => {
            let response = JsonRpcResponse::from_result(
                request_id,
                Err(ErrorData::invalid_request(format!("Invalid JSON-RPC: {}", e))),
            );
            return with_session(
                (StatusCode::BAD_REQUEST, Json(response)).into_response(),
                &session_id,
            );
        }
    };

    if message.is_notification() {
        debug!(method = %message.method, "notification received");
        return with_session(StatusCode::ACCEPTED.into_response(), &session_id);
    }

    info!(method = %message.method, request_id = %request_id, "mcp request");
    let result = super::dispatch(&state, &identity, &session_id, &message).await;
    let response = JsonRpcResponse::from_result(request_id, result);

    with_session((StatusCode::OK, Json(response)).into_response(), &session_id)
}

/// SSE clients get one ready event; anything else is told to POST.
pub async fn stream_handler(headers: HeaderMap) -> Response {
    let session_id = session_id(&headers);
    let wants_sse = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));

    let response = if wants_sse {
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            SSE_READY_EVENT,
        )
            .into_response()
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "POST")],
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response()
    };

    with_session(response, &session_id)
}
