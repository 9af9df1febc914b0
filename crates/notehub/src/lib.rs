//! notehub - per-user hierarchical notes exposed as MCP tools.
//!
//! - `auth`: bearer authentication, email allow-list, request middleware
//! - `tools`: the four note tools and their router
//! - `mcp`: JSON-RPC / MCP protocol over Streamable HTTP
//! - `serve`: axum application and server loop
//! - `commands`: CLI subcommands
//! - `telemetry`: tracing and OTLP setup

pub mod auth;
pub mod commands;
pub mod mcp;
pub mod serve;
pub mod telemetry;
pub mod tools;

pub use auth::{Authenticator, Gatekeeper, UserIdentity};
pub use tools::{ToolCall, ToolOutcome, ToolRouter};
