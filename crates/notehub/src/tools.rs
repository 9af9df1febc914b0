//! Tool Router: the four note operations exposed to MCP clients.
//!
//! Arguments arrive as loose JSON and are parsed into a [`ToolCall`] before
//! anything touches the store. Every failure is turned into an error
//! envelope by [`ToolRouter::invoke`], so the transport always has a
//! well-formed result to send back.

use notestore::safety::{self, Field};
use notestore::{normalize, NodeStore, NoteError, SetRequest};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::UserIdentity;
use crate::mcp::types::{Tool, ToolAnnotations, ToolSchema};

pub const LIST_PATHS: &str = "notes.list_paths";
pub const GET: &str = "notes.get";
pub const SET: &str = "notes.set";
pub const DELETE: &str = "notes.delete";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListPathsArgs {
    /// Only list this node and its descendants. Empty or omitted lists everything.
    #[serde(default, alias = "path")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetArgs {
    /// Node path, e.g. "personal/preferences".
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetArgs {
    /// Node path, e.g. "personal/preferences".
    pub path: String,

    /// New content for the node.
    pub content: String,

    /// Version returned by a prior get. Omit or null to create a new node.
    #[serde(default)]
    pub if_match_version: Option<String>,

    /// Updated roll-up for the immediate parent. Required when the path has a parent.
    #[serde(default, alias = "parentSummary")]
    pub parent_rollup: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteArgs {
    /// Node path to remove.
    pub path: String,
}

/// A parsed tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    ListPaths(ListPathsArgs),
    Get(GetArgs),
    Set(SetArgs),
    Delete(DeleteArgs),
}

impl ToolCall {
    /// Parse a named call. Missing or null arguments count as `{}`.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, NoteError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        fn args<T: for<'de> Deserialize<'de>>(name: &str, value: Value) -> Result<T, NoteError> {
            serde_json::from_value(value)
                .map_err(|e| NoteError::validation(format!("Invalid arguments for {}: {}", name, e)))
        }

        match name {
            LIST_PATHS => Ok(ToolCall::ListPaths(args(name, arguments)?)),
            GET => Ok(ToolCall::Get(args(name, arguments)?)),
            SET => Ok(ToolCall::Set(args(name, arguments)?)),
            DELETE => Ok(ToolCall::Delete(args(name, arguments)?)),
            other => Err(NoteError::validation(format!("Unknown tool: {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ListPaths(_) => LIST_PATHS,
            ToolCall::Get(_) => GET,
            ToolCall::Set(_) => SET,
            ToolCall::Delete(_) => DELETE,
        }
    }
}

/// Result of [`ToolRouter::invoke`]: either the tool's JSON or an error envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    pub fn error(err: &NoteError) -> Self {
        Self {
            value: json!({ "error": { "code": err.code(), "message": err.to_string() } }),
            is_error: true,
        }
    }
}

fn schema_for<T: JsonSchema>() -> ToolSchema {
    let settings = schemars::generate::SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let gen = settings.into_generator();
    let schema = gen.into_root_schema_for::<T>();
    let value = serde_json::to_value(&schema).unwrap_or_default();
    ToolSchema::from_value(value)
}

/// Dispatches tool calls against a [`NodeStore`] on behalf of an identity.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    store: NodeStore,
}

impl ToolRouter {
    pub fn new(store: NodeStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Tool definitions advertised by `tools/list`.
    pub fn definitions() -> Vec<Tool> {
        vec![
            Tool {
                name: LIST_PATHS.to_string(),
                title: Some("List note paths".to_string()),
                description: Some(
                    "List note paths for the current user. Use this first to discover what exists. \
                     With a prefix, returns that node (only if it exists) followed by every path \
                     beneath it, in ascending order. Returns paths only; call notes.get for content."
                        .to_string(),
                ),
                input_schema: schema_for::<ListPathsArgs>(),
                annotations: Some(ToolAnnotations::read_only()),
            },
            Tool {
                name: GET.to_string(),
                title: Some("Get note".to_string()),
                description: Some(
                    "Get the content and version of a single path. Paths are normalized to lowercase \
                     with / separators. A missing path returns empty content and a null version."
                        .to_string(),
                ),
                input_schema: schema_for::<GetArgs>(),
                annotations: Some(ToolAnnotations::read_only()),
            },
            Tool {
                name: SET.to_string(),
                title: Some("Set note".to_string()),
                description: Some(
                    "Create or replace the content at a path. Omit ifMatchVersion to create; to update, \
                     pass the version from notes.get. A stale or missing version is a CONFLICT: re-read \
                     and retry. Keep nodes small, put detail in children and keep parents as roll-up \
                     summaries: writing a child path requires parentRollup, the new content for its \
                     immediate parent, written in the same transaction."
                        .to_string(),
                ),
                input_schema: schema_for::<SetArgs>(),
                annotations: Some(ToolAnnotations::write_non_destructive()),
            },
            Tool {
                name: DELETE.to_string(),
                title: Some("Delete note".to_string()),
                description: Some(
                    "Delete the node at a path. This is destructive. Do not delete unless the user \
                     explicitly asks; prefer marking content as archived via notes.set. Deleting a \
                     missing path succeeds."
                        .to_string(),
                ),
                input_schema: schema_for::<DeleteArgs>(),
                annotations: Some(ToolAnnotations::destructive()),
            },
        ]
    }

    /// Run a parsed call. Validation always happens before the store is touched.
    pub async fn call(&self, identity: &UserIdentity, call: ToolCall) -> Result<Value, NoteError> {
        let owner = identity.user_id.as_str();
        let tool = call.name();

        match call {
            ToolCall::ListPaths(args) => {
                let prefix = match args.prefix.as_deref().map(str::trim) {
                    Some(raw) if !raw.is_empty() => Some(normalize(raw)?),
                    _ => None,
                };
                info!(tool, user_id = owner, prefix = prefix.as_deref().unwrap_or(""), "tool call");

                let paths = self.store.list_paths(owner, prefix.as_deref()).await?;
                Ok(json!({ "paths": paths }))
            }
            ToolCall::Get(args) => {
                let path = normalize(&args.path)?;
                info!(tool, user_id = owner, %path, "tool call");

                let node = self.store.get_node(owner, &path).await?;
                Ok(serde_json::to_value(node).unwrap_or_default())
            }
            ToolCall::Set(args) => {
                let path = normalize(&args.path)?;
                safety::check(Field::Content, &args.content)?;
                if let Some(rollup) = &args.parent_rollup {
                    safety::check(Field::ParentRollup, rollup)?;
                }
                info!(
                    tool,
                    user_id = owner,
                    %path,
                    update = args.if_match_version.is_some(),
                    rollup = args.parent_rollup.is_some(),
                    "tool call"
                );

                let mut request = SetRequest::create(path, args.content);
                if let Some(version) = args.if_match_version {
                    request = request.if_match(version);
                }
                if let Some(rollup) = args.parent_rollup {
                    request = request.with_rollup(rollup);
                }

                let version = self.store.set_node(owner, request).await?;
                Ok(json!({ "ok": true, "version": version }))
            }
            ToolCall::Delete(args) => {
                let path = normalize(&args.path)?;
                info!(tool, user_id = owner, %path, "tool call");

                self.store.delete_node(owner, &path).await?;
                Ok(json!({ "ok": true }))
            }
        }
    }

    /// Parse and run a call by name, folding every failure into an error envelope.
    pub async fn invoke(&self, identity: &UserIdentity, name: &str, arguments: Value) -> ToolOutcome {
        let result = match ToolCall::parse(name, arguments) {
            Ok(call) => self.call(identity, call).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => ToolOutcome::ok(value),
            Err(err) => {
                warn!(tool = name, user_id = %identity.user_id, code = err.code(), "tool call failed: {}", err);
                ToolOutcome::error(&err)
            }
        }
    }
}
