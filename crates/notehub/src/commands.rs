//! CLI command implementations.
//!
//! The note commands go through the same [`ToolRouter`] the server uses,
//! so validation, safety checks and conflict handling behave identically.

use anyhow::{bail, Result};
use noteconf::{ConfigSources, NoteConfig};
use serde_json::{json, Value};

use crate::auth::UserIdentity;
use crate::serve::open_store;
use crate::tools::{self, ToolRouter};

fn cli_identity(owner: &str) -> UserIdentity {
    UserIdentity::new(owner, "", "cli")
}

/// Run one tool against the configured store and print its JSON.
async fn run_tool(config: &NoteConfig, owner: &str, name: &str, arguments: Value) -> Result<()> {
    let router = ToolRouter::new(open_store(config)?);
    let outcome = router.invoke(&cli_identity(owner), name, arguments).await;

    println!("{}", serde_json::to_string_pretty(&outcome.value)?);
    if outcome.is_error {
        bail!("{} failed", name);
    }
    Ok(())
}

pub async fn paths(config: &NoteConfig, owner: &str, prefix: Option<&str>) -> Result<()> {
    run_tool(config, owner, tools::LIST_PATHS, json!({ "prefix": prefix })).await
}

pub async fn get(config: &NoteConfig, owner: &str, path: &str) -> Result<()> {
    run_tool(config, owner, tools::GET, json!({ "path": path })).await
}

pub async fn put(
    config: &NoteConfig,
    owner: &str,
    path: &str,
    content: &str,
    if_match: Option<&str>,
    parent_rollup: Option<&str>,
) -> Result<()> {
    let mut args = json!({ "path": path, "content": content });
    if let Some(version) = if_match {
        args["ifMatchVersion"] = json!(version);
    }
    if let Some(rollup) = parent_rollup {
        args["parentRollup"] = json!(rollup);
    }
    run_tool(config, owner, tools::SET, args).await
}

pub async fn delete(config: &NoteConfig, owner: &str, path: &str) -> Result<()> {
    run_tool(config, owner, tools::DELETE, json!({ "path": path })).await
}

/// Print the resolved configuration and where it came from.
pub fn show_config(config: &NoteConfig, sources: &ConfigSources) {
    if sources.files.is_empty() {
        println!("# No config files found; using defaults");
    }
    for file in &sources.files {
        println!("# Loaded: {}", file.display());
    }
    for var in &sources.env_overrides {
        println!("# Env override: {}", var);
    }
    println!();
    print!("{}", config.to_toml());
}
