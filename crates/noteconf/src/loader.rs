//! Config file discovery, loading, and environment variable overlay.

use crate::auth::{parse_email_list, TokenEntry};
use crate::infra::StorageBackend;
use crate::{ConfigError, NoteConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/notehub/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("notehub/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("notehub.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and overlay the keys it sets onto `config`.
pub fn apply_file(config: &mut NoteConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Overlay a TOML document onto `config`. Keys absent from the document keep
/// whatever value earlier layers produced.
pub(crate) fn apply_toml(
    config: &mut NoteConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("state_dir").and_then(|v| v.as_str()) {
            config.paths.state_dir = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            config.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("http_port").and_then(|v| v.as_integer()) {
            config.bind.http_port = u16::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("bind.http_port out of range: {}", v),
            })?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    if let Some(storage) = table.get("storage").and_then(|v| v.as_table()) {
        if let Some(v) = storage.get("backend").and_then(|v| v.as_str()) {
            config.storage.backend = StorageBackend::parse(v).ok_or_else(|| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("unknown storage.backend '{}' (expected sqlite or memory)", v),
            })?;
        }
        if let Some(v) = storage.get("db_path").and_then(|v| v.as_str()) {
            config.storage.db_path = Some(expand_path(v));
        }
        if let Some(v) = storage.get("busy_timeout_ms").and_then(|v| v.as_integer()) {
            config.storage.busy_timeout_ms = v.max(0) as u64;
        }
    }

    if let Some(auth) = table.get("auth").and_then(|v| v.as_table()) {
        if let Some(v) = auth.get("dev_mode").and_then(|v| v.as_bool()) {
            config.auth.dev_mode = v;
        }
        if let Some(v) = auth.get("dev_user_id").and_then(|v| v.as_str()) {
            config.auth.dev_user_id = v.to_string();
        }
        if let Some(v) = auth.get("dev_email").and_then(|v| v.as_str()) {
            config.auth.dev_email = v.to_string();
        }
        if let Some(v) = auth.get("dev_name").and_then(|v| v.as_str()) {
            config.auth.dev_name = v.to_string();
        }
        if let Some(list) = auth.get("allowed_emails").and_then(|v| v.as_array()) {
            config.auth.allowed_emails = list
                .iter()
                .filter_map(|v| v.as_str())
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(v) = auth.get("api_base_url").and_then(|v| v.as_str()) {
            config.auth.api_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = auth.get("issuer_url").and_then(|v| v.as_str()) {
            config.auth.issuer_url = v.to_string();
        }
        if let Some(tokens) = auth.get("tokens") {
            config.auth.tokens = tokens
                .clone()
                .try_into::<Vec<TokenEntry>>()
                .map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!("auth.tokens: {}", e),
                })?;
        }
    }

    Ok(())
}

fn env_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut NoteConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Same as [`apply_env_overrides`] but reading from an arbitrary lookup, so tests
/// don't have to mutate the process environment.
pub fn apply_overrides_from<F>(config: &mut NoteConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut hit = |key: &str| sources.env_overrides.push(key.to_string());

    // Paths
    if let Some(v) = lookup("NOTEHUB_STATE_DIR") {
        config.paths.state_dir = expand_path(&v);
        hit("NOTEHUB_STATE_DIR");
    }
    if let Some(v) = lookup("NOTEHUB_DB_PATH") {
        config.storage.db_path = Some(expand_path(&v));
        hit("NOTEHUB_DB_PATH");
    }

    // Bind
    if let Some(v) = lookup("NOTEHUB_BIND_HOST") {
        config.bind.host = v;
        hit("NOTEHUB_BIND_HOST");
    }
    if let Some(v) = lookup("NOTEHUB_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            config.bind.http_port = port;
            hit("NOTEHUB_HTTP_PORT");
        }
    }

    // Telemetry
    if let Some(v) = lookup("NOTEHUB_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        hit("NOTEHUB_OTLP_ENDPOINT");
    }
    // Standard OTEL var
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        hit("OTEL_EXPORTER_OTLP_ENDPOINT");
    }
    if let Some(v) = lookup("NOTEHUB_LOG_LEVEL") {
        config.telemetry.log_level = v;
        hit("NOTEHUB_LOG_LEVEL");
    }
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        hit("RUST_LOG");
    }

    // Storage
    if let Some(v) = lookup("NOTEHUB_STORAGE_BACKEND") {
        if let Some(backend) = StorageBackend::parse(&v) {
            config.storage.backend = backend;
            hit("NOTEHUB_STORAGE_BACKEND");
        }
    }

    // Auth
    if let Some(v) = lookup("NOTEHUB_DEV_MODE") {
        config.auth.dev_mode = env_flag(&v);
        hit("NOTEHUB_DEV_MODE");
    }
    if let Some(v) = lookup("NOTEHUB_DEV_USER_ID") {
        config.auth.dev_user_id = v;
        hit("NOTEHUB_DEV_USER_ID");
    }
    if let Some(v) = lookup("NOTEHUB_DEV_EMAIL") {
        config.auth.dev_email = v;
        hit("NOTEHUB_DEV_EMAIL");
    }
    if let Some(v) = lookup("NOTEHUB_DEV_NAME") {
        config.auth.dev_name = v;
        hit("NOTEHUB_DEV_NAME");
    }
    if let Some(v) = lookup("NOTEHUB_ALLOWED_EMAILS") {
        config.auth.allowed_emails = parse_email_list(&v);
        hit("NOTEHUB_ALLOWED_EMAILS");
    }
    if let Some(v) = lookup("NOTEHUB_API_BASE_URL") {
        config.auth.api_base_url = v.trim_end_matches('/').to_string();
        hit("NOTEHUB_API_BASE_URL");
    }
    if let Some(v) = lookup("NOTEHUB_ISSUER_URL") {
        config.auth.issuer_url = v;
        hit("NOTEHUB_ISSUER_URL");
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            Some(home) => home.join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|value| PathBuf::from(value).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}
