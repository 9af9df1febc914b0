//! Layered configuration loading for notehub.
//!
//! Everything here is infrastructure: values that are fixed once the process
//! starts (paths, bind address, telemetry, storage backend, auth settings).
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/notehub/config.toml` (system)
//! 2. `~/.config/notehub/config.toml` (user)
//! 3. `./notehub.toml` or the `--config` path (local override)
//! 4. Environment variables (`NOTEHUB_*`, plus `RUST_LOG` and `OTEL_EXPORTER_OTLP_ENDPOINT`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! state_dir = "~/.local/share/notehub"
//!
//! [bind]
//! host = "0.0.0.0"
//! http_port = 8090
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [storage]
//! backend = "sqlite"
//!
//! [auth]
//! allowed_emails = ["me@example.com"]
//! api_base_url = "https://notes.example.com"
//! issuer_url = "https://auth.example.com"
//!
//! [[auth.tokens]]
//! token = "change-me"
//! user_id = "me"
//! email = "me@example.com"
//! name = "Me"
//! ```

pub mod auth;
pub mod infra;
pub mod loader;

pub use auth::{AuthConfig, TokenEntry};
pub use infra::{BindConfig, PathsConfig, StorageBackend, StorageConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete notehub configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NoteConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl NoteConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an optional explicit file replacing `./notehub.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = NoteConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::apply_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Database file for the SQLite backend.
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .db_path
            .clone()
            .unwrap_or_else(|| self.paths.state_dir.join("notes.db"))
    }

    /// Serialize config to a TOML string. Token secrets are masked.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# notehub configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "state_dir = \"{}\"\n",
            self.paths.state_dir.display()
        ));

        output.push_str("\n[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.bind.host));
        output.push_str(&format!("http_port = {}\n", self.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.telemetry.otlp_endpoint
        ));
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output.push_str("\n[storage]\n");
        output.push_str(&format!("backend = \"{}\"\n", self.storage.backend.as_str()));
        output.push_str(&format!("db_path = \"{}\"\n", self.db_path().display()));
        output.push_str(&format!(
            "busy_timeout_ms = {}\n",
            self.storage.busy_timeout_ms
        ));

        output.push_str("\n[auth]\n");
        output.push_str(&format!("dev_mode = {}\n", self.auth.dev_mode));
        output.push_str(&format!("dev_user_id = \"{}\"\n", self.auth.dev_user_id));
        output.push_str(&format!("dev_email = \"{}\"\n", self.auth.dev_email));
        output.push_str(&format!("dev_name = \"{}\"\n", self.auth.dev_name));
        output.push_str("allowed_emails = [\n");
        for email in &self.auth.allowed_emails {
            output.push_str(&format!("    \"{}\",\n", email));
        }
        output.push_str("]\n");
        output.push_str(&format!("api_base_url = \"{}\"\n", self.auth.api_base_url));
        output.push_str(&format!("issuer_url = \"{}\"\n", self.auth.issuer_url));

        for entry in &self.auth.tokens {
            output.push_str("\n[[auth.tokens]]\n");
            output.push_str("token = \"********\"\n");
            output.push_str(&format!("user_id = \"{}\"\n", entry.user_id));
            output.push_str(&format!("email = \"{}\"\n", entry.email));
            output.push_str(&format!("name = \"{}\"\n", entry.name));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NoteConfig::default();
        assert_eq!(config.bind.http_port, 8090);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(!config.telemetry.otlp_enabled());
        assert!(config.db_path().ends_with("notes.db"));
    }

    #[test]
    fn test_to_toml_masks_tokens() {
        let mut config = NoteConfig::default();
        config.auth.tokens.push(TokenEntry {
            token: "super-secret".to_string(),
            user_id: "u1".to_string(),
            email: String::new(),
            name: String::new(),
        });

        let toml = config.to_toml();
        assert!(toml.contains("[paths]"));
        assert!(toml.contains("[storage]"));
        assert!(toml.contains("[[auth.tokens]]"));
        assert!(!toml.contains("super-secret"));
    }

    #[test]
    fn test_to_toml_reparses() {
        let config = NoteConfig::default();
        let parsed: toml::Table = config.to_toml().parse().unwrap();
        assert!(parsed.contains_key("bind"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notehub.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[storage]\ndb_path = \"/tmp/explicit.db\"").unwrap();

        let (config, sources) = NoteConfig::load_with_sources_from(Some(&path)).unwrap();
        assert!(sources.files.contains(&path));
        // env may still override; only assert when nobody set it
        if std::env::var("NOTEHUB_DB_PATH").is_err() {
            assert_eq!(config.db_path(), PathBuf::from("/tmp/explicit.db"));
        }
    }

    #[test]
    fn test_broken_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[bind\nhttp_port = ").unwrap();

        let err = NoteConfig::load_from(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
