//! Authentication settings consumed by the server's authenticator.

use serde::{Deserialize, Serialize};

/// A static bearer token and the identity it resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Accept every request as the dev identity. Never enable in production.
    /// Default: false
    #[serde(default)]
    pub dev_mode: bool,

    /// Default: dev-user-123
    #[serde(default = "AuthConfig::default_dev_user_id")]
    pub dev_user_id: String,

    /// Default: dev@example.com
    #[serde(default = "AuthConfig::default_dev_email")]
    pub dev_email: String,

    /// Default: Dev User
    #[serde(default = "AuthConfig::default_dev_name")]
    pub dev_name: String,

    /// Emails allowed to use the server (case-insensitive). Empty allows everyone.
    #[serde(default)]
    pub allowed_emails: Vec<String>,

    /// Public base URL of this server, used in the OAuth challenge and resource metadata.
    #[serde(default)]
    pub api_base_url: String,

    /// OAuth authorization server advertised in the protected-resource metadata.
    #[serde(default)]
    pub issuer_url: String,

    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

impl AuthConfig {
    fn default_dev_user_id() -> String {
        "dev-user-123".to_string()
    }

    fn default_dev_email() -> String {
        "dev@example.com".to_string()
    }

    fn default_dev_name() -> String {
        "Dev User".to_string()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            dev_user_id: Self::default_dev_user_id(),
            dev_email: Self::default_dev_email(),
            dev_name: Self::default_dev_name(),
            allowed_emails: Vec::new(),
            api_base_url: String::new(),
            issuer_url: String::new(),
            tokens: Vec::new(),
        }
    }
}

/// Split a comma-separated allow-list, normalizing case and dropping blanks.
pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_list() {
        let emails = parse_email_list(" Alice@Example.com, ,bob@example.com,");
        assert_eq!(emails, vec!["alice@example.com", "bob@example.com"]);
    }

    #[test]
    fn test_dev_identity_defaults() {
        let auth = AuthConfig::default();
        assert!(!auth.dev_mode);
        assert_eq!(auth.dev_user_id, "dev-user-123");
        assert_eq!(auth.dev_email, "dev@example.com");
        assert_eq!(auth.dev_name, "Dev User");
    }
}
