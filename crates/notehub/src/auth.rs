//! Bearer authentication and the email allow-list.
//!
//! The [`Authenticator`] is built once at startup from config and shared
//! through [`Gatekeeper`], which the HTTP layer runs before any tool call.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use noteconf::AuthConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Who is calling. `user_id` partitions every node the caller can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl UserIdentity {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(_) => "UNAUTHENTICATED",
            AuthError::Forbidden(_) => "FORBIDDEN",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// RFC 6750 `error=` value for the challenge.
    fn challenge_error(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(_) => "invalid_token",
            AuthError::Forbidden(_) => "insufficient_scope",
        }
    }
}

/// Resolves a bearer credential to an identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: Option<&str>) -> Result<UserIdentity, AuthError>;

    fn name(&self) -> &'static str;
}

/// Accepts anything as the configured dev identity.
#[derive(Debug, Clone)]
pub struct DevAuthenticator {
    identity: UserIdentity,
}

impl DevAuthenticator {
    pub fn new(identity: UserIdentity) -> Self {
        Self { identity }
    }
}

#[async_trait]
impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, _credential: Option<&str>) -> Result<UserIdentity, AuthError> {
        Ok(self.identity.clone())
    }

    fn name(&self) -> &'static str {
        "dev"
    }
}

/// Fixed table of bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserIdentity>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: UserIdentity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, credential: Option<&str>) -> Result<UserIdentity, AuthError> {
        let token = credential
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Unauthenticated("No token provided".to_string()))?;

        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Unauthenticated("Invalid or expired token".to_string()))
    }

    fn name(&self) -> &'static str {
        "static-token"
    }
}

/// Build the authenticator described by config.
pub fn authenticator_from_config(config: &AuthConfig) -> Arc<dyn Authenticator> {
    if config.dev_mode {
        warn!(user_id = %config.dev_user_id, "dev mode: every request authenticates as the dev user");
        return Arc::new(DevAuthenticator::new(UserIdentity::new(
            &config.dev_user_id,
            &config.dev_email,
            &config.dev_name,
        )));
    }

    let authenticator = config.tokens.iter().fold(StaticTokenAuthenticator::new(), |auth, entry| {
        auth.with_token(
            &entry.token,
            UserIdentity::new(&entry.user_id, &entry.email, &entry.name),
        )
    });

    if authenticator.is_empty() {
        warn!("no auth tokens configured; every authenticated request will be rejected");
    }
    Arc::new(authenticator)
}

/// Case-insensitive email allow-list. Empty allows everyone.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed_emails: Vec<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn check(&self, identity: &UserIdentity) -> Result<(), AuthError> {
        if self.allowed_emails.is_empty() {
            return Ok(());
        }
        let email = identity.email.to_lowercase();
        if self.allowed_emails.iter().any(|allowed| *allowed == email) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(
                "Access denied: email not in allowed list".to_string(),
            ))
        }
    }
}

/// `Bearer <token>` yields the token; any other non-empty value is taken as-is.
pub fn extract_bearer(header_value: Option<&str>) -> Option<&str> {
    let value = header_value?.trim();
    if value.is_empty() {
        return None;
    }
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Some(token.trim()).filter(|t| !t.is_empty())
        }
        _ => Some(value),
    }
}

/// `WWW-Authenticate` value pointing clients at the protected-resource metadata.
pub fn challenge(api_base_url: &str, err: &AuthError) -> String {
    format!(
        "Bearer realm=\"mcp\", error=\"{}\", resource_metadata=\"{}/.well-known/oauth-protected-resource\", scope=\"openid email profile\"",
        err.challenge_error(),
        api_base_url.trim_end_matches('/')
    )
}

/// Authenticator + allow-list + challenge settings, shared by every request.
pub struct Gatekeeper {
    authenticator: Arc<dyn Authenticator>,
    policy: AccessPolicy,
    api_base_url: String,
}

impl Gatekeeper {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        policy: AccessPolicy,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            authenticator,
            policy,
            api_base_url: api_base_url.into(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            authenticator_from_config(config),
            AccessPolicy::new(&config.allowed_emails),
            config.api_base_url.clone(),
        )
    }

    /// Authenticate the request headers and apply the allow-list.
    pub async fn admit(&self, headers: &HeaderMap) -> Result<UserIdentity, AuthError> {
        let header_value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let identity = self
            .authenticator
            .authenticate(extract_bearer(header_value))
            .await?;
        self.policy.check(&identity)?;
        Ok(identity)
    }

    /// 401/403 with challenge header and error envelope.
    pub fn reject(&self, err: &AuthError) -> Response {
        let body = serde_json::json!({
            "error": { "code": err.code(), "message": err.to_string() }
        });
        let mut response = (err.status(), Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge(&self.api_base_url, err)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Middleware: admit the caller and stash their [`UserIdentity`] in request extensions.
pub async fn require_identity(
    State(gate): State<Arc<Gatekeeper>>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.admit(request.headers()).await {
        Ok(identity) => {
            debug!(user_id = %identity.user_id, "request admitted");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => {
            warn!(code = err.code(), path = %request.uri().path(), "request rejected: {}", err);
            gate.reject(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserIdentity {
        UserIdentity::new("alice", "Alice@Example.com", "Alice")
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("Bearer ")), Some("Bearer"));
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[tokio::test]
    async fn test_static_tokens() {
        let auth = StaticTokenAuthenticator::new().with_token("t1", alice());

        assert_eq!(auth.authenticate(Some("t1")).await.unwrap(), alice());
        assert!(matches!(
            auth.authenticate(Some("nope")).await,
            Err(AuthError::Unauthenticated(_))
        ));
        assert!(matches!(
            auth.authenticate(None).await,
            Err(AuthError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_dev_authenticator_ignores_credential() {
        let auth = authenticator_from_config(&AuthConfig {
            dev_mode: true,
            ..AuthConfig::default()
        });
        let identity = auth.authenticate(None).await.unwrap();
        assert_eq!(identity.user_id, "dev-user-123");
        assert_eq!(identity.email, "dev@example.com");
        assert_eq!(auth.name(), "dev");
    }

    #[test]
    fn test_access_policy() {
        assert!(AccessPolicy::allow_all().check(&alice()).is_ok());
        assert!(AccessPolicy::new(["alice@example.com"]).check(&alice()).is_ok());

        let err = AccessPolicy::new(["bob@example.com"]).check(&alice()).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_challenge_header() {
        let err = AuthError::Unauthenticated("x".into());
        assert_eq!(
            challenge("https://notes.example.com/", &err),
            "Bearer realm=\"mcp\", error=\"invalid_token\", resource_metadata=\"https://notes.example.com/.well-known/oauth-protected-resource\", scope=\"openid email profile\""
        );
        let err = AuthError::Forbidden("x".into());
        assert!(challenge("", &err).contains("error=\"insufficient_scope\""));
    }

    #[tokio::test]
    async fn test_gatekeeper_admit() {
        let gate = Gatekeeper::new(
            Arc::new(StaticTokenAuthenticator::new().with_token("t1", alice())),
            AccessPolicy::new(["alice@example.com"]),
            "https://notes.example.com",
        );

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t1"));
        assert_eq!(gate.admit(&headers).await.unwrap().user_id, "alice");

        let response = gate.reject(&AuthError::Unauthenticated("No token provided".into()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }
}
