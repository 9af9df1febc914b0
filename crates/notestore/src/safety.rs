//! Content safety checks run before anything is written.
//!
//! Two independent checks: a secret-pattern scan and length/tag bounds.
//! Neither consults the store.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Maximum content length in UTF-16 code units.
pub const MAX_CONTENT_LENGTH: usize = 4096;

/// Maximum number of tags on a single entry.
pub const MAX_TAGS: usize = 20;

static SECRET_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("aws_access_key_id", r"AKIA[0-9A-Z]{16}"),
        ("aws_secret_access_key", r"(?i)aws_secret_access_key\s*=\s*[\w+/=]{40}"),
        ("private_key", r"-----BEGIN (?:RSA |EC |OPENSSH )?PRIVATE KEY-----"),
        ("openai_key", r"sk-[a-zA-Z0-9]{20,}"),
        ("github_token", r"ghp_[a-zA-Z0-9]{36}"),
        ("slack_bot_token", r"(?i)xoxb-[a-zA-Z0-9-]+"),
        ("password_assignment", r#"(?i)password\s*[:=]\s*["']?[^\s"']+["']?"#),
        ("api_key_assignment", r#"(?i)api[_-]?key\s*[:=]\s*["']?[^\s"']+["']?"#),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid secret pattern")))
    .collect()
});

/// Which argument a safety failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Content,
    ParentRollup,
}

impl Field {
    fn subject(self) -> &'static str {
        match self {
            Field::Content => "Content",
            Field::ParentRollup => "parentRollup",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Field::Content => "",
            Field::ParentRollup => "parentRollup: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    #[error("content required")]
    Empty,

    #[error("content exceeds max length 4096 (got {len})")]
    TooLong { len: usize },

    #[error("too many tags (max 20, got {count})")]
    TooManyTags { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyError {
    /// Matched a secret pattern. `kind` names the pattern, never the matched text.
    #[error("{} appears to contain secrets or credentials; rejected for safety.", .field.subject())]
    SecretLike { field: Field, kind: &'static str },

    #[error("{}{source}", .field.prefix())]
    Bounds { field: Field, source: BoundsError },
}

/// Name of the first secret pattern `content` matches.
pub fn matched_pattern(content: &str) -> Option<&'static str> {
    SECRET_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(content))
        .map(|(kind, _)| *kind)
}

pub fn contains_secret_like(content: &str) -> bool {
    matched_pattern(content).is_some()
}

/// Length and tag-count bounds. Both limits are inclusive.
pub fn validate_bounds(content: &str, tags: Option<&[String]>) -> Result<(), BoundsError> {
    if content.is_empty() {
        return Err(BoundsError::Empty);
    }

    let len = content.encode_utf16().count();
    if len > MAX_CONTENT_LENGTH {
        return Err(BoundsError::TooLong { len });
    }

    if let Some(tags) = tags {
        if tags.len() > MAX_TAGS {
            return Err(BoundsError::TooManyTags { count: tags.len() });
        }
    }

    Ok(())
}

/// Full write-path check for one text field: secrets first, then bounds.
pub fn check(field: Field, text: &str) -> Result<(), SafetyError> {
    if let Some(kind) = matched_pattern(text) {
        tracing::warn!(field = field.subject(), kind, "rejected secret-like content");
        return Err(SafetyError::SecretLike { field, kind });
    }

    validate_bounds(text, None).map_err(|source| SafetyError::Bounds { field, source })
}
