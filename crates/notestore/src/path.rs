//! Canonical path handling.
//!
//! Every key the store sees has been through [`normalize`]: lowercase,
//! `/`-separated, no leading/trailing or doubled slashes, and each segment
//! drawn from `[a-z0-9_-]`.

use thiserror::Error;

/// Longest canonical path accepted, in characters.
pub const MAX_PATH_LENGTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is required")]
    Required,

    #[error("path too long (max 200)")]
    TooLong,

    #[error("invalid path: empty segment")]
    EmptySegment,

    #[error("invalid path: dot segments not allowed")]
    DotSegment,

    #[error("invalid path: allowed chars per segment are a-z, 0-9, _, -")]
    InvalidCharacters,
}

/// Canonicalize a user-supplied path.
///
/// ```
/// use notestore::path::normalize;
///
/// assert_eq!(normalize(" Personal\\\\Preferences/ ").unwrap(), "personal/preferences");
/// assert!(normalize("../x").is_err());
/// ```
pub fn normalize(raw: &str) -> Result<String, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::Required);
    }

    let mut collapsed = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }

    let stripped = collapsed.trim_matches('/').trim();
    if stripped.is_empty() {
        return Err(PathError::Required);
    }

    let lowered = stripped.to_lowercase();
    if lowered.chars().count() > MAX_PATH_LENGTH {
        return Err(PathError::TooLong);
    }

    for segment in lowered.split('/') {
        if segment.is_empty() {
            return Err(PathError::EmptySegment);
        }
        if segment == "." || segment == ".." {
            return Err(PathError::DotSegment);
        }
        if !segment.bytes().all(is_segment_byte) {
            return Err(PathError::InvalidCharacters);
        }
    }

    Ok(lowered)
}

fn is_segment_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-'
}

/// Immediate parent of a canonical path, `None` for root-level paths.
pub fn parent(path: &str) -> Option<&str> {
    path.rfind('/').map(|i| &path[..i])
}
