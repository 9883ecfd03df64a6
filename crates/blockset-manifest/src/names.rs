//! Record kind validation.
//!
//! A kind names a manifest partition directory, so it must be a single
//! portable path component:
//! - Must be non-empty and at most 64 bytes
//! - Only ASCII letters, digits, `-`, `_` and `.`
//! - Must not start with `.`

use crate::error::{ManifestError, Result};

const MAX_KIND_LEN: usize = 64;

/// Validate a record kind, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use blockset_manifest::validate_kind;
///
/// assert!(validate_kind("task").is_ok());
/// assert!(validate_kind("voice_note").is_ok());
/// assert!(validate_kind("../etc").is_err());
/// ```
pub fn validate_kind(kind: &str) -> Result<()> {
    let invalid = |reason: &str| ManifestError::InvalidKind {
        kind: kind.to_string(),
        reason: reason.to_string(),
    };

    if kind.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if kind.len() > MAX_KIND_LEN {
        return Err(invalid("longer than 64 bytes"));
    }
    if kind.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if let Some(ch) = kind
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(&format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for kind in ["task", "note", "profile", "voice-note", "v2.task", "A_1"] {
            assert!(validate_kind(kind).is_ok(), "{kind}");
        }
    }

    #[test]
    fn rejects_unsafe_names() {
        for kind in ["", ".hidden", "..", "a/b", "a\\b", "with space", "tâche"] {
            assert!(validate_kind(kind).is_err(), "{kind:?}");
        }
        assert!(validate_kind(&"k".repeat(65)).is_err());
    }
}
