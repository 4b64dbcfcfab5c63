//! Item name helpers

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ValidationError, DEFAULT_MAX_ITEM_NAME_LEN};

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Normalize a free-form name into slug form: trimmed, lowercased, with each
/// whitespace run replaced by a single `-`.
pub fn clean_item_name(name: &str) -> String {
    WHITESPACE_RE
        .replace_all(&name.trim().to_lowercase(), "-")
        .into_owned()
}

/// True when `name` is non-empty after trimming and no longer than
/// [`DEFAULT_MAX_ITEM_NAME_LEN`] characters.
pub fn is_valid_item_name(name: &str) -> bool {
    validate_item_name(name, DEFAULT_MAX_ITEM_NAME_LEN).is_ok()
}

/// Check a name against `max_len`. Emptiness and length are measured on the
/// trimmed name; the name is returned as given.
pub fn validate_item_name(name: &str, max_len: usize) -> Result<&str, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "item_name".to_string(),
        });
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(ValidationError::InvalidValue {
            field: "item_name".to_string(),
            reason: format!("{} characters exceeds limit of {}", len, max_len),
        });
    }
    Ok(name)
}
