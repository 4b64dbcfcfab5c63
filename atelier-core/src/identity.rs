//! Identity types for Atelier entities and SQL identifiers

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Identifier of the owning side of a relation (a post, a service).
pub type EntityId = i64;

/// Primary key of a named item (a tag, a category).
pub type ItemId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex"));

/// A validated table, column, alias or procedure name.
///
/// Construction is the only validation point: anything holding an
/// `Identifier` may be spliced into a query after quoting, so raw strings
/// never reach SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate and wrap an identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::InvalidIdentifier {
                identifier: raw,
                reason: "identifier must not be empty".to_string(),
            });
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(ValidationError::InvalidIdentifier {
                identifier: raw,
                reason: format!("identifier longer than {} bytes", MAX_IDENTIFIER_LEN),
            });
        }
        if !IDENTIFIER_RE.is_match(&raw) {
            return Err(ValidationError::InvalidIdentifier {
                identifier: raw,
                reason: "must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
            });
        }
        Ok(Self(raw))
    }

    /// The bare identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in double quotes for SQL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_accepts_snake_case() {
        let ident = Identifier::new("posts_tags_rel").unwrap();
        assert_eq!(ident.as_str(), "posts_tags_rel");
        assert_eq!(ident.quoted(), "\"posts_tags_rel\"");
        assert_eq!(ident.to_string(), "posts_tags_rel");
    }

    #[test]
    fn test_identifier_rejects_empty() {
        assert!(matches!(
            Identifier::new(""),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_identifier_rejects_injection() {
        for raw in ["tag_name; drop table x", "a\"b", "1abc", "tag-name", "tag name"] {
            assert!(Identifier::new(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_identifier_rejects_overlong() {
        let raw = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(Identifier::new(raw).is_err());
        assert!(Identifier::new("a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_identifier_serde_validates() {
        let ok: Identifier = serde_json::from_str("\"tag_id\"").unwrap();
        assert_eq!(ok.as_str(), "tag_id");

        let bad: Result<Identifier, _> = serde_json::from_str("\"tag id\"");
        assert!(bad.is_err());
    }
}
