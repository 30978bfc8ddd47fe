use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a tracked entity (an ICAO 24-bit address for aircraft).
///
/// Stored trimmed and lowercased so `"ABC123"` and `" abc123 "` compare equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(EntityId(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::EntityId;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let a = EntityId::parse(" ABC123 ").expect("id");
        let b = EntityId::parse("abc123").expect("id");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "abc123");
    }

    #[test]
    fn parse_rejects_blank() {
        assert!(EntityId::parse("").is_none());
        assert!(EntityId::parse("   ").is_none());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = EntityId::parse("4ca7b5").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"4ca7b5\"");
    }
}
