//! Session tokens
//!
//! A session token is the only identity the survey knows about. It is
//! opaque and unauthenticated, but it names export files, so the accepted
//! alphabet is restricted.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest accepted token
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Validated opaque session token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse a client-supplied token
    ///
    /// Accepts 1..=128 characters from `[A-Za-z0-9_-]` (UUIDs included).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return Err(Error::InvalidInput(format!(
                "session id must be 1..={} characters, got {}",
                MAX_SESSION_ID_LEN,
                raw.len()
            )));
        }

        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::InvalidInput(format!(
                "session id contains invalid character {:?}",
                bad
            )));
        }

        Ok(Self(raw.to_string()))
    }

    /// Issue a fresh random token (UUIDv4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        SessionId::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_parse() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn test_rejects_path_characters() {
        assert!(SessionId::parse("../etc/passwd").is_err());
        assert!(SessionId::parse("a/b").is_err());
        assert!(SessionId::parse("a b").is_err());
    }

    #[test]
    fn test_rejects_empty_and_overlong() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
        assert!(SessionId::parse(&"x".repeat(MAX_SESSION_ID_LEN)).is_ok());
    }

    #[test]
    fn test_try_from_validates() {
        let ok = SessionId::try_from("abc_123-XYZ".to_string()).unwrap();
        assert_eq!(ok.as_str(), "abc_123-XYZ");
        assert!(SessionId::try_from("no way".to_string()).is_err());
    }
}
