//! Room identity: the namespace that scopes one word pool and one call log.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::entry::now_millis;

/// Maximum length of a human-chosen room code.
pub const MAX_ROOM_CODE_LEN: usize = 24;

/// Server-side identifier of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("Room code is empty")]
    Empty,
    #[error("Room code is {0} characters long (maximum is 24)")]
    TooLong(usize),
    #[error("Room code contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Human-chosen room code: ASCII alphanumerics, `-` and `_`, at most 24 chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl RoomCode {
    /// Strict parse. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RoomCodeError::Empty);
        }
        if let Some(bad) = trimmed.chars().find(|c| !is_code_char(*c)) {
            return Err(RoomCodeError::InvalidChar(bad));
        }
        let len = trimmed.chars().count();
        if len > MAX_ROOM_CODE_LEN {
            return Err(RoomCodeError::TooLong(len));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Lenient form used for free-text input: drops disallowed characters and
    /// truncates to the maximum length. `None` when nothing usable remains.
    pub fn sanitize(input: &str) -> Option<Self> {
        let cleaned: String = input
            .chars()
            .filter(|c| is_code_char(*c))
            .take(MAX_ROOM_CODE_LEN)
            .collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// A resolved room record. Created lazily on first access to a code and
/// never deleted by the sync core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: RoomCode,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
}

impl Room {
    pub fn new(code: RoomCode) -> Self {
        Self {
            id: RoomId::new(),
            code,
            created_at: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_valid_codes() {
        assert_eq!(RoomCode::parse("game-night_2").unwrap().as_str(), "game-night_2");
        assert_eq!(RoomCode::parse("  abc  ").unwrap().as_str(), "abc");
        assert!(RoomCode::parse(&"a".repeat(24)).is_ok());
    }

    #[test]
    fn test_parse_rejects_invalid_codes() {
        assert_eq!(RoomCode::parse("   "), Err(RoomCodeError::Empty));
        assert_eq!(RoomCode::parse(&"a".repeat(25)), Err(RoomCodeError::TooLong(25)));
        assert_eq!(RoomCode::parse("room one"), Err(RoomCodeError::InvalidChar(' ')));
        assert_eq!(RoomCode::parse("café"), Err(RoomCodeError::InvalidChar('é')));
    }

    #[test]
    fn test_sanitize_filters_and_truncates() {
        let code = RoomCode::sanitize("my room!! #42").unwrap();
        assert_eq!(code.as_str(), "myroom42");

        let long = RoomCode::sanitize(&"x".repeat(40)).unwrap();
        assert_eq!(long.as_str().len(), MAX_ROOM_CODE_LEN);

        assert!(RoomCode::sanitize("!!! ???").is_none());
    }

    #[test]
    fn test_room_code_serde_validates() {
        let code = RoomCode::parse("abc").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"abc\"");
        assert!(serde_json::from_str::<RoomCode>("\"bad code\"").is_err());
    }

    #[test]
    fn test_room_new_assigns_fresh_id() {
        let code = RoomCode::parse("abc").unwrap();
        let a = Room::new(code.clone());
        let b = Room::new(code);
        assert_ne!(a.id, b.id);
        assert!(a.created_at > 0);
    }
}
