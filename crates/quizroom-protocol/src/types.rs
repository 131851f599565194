//! Identifier newtypes.
//!
//! Every id is a newtype with `#[serde(transparent)]`, so on the wire it is
//! just the inner string or number while in Rust a `RoomId` can never be
//! passed where a `ParticipantId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a room. Chosen by the operator, stable for the room's
/// lifetime, unique within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a participant, generated by the room at join time.
///
/// Unique within its room only. It doubles as the credential a client
/// presents on `Submit`, so the room generates it from a random source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a question, assigned by the owning room when the
/// question is appended. Numbering restarts at 1 in every room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct QuestionId(pub u64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q-{}", self.0)
    }
}

/// Index of an answer option.
///
/// A value of this type on its own is not proof of validity; the
/// submission validator decides which indices a deployment accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AnswerIndex(pub u8);

impl fmt::Display for AnswerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomId::from("finals")).unwrap();
        assert_eq!(json, "\"finals\"");
    }

    #[test]
    fn test_room_id_display_is_raw_id() {
        assert_eq!(RoomId::new("abc").to_string(), "abc");
    }

    #[test]
    fn test_question_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&QuestionId(4)).unwrap();
        assert_eq!(json, "4");
        assert_eq!(QuestionId(4).to_string(), "Q-4");
    }

    #[test]
    fn test_answer_index_deserializes_from_number() {
        let idx: AnswerIndex = serde_json::from_str("3").unwrap();
        assert_eq!(idx, AnswerIndex(3));
    }

    #[test]
    fn test_answer_index_rejects_negative() {
        let result: Result<AnswerIndex, _> = serde_json::from_str("-1");
        assert!(result.is_err());
    }
}
