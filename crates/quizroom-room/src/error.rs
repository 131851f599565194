//! Error types for the room layer.

use quizroom_protocol::{AnswerIndex, RoomId};

/// Errors that can occur during room operations.
///
/// Rejected submissions are not errors; they come back as
/// [`SubmitOutcome::Rejected`](crate::SubmitOutcome::Rejected).
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room's command channel is closed. The room was deleted while
    /// the command was in flight.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The late-join policy forbids joining in the room's current state.
    #[error("room {0} is no longer accepting participants")]
    JoinClosed(RoomId),

    /// An authored question failed validation.
    #[error("invalid question: {0}")]
    InvalidQuestion(#[from] ValidationError),
}

/// A value supplied by a client was outside what the deployment accepts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The submitted answer is not one of the allowed indices.
    #[error("answer {0} is not an allowed option")]
    AnswerOutOfRange(i64),

    #[error("question title is empty")]
    EmptyTitle,

    /// A question needs at least two options to be answerable.
    #[error("question has {0} options, need at least 2")]
    TooFewOptions(usize),

    #[error("option {0} appears more than once")]
    DuplicateOption(AnswerIndex),

    #[error("option {0} is outside the allowed answer set")]
    OptionOutOfRange(AnswerIndex),

    /// The correct answer does not name one of the question's options.
    #[error("answer {0} is not one of the question's options")]
    AnswerNotAnOption(AnswerIndex),
}

/// Errors from the persistence mirror. Logged, never surfaced to clients.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store record is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    /// An append targeted a room the store has no record of.
    #[error("no stored record for room {0}")]
    MissingRecord(RoomId),
}
