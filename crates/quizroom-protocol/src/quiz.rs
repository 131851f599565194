//! Quiz payloads: what clients see of questions, participants, and rooms.
//!
//! These shapes are the compatibility contract with browser clients. Two
//! rules hold for all of them:
//!
//! - A question shown to participants never carries its correct answer.
//!   [`ProblemView`] simply has no such field, so there is nothing to
//!   forget to strip.
//! - Leaderboards are always ordered by descending score, ties in join
//!   order. The room produces them; these types only carry the result.

use serde::{Deserialize, Serialize};

use crate::{AnswerIndex, ParticipantId, QuestionId, RoomId};

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// The index participants submit to pick this option.
    pub id: AnswerIndex,
    /// Label shown to participants.
    pub title: String,
}

/// A question as authored by the operator, before a room assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub title: String,
    pub description: String,
    /// Optional image reference (URL or asset key), passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub options: Vec<AnswerOption>,
    /// Index of the correct option.
    pub answer: AnswerIndex,
}

/// The active question as published to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemView {
    pub id: QuestionId,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub options: Vec<AnswerOption>,
    /// Unix time in milliseconds when the collection window opened.
    pub started_at_ms: u64,
    /// Length of the collection window in milliseconds.
    pub window_ms: u64,
}

/// A participant's row on the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub id: ParticipantId,
    pub name: String,
    pub score: u32,
    /// Bucketed progress indicator, 1 through the configured maximum.
    pub stage: u8,
}

/// Side-effect-free snapshot of a room, tagged by lifecycle state.
///
/// JSON shape: `{ "type": "question_active", "problem": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomView {
    NotStarted,
    QuestionActive { problem: ProblemView },
    LeaderboardShown { leaderboard: Vec<Standing> },
    Ended {
        leaderboard: Vec<Standing>,
        winner: Option<Standing>,
    },
}

/// Outbound event published on a room's channel, one per state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A question became active.
    Problem {
        room_id: RoomId,
        problem: ProblemView,
    },
    /// The collection window closed without a winner.
    Leaderboard {
        room_id: RoomId,
        leaderboard: Vec<Standing>,
        winner: Option<Standing>,
    },
    /// A participant reached the winning score. Terminal.
    Winner {
        room_id: RoomId,
        leaderboard: Vec<Standing>,
        winner: Standing,
    },
    /// The question list was exhausted. Terminal.
    Ended {
        room_id: RoomId,
        leaderboard: Vec<Standing>,
        winner: Option<Standing>,
    },
    /// The room was deleted or restarted; clients should return to the lobby.
    Reset { room_id: RoomId },
}

impl RoomEvent {
    /// The room this event belongs to.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Problem { room_id, .. }
            | Self::Leaderboard { room_id, .. }
            | Self::Winner { room_id, .. }
            | Self::Ended { room_id, .. }
            | Self::Reset { room_id } => room_id,
        }
    }
}
