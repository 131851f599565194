//! Quiz configuration and the room lifecycle state machine.

use std::time::Duration;

use quizroom_protocol::AnswerIndex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// QuizConfig
// ---------------------------------------------------------------------------

/// Whether participants may join after the first question went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LateJoin {
    /// Join in any state. Late joiners show up on the leaderboard with
    /// zero points for the questions they missed.
    #[default]
    Allow,
    /// Join only while the room is `not_started`.
    BeforeStart,
}

/// Gameplay constants for every room in a registry.
///
/// Option count is fixed per deployment, not per question, so the set of
/// acceptable answer indices lives here too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    /// Length of each question's collection window.
    pub question_window: Duration,

    /// Points awarded for a correct answer.
    pub points_per_correct: u32,

    /// Cumulative score at which a participant wins and the room ends.
    pub winning_score: u32,

    /// Score per stage bucket.
    pub points_per_stage: u32,

    /// Highest stage a participant can reach.
    pub max_stage: u8,

    /// Answer indices a submission may carry.
    pub allowed_answers: Vec<AnswerIndex>,

    /// Late-join policy.
    pub late_join: LateJoin,

    /// Capacity of each room's event channel. Slow subscribers that fall
    /// further behind than this miss events.
    pub event_buffer: usize,

    /// Capacity of each room's command channel.
    pub command_buffer: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            question_window: Duration::from_secs(15),
            points_per_correct: 10,
            winning_score: 80,
            points_per_stage: 10,
            max_stage: 9,
            allowed_answers: (0..=3).map(AnswerIndex).collect(),
            late_join: LateJoin::Allow,
            event_buffer: 64,
            command_buffer: 64,
        }
    }
}

impl QuizConfig {
    /// Fixes out-of-range values so the config is safe to run with.
    ///
    /// - zero window, increment, or stage width fall back to the defaults
    /// - `winning_score` is at least `points_per_correct`
    /// - `max_stage` is at least 1
    /// - an empty answer set falls back to `0..=3`
    /// - channel capacities are at least 1
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.question_window.is_zero() {
            tracing::warn!("question_window is zero, using default");
            self.question_window = defaults.question_window;
        }
        if self.points_per_correct == 0 {
            tracing::warn!("points_per_correct is zero, using default");
            self.points_per_correct = defaults.points_per_correct;
        }
        if self.winning_score < self.points_per_correct {
            tracing::warn!(
                winning_score = self.winning_score,
                "winning_score is below points_per_correct, clamping"
            );
            self.winning_score = self.points_per_correct;
        }
        if self.points_per_stage == 0 {
            tracing::warn!("points_per_stage is zero, using default");
            self.points_per_stage = defaults.points_per_stage;
        }
        if self.max_stage == 0 {
            tracing::warn!("max_stage is zero, clamping to 1");
            self.max_stage = 1;
        }
        if self.allowed_answers.is_empty() {
            tracing::warn!("allowed_answers is empty, using default");
            self.allowed_answers = defaults.allowed_answers;
        }
        self.allowed_answers.sort();
        self.allowed_answers.dedup();
        self.event_buffer = self.event_buffer.max(1);
        self.command_buffer = self.command_buffer.max(1);
        self
    }

    /// Stage for a score: `min(score / points_per_stage + 1, max_stage)`.
    pub fn stage_for(&self, score: u32) -> u8 {
        let bucket = score / self.points_per_stage.max(1) + 1;
        bucket.min(u32::from(self.max_stage)) as u8
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// What happened to a room. Input to [`RoomState::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Operator `start`.
    Start { has_questions: bool },
    /// The active question's collection window elapsed.
    WindowClosed,
    /// A submission brought a participant to the winning score.
    WinningScore,
    /// Operator `advance`.
    Advance { has_next: bool },
    /// Operator `restart`.
    Restart,
}

/// The lifecycle state of a room.
///
/// ```text
///                 start                 window closed
/// NotStarted ─────────────→ QuestionActive ─────────────→ LeaderboardShown
///                             │      ↑                        │      │
///              winning score  │      └──── advance (next) ────┘      │
///                             ↓                                      │
///                           Ended ←──────── advance (no next) ───────┘
/// ```
///
/// `Ended` is terminal except for `Restart`, which returns any state to
/// `NotStarted`. Every pair not in the table is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    NotStarted,
    QuestionActive,
    LeaderboardShown,
    Ended,
}

impl RoomState {
    /// The transition table. Returns the next state, or `None` if the
    /// trigger is not valid in this state.
    pub fn on(self, trigger: Trigger) -> Option<Self> {
        use RoomState::*;
        match (self, trigger) {
            (_, Trigger::Restart) => Some(NotStarted),
            (NotStarted, Trigger::Start { has_questions: true }) => Some(QuestionActive),
            (QuestionActive, Trigger::WindowClosed) => Some(LeaderboardShown),
            (QuestionActive, Trigger::WinningScore) => Some(Ended),
            (LeaderboardShown, Trigger::Advance { has_next: true }) => Some(QuestionActive),
            (LeaderboardShown, Trigger::Advance { has_next: false }) => Some(Ended),
            (NotStarted, _) | (QuestionActive, _) | (LeaderboardShown, _) | (Ended, _) => None,
        }
    }

    /// Returns `true` once the room can no longer progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::QuestionActive => write!(f, "question_active"),
            Self::LeaderboardShown => write!(f, "leaderboard_shown"),
            Self::Ended => write!(f, "ended"),
        }
    }
}
