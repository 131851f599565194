//! The quiz state machine for a single room.
//!
//! [`Quiz`] is synchronous and owns no timers. Every method that depends on
//! time takes `now` explicitly, and every state change it makes pushes a
//! [`RoomEvent`] onto an outbox that the room actor drains after each
//! command. The actor is what serializes commands and deadline expiry; this
//! type only has to be correct for one call at a time.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use quizroom_protocol::{
    AnswerIndex, NewQuestion, ParticipantId, ProblemView, QuestionId, RoomEvent, RoomId,
    RoomView, Standing,
};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{LateJoin, QuizConfig, RoomState, Trigger};
use crate::RoomError;

const PARTICIPANT_ID_LEN: usize = 7;
const PARTICIPANT_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Recorded. `score` is the participant's total after scoring.
    Accepted { correct: bool, score: u32 },
    /// Recorded, and it brought the participant to the winning score.
    Won { score: u32 },
    /// Dropped without touching room state.
    Rejected(Rejection),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Why a submission was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The answer index is outside the deployment's allowed set.
    InvalidAnswer,
    WinnerDeclared,
    UnknownParticipant,
    UnknownQuestion,
    /// The room is not collecting answers for this question.
    NotActive,
    AlreadyAnswered,
    /// The collection window had elapsed.
    WindowClosed,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::InvalidAnswer => "invalid answer index",
            Self::WinnerDeclared => "winner already declared",
            Self::UnknownParticipant => "unknown participant",
            Self::UnknownQuestion => "unknown question",
            Self::NotActive => "question not active",
            Self::AlreadyAnswered => "already answered",
            Self::WindowClosed => "window closed",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone)]
struct Question {
    id: QuestionId,
    body: NewQuestion,
    window_started: Option<Instant>,
    started_at_ms: u64,
    /// Accepted answers in the latest window, in arrival order.
    submissions: Vec<Submission>,
}

/// An accepted answer, as recorded on its question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub participant_id: ParticipantId,
    pub answer: AnswerIndex,
    /// When the room accepted it.
    pub at: Instant,
}

impl Question {
    fn view(&self, window: Duration) -> ProblemView {
        ProblemView {
            id: self.id,
            title: self.body.title.clone(),
            description: self.body.description.clone(),
            image: self.body.image.clone(),
            options: self.body.options.clone(),
            started_at_ms: self.started_at_ms,
            window_ms: window.as_millis() as u64,
        }
    }

    fn reset_window(&mut self) {
        self.window_started = None;
        self.started_at_ms = 0;
        self.submissions.clear();
    }
}

#[derive(Debug, Clone)]
struct Participant {
    id: ParticipantId,
    name: String,
    score: u32,
    stage: u8,
    has_answered: bool,
}

impl Participant {
    fn standing(&self) -> Standing {
        Standing {
            id: self.id.clone(),
            name: self.name.clone(),
            score: self.score,
            stage: self.stage,
        }
    }
}

/// One room's questions, roster, and lifecycle.
#[derive(Debug)]
pub struct Quiz {
    room_id: RoomId,
    config: QuizConfig,
    state: RoomState,
    questions: Vec<Question>,
    /// Index into `questions`. Meaningful once the room has started.
    active: usize,
    /// Join order is leaderboard tie-break order.
    participants: Vec<Participant>,
    /// Index into `participants`. Set at most once per game.
    winner: Option<usize>,
    next_question_id: u64,
    /// Bumped on every activation and restart. Tags deadlines so a stale
    /// one can be told apart from the current window's.
    round: u64,
    events: Vec<RoomEvent>,
}

impl Quiz {
    pub fn new(room_id: RoomId, config: QuizConfig) -> Self {
        Self {
            room_id,
            config: config.validated(),
            state: RoomState::NotStarted,
            questions: Vec::new(),
            active: 0,
            participants: Vec::new(),
            winner: None,
            next_question_id: 1,
            round: 0,
            events: Vec::new(),
        }
    }

    // -- Queries -----------------------------------------------------------

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// The current activation, for tagging the question deadline.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// `Some(round)` while a collection window is open.
    pub fn deadline_round(&self) -> Option<u64> {
        (self.state == RoomState::QuestionActive).then_some(self.round)
    }

    /// The question currently collecting answers.
    pub fn active_question(&self) -> Option<QuestionId> {
        if self.state != RoomState::QuestionActive {
            return None;
        }
        self.questions.get(self.active).map(|q| q.id)
    }

    pub fn winner(&self) -> Option<Standing> {
        self.winner
            .and_then(|idx| self.participants.get(idx))
            .map(Participant::standing)
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<Standing> {
        self.participants
            .iter()
            .find(|p| &p.id == id)
            .map(Participant::standing)
    }

    /// Number of submissions recorded for a question in its latest window.
    pub fn submission_count(&self, question_id: QuestionId) -> usize {
        self.submissions(question_id).len()
    }

    /// Submissions recorded for a question in its latest window, oldest
    /// first. Empty for an unknown question.
    pub fn submissions(&self, question_id: QuestionId) -> &[Submission] {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.submissions.as_slice())
            .unwrap_or_default()
    }

    /// Participants by descending score; ties keep join order.
    pub fn leaderboard(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> =
            self.participants.iter().map(Participant::standing).collect();
        // `sort_by` is stable, which is what keeps ties in join order.
        standings.sort_by(|a, b| b.score.cmp(&a.score));
        standings
    }

    /// Side-effect-free snapshot of the room.
    pub fn view(&self) -> RoomView {
        match self.state {
            RoomState::NotStarted => RoomView::NotStarted,
            RoomState::QuestionActive => match self.questions.get(self.active) {
                Some(question) => RoomView::QuestionActive {
                    problem: question.view(self.config.question_window),
                },
                None => RoomView::NotStarted,
            },
            RoomState::LeaderboardShown => RoomView::LeaderboardShown {
                leaderboard: self.leaderboard(),
            },
            RoomState::Ended => RoomView::Ended {
                leaderboard: self.leaderboard(),
                winner: self.winner(),
            },
        }
    }

    /// Drains the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Commands ----------------------------------------------------------

    /// Appends a question. Allowed in any state.
    pub fn add_question(&mut self, question: NewQuestion) -> QuestionId {
        let id = QuestionId(self.next_question_id);
        self.next_question_id += 1;
        self.questions.push(Question {
            id,
            body: question,
            window_started: None,
            started_at_ms: 0,
            submissions: Vec::new(),
        });
        debug!(room_id = %self.room_id, question_id = %id, "question added");
        id
    }

    /// Adds a participant with score 0 and stage 1.
    ///
    /// Only fails under [`LateJoin::BeforeStart`] once the room has started.
    pub fn add_participant(&mut self, name: impl Into<String>) -> Result<ParticipantId, RoomError> {
        if self.config.late_join == LateJoin::BeforeStart && self.state != RoomState::NotStarted {
            debug!(room_id = %self.room_id, state = %self.state, "late join refused");
            return Err(RoomError::JoinClosed(self.room_id.clone()));
        }

        let id = self.fresh_participant_id();
        self.participants.push(Participant {
            id: id.clone(),
            name: name.into(),
            score: 0,
            stage: 1,
            has_answered: false,
        });
        info!(
            room_id = %self.room_id,
            participant_id = %id,
            participants = self.participants.len(),
            "participant joined"
        );
        Ok(id)
    }

    /// Activates the first question. Returns `false` (and changes nothing)
    /// unless the room is `not_started` and has at least one question.
    pub fn start(&mut self, now: Instant) -> bool {
        let trigger = Trigger::Start {
            has_questions: !self.questions.is_empty(),
        };
        if self.state.on(trigger).is_none() {
            debug!(room_id = %self.room_id, state = %self.state, "start ignored");
            return false;
        }
        self.activate(0, now);
        true
    }

    /// Scores an answer to the active question.
    pub fn submit(
        &mut self,
        participant_id: &ParticipantId,
        question_id: QuestionId,
        answer: AnswerIndex,
        now: Instant,
    ) -> SubmitOutcome {
        let outcome = self.try_submit(participant_id, question_id, answer, now);
        if let SubmitOutcome::Rejected(reason) = outcome {
            debug!(
                room_id = %self.room_id,
                %participant_id,
                %question_id,
                %reason,
                "submission dropped"
            );
        }
        outcome
    }

    fn try_submit(
        &mut self,
        participant_id: &ParticipantId,
        question_id: QuestionId,
        answer: AnswerIndex,
        now: Instant,
    ) -> SubmitOutcome {
        use Rejection::*;

        if self.winner.is_some() {
            return SubmitOutcome::Rejected(WinnerDeclared);
        }
        let Some(p_idx) = self.participants.iter().position(|p| &p.id == participant_id) else {
            return SubmitOutcome::Rejected(UnknownParticipant);
        };
        let Some(q_idx) = self.questions.iter().position(|q| q.id == question_id) else {
            return SubmitOutcome::Rejected(UnknownQuestion);
        };
        if self.state != RoomState::QuestionActive || q_idx != self.active {
            return SubmitOutcome::Rejected(NotActive);
        }
        if self.participants[p_idx].has_answered {
            return SubmitOutcome::Rejected(AlreadyAnswered);
        }

        let question = &mut self.questions[q_idx];
        let Some(started) = question.window_started else {
            return SubmitOutcome::Rejected(NotActive);
        };
        if now.saturating_duration_since(started) > self.config.question_window {
            return SubmitOutcome::Rejected(WindowClosed);
        }

        let correct = question.body.answer == answer;
        question.submissions.push(Submission {
            participant_id: participant_id.clone(),
            answer,
            at: now,
        });

        let participant = &mut self.participants[p_idx];
        participant.has_answered = true;
        if correct {
            participant.score = participant.score.saturating_add(self.config.points_per_correct);
        }
        let score = participant.score;
        debug!(
            room_id = %self.room_id,
            %participant_id,
            %question_id,
            %answer,
            correct,
            score,
            "submission accepted"
        );

        if score >= self.config.winning_score {
            self.declare_winner(p_idx);
            return SubmitOutcome::Won { score };
        }
        SubmitOutcome::Accepted { correct, score }
    }

    /// Handles the end of a collection window.
    ///
    /// `round` is the value the deadline was armed with. A deadline from an
    /// earlier activation, or one that lost the race against a winner, is a
    /// no-op.
    pub fn close_window(&mut self, round: u64) -> bool {
        if self.winner.is_some() || round != self.round {
            debug!(room_id = %self.room_id, round, current = self.round, "stale deadline ignored");
            return false;
        }
        let Some(next) = self.state.on(Trigger::WindowClosed) else {
            debug!(room_id = %self.room_id, state = %self.state, "deadline ignored");
            return false;
        };

        self.state = next;
        for participant in &mut self.participants {
            participant.stage = self.config.stage_for(participant.score);
            participant.has_answered = false;
        }

        let leaderboard = self.leaderboard();
        info!(
            room_id = %self.room_id,
            question_id = ?self.active_question_id(),
            participants = leaderboard.len(),
            "leaderboard revealed"
        );
        self.events.push(RoomEvent::Leaderboard {
            room_id: self.room_id.clone(),
            leaderboard,
            winner: None,
        });
        true
    }

    /// Moves to the next question, or ends the room after the last one.
    /// Only valid while the leaderboard is shown.
    pub fn advance(&mut self, now: Instant) -> bool {
        if self.winner.is_some() {
            debug!(room_id = %self.room_id, "advance ignored, winner declared");
            return false;
        }
        let has_next = self.active + 1 < self.questions.len();
        match self.state.on(Trigger::Advance { has_next }) {
            Some(RoomState::QuestionActive) => {
                self.activate(self.active + 1, now);
                true
            }
            Some(next) => {
                self.state = next;
                info!(room_id = %self.room_id, "questions exhausted, room ended");
                self.events.push(RoomEvent::Ended {
                    room_id: self.room_id.clone(),
                    leaderboard: self.leaderboard(),
                    winner: None,
                });
                true
            }
            None => {
                debug!(room_id = %self.room_id, state = %self.state, "advance ignored");
                false
            }
        }
    }

    /// Returns the room to `not_started` with an empty roster. Questions
    /// and their ids are kept.
    pub fn restart(&mut self) {
        if let Some(next) = self.state.on(Trigger::Restart) {
            self.state = next;
        }
        self.participants.clear();
        self.active = 0;
        self.winner = None;
        self.round += 1;
        for question in &mut self.questions {
            question.reset_window();
        }
        info!(room_id = %self.room_id, questions = self.questions.len(), "room restarted");
        self.events.push(RoomEvent::Reset {
            room_id: self.room_id.clone(),
        });
    }

    // -- Internals ---------------------------------------------------------

    fn activate(&mut self, index: usize, now: Instant) {
        self.active = index;
        self.state = RoomState::QuestionActive;
        self.round += 1;
        for participant in &mut self.participants {
            participant.has_answered = false;
        }

        let question = &mut self.questions[index];
        question.reset_window();
        question.window_started = Some(now);
        question.started_at_ms = unix_millis();
        let problem = question.view(self.config.question_window);

        info!(
            room_id = %self.room_id,
            question_id = %problem.id,
            round = self.round,
            "question activated"
        );
        self.events.push(RoomEvent::Problem {
            room_id: self.room_id.clone(),
            problem,
        });
    }

    fn declare_winner(&mut self, idx: usize) {
        if let Some(next) = self.state.on(Trigger::WinningScore) {
            self.state = next;
        }
        self.winner = Some(idx);

        let winner = self.participants[idx].standing();
        info!(
            room_id = %self.room_id,
            participant_id = %winner.id,
            score = winner.score,
            "winner declared"
        );
        self.events.push(RoomEvent::Winner {
            room_id: self.room_id.clone(),
            leaderboard: self.leaderboard(),
            winner,
        });
    }

    fn active_question_id(&self) -> Option<QuestionId> {
        self.questions.get(self.active).map(|q| q.id)
    }

    fn fresh_participant_id(&self) -> ParticipantId {
        let mut rng = rand::rng();
        loop {
            let id: String = (0..PARTICIPANT_ID_LEN)
                .map(|_| {
                    let i = rng.random_range(0..PARTICIPANT_ID_ALPHABET.len());
                    PARTICIPANT_ID_ALPHABET[i] as char
                })
                .collect();
            if !self.participants.iter().any(|p| p.id.as_str() == id) {
                return ParticipantId(id);
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use quizroom_protocol::AnswerOption;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(15);

    fn question(answer: u8) -> NewQuestion {
        NewQuestion {
            title: format!("Question with answer {answer}"),
            description: "Pick one".into(),
            image: None,
            options: (0..4)
                .map(|id| AnswerOption {
                    id: AnswerIndex(id),
                    title: format!("option {id}"),
                })
                .collect(),
            answer: AnswerIndex(answer),
        }
    }

    fn quiz_with_questions(answers: &[u8]) -> Quiz {
        let mut quiz = Quiz::new(RoomId::from("room"), QuizConfig::default());
        for &answer in answers {
            quiz.add_question(question(answer));
        }
        quiz
    }

    /// Plays one question: every listed participant answers, then the window closes.
    fn play(quiz: &mut Quiz, now: Instant, answers: &[(&ParticipantId, u8)]) {
        let qid = quiz.active_question().expect("a question should be active");
        for (pid, answer) in answers {
            quiz.submit(pid, qid, AnswerIndex(*answer), now + Duration::from_secs(1));
        }
        quiz.close_window(quiz.round());
    }

    // =====================================================================
    // Setup
    // =====================================================================

    #[test]
    fn test_add_question_assigns_sequential_ids() {
        let mut quiz = quiz_with_questions(&[]);
        assert_eq!(quiz.add_question(question(0)), QuestionId(1));
        assert_eq!(quiz.add_question(question(1)), QuestionId(2));
        assert_eq!(quiz.question_count(), 2);
    }

    #[test]
    fn test_add_participant_generates_unique_ids() {
        let mut quiz = quiz_with_questions(&[0]);
        let mut ids = std::collections::HashSet::new();
        for i in 0..50 {
            let id = quiz.add_participant(format!("p{i}")).unwrap();
            assert_eq!(id.as_str().len(), PARTICIPANT_ID_LEN);
            assert!(id.as_str().bytes().all(|b| PARTICIPANT_ID_ALPHABET.contains(&b)));
            assert!(ids.insert(id));
        }
    }

    #[test]
    fn test_add_participant_starts_at_zero_stage_one() {
        let mut quiz = quiz_with_questions(&[0]);
        let id = quiz.add_participant("Ada").unwrap();
        let standing = quiz.participant(&id).unwrap();
        assert_eq!(standing.name, "Ada");
        assert_eq!(standing.score, 0);
        assert_eq!(standing.stage, 1);
    }

    #[test]
    fn test_add_participant_late_join_allowed_by_default() {
        let mut quiz = quiz_with_questions(&[0]);
        quiz.start(Instant::now());
        assert!(quiz.add_participant("late").is_ok());
    }

    #[test]
    fn test_add_participant_before_start_policy_rejects_late_join() {
        let config = QuizConfig {
            late_join: LateJoin::BeforeStart,
            ..QuizConfig::default()
        };
        let mut quiz = Quiz::new(RoomId::from("strict"), config);
        quiz.add_question(question(0));
        assert!(quiz.add_participant("early").is_ok());

        quiz.start(Instant::now());
        assert!(matches!(
            quiz.add_participant("late"),
            Err(RoomError::JoinClosed(_))
        ));
        assert_eq!(quiz.participant_count(), 1);
    }

    // =====================================================================
    // Start
    // =====================================================================

    #[test]
    fn test_start_without_questions_is_noop() {
        let mut quiz = quiz_with_questions(&[]);
        assert!(!quiz.start(Instant::now()));
        assert_eq!(quiz.state(), RoomState::NotStarted);
        assert!(quiz.take_events().is_empty());
    }

    #[test]
    fn test_start_publishes_first_problem_without_answer() {
        let mut quiz = quiz_with_questions(&[2, 1]);
        assert!(quiz.start(Instant::now()));
        assert_eq!(quiz.state(), RoomState::QuestionActive);
        assert_eq!(quiz.active_question(), Some(QuestionId(1)));

        let events = quiz.take_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RoomEvent::Problem { problem, .. } => {
                assert_eq!(problem.id, QuestionId(1));
                assert_eq!(problem.window_ms, 15_000);
                let json = serde_json::to_value(problem).unwrap();
                assert!(json.get("answer").is_none());
            }
            other => panic!("expected Problem, got {other:?}"),
        }
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut quiz = quiz_with_questions(&[0]);
        let now = Instant::now();
        quiz.start(now);
        let round = quiz.round();
        quiz.take_events();

        assert!(!quiz.start(now));
        assert_eq!(quiz.round(), round);
        assert!(quiz.take_events().is_empty());
    }

    // =====================================================================
    // Submit
    // =====================================================================

    #[test]
    fn test_submit_correct_answer_scores() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        let outcome = quiz.submit(&a, QuestionId(1), AnswerIndex(2), now);
        assert_eq!(outcome, SubmitOutcome::Accepted { correct: true, score: 10 });
    }

    #[test]
    fn test_submit_wrong_answer_is_recorded_without_points() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        let outcome = quiz.submit(&a, QuestionId(1), AnswerIndex(0), now);
        assert_eq!(outcome, SubmitOutcome::Accepted { correct: false, score: 0 });
        assert_eq!(quiz.submission_count(QuestionId(1)), 1);
    }

    #[test]
    fn test_submit_second_answer_in_window_rejected() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        quiz.submit(&a, QuestionId(1), AnswerIndex(0), now);
        let outcome = quiz.submit(&a, QuestionId(1), AnswerIndex(2), now);

        assert_eq!(outcome, SubmitOutcome::Rejected(Rejection::AlreadyAnswered));
        assert_eq!(quiz.participant(&a).unwrap().score, 0);
        assert_eq!(quiz.submission_count(QuestionId(1)), 1);
    }

    #[test]
    fn test_submit_wrong_answer_with_zero_winning_score_does_not_win() {
        let config = QuizConfig {
            winning_score: 0,
            ..QuizConfig::default()
        };
        let mut quiz = Quiz::new(RoomId::from("room"), config);
        quiz.add_question(question(2));
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        let outcome = quiz.submit(&a, QuestionId(1), AnswerIndex(0), now);
        assert_eq!(outcome, SubmitOutcome::Accepted { correct: false, score: 0 });
        assert_eq!(quiz.state(), RoomState::QuestionActive);
    }

    #[test]
    fn test_submissions_record_arrival_time_in_order() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let b = quiz.add_participant("B").unwrap();
        let now = Instant::now();
        quiz.start(now);

        quiz.submit(&b, QuestionId(1), AnswerIndex(1), now + Duration::from_secs(2));
        quiz.submit(&a, QuestionId(1), AnswerIndex(2), now + Duration::from_secs(3));

        let submissions = quiz.submissions(QuestionId(1));
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].participant_id, b);
        assert_eq!(submissions[0].answer, AnswerIndex(1));
        assert_eq!(submissions[0].at, now + Duration::from_secs(2));
        assert_eq!(submissions[1].participant_id, a);
        assert_eq!(submissions[1].at - now, Duration::from_secs(3));
        assert!(quiz.submissions(QuestionId(9)).is_empty());
    }

    #[test]
    fn test_submit_first_on_time_submission_per_participant_wins() {
        let mut quiz = quiz_with_questions(&[1]);
        let ids: Vec<_> = (0..5)
            .map(|i| quiz.add_participant(format!("p{i}")).unwrap())
            .collect();
        let now = Instant::now();
        quiz.start(now);

        for id in &ids {
            assert!(quiz.submit(id, QuestionId(1), AnswerIndex(1), now).is_accepted());
        }
        for id in &ids {
            assert_eq!(
                quiz.submit(id, QuestionId(1), AnswerIndex(1), now),
                SubmitOutcome::Rejected(Rejection::AlreadyAnswered)
            );
        }
        assert!(ids.iter().all(|id| quiz.participant(id).unwrap().score == 10));
    }

    #[test]
    fn test_submit_at_window_edge_accepted() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        let outcome = quiz.submit(&a, QuestionId(1), AnswerIndex(2), now + WINDOW);
        assert!(outcome.is_accepted(), "elapsed == window is still on time");
    }

    #[test]
    fn test_submit_after_window_rejected_even_if_correct() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        let late = now + WINDOW + Duration::from_millis(1);
        let outcome = quiz.submit(&a, QuestionId(1), AnswerIndex(2), late);

        assert_eq!(outcome, SubmitOutcome::Rejected(Rejection::WindowClosed));
        assert_eq!(quiz.participant(&a).unwrap().score, 0);
        assert_eq!(quiz.submission_count(QuestionId(1)), 0, "late submissions are not recorded");
    }

    #[test]
    fn test_submit_unknown_ids_rejected() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);

        assert_eq!(
            quiz.submit(&ParticipantId::from("nobody"), QuestionId(1), AnswerIndex(2), now),
            SubmitOutcome::Rejected(Rejection::UnknownParticipant)
        );
        assert_eq!(
            quiz.submit(&a, QuestionId(99), AnswerIndex(2), now),
            SubmitOutcome::Rejected(Rejection::UnknownQuestion)
        );
    }

    #[test]
    fn test_submit_for_inactive_question_rejected() {
        let mut quiz = quiz_with_questions(&[2, 3]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();

        assert_eq!(
            quiz.submit(&a, QuestionId(1), AnswerIndex(2), now),
            SubmitOutcome::Rejected(Rejection::NotActive),
            "room has not started"
        );

        quiz.start(now);
        assert_eq!(
            quiz.submit(&a, QuestionId(2), AnswerIndex(3), now),
            SubmitOutcome::Rejected(Rejection::NotActive),
            "question 2 is not the active one"
        );

        quiz.close_window(quiz.round());
        assert_eq!(
            quiz.submit(&a, QuestionId(1), AnswerIndex(2), now),
            SubmitOutcome::Rejected(Rejection::NotActive),
            "leaderboard is shown"
        );
    }

    // =====================================================================
    // Window close / leaderboard
    // =====================================================================

    #[test]
    fn test_close_window_reveals_leaderboard_and_stages() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);
        quiz.submit(&a, QuestionId(1), AnswerIndex(2), now);
        assert_eq!(quiz.participant(&a).unwrap().stage, 1, "stage waits for the reveal");
        quiz.take_events();

        assert!(quiz.close_window(quiz.round()));
        assert_eq!(quiz.state(), RoomState::LeaderboardShown);
        assert_eq!(quiz.participant(&a).unwrap().stage, 2);

        let events = quiz.take_events();
        match &events[..] {
            [RoomEvent::Leaderboard { leaderboard, winner, .. }] => {
                assert_eq!(leaderboard[0].id, a);
                assert_eq!(leaderboard[0].stage, 2);
                assert!(winner.is_none());
            }
            other => panic!("expected one Leaderboard event, got {other:?}"),
        }
    }

    #[test]
    fn test_close_window_stale_round_ignored() {
        let mut quiz = quiz_with_questions(&[0, 0]);
        let now = Instant::now();
        quiz.start(now);
        let first = quiz.round();
        quiz.close_window(first);
        quiz.advance(now);
        quiz.take_events();

        assert!(!quiz.close_window(first), "deadline of question 1 must not close question 2");
        assert_eq!(quiz.state(), RoomState::QuestionActive);
        assert!(quiz.take_events().is_empty());
    }

    #[test]
    fn test_close_window_clears_has_answered() {
        let mut quiz = quiz_with_questions(&[0, 0]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);
        quiz.submit(&a, QuestionId(1), AnswerIndex(0), now);
        quiz.close_window(quiz.round());
        quiz.advance(now);

        let outcome = quiz.submit(&a, QuestionId(2), AnswerIndex(0), now);
        assert_eq!(outcome, SubmitOutcome::Accepted { correct: true, score: 20 });
    }

    #[test]
    fn test_leaderboard_ties_keep_join_order() {
        let mut quiz = quiz_with_questions(&[1]);
        let a = quiz.add_participant("A").unwrap();
        let b = quiz.add_participant("B").unwrap();
        let c = quiz.add_participant("C").unwrap();
        let d = quiz.add_participant("D").unwrap();
        let now = Instant::now();
        quiz.start(now);
        quiz.submit(&c, QuestionId(1), AnswerIndex(1), now);
        quiz.submit(&b, QuestionId(1), AnswerIndex(1), now);

        let order: Vec<_> = quiz.leaderboard().into_iter().map(|s| s.id).collect();
        assert_eq!(order, vec![b, c, a, d]);
    }

    // =====================================================================
    // Advance / end
    // =====================================================================

    #[test]
    fn test_advance_only_from_leaderboard() {
        let mut quiz = quiz_with_questions(&[0, 0]);
        let now = Instant::now();
        assert!(!quiz.advance(now), "not started");

        quiz.start(now);
        assert!(!quiz.advance(now), "window still open");
        assert_eq!(quiz.active_question(), Some(QuestionId(1)));

        quiz.close_window(quiz.round());
        assert!(quiz.advance(now));
        assert_eq!(quiz.active_question(), Some(QuestionId(2)));
    }

    #[test]
    fn test_advance_past_last_question_ends_without_winner() {
        let mut quiz = quiz_with_questions(&[0]);
        let now = Instant::now();
        quiz.start(now);
        quiz.close_window(quiz.round());
        quiz.take_events();

        assert!(quiz.advance(now));
        assert_eq!(quiz.state(), RoomState::Ended);
        assert!(matches!(
            &quiz.take_events()[..],
            [RoomEvent::Ended { winner: None, .. }]
        ));

        assert!(!quiz.advance(now), "ended is terminal");
        assert!(!quiz.start(now), "ended is terminal");
    }

    /// One question, A correct, B silent, then advance to the end.
    #[test]
    fn test_single_question_room_ends_with_null_winner() {
        let mut quiz = quiz_with_questions(&[2]);
        let a = quiz.add_participant("A").unwrap();
        let b = quiz.add_participant("B").unwrap();
        let now = Instant::now();
        quiz.start(now);

        quiz.submit(&a, QuestionId(1), AnswerIndex(2), now + Duration::from_secs(3));
        quiz.close_window(quiz.round());

        let board = quiz.leaderboard();
        assert_eq!(board[0].id, a);
        assert_eq!(board[0].score, 10);
        assert_eq!(board[1].id, b);
        assert_eq!(board[1].score, 0);

        quiz.advance(now + WINDOW);
        match quiz.view() {
            RoomView::Ended { leaderboard, winner } => {
                assert_eq!(leaderboard.len(), 2);
                assert!(winner.is_none(), "10 points is below the threshold");
            }
            other => panic!("expected Ended, got {other:?}"),
        }
    }

    // =====================================================================
    // Winner
    // =====================================================================

    /// A reaches 80 mid-window: ended immediately, B's answer moments later
    /// is dropped, and nothing after that moves the room.
    #[test]
    fn test_winner_ends_room_mid_window() {
        let mut quiz = quiz_with_questions(&[1; 8]);
        let a = quiz.add_participant("A").unwrap();
        let b = quiz.add_participant("B").unwrap();
        let now = Instant::now();
        quiz.start(now);

        for _ in 0..7 {
            play(&mut quiz, now, &[(&a, 1)]);
            quiz.advance(now);
        }
        assert_eq!(quiz.participant(&a).unwrap().score, 70);
        quiz.take_events();

        let qid = quiz.active_question().unwrap();
        let outcome = quiz.submit(&a, qid, AnswerIndex(1), now + Duration::from_secs(2));
        assert_eq!(outcome, SubmitOutcome::Won { score: 80 });
        assert_eq!(quiz.state(), RoomState::Ended);

        let events = quiz.take_events();
        match &events[..] {
            [RoomEvent::Winner { winner, leaderboard, .. }] => {
                assert_eq!(winner.id, a);
                assert_eq!(leaderboard[0].id, a);
            }
            other => panic!("expected exactly one Winner event, got {other:?}"),
        }

        let late = quiz.submit(&b, qid, AnswerIndex(1), now + Duration::from_secs(3));
        assert_eq!(late, SubmitOutcome::Rejected(Rejection::WinnerDeclared));
        assert!(!quiz.close_window(quiz.round()), "deadline after winner is a no-op");
        assert!(!quiz.advance(now));
        assert!(quiz.take_events().is_empty());
        assert_eq!(quiz.winner().unwrap().id, a);
    }

    #[test]
    fn test_winner_bypasses_leaderboard_state() {
        let config = QuizConfig {
            winning_score: 10,
            ..QuizConfig::default()
        };
        let mut quiz = Quiz::new(RoomId::from("fast"), config);
        quiz.add_question(question(0));
        quiz.add_question(question(0));
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);
        quiz.take_events();

        quiz.submit(&a, QuestionId(1), AnswerIndex(0), now);

        assert_eq!(quiz.state(), RoomState::Ended);
        assert_eq!(quiz.deadline_round(), None);
        assert!(
            !quiz
                .take_events()
                .iter()
                .any(|e| matches!(e, RoomEvent::Leaderboard { .. }))
        );
    }

    // =====================================================================
    // Restart / view
    // =====================================================================

    #[test]
    fn test_restart_clears_roster_keeps_questions() {
        let mut quiz = quiz_with_questions(&[0, 1]);
        let a = quiz.add_participant("A").unwrap();
        let now = Instant::now();
        quiz.start(now);
        quiz.submit(&a, QuestionId(1), AnswerIndex(0), now);
        let round = quiz.round();
        quiz.take_events();

        quiz.restart();

        assert_eq!(quiz.state(), RoomState::NotStarted);
        assert_eq!(quiz.participant_count(), 0);
        assert_eq!(quiz.question_count(), 2);
        assert_eq!(quiz.submission_count(QuestionId(1)), 0);
        assert!(matches!(&quiz.take_events()[..], [RoomEvent::Reset { .. }]));
        assert!(!quiz.close_window(round), "pre-restart deadline is stale");
        assert_eq!(quiz.add_question(question(2)), QuestionId(3), "ids keep counting");

        assert!(quiz.start(now));
        assert_eq!(quiz.active_question(), Some(QuestionId(1)));
    }

    #[test]
    fn test_view_tracks_state() {
        let mut quiz = quiz_with_questions(&[3]);
        assert_eq!(quiz.view(), RoomView::NotStarted);

        let now = Instant::now();
        quiz.start(now);
        match quiz.view() {
            RoomView::QuestionActive { problem } => assert_eq!(problem.id, QuestionId(1)),
            other => panic!("expected QuestionActive, got {other:?}"),
        }

        quiz.close_window(quiz.round());
        assert!(matches!(quiz.view(), RoomView::LeaderboardShown { .. }));
    }

    #[test]
    fn test_deadline_round_only_while_active() {
        let mut quiz = quiz_with_questions(&[0]);
        assert_eq!(quiz.deadline_round(), None);
        quiz.start(Instant::now());
        assert_eq!(quiz.deadline_round(), Some(quiz.round()));
        quiz.close_window(quiz.round());
        assert_eq!(quiz.deadline_round(), None);
    }
}
