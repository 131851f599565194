//! Room actor: an isolated Tokio task that owns one [`Quiz`].
//!
//! Each room runs in its own task and talks to the outside world through
//! an mpsc command channel. The task also owns the room's
//! [`QuestionDeadline`], so commands and the deadline firing are handled
//! one at a time by the same loop. Whichever reaches the loop first wins;
//! the other sees the already-changed state and does nothing.
//!
//! Outbound [`RoomEvent`]s go to a `broadcast` channel. Anyone holding a
//! [`RoomHandle`] can subscribe.
//!
//! Setup changes are queued on the [`StoreMirror`] from inside the actor,
//! so the store sees them in the order the room applied them.

use quizroom_protocol::{
    AnswerIndex, NewQuestion, ParticipantId, QuestionId, RoomEvent, RoomId, RoomView,
};
use quizroom_timer::QuestionDeadline;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::store::{MirrorOp, ParticipantRecord};
use crate::{Quiz, QuizConfig, RoomError, RoomState, StoreMirror, SubmitOutcome};

/// Commands sent to a room actor through its channel.
///
/// Every variant carries a reply channel so callers observe the result of
/// their own command, in order.
pub(crate) enum RoomCommand {
    AddQuestion {
        question: NewQuestion,
        reply: oneshot::Sender<QuestionId>,
    },
    Join {
        name: String,
        reply: oneshot::Sender<Result<(ParticipantId, RoomView), RoomError>>,
    },
    Submit {
        participant_id: ParticipantId,
        question_id: QuestionId,
        answer: AnswerIndex,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    Start {
        reply: oneshot::Sender<RoomState>,
    },
    Advance {
        reply: oneshot::Sender<RoomState>,
    },
    Restart {
        reply: oneshot::Sender<()>,
    },
    GetState {
        reply: oneshot::Sender<RoomView>,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    /// Publish `Reset` and stop.
    Shutdown,
    /// Drop the room's stored record, then behave like `Shutdown`.
    Delete {
        reply: oneshot::Sender<()>,
    },
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub state: RoomState,
    pub question_count: usize,
    pub participant_count: usize,
    /// The question whose window is open, if any.
    pub active_question: Option<QuestionId>,
}

/// Handle to a running room actor.
///
/// Cheap to clone. The registry holds one per room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<RoomEvent>,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AddQuestion { .. } => "AddQuestion",
            Self::Join { .. } => "Join",
            Self::Submit { .. } => "Submit",
            Self::Start { .. } => "Start",
            Self::Advance { .. } => "Advance",
            Self::Restart { .. } => "Restart",
            Self::GetState { .. } => "GetState",
            Self::GetInfo { .. } => "GetInfo",
            Self::Shutdown => "Shutdown",
            Self::Delete { .. } => "Delete",
        };
        f.write_str(name)
    }
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Subscribes to this room's events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub async fn add_question(&self, question: NewQuestion) -> Result<QuestionId, RoomError> {
        self.request(|reply| RoomCommand::AddQuestion { question, reply })
            .await
    }

    /// Adds a participant and returns their id with the room's current view.
    pub async fn join(&self, name: String) -> Result<(ParticipantId, RoomView), RoomError> {
        self.request(|reply| RoomCommand::Join { name, reply })
            .await?
    }

    /// Submits an already-validated answer.
    pub async fn submit(
        &self,
        participant_id: ParticipantId,
        question_id: QuestionId,
        answer: AnswerIndex,
    ) -> Result<SubmitOutcome, RoomError> {
        self.request(|reply| RoomCommand::Submit {
            participant_id,
            question_id,
            answer,
            reply,
        })
        .await
    }

    /// Starts the room. Returns the state afterwards.
    pub async fn start(&self) -> Result<RoomState, RoomError> {
        self.request(|reply| RoomCommand::Start { reply }).await
    }

    /// Advances the room. Returns the state afterwards.
    pub async fn advance(&self) -> Result<RoomState, RoomError> {
        self.request(|reply| RoomCommand::Advance { reply }).await
    }

    pub async fn restart(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Restart { reply }).await
    }

    pub async fn get_state(&self) -> Result<RoomView, RoomError> {
        self.request(|reply| RoomCommand::GetState { reply }).await
    }

    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Tells the room to shut down (fire-and-forget).
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Shuts the room down and removes its stored record. Resolves once
    /// every command queued before it has been applied.
    pub(crate) async fn delete(&self) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Delete { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    quiz: Quiz,
    deadline: QuestionDeadline<u64>,
    receiver: mpsc::Receiver<RoomCommand>,
    events: broadcast::Sender<RoomEvent>,
    mirror: Option<StoreMirror>,
}

impl RoomActor {
    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        tracing::info!(room_id = %self.quiz.room_id(), "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                expired = self.deadline.expired() => {
                    tracing::debug!(
                        room_id = %self.quiz.room_id(),
                        round = expired.key,
                        "question window elapsed"
                    );
                    self.quiz.close_window(expired.key);
                }
            }
            self.sync();
        }

        tracing::info!(room_id = %self.quiz.room_id(), "room actor stopped");
    }

    /// Applies one command. Returns `false` when the actor should stop.
    fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::AddQuestion { question, reply } => {
                self.record(|room_id| MirrorOp::PushQuestion(room_id, question.clone()));
                let _ = reply.send(self.quiz.add_question(question));
            }
            RoomCommand::Join { name, reply } => {
                let result = self.quiz.add_participant(name.as_str());
                if result.is_ok() {
                    self.record(|room_id| {
                        MirrorOp::PushParticipant(room_id, ParticipantRecord::joined(name))
                    });
                }
                let _ = reply.send(result.map(|id| (id, self.quiz.view())));
            }
            RoomCommand::Submit {
                participant_id,
                question_id,
                answer,
                reply,
            } => {
                let outcome =
                    self.quiz
                        .submit(&participant_id, question_id, answer, Instant::now());
                let _ = reply.send(outcome);
            }
            RoomCommand::Start { reply } => {
                self.quiz.start(Instant::now());
                let _ = reply.send(self.quiz.state());
            }
            RoomCommand::Advance { reply } => {
                self.quiz.advance(Instant::now());
                let _ = reply.send(self.quiz.state());
            }
            RoomCommand::Restart { reply } => {
                self.quiz.restart();
                self.record(MirrorOp::ClearParticipants);
                let _ = reply.send(());
            }
            RoomCommand::GetState { reply } => {
                let _ = reply.send(self.quiz.view());
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                self.stop();
                return false;
            }
            RoomCommand::Delete { reply } => {
                self.record(MirrorOp::DeleteRoom);
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn stop(&mut self) {
        tracing::info!(room_id = %self.quiz.room_id(), "room shutting down");
        self.deadline.cancel();
        let _ = self.events.send(RoomEvent::Reset {
            room_id: self.quiz.room_id().clone(),
        });
    }

    fn record(&self, op: impl FnOnce(RoomId) -> MirrorOp) {
        if let Some(mirror) = &self.mirror {
            mirror.send(op(self.quiz.room_id().clone()));
        }
    }

    /// Publishes pending events and makes the deadline match the quiz:
    /// armed for the current round while a window is open, disarmed
    /// otherwise.
    fn sync(&mut self) {
        for event in self.quiz.take_events() {
            // Err only means nobody is subscribed right now.
            let _ = self.events.send(event);
        }

        match self.quiz.deadline_round() {
            Some(round) if self.deadline.armed_key() != Some(&round) => {
                self.deadline.arm(round, self.quiz.config().question_window);
            }
            Some(_) => {}
            None => {
                self.deadline.cancel();
            }
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.quiz.room_id().clone(),
            state: self.quiz.state(),
            question_count: self.quiz.question_count(),
            participant_count: self.quiz.participant_count(),
            active_question: self.quiz.active_question(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
pub(crate) fn spawn_room(
    room_id: RoomId,
    config: QuizConfig,
    mirror: Option<StoreMirror>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_buffer);
    let (events, _) = broadcast::channel(config.event_buffer);

    let actor = RoomActor {
        quiz: Quiz::new(room_id.clone(), config),
        deadline: QuestionDeadline::new(),
        receiver: rx,
        events: events.clone(),
        mirror,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id,
        sender: tx,
        events,
    }
}
