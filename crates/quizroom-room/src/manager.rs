//! Room registry: creates, tracks, and routes commands to rooms.

use std::collections::HashMap;

use quizroom_protocol::{NewQuestion, ParticipantId, QuestionId, RoomEvent, RoomId, RoomView};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::room::spawn_room;
use crate::store::MirrorOp;
use crate::{
    QuizConfig, Rejection, RoomError, RoomHandle, RoomInfo, RoomState, RoomStore, StoreMirror,
    SubmissionValidator, SubmitOutcome,
};

/// Maps room ids to running rooms.
///
/// This is the entry point for room operations from the server. The map
/// lock is only held to look up or insert a handle, never while a room is
/// working, so a slow room never blocks another.
///
/// Setup changes (create, question, join, restart, delete) are mirrored to
/// a [`RoomStore`] when one is configured. Creation is recorded here; every
/// later change is recorded by the room itself.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    config: QuizConfig,
    validator: SubmissionValidator,
    mirror: Option<StoreMirror>,
}

impl RoomRegistry {
    /// Creates an empty registry without persistence.
    pub fn new(config: QuizConfig) -> Self {
        let config = config.validated();
        Self {
            rooms: RwLock::new(HashMap::new()),
            validator: SubmissionValidator::new(&config),
            config,
            mirror: None,
        }
    }

    /// Creates an empty registry that mirrors setup changes to `store`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn with_store<S: RoomStore>(config: QuizConfig, store: S) -> Self {
        Self::with_mirror(config, StoreMirror::spawn(store))
    }

    pub fn with_mirror(config: QuizConfig, mirror: StoreMirror) -> Self {
        Self {
            mirror: Some(mirror),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    pub fn validator(&self) -> &SubmissionValidator {
        &self.validator
    }

    /// Creates an empty room. Returns `false` if the id is taken, in which
    /// case the existing room is left alone.
    pub async fn create_room(&self, room_id: RoomId) -> bool {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room_id) {
            debug!(%room_id, "room already exists");
            return false;
        }
        // Queued before the handle is published so no op on this room can
        // overtake it.
        self.record(MirrorOp::CreateRoom(room_id.clone()));
        let handle = spawn_room(room_id.clone(), self.config.clone(), self.mirror.clone());
        rooms.insert(room_id.clone(), handle);
        info!(%room_id, rooms = rooms.len(), "room created");
        true
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Removes and shuts down a room. Subscribers receive `Reset`.
    /// Returns `false` if there was no such room.
    pub async fn delete_room(&self, room_id: &RoomId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(handle) = rooms.remove(room_id) else {
            debug!(%room_id, "delete of unknown room ignored");
            return false;
        };

        // The lock is held until the room has drained its queue, so a room
        // re-created under the same id is recorded after this delete.
        if handle.delete().await.is_err() {
            self.record(MirrorOp::DeleteRoom(room_id.clone()));
        }
        drop(rooms);

        info!(%room_id, "room deleted");
        true
    }

    /// Clears the roster and returns the room to `not_started`.
    pub async fn restart_room(&self, room_id: &RoomId) -> Result<(), RoomError> {
        self.room(room_id).await?.restart().await
    }

    /// Validates and appends a question.
    pub async fn add_question(
        &self,
        room_id: &RoomId,
        question: NewQuestion,
    ) -> Result<QuestionId, RoomError> {
        self.validator.validate_question(&question)?;
        self.room(room_id).await?.add_question(question).await
    }

    /// Adds a participant. Returns their id and the room's current view.
    pub async fn join(
        &self,
        room_id: &RoomId,
        name: impl Into<String>,
    ) -> Result<(ParticipantId, RoomView), RoomError> {
        self.room(room_id).await?.join(name.into()).await
    }

    /// Validates `answer` and forwards it to the room.
    ///
    /// An answer outside the allowed set never reaches the room and comes
    /// back as [`Rejection::InvalidAnswer`].
    pub async fn submit(
        &self,
        room_id: &RoomId,
        participant_id: ParticipantId,
        question_id: QuestionId,
        answer: i64,
    ) -> Result<SubmitOutcome, RoomError> {
        let answer = match self.validator.validate_answer(answer) {
            Ok(answer) => answer,
            Err(e) => {
                debug!(%room_id, %participant_id, error = %e, "submission dropped");
                return Ok(SubmitOutcome::Rejected(Rejection::InvalidAnswer));
            }
        };
        self.room(room_id)
            .await?
            .submit(participant_id, question_id, answer)
            .await
    }

    pub async fn start(&self, room_id: &RoomId) -> Result<RoomState, RoomError> {
        self.room(room_id).await?.start().await
    }

    pub async fn advance(&self, room_id: &RoomId) -> Result<RoomState, RoomError> {
        self.room(room_id).await?.advance().await
    }

    pub async fn get_state(&self, room_id: &RoomId) -> Result<RoomView, RoomError> {
        self.room(room_id).await?.get_state().await
    }

    pub async fn get_info(&self, room_id: &RoomId) -> Result<RoomInfo, RoomError> {
        self.room(room_id).await?.get_info().await
    }

    pub async fn subscribe(
        &self,
        room_id: &RoomId,
    ) -> Result<broadcast::Receiver<RoomEvent>, RoomError> {
        Ok(self.room(room_id).await?.subscribe())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Shuts down every room. Used on server shutdown.
    pub async fn close_all(&self) {
        let handles: Vec<RoomHandle> = self.rooms.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }

    async fn room(&self, room_id: &RoomId) -> Result<RoomHandle, RoomError> {
        self.get_room(room_id)
            .await
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    fn record(&self, op: MirrorOp) {
        if let Some(mirror) = &self.mirror {
            mirror.send(op);
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(QuizConfig::default())
    }
}
