//! Durable mirror of room setup: questions and roster.
//!
//! The in-memory [`Quiz`](crate::Quiz) is the source of truth for
//! gameplay. The store only receives a copy of what was authored and who
//! joined, so a room's setup can be inspected or audited after the fact.
//!
//! Writes go through a [`StoreMirror`]: a single background task that
//! applies operations in the order they were issued. Callers never wait on
//! it, and a failed write is logged at `warn` and otherwise forgotten.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quizroom_protocol::{NewQuestion, RoomId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::StoreError;

/// A roster entry as recorded at join time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub name: String,
    pub score: u32,
    pub stage: u8,
}

impl ParticipantRecord {
    /// A freshly joined participant: score 0, stage 1.
    pub fn joined(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: 0,
            stage: 1,
        }
    }
}

/// Everything the store knows about one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub questions: Vec<NewQuestion>,
    pub participants: Vec<ParticipantRecord>,
}

impl RoomRecord {
    pub fn empty(room_id: RoomId) -> Self {
        Self {
            room_id,
            questions: Vec::new(),
            participants: Vec::new(),
        }
    }
}

/// A durable backend for room records.
///
/// Implementations only need to be correct when called one operation at a
/// time; the [`StoreMirror`] never overlaps calls.
pub trait RoomStore: Send + Sync + 'static {
    /// Creates an empty record, replacing any previous one.
    fn create_room(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn push_question(
        &self,
        room_id: &RoomId,
        question: &NewQuestion,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn push_participant(
        &self,
        room_id: &RoomId,
        participant: &ParticipantRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Empties the roster. Used when a room restarts.
    fn clear_participants(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the record. Removing a missing record is not an error.
    fn delete_room(&self, room_id: &RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomRecord>, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Keeps records in a shared map. Clones share the same map, so a test can
/// hand one clone to the registry and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<RoomId, RoomRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(
        &self,
        room_id: &RoomId,
        f: impl FnOnce(&mut RoomRecord),
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(room_id)
            .ok_or_else(|| StoreError::MissingRecord(room_id.clone()))?;
        f(record);
        Ok(())
    }
}

impl RoomStore for MemoryStore {
    async fn create_room(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(room_id.clone(), RoomRecord::empty(room_id.clone()));
        Ok(())
    }

    async fn push_question(&self, room_id: &RoomId, question: &NewQuestion) -> Result<(), StoreError> {
        self.update(room_id, |r| r.questions.push(question.clone())).await
    }

    async fn push_participant(
        &self,
        room_id: &RoomId,
        participant: &ParticipantRecord,
    ) -> Result<(), StoreError> {
        self.update(room_id, |r| r.participants.push(participant.clone()))
            .await
    }

    async fn clear_participants(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.update(room_id, |r| r.participants.clear()).await
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.records.lock().await.remove(room_id);
        Ok(())
    }

    async fn load(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.records.lock().await.get(room_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One pretty-printed JSON document per room under a directory.
///
/// File names are the hex-encoded room id, so any operator-chosen id maps
/// to a safe file name.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, room_id: &RoomId) -> PathBuf {
        let name: String = room_id
            .as_str()
            .bytes()
            .map(|b| format!("{b:02x}"))
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    async fn read(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        match tokio::fs::read(self.path(room_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a temporary file and renames it over the record.
    async fn write(&self, record: &RoomRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(&record.room_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn update(
        &self,
        room_id: &RoomId,
        f: impl FnOnce(&mut RoomRecord) + Send,
    ) -> Result<(), StoreError> {
        let mut record = self
            .read(room_id)
            .await?
            .ok_or_else(|| StoreError::MissingRecord(room_id.clone()))?;
        f(&mut record);
        self.write(&record).await
    }
}

impl RoomStore for FileStore {
    async fn create_room(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.write(&RoomRecord::empty(room_id.clone())).await
    }

    async fn push_question(&self, room_id: &RoomId, question: &NewQuestion) -> Result<(), StoreError> {
        let question = question.clone();
        self.update(room_id, move |r| r.questions.push(question)).await
    }

    async fn push_participant(
        &self,
        room_id: &RoomId,
        participant: &ParticipantRecord,
    ) -> Result<(), StoreError> {
        let participant = participant.clone();
        self.update(room_id, move |r| r.participants.push(participant))
            .await
    }

    async fn clear_participants(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.update(room_id, |r| r.participants.clear()).await
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path(room_id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn load(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, StoreError> {
        self.read(room_id).await
    }
}

// ---------------------------------------------------------------------------
// StoreMirror
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum MirrorOp {
    CreateRoom(RoomId),
    PushQuestion(RoomId, NewQuestion),
    PushParticipant(RoomId, ParticipantRecord),
    ClearParticipants(RoomId),
    DeleteRoom(RoomId),
}

impl MirrorOp {
    fn room_id(&self) -> &RoomId {
        match self {
            Self::CreateRoom(id)
            | Self::PushQuestion(id, _)
            | Self::PushParticipant(id, _)
            | Self::ClearParticipants(id)
            | Self::DeleteRoom(id) => id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create_room",
            Self::PushQuestion(..) => "push_question",
            Self::PushParticipant(..) => "push_participant",
            Self::ClearParticipants(_) => "clear_participants",
            Self::DeleteRoom(_) => "delete_room",
        }
    }

    async fn apply<S: RoomStore>(&self, store: &S) -> Result<(), StoreError> {
        match self {
            Self::CreateRoom(id) => store.create_room(id).await,
            Self::PushQuestion(id, q) => store.push_question(id, q).await,
            Self::PushParticipant(id, p) => store.push_participant(id, p).await,
            Self::ClearParticipants(id) => store.clear_participants(id).await,
            Self::DeleteRoom(id) => store.delete_room(id).await,
        }
    }
}

/// Fire-and-forget handle to the background task that owns a [`RoomStore`].
///
/// Must be created inside a Tokio runtime. The task exits once every
/// clone of the mirror has been dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct StoreMirror {
    tx: mpsc::UnboundedSender<MirrorOp>,
}

impl StoreMirror {
    pub fn spawn<S: RoomStore>(store: S) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<MirrorOp>();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                if let Err(e) = op.apply(&store).await {
                    warn!(
                        room_id = %op.room_id(),
                        op = op.name(),
                        error = %e,
                        "store mirror write failed"
                    );
                }
            }
            debug!("store mirror stopped");
        });

        Self { tx }
    }

    pub(crate) fn send(&self, op: MirrorOp) {
        if let Err(e) = self.tx.send(op) {
            warn!(op = e.0.name(), "store mirror stopped, dropping write");
        }
    }
}

#[cfg(test)]
mod tests {
    use quizroom_protocol::{AnswerIndex, AnswerOption};

    use super::*;

    fn question() -> NewQuestion {
        NewQuestion {
            title: "Boiling point of water".into(),
            description: "At sea level, in Celsius".into(),
            image: None,
            options: vec![
                AnswerOption {
                    id: AnswerIndex(0),
                    title: "90".into(),
                },
                AnswerOption {
                    id: AnswerIndex(1),
                    title: "100".into(),
                },
            ],
            answer: AnswerIndex(1),
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("quizroom-store-{tag}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn test_memory_store_records_setup() {
        let store = MemoryStore::new();
        let id = RoomId::from("trivia night");
        store.create_room(&id).await.unwrap();
        store.push_question(&id, &question()).await.unwrap();
        store
            .push_participant(&id, &ParticipantRecord::joined("Ada"))
            .await
            .unwrap();

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.questions.len(), 1);
        assert_eq!(record.participants, vec![ParticipantRecord::joined("Ada")]);
    }

    #[tokio::test]
    async fn test_memory_store_push_to_missing_room_fails() {
        let store = MemoryStore::new();
        let result = store.push_question(&RoomId::from("ghost"), &question()).await;
        assert!(matches!(result, Err(StoreError::MissingRecord(_))));
    }

    #[tokio::test]
    async fn test_file_store_round_trips_record() {
        let dir = temp_dir("roundtrip");
        let store = FileStore::new(&dir);
        let id = RoomId::from("../escape attempt");

        store.create_room(&id).await.unwrap();
        store.push_question(&id, &question()).await.unwrap();
        store
            .push_participant(&id, &ParticipantRecord::joined("Grace"))
            .await
            .unwrap();

        let path = store.path(&id);
        assert_eq!(path.parent(), Some(dir.as_path()), "room id must not escape the directory");

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.room_id, id);
        assert_eq!(record.questions, vec![question()]);
        assert_eq!(record.participants[0].name, "Grace");

        store.clear_participants(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().unwrap().participants.is_empty());

        store.delete_room(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
        store.delete_room(&id).await.unwrap();

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_store_mirror_applies_in_order() {
        let store = MemoryStore::new();
        let mirror = StoreMirror::spawn(store.clone());
        let id = RoomId::from("ordered");

        mirror.send(MirrorOp::CreateRoom(id.clone()));
        for name in ["a", "b", "c"] {
            mirror.send(MirrorOp::PushParticipant(
                id.clone(),
                ParticipantRecord::joined(name),
            ));
        }
        mirror.send(MirrorOp::PushQuestion(id.clone(), question()));

        let record = loop {
            let record = store.load(&id).await.unwrap();
            if let Some(r) = record.filter(|r| !r.questions.is_empty()) {
                break r;
            }
            tokio::task::yield_now().await;
        };
        let names: Vec<_> = record.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_store_mirror_survives_failed_write() {
        let store = MemoryStore::new();
        let mirror = StoreMirror::spawn(store.clone());
        let id = RoomId::from("late");

        // No record yet: this write fails and is only logged.
        mirror.send(MirrorOp::PushQuestion(id.clone(), question()));
        mirror.send(MirrorOp::CreateRoom(id.clone()));

        let record = loop {
            if let Some(r) = store.load(&id).await.unwrap() {
                break r;
            }
            tokio::task::yield_now().await;
        };
        assert!(record.questions.is_empty());
    }
}
