//! Rooms for quizroom: the quiz state machine and everything that runs it.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! questions, roster, lifecycle state, and question deadline.
//!
//! # Key types
//!
//! - [`Quiz`]: the synchronous per-room state machine
//! - [`RoomState`]: lifecycle states and their transition table
//! - [`RoomHandle`]: send commands to a running room actor, subscribe to
//!   its events
//! - [`RoomRegistry`]: creates, deletes, and routes commands to rooms
//! - [`SubmissionValidator`]: rejects bad input before it reaches a room
//! - [`RoomStore`]: durable mirror of room setup ([`MemoryStore`],
//!   [`FileStore`])
//! - [`QuizConfig`]: gameplay constants

mod config;
mod error;
mod manager;
mod quiz;
mod room;
mod store;
mod validator;

pub use config::{LateJoin, QuizConfig, RoomState, Trigger};
pub use error::{RoomError, StoreError, ValidationError};
pub use manager::RoomRegistry;
pub use quiz::{Quiz, Rejection, Submission, SubmitOutcome};
pub use room::{RoomHandle, RoomInfo};
pub use store::{FileStore, MemoryStore, ParticipantRecord, RoomRecord, RoomStore, StoreMirror};
pub use validator::SubmissionValidator;
