//! Wire protocol for quizroom.
//!
//! This crate defines everything that crosses the boundary between the
//! quiz core and the outside world:
//!
//! - **Identifiers** ([`RoomId`], [`ParticipantId`], [`QuestionId`],
//!   [`AnswerIndex`]): newtypes so ids of different kinds can't be mixed.
//! - **Quiz payloads** ([`NewQuestion`], [`ProblemView`], [`Standing`],
//!   [`RoomView`], [`RoomEvent`]): the compatibility contract for what
//!   clients see of a room.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Envelope`]):
//!   the commands clients send and the replies the server produces.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! The protocol layer knows nothing about timers, connections, or room
//! state. It only describes shapes.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Room
//! ```

mod codec;
mod error;
mod message;
mod quiz;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{ClientMessage, Envelope, ServerMessage};
pub use quiz::{
    AnswerOption, NewQuestion, ProblemView, RoomEvent, RoomView, Standing,
};
pub use types::{AnswerIndex, ParticipantId, QuestionId, RoomId};
