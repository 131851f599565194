//! Client and server messages, and the envelope that carries them.

use serde::{Deserialize, Serialize};

use crate::{NewQuestion, ParticipantId, QuestionId, RoomEvent, RoomId, RoomView};

/// Messages a client sends to the server.
///
/// Internally tagged: `{ "type": "Join", "room_id": "finals", "name": "Ada" }`.
/// Operator commands are only honoured on connections whose handshake
/// presented a valid operator token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    // -- Connection lifecycle --
    /// First message on every connection. `token` is the operator secret;
    /// participants omit it.
    Handshake {
        version: u32,
        #[serde(default)]
        token: Option<String>,
    },

    /// Keep-alive. The server echoes `client_time` back.
    Heartbeat { client_time: u64 },

    /// "I'm leaving."
    Disconnect { reason: String },

    // -- Participant commands --
    /// Join a room under a display name.
    Join { room_id: RoomId, name: String },

    /// Answer the active question. `answer` is deliberately a wide integer
    /// so out-of-range values reach the validator instead of failing decode.
    Submit {
        room_id: RoomId,
        participant_id: ParticipantId,
        question_id: QuestionId,
        answer: i64,
    },

    // -- Operator commands --
    CreateRoom { room_id: RoomId },
    AddQuestion {
        room_id: RoomId,
        question: NewQuestion,
    },
    Start { room_id: RoomId },
    Advance { room_id: RoomId },
    RestartRoom { room_id: RoomId },
    DeleteRoom { room_id: RoomId },
    GetState { room_id: RoomId },
}

impl ClientMessage {
    /// Returns `true` for commands that require operator capability.
    pub fn is_operator_only(&self) -> bool {
        matches!(
            self,
            Self::CreateRoom { .. }
                | Self::AddQuestion { .. }
                | Self::Start { .. }
                | Self::Advance { .. }
                | Self::RestartRoom { .. }
                | Self::DeleteRoom { .. }
                | Self::GetState { .. }
        )
    }
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake accepted. `operator` tells the client whether its token
    /// granted operator capability.
    HandshakeAck { server_time: u64, operator: bool },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Reply to `Join`: the new participant id and the room as it is now.
    Init {
        participant_id: ParticipantId,
        state: RoomView,
    },

    RoomCreated { room_id: RoomId },

    QuestionAdded {
        room_id: RoomId,
        question_id: QuestionId,
    },

    /// Reply to `GetState`.
    State { room_id: RoomId, state: RoomView },

    /// A room event forwarded from the room the connection is subscribed to.
    Room { event: RoomEvent },

    /// Something went wrong. `code` follows HTTP conventions
    /// (400 bad request, 401 unauthorized, 403 forbidden, 404 not found,
    /// 409 conflict).
    Error { code: u16, message: String },
}

/// The top-level wire wrapper.
///
/// `seq` increases per direction per connection; `timestamp` is
/// milliseconds since the connection was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: P,
}
