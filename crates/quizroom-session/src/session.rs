//! Session types: what the server knows about one open connection.

use std::time::{Duration, Instant};

use quizroom_protocol::{ParticipantId, RoomId};
use quizroom_transport::ConnectionId;

use crate::OperatorCapability;

/// Timeouts applied to every connection.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a new connection has to send its `Handshake`.
    ///
    /// Default: 5 seconds.
    pub handshake_timeout: Duration,

    /// A connection that sends nothing (not even a heartbeat) for this long
    /// is closed.
    ///
    /// Default: 60 seconds.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// What a connection is allowed to do.
///
/// ```text
///   Guest ──(Join)──→ Participant ──(Join elsewhere)──→ Participant
///
///   Operator   (decided at handshake, never changes)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Handshake done, not in any room yet.
    Guest,

    /// Joined `room_id` as `participant_id`.
    Participant {
        room_id: RoomId,
        participant_id: ParticipantId,
    },

    /// Presented a valid operator token.
    Operator(OperatorCapability),
}

/// One connection's session.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub connected_at: Instant,
}

impl Session {
    pub fn new(connection_id: ConnectionId, role: Role) -> Self {
        Self {
            connection_id,
            role,
            connected_at: Instant::now(),
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self.role, Role::Operator(_))
    }

    pub fn capability(&self) -> Option<&OperatorCapability> {
        match &self.role {
            Role::Operator(cap) => Some(cap),
            _ => None,
        }
    }

    /// The room and participant this connection plays as, if any.
    pub fn participant(&self) -> Option<(&RoomId, &ParticipantId)> {
        match &self.role {
            Role::Participant {
                room_id,
                participant_id,
            } => Some((room_id, participant_id)),
            _ => None,
        }
    }
}
