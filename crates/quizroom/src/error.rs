//! Unified error type for the quizroom server.

use quizroom_protocol::ProtocolError;
use quizroom_room::RoomError;
use quizroom_session::SessionError;
use quizroom_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every layer's error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    /// Binding, accepting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding a message failed, or the conversation broke
    /// protocol (e.g. no handshake).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The environment didn't describe a usable server.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
