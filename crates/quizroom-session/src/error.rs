//! Error types for the session layer.

use quizroom_transport::ConnectionId;

/// Errors that can occur while tracking connection sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operator token was rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the connection. Either the handshake never
    /// completed or the connection already went away.
    #[error("no session for {0}")]
    NotFound(ConnectionId),

    /// A session for this connection already exists.
    #[error("{0} already has a session")]
    AlreadyConnected(ConnectionId),

    /// The connection tried an operator command without capability.
    #[error("{0} is not an operator")]
    Forbidden(ConnectionId),
}
