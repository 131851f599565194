//! # quizroom
//!
//! Real-time multiplayer trivia rooms over WebSocket.
//!
//! An operator creates a room, authors questions, and starts the quiz.
//! Participants join with a display name and race to answer each question
//! inside a fixed window; after every window the room reveals the
//! leaderboard, and the first participant to reach the winning score ends
//! the game.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quizroom::prelude::*;
//!
//! # async fn run() -> Result<(), QuizError> {
//! let config = ServerConfig::from_env()?;
//! let server = QuizServer::builder()
//!     .configure(&config)
//!     .build(SharedSecretAuthenticator::new(config.operator_secret.clone()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, DEFAULT_BIND, DEFAULT_LOG_FILTER, ServerConfig};
pub use error::QuizError;
pub use server::{PROTOCOL_VERSION, QuizServer, QuizServerBuilder};

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by
/// `default_filter` when `RUST_LOG` is unset or unparsable.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

/// Everything needed to embed or talk to a quiz server.
pub mod prelude {
    pub use quizroom_protocol::{
        AnswerIndex, AnswerOption, ClientMessage, Codec, Envelope, JsonCodec, NewQuestion,
        ParticipantId, ProblemView, QuestionId, RoomEvent, RoomId, RoomView, ServerMessage,
        Standing,
    };
    pub use quizroom_room::{
        FileStore, LateJoin, MemoryStore, QuizConfig, RoomError, RoomRegistry, RoomState,
        RoomStore,
    };
    pub use quizroom_session::{
        Authenticator, OperatorCapability, SessionConfig, SessionError,
        SharedSecretAuthenticator,
    };

    pub use crate::{
        ConfigError, PROTOCOL_VERSION, QuizError, QuizServer, QuizServerBuilder, ServerConfig,
    };
}
