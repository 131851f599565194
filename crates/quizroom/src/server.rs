//! `QuizServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;

use quizroom_protocol::{Codec, JsonCodec};
use quizroom_room::{FileStore, QuizConfig, RoomRegistry, RoomStore, StoreMirror};
use quizroom_session::{Authenticator, SessionConfig, SessionManager};
use quizroom_transport::{Transport, TransportError, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{QuizError, ServerConfig};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<A: Authenticator, C: Codec> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) session_config: SessionConfig,
    pub(crate) registry: RoomRegistry,
    pub(crate) auth: A,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a quiz server.
///
/// # Example
///
/// ```rust,no_run
/// use quizroom::prelude::*;
///
/// # async fn run() -> Result<(), QuizError> {
/// let server = QuizServer::builder()
///     .bind("0.0.0.0:3000")
///     .build(SharedSecretAuthenticator::new("let-me-host"))
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct QuizServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    quiz_config: QuizConfig,
    mirror: Option<StoreMirror>,
}

impl QuizServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            session_config: SessionConfig::default(),
            quiz_config: QuizConfig::default(),
            mirror: None,
        }
    }

    /// Applies everything in a [`ServerConfig`] except the operator
    /// secret, which goes to the authenticator.
    ///
    /// Must be called inside a Tokio runtime when the config names a
    /// store directory.
    pub fn configure(self, config: &ServerConfig) -> Self {
        let builder = self.bind(&config.bind_addr).quiz_config(config.quiz_config());
        match &config.store_dir {
            Some(dir) => builder.store(FileStore::new(dir)),
            None => builder,
        }
    }

    /// Sets the address to bind the server to. Port 0 picks a free port.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the gameplay constants shared by every room.
    pub fn quiz_config(mut self, config: QuizConfig) -> Self {
        self.quiz_config = config;
        self
    }

    /// Mirrors room setup into `store`.
    ///
    /// Spawns the mirror task right away, so this must be called inside a
    /// Tokio runtime.
    pub fn store<S: RoomStore>(mut self, store: S) -> Self {
        self.mirror = Some(StoreMirror::spawn(store));
        self
    }

    /// Binds the listener and returns a server ready to [`run`](QuizServer::run).
    ///
    /// # Errors
    /// Returns [`QuizError::Transport`] if the address can't be bound.
    pub async fn build<A: Authenticator>(self, auth: A) -> Result<QuizServer<A, JsonCodec>, QuizError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let registry = match self.mirror {
            Some(mirror) => RoomRegistry::with_mirror(self.quiz_config, mirror),
            None => RoomRegistry::new(self.quiz_config),
        };

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.session_config.clone())),
            session_config: self.session_config,
            registry,
            auth,
            codec: JsonCodec,
        });

        Ok(QuizServer { transport, state })
    }
}

impl Default for QuizServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound quiz server.
///
/// Call [`run`](Self::run) or [`run_until`](Self::run_until) to start
/// accepting connections.
pub struct QuizServer<A: Authenticator, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, C>>,
}

impl QuizServer<quizroom_session::SharedSecretAuthenticator, JsonCodec> {
    pub fn builder() -> QuizServerBuilder {
        QuizServerBuilder::new()
    }
}

impl<A, C> QuizServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        self.transport.local_addr()
    }

    /// The rooms this server hosts.
    pub fn registry(&self) -> &RoomRegistry {
        &self.state.registry
    }

    /// Accepts connections until the process is terminated.
    pub async fn run(self) -> Result<(), QuizError> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then stops accepting
    /// and shuts every room down. Subscribers see `Reset` for each room.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), QuizError> {
        tracing::info!("quiz server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::Shutdown) => break,
                    Err(e) if e.is_peer_fault() => {
                        tracing::debug!(error = %e, "dropped connection before upgrade");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.transport.shutdown().await?;
        self.state.registry.close_all().await;
        tracing::info!("quiz server stopped");
        Ok(())
    }
}
