//! Network plumbing for quizroom.
//!
//! The server talks to clients through two traits: a [`Transport`] hands
//! out [`Connection`]s, and a connection moves opaque byte messages. Room
//! events are pushed to a client while its handler is parked in
//! [`Connection::recv`], so implementations must allow a `send` to run
//! alongside a pending `recv`.
//!
//! The only implementation is WebSocket (`websocket` feature, on by
//! default), built on `tokio-tungstenite`.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one accepted connection for the lifetime of the process.
/// Sessions are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates an id no other connection in this process has used.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener that produces connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client whose upgrade has completed. A peer
    /// that is slow to upgrade must not delay the others.
    ///
    /// A failure caused by one peer does not stop the listener; call
    /// `accept` again.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address clients connect to.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;

    /// Refuses every later `accept`. Open connections are unaffected.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// One client connection carrying whole messages.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Waits for the next message. `Ok(None)` means the peer closed the
    /// connection.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> SocketAddr;
}
