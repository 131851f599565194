//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// A peer that opens a TCP connection but never completes the upgrade is
/// dropped after this long.
const UPGRADE_TIMEOUT: Duration = Duration::from_secs(5);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Upgraded connections waiting for [`accept`](Transport::accept).
const READY_BACKLOG: usize = 64;

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;
type Accepted = Result<WebSocketConnection, TransportError>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
///
/// A background task owns the listener and upgrades each TCP connection
/// in its own task, so a peer that stalls mid-handshake never delays
/// anyone else. [`accept`](Transport::accept) hands out connections in the
/// order their upgrades finished.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<Accepted>,
    acceptor: JoinHandle<()>,
    shut_down: AtomicBool,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// Use port 0 to let the OS pick one, then read it back with
    /// [`local_addr`](Transport::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        tracing::info!(addr = %local_addr, "WebSocket transport listening");

        let (tx, ready) = mpsc::channel(READY_BACKLOG);
        Ok(Self {
            local_addr,
            ready,
            acceptor: tokio::spawn(accept_loop(listener, tx)),
            shut_down: AtomicBool::new(false),
        })
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    /// Cancel safe: a connection is only taken off the queue when this
    /// future completes.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        self.ready.recv().await.unwrap_or(Err(TransportError::Shutdown))
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        Ok(self.local_addr)
    }

    /// Stops listening. Every later [`accept`](Transport::accept) fails
    /// with [`TransportError::Shutdown`].
    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.shut_down.store(true, Ordering::Release);
        self.acceptor.abort();
        tracing::info!("WebSocket transport shut down");
        Ok(())
    }
}

/// Accepts TCP connections until the transport goes away, spawning one
/// upgrade task per peer.
async fn accept_loop(listener: TcpListener, ready: mpsc::Sender<Accepted>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                if ready.send(Err(TransportError::Accept(e))).await.is_err() {
                    return;
                }
                // Usually fd exhaustion; retrying at once would spin.
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let ready = ready.clone();
        tokio::spawn(async move {
            // Err only means the transport is gone.
            let _ = ready.send(upgrade(stream, peer).await).await;
        });
    }
}

async fn upgrade(stream: TcpStream, peer: SocketAddr) -> Accepted {
    let ws = match tokio::time::timeout(UPGRADE_TIMEOUT, tokio_tungstenite::accept_async(stream))
        .await
    {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            return Err(TransportError::Upgrade {
                peer,
                reason: e.to_string(),
            });
        }
        Err(_) => return Err(TransportError::UpgradeTimeout { peer }),
    };

    let id = ConnectionId::next();
    tracing::debug!(%id, %peer, "accepted WebSocket connection");

    let (sink, stream) = ws.split();
    Ok(WebSocketConnection {
        id,
        peer,
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
    })
}

/// A single WebSocket connection.
///
/// The socket is split so that a task waiting in [`recv`](Connection::recv)
/// never blocks another task that is pushing room events with
/// [`send`](Connection::send).
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// UTF-8 payloads go out as text frames (browsers read JSON from those),
    /// anything else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::ConnectionClosed(e.to_string()))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
