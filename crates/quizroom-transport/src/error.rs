use std::net::SocketAddr;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener itself failed to hand out a socket.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// A peer connected but sent something that isn't a WebSocket upgrade.
    #[error("upgrade from {peer} failed: {reason}")]
    Upgrade { peer: SocketAddr, reason: String },

    /// A peer connected but never finished the upgrade.
    #[error("{peer} did not finish the upgrade in time")]
    UpgradeTimeout { peer: SocketAddr },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    /// The transport was shut down and accepts nothing new.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// `true` when one misbehaving peer caused the error and the listener
    /// is still healthy.
    pub fn is_peer_fault(&self) -> bool {
        matches!(self, Self::Upgrade { .. } | Self::UpgradeTimeout { .. })
    }
}
