//! Transport abstraction layer for ackwire.
//!
//! Provides the [`Frame`] sum type and the [`Transport`] and [`Connection`]
//! traits that the protocol core is written against. The core never touches
//! sockets directly: it consumes "receive a frame" and "send a frame" from
//! a [`Connection`] and nothing else.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`,
//!   with `wss://` support via `tokio-rustls`

#![allow(async_fn_in_trait)]

mod error;
mod frame;
#[cfg(feature = "websocket")]
pub mod tls;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use frame::{CloseReason, Frame, UpgradeResponse};
#[cfg(feature = "websocket")]
pub use websocket::{
    IncomingConnection, WebSocketConnection, WebSocketConnector,
    WebSocketTransport,
};

use std::fmt;
use std::net::SocketAddr;

/// Process-unique connection number, shown as `conn-N` in logs.
///
/// Server and client connections draw from the same counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
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

/// URL scheme of an endpoint: plain `ws://` or TLS-secured `wss://`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Ws,
    Wss,
}

impl Scheme {
    /// Returns `true` for `wss`.
    pub fn is_secure(self) -> bool {
        matches!(self, Scheme::Wss)
    }

    /// The lowercase URL scheme (`"ws"` or `"wss"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// A connection that has been accepted but not yet upgraded.
    type Incoming: Send + 'static;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A single upgraded connection that can send and receive frames.
///
/// `send` must be safe to call concurrently with a pending `recv`: the
/// client reads operator input on one task while inbound frames are
/// processed on another.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer.
    async fn send(&self, frame: Frame) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` once the underlying stream has ended.
    async fn recv(&self) -> Result<Option<Frame>, Self::Error>;

    /// Starts the closing handshake.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Resolves once the connection is no longer usable.
    async fn closed(&self);

    /// Returns `false` once the connection has ended.
    fn is_open(&self) -> bool;

    /// Whether the connection runs over TLS. For logging only.
    fn is_secure(&self) -> bool;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
