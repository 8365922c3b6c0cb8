//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};

use crate::tls::{TlsAcceptor, TlsConnector};
use crate::{
    CloseReason, Connection, ConnectionId, Frame, Scheme, Transport,
    TransportError, UpgradeResponse,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Plain TCP or TLS, erased so both share one connection type.
trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

type BoxedIo = Box<dyn AsyncIo>;
type WsStream = WebSocketStream<BoxedIo>;

fn upgrade_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            TransportError::Handshake {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("rejected")
                    .to_string(),
            }
        }
        tungstenite::Error::Io(e) => TransportError::AcceptFailed(e),
        other => TransportError::Handshake {
            status: StatusCode::BAD_REQUEST.as_u16(),
            reason: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// With `tls` set, every accepted connection goes through a TLS
    /// handshake before the WebSocket upgrade.
    pub async fn bind(
        addr: &str,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, secure = tls.is_some(), "WebSocket transport listening");
        Ok(Self { listener, tls })
    }
}

impl Transport for WebSocketTransport {
    type Incoming = IncomingConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = next_id();
        tracing::debug!(%id, %peer, "accepted TCP connection");

        Ok(IncomingConnection {
            id,
            peer,
            stream,
            tls: self.tls.clone(),
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// An accepted socket whose WebSocket upgrade has not happened yet.
///
/// Upgrading is split from accepting so a slow or hostile client cannot
/// stall the accept loop.
pub struct IncomingConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
}

impl IncomingConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Runs the TLS handshake (if configured) and the WebSocket upgrade.
    ///
    /// Only requests for `path` are upgraded; anything else is answered
    /// with `404 Not Found` and reported as [`TransportError::Handshake`].
    pub async fn upgrade(
        self,
        path: &str,
    ) -> Result<(WebSocketConnection, UpgradeResponse), TransportError> {
        let secure = self.tls.is_some();
        let io: BoxedIo = match self.tls {
            Some(acceptor) => Box::new(
                acceptor.accept(self.stream).await.map_err(|e| {
                    TransportError::Tls(format!("TLS handshake failed: {e}"))
                })?,
            ),
            None => Box::new(self.stream),
        };

        let expected = path.to_string();
        let check_path = move |req: &Request, resp: Response| {
            if req.uri().path() == expected {
                Ok(resp)
            } else {
                let mut rejection: ErrorResponse = ErrorResponse::new(Some(
                    format!("no WebSocket endpoint at {}", req.uri().path()),
                ));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws = tokio_tungstenite::accept_hdr_async(io, check_path)
            .await
            .map_err(upgrade_error)?;

        tracing::debug!(id = %self.id, peer = %self.peer, secure, "WebSocket upgrade complete");
        Ok((
            WebSocketConnection::new(self.id, self.peer, secure, ws),
            UpgradeResponse::switching_protocols(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Opens outbound WebSocket connections to one endpoint.
#[derive(Clone)]
pub struct WebSocketConnector {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
    tls: Option<TlsConnector>,
}

impl WebSocketConnector {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
            path: "/".to_string(),
            tls: None,
        }
    }

    /// Sets the request path (defaults to `/`).
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the TLS connector used for `wss`.
    pub fn tls(mut self, connector: TlsConnector) -> Self {
        self.tls = Some(connector);
        self
    }

    /// The URL requested during the upgrade.
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }

    /// Connects and performs the WebSocket upgrade.
    ///
    /// A refused upgrade is returned as [`TransportError::Handshake`]
    /// carrying the HTTP status the server answered with.
    pub async fn connect(
        &self,
    ) -> Result<(WebSocketConnection, UpgradeResponse), TransportError> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(TransportError::ConnectFailed)?;
        let peer = tcp.peer_addr().map_err(TransportError::ConnectFailed)?;

        let io: BoxedIo = match (self.scheme, &self.tls) {
            (Scheme::Ws, _) => Box::new(tcp),
            (Scheme::Wss, Some(connector)) => {
                let name = ServerName::try_from(self.host.clone()).map_err(|e| {
                    TransportError::Tls(format!("invalid server name {}: {e}", self.host))
                })?;
                Box::new(connector.connect(name, tcp).await.map_err(|e| {
                    TransportError::Tls(format!("TLS handshake failed: {e}"))
                })?)
            }
            (Scheme::Wss, None) => {
                return Err(TransportError::Tls(
                    "wss requires a TLS connector".into(),
                ));
            }
        };

        let (ws, response) = tokio_tungstenite::client_async(self.url(), io)
            .await
            .map_err(|e| match upgrade_error(e) {
                TransportError::AcceptFailed(io) => TransportError::ConnectFailed(io),
                other => other,
            })?;

        let upgrade = UpgradeResponse {
            status: response.status().as_u16(),
            reason: None,
        };
        let conn = WebSocketConnection::new(next_id(), peer, self.scheme.is_secure(), ws);
        tracing::debug!(id = %conn.id(), url = %self.url(), status = upgrade.status, "connected");
        Ok((conn, upgrade))
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A single WebSocket connection.
///
/// The socket is split into a sink and a stream, each behind its own
/// lock, so a `send` from one task never waits on a `recv` parked in
/// another.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    secure: bool,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: watch::Sender<bool>,
}

impl WebSocketConnection {
    fn new(id: ConnectionId, peer: SocketAddr, secure: bool, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            secure,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed,
        }
    }

    /// Address of the remote peer.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Flags the connection as finished and wakes every `closed()` waiter.
    ///
    /// For the task that owns the read side, once it stops reading.
    pub fn mark_closed(&self) {
        self.closed.send_replace(true);
    }
}

fn to_message(frame: Frame) -> Option<Message> {
    let message = match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        // tungstenite replaces its own queued pong with this one, so the
        // peer still sees a single pong per ping.
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: CloseCode::from(r.code),
            reason: r.reason.into(),
        })),
        Frame::Unrecognized => return None,
    };
    Some(message)
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(close) => Frame::Close(close.map(|c| {
            CloseReason::new(u16::from(c.code), c.reason.as_str())
        })),
        Message::Frame(_) => Frame::Unrecognized,
    }
}

fn broken_pipe(e: tungstenite::Error) -> TransportError {
    TransportError::SendFailed(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        e,
    ))
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, frame: Frame) -> Result<(), Self::Error> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} is no longer open",
                self.id
            )));
        }

        let kind = frame.kind();
        let message = to_message(frame).ok_or_else(|| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot send an unrecognized frame",
            ))
        })?;

        tracing::debug!(conn_id = %self.id, kind, "websocket/out");
        let result = self.sink.lock().await.send(message).await;
        result.map_err(|e| {
            if matches!(
                e,
                tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
            ) {
                self.mark_closed();
            }
            broken_pipe(e)
        })
    }

    async fn recv(&self) -> Result<Option<Frame>, Self::Error> {
        let next = self.stream.lock().await.next().await;
        match next {
            Some(Ok(message)) => {
                let frame = from_message(message);
                if matches!(frame, Frame::Close(_)) {
                    self.mark_closed();
                }
                Ok(Some(frame))
            }
            Some(Err(e)) => {
                self.mark_closed();
                Err(TransportError::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    e,
                )))
            }
            None => {
                self.mark_closed();
                Ok(None)
            }
        }
    }

    /// Sends a normal close frame, or finishes a close the peer started.
    ///
    /// Once the peer's close frame has been read, tungstenite has already
    /// queued the reply and refuses another close; flushing sends that reply.
    async fn close(&self) -> Result<(), Self::Error> {
        let normal = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: Utf8Bytes::from_static(""),
        }));
        let mut sink = self.sink.lock().await;
        let sent = match sink.send(normal).await {
            Err(tungstenite::Error::Protocol(ProtocolError::SendAfterClosing)) => {
                sink.flush().await
            }
            other => other,
        };
        match sent {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => {
                self.mark_closed();
                Err(broken_pipe(e))
            }
        }
    }

    async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
