//! `AckwireClient` builder and connection setup.
//!
//! Connecting is two-phase. The upgrade result is fed to the dispatcher
//! from a spawned I/O task, and `connect()` only returns once that task's
//! handshake gate has completed (or failed, or timed out). Application
//! traffic is never sent before then.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ackwire_protocol::{Codec, JsonCodec, Message};
use ackwire_transport::tls::{self, TlsConnector};
use ackwire_transport::{
    Connection, Frame, Scheme, TransportError, WebSocketConnection, WebSocketConnector,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::dispatch::{Dispatcher, Inbound, Role};
use crate::gate::HandshakeSignal;
use crate::handler::{drive, upgrade_failure};
use crate::session::SessionDriver;
use crate::AckwireError;

/// Decoded inbound messages buffered for [`AckwireClient::next_message`].
const INBOX_CAPACITY: usize = 64;

/// Where the client gets the certificates it trusts for `wss://`.
#[derive(Clone, Default)]
pub enum ClientTls {
    #[default]
    Off,
    /// A PEM bundle on disk.
    CaFile(PathBuf),
    /// An already-built connector.
    Connector(TlsConnector),
}

/// Builder for an [`AckwireClient`].
pub struct AckwireClientBuilder<C = JsonCodec> {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
    tls: ClientTls,
    handshake_timeout: Duration,
    codec: C,
}

impl AckwireClientBuilder {
    pub fn new() -> Self {
        Self {
            scheme: Scheme::Ws,
            host: "localhost".to_string(),
            port: 8025,
            path: "/".to_string(),
            tls: ClientTls::Off,
            handshake_timeout: HandshakeSignal::DEFAULT_TIMEOUT,
            codec: JsonCodec::default(),
        }
    }
}

impl Default for AckwireClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec + Clone> AckwireClientBuilder<C> {
    /// Sets the scheme, host and port to connect to.
    pub fn endpoint(mut self, scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        self.scheme = scheme;
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn tls(mut self, tls: ClientTls) -> Self {
        self.tls = tls;
        self
    }

    /// How long `connect()` waits for the upgrade to complete.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn codec<C2: Codec + Clone>(self, codec: C2) -> AckwireClientBuilder<C2> {
        AckwireClientBuilder {
            scheme: self.scheme,
            host: self.host,
            port: self.port,
            path: self.path,
            tls: self.tls,
            handshake_timeout: self.handshake_timeout,
            codec,
        }
    }

    /// Connects, then waits for the handshake gate.
    ///
    /// # Errors
    /// - [`AckwireError::Argument`] for `wss` without trusted certificates
    /// - [`AckwireError::Handshake`] when the upgrade is refused, the TLS
    ///   handshake fails, or the timeout elapses
    /// - [`AckwireError::Transport`] when the endpoint is unreachable
    pub async fn connect(self) -> Result<AckwireClient<C>, AckwireError> {
        let tls = match (&self.tls, self.scheme) {
            (ClientTls::Off, Scheme::Wss) => {
                return Err(AckwireError::Argument(
                    "wss requires trusted certificates (--ca)".into(),
                ));
            }
            (_, Scheme::Ws) => None,
            (ClientTls::CaFile(path), Scheme::Wss) => Some(tls::load_connector(path)?),
            (ClientTls::Connector(connector), Scheme::Wss) => Some(connector.clone()),
        };

        let mut connector =
            WebSocketConnector::new(self.scheme, self.host, self.port).path(self.path);
        if let Some(tls) = tls {
            connector = connector.tls(tls);
        }

        let url = connector.url();
        tracing::info!(%url, "trying to create channel");

        // The upgrade exchange itself counts against the handshake timeout.
        let deadline = Instant::now() + self.handshake_timeout;
        let (conn, response) = match tokio::time::timeout_at(deadline, connector.connect()).await {
            Ok(connected) => connected.map_err(upgrade_failure)?,
            Err(_) => {
                tracing::error!(%url, "[NOK] channel not created");
                return Err(AckwireError::Handshake(format!(
                    "no handshake response within {:?}",
                    self.handshake_timeout
                )));
            }
        };
        let conn = Arc::new(conn);
        let conn_id = conn.id();

        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (dispatcher, signal) = Dispatcher::new(Role::Client, conn_id, self.codec.clone());
        let mut dispatcher = dispatcher.with_inbox(inbox_tx);

        let io_conn = Arc::clone(&conn);
        let io = tokio::spawn(async move {
            let result = match dispatcher.dispatch(Inbound::Upgrade(response)) {
                Ok(_) => drive(&io_conn, &mut dispatcher).await,
                Err(e) => Err(e),
            };
            io_conn.mark_closed();
            if let Err(e) = &result {
                tracing::warn!(%conn_id, error = %e, "connection ended with error");
            }
            result
        });

        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Err(e) = signal.wait(remaining).await {
            io.abort();
            tracing::error!(%url, error = %e, "[NOK] channel not created");
            return Err(e);
        }
        tracing::info!(%url, secure = conn.is_secure(), "[OK] channel created");

        Ok(AckwireClient {
            conn,
            io,
            inbox,
            codec: self.codec,
        })
    }
}

/// A connected client whose handshake has completed.
pub struct AckwireClient<C: Codec = JsonCodec> {
    conn: Arc<WebSocketConnection>,
    io: JoinHandle<Result<(), AckwireError>>,
    inbox: mpsc::Receiver<Message>,
    codec: C,
}

impl AckwireClient {
    pub fn builder() -> AckwireClientBuilder {
        AckwireClientBuilder::new()
    }
}

impl<C: Codec> AckwireClient<C> {
    pub fn connection(&self) -> &WebSocketConnection {
        &self.conn
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    /// Encodes and sends one message.
    pub async fn send(&self, message: &Message) -> Result<(), AckwireError> {
        let payload = self.codec.encode(message)?;
        self.conn.send(Frame::Text(payload)).await?;
        Ok(())
    }

    /// The next message the server sent, or `None` once the connection
    /// has ended and everything buffered was read.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    /// A session driver over this client's connection.
    pub fn session(&self) -> SessionDriver<'_, WebSocketConnection, C> {
        SessionDriver::new(self.conn.as_ref(), &self.codec)
    }

    /// Closes the connection (if still open) and waits for the I/O task.
    pub async fn finish(self) -> Result<(), AckwireError> {
        if self.conn.is_open() {
            self.conn.close().await?;
        }
        match self.io.await {
            Ok(result) => result,
            Err(e) => Err(AckwireError::Transport(TransportError::ConnectionClosed(
                format!("I/O task stopped: {e}"),
            ))),
        }
    }
}
