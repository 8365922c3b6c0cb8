//! `AckwireServer` builder and accept loop.
//!
//! This is the entry point for running an ackwire server. It ties the
//! layers together: transport → handshake gate → dispatcher → ack policy.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ackwire_protocol::{Codec, JsonCodec};
use ackwire_transport::{
    tls, IncomingConnection, Scheme, Transport, TransportError, WebSocketTransport,
};
use tokio::task::JoinSet;

use crate::gate::HandshakeSignal;
use crate::handler::handle_connection;
use crate::registry::{ConnectionInfo, ConnectionRegistry};
use crate::AckwireError;

/// Where the server gets its TLS material from.
#[derive(Debug, Clone, Default)]
pub enum ServerTls {
    /// Plain `ws://`.
    #[default]
    Off,
    /// PEM certificate chain and private key files.
    Pem { cert: PathBuf, key: PathBuf },
    /// A self-signed certificate for the local dev hosts, generated at
    /// startup. Its PEM is written to `export` when given.
    SelfSigned { export: Option<PathBuf> },
}

impl ServerTls {
    pub fn scheme(&self) -> Scheme {
        match self {
            ServerTls::Off => Scheme::Ws,
            _ => Scheme::Wss,
        }
    }
}

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) codec: C,
    pub(crate) path: String,
    /// How long a freshly accepted socket may take to send its upgrade.
    pub(crate) handshake_timeout: Duration,
}

/// Builder for configuring and starting an ackwire server.
///
/// # Example
///
/// ```rust,no_run
/// use ackwire::prelude::*;
///
/// # async fn start() -> Result<(), AckwireError> {
/// let server = AckwireServer::builder()
///     .bind("0.0.0.0:8025")
///     .path("/")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct AckwireServerBuilder<C = JsonCodec> {
    bind_addr: String,
    path: String,
    tls: ServerTls,
    handshake_timeout: Duration,
    codec: C,
}

impl AckwireServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8025".to_string(),
            path: "/".to_string(),
            tls: ServerTls::Off,
            handshake_timeout: HandshakeSignal::DEFAULT_TIMEOUT,
            codec: JsonCodec::default(),
        }
    }
}

impl Default for AckwireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec + Clone> AckwireServerBuilder<C> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Sets the only request path upgrades are accepted on.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn tls(mut self, tls: ServerTls) -> Self {
        self.tls = tls;
        self
    }

    /// Drops connections whose upgrade does not complete within `timeout`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Replaces the codec used for every connection.
    pub fn codec<C2: Codec + Clone>(self, codec: C2) -> AckwireServerBuilder<C2> {
        AckwireServerBuilder {
            bind_addr: self.bind_addr,
            path: self.path,
            tls: self.tls,
            handshake_timeout: self.handshake_timeout,
            codec,
        }
    }

    /// Loads TLS material and binds the listener.
    pub async fn build(self) -> Result<AckwireServer<C>, AckwireError> {
        let mut cert_pem = None;
        let acceptor = match &self.tls {
            ServerTls::Off => None,
            ServerTls::Pem { cert, key } => Some(tls::load_acceptor(cert, key)?),
            ServerTls::SelfSigned { export } => {
                let generated = tls::self_signed_acceptor()?;
                if let Some(path) = export {
                    std::fs::write(path, &generated.cert_pem).map_err(|e| {
                        TransportError::Tls(format!(
                            "cannot write certificate to {}: {e}",
                            path.display()
                        ))
                    })?;
                    tracing::info!(path = %path.display(), "wrote self-signed certificate");
                }
                cert_pem = Some(generated.cert_pem);
                Some(generated.acceptor)
            }
        };

        let transport = WebSocketTransport::bind(&self.bind_addr, acceptor).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(ConnectionRegistry::new()),
            codec: self.codec,
            path: self.path,
            handshake_timeout: self.handshake_timeout,
        });

        Ok(AckwireServer {
            transport,
            state,
            scheme: self.tls.scheme(),
            cert_pem,
        })
    }
}

/// A bound ackwire server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct AckwireServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
    scheme: Scheme,
    cert_pem: Option<String>,
}

impl AckwireServer {
    /// Creates a new builder.
    pub fn builder() -> AckwireServerBuilder {
        AckwireServerBuilder::new()
    }
}

impl<C: Codec + Clone> AckwireServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// PEM of the generated certificate, when running self-signed.
    pub fn self_signed_pem(&self) -> Option<&str> {
        self.cert_pem.as_deref()
    }

    /// The set of currently open connections.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), AckwireError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then aborts every
    /// connection task still running.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), AckwireError> {
        let addr = self.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(%addr, scheme = %self.scheme, path = %self.state.path, "[OK] server started");

        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(open = tasks.len(), "shutting down");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        tasks.spawn(serve(incoming, state));
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "connection task panicked");
                        }
                    }
                }
            }
        }

        tasks.shutdown().await;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve<C: Codec + Clone>(incoming: IncomingConnection, state: Arc<ServerState<C>>) {
    let conn_id = incoming.id();
    let peer = incoming.peer();
    let secure = incoming.is_secure();

    let open = state
        .registry
        .insert(conn_id, ConnectionInfo { peer, secure })
        .await;
    tracing::info!(%conn_id, %peer, secure, open, "connection opened");

    let result = handle_connection(incoming, &state).await;
    state.registry.remove(conn_id).await;

    match result {
        Ok(()) => tracing::info!(%conn_id, "connection ended"),
        Err(e) => tracing::warn!(%conn_id, error = %e, "connection ended with error"),
    }
}
