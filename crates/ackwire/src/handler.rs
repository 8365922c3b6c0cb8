//! Per-connection I/O: upgrade, then receive → dispatch → reply.
//!
//! Each connection gets its own Tokio task running [`drive`]. The flow is:
//!   1. Upgrade the socket → feed the response to the handshake gate
//!   2. Loop: receive a frame → dispatch → send the reply, if any
//!   3. Stop on close, disconnect, end of stream, or a fatal error

use std::time::Duration;

use ackwire_protocol::Codec;
use ackwire_transport::{
    Connection, IncomingConnection, TransportError, WebSocketConnection,
};

use crate::dispatch::{Dispatcher, Inbound, Outcome, Role};
use crate::server::ServerState;
use crate::AckwireError;

/// How long a closing connection keeps reading for the peer's close frame.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Upgrade failures are handshake errors; anything else stays a transport
/// error.
pub(crate) fn upgrade_failure(e: TransportError) -> AckwireError {
    match e {
        TransportError::Handshake { .. } | TransportError::Tls(_) => {
            AckwireError::Handshake(e.to_string())
        }
        other => AckwireError::Transport(other),
    }
}

/// Serves one accepted server-side connection from upgrade to close.
pub(crate) async fn handle_connection<C>(
    incoming: IncomingConnection,
    state: &ServerState<C>,
) -> Result<(), AckwireError>
where
    C: Codec + Clone,
{
    let conn_id = incoming.id();
    let (mut dispatcher, _signal) =
        Dispatcher::new(Role::Server, conn_id, state.codec.clone());

    let upgrade = tokio::time::timeout(state.handshake_timeout, incoming.upgrade(&state.path));
    let (conn, response) = match upgrade.await {
        Ok(Ok(upgraded)) => upgraded,
        Ok(Err(e)) => {
            dispatcher.abort(&e);
            return Err(upgrade_failure(e));
        }
        Err(_) => {
            let reason = format!("no upgrade request within {:?}", state.handshake_timeout);
            dispatcher.abort(&reason);
            return Err(AckwireError::Handshake(reason));
        }
    };
    dispatcher.dispatch(Inbound::Upgrade(response))?;

    drive(&conn, &mut dispatcher).await
}

/// Runs the receive/dispatch loop until the connection ends.
///
/// Frames are handled strictly one at a time: a reply is sent before the
/// next frame is read.
pub(crate) async fn drive<C: Codec>(
    conn: &WebSocketConnection,
    dispatcher: &mut Dispatcher<C>,
) -> Result<(), AckwireError> {
    let conn_id = conn.id();

    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed");
                return Ok(());
            }
            Err(e) => {
                dispatcher.abort(&e);
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Err(e.into());
            }
        };

        match dispatcher.dispatch(Inbound::Frame(frame)) {
            Ok(Outcome::Continue) => {}
            Ok(Outcome::Reply(reply)) => conn.send(reply).await?,
            Ok(Outcome::Closed(_)) => {
                finish_close(conn).await;
                return Ok(());
            }
            Ok(Outcome::Disconnect) => {
                tracing::info!(%conn_id, "peer requested disconnection");
                finish_close(conn).await;
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "closing connection");
                finish_close(conn).await;
                return Err(e);
            }
        }
    }
}

/// Sends or answers the close frame, then reads until the stream ends so
/// the socket is only dropped after the close handshake.
async fn finish_close(conn: &WebSocketConnection) {
    let conn_id = conn.id();
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
        return;
    }

    let drain = async { while let Ok(Some(_)) = conn.recv().await {} };
    if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::debug!(%conn_id, "peer did not finish the close handshake");
    }
}
