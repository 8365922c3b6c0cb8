//! Frame dispatcher: decides what one inbound event means.
//!
//! The dispatcher does no I/O. It takes one [`Inbound`] event and returns
//! an [`Outcome`] (or an error) that the connection task acts on. Replies
//! are built here and sent by the caller before the next frame is read, so
//! acks leave in the same order their messages arrived.

use std::fmt;

use ackwire_protocol::{Codec, Message};
use ackwire_transport::{CloseReason, ConnectionId, Frame, UpgradeResponse};

use tokio::sync::mpsc;

use crate::gate::{GateState, HandshakeGate, HandshakeSignal};
use crate::AckwireError;

/// Which end of the connection a dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// One event from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The answer to the WebSocket upgrade request.
    Upgrade(UpgradeResponse),
    /// A frame received after (or, illegally, before) the upgrade.
    Frame(Frame),
}

/// What the connection task should do after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to send; read the next frame.
    Continue,
    /// Send this frame, then read the next one.
    Reply(Frame),
    /// The peer sent a close frame. Finish closing; send nothing else.
    Closed(Option<CloseReason>),
    /// The peer announced a disconnect. Close locally; no reply.
    Disconnect,
}

/// Per-connection dispatcher. Owns the connection's [`HandshakeGate`].
pub struct Dispatcher<C: Codec> {
    role: Role,
    conn_id: ConnectionId,
    codec: C,
    gate: HandshakeGate,
    inbox: Option<mpsc::Sender<Message>>,
}

impl<C: Codec> Dispatcher<C> {
    /// Creates a dispatcher with a pending gate, and the signal that
    /// reports when the gate completes or fails.
    pub fn new(role: Role, conn_id: ConnectionId, codec: C) -> (Self, HandshakeSignal) {
        let (gate, signal) = HandshakeGate::new();
        let dispatcher = Self {
            role,
            conn_id,
            codec,
            gate,
            inbox: None,
        };
        (dispatcher, signal)
    }

    /// Also forwards every decoded message to `inbox`.
    ///
    /// Forwarding never blocks the connection: when the inbox is full or
    /// its receiver is gone the copy is dropped.
    pub fn with_inbox(mut self, inbox: mpsc::Sender<Message>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Fails a still-pending handshake because the connection broke.
    pub fn abort(&mut self, reason: impl fmt::Display) {
        let conn_id = self.conn_id;
        if self.gate.fail(AckwireError::Handshake(format!(
            "connection failed: {reason}"
        ))) {
            tracing::warn!(%conn_id, %reason, "connection failed during handshake");
        }
    }

    /// Dispatches one inbound event.
    ///
    /// # Errors
    /// - [`AckwireError::Handshake`]: the upgrade was rejected, or an
    ///   upgrade response arrived when none was expected
    /// - [`AckwireError::DispatchState`]: a frame arrived before the
    ///   handshake completed
    ///
    /// Undecodable text is *not* an error: it is logged and dropped.
    pub fn dispatch(&mut self, inbound: Inbound) -> Result<Outcome, AckwireError> {
        match inbound {
            Inbound::Upgrade(response) => self.on_upgrade(response),
            Inbound::Frame(frame) if !self.gate.is_complete() => {
                let reason = format!(
                    "{} frame received while the handshake is {:?}",
                    frame.kind(),
                    self.gate.state()
                );
                tracing::error!(conn_id = %self.conn_id, kind = frame.kind(), "frame before handshake");
                self.gate.fail(AckwireError::DispatchState(reason.clone()));
                Err(AckwireError::DispatchState(reason))
            }
            Inbound::Frame(frame) => self.on_frame(frame),
        }
    }

    fn on_upgrade(&mut self, response: UpgradeResponse) -> Result<Outcome, AckwireError> {
        let conn_id = self.conn_id;

        if self.gate.state() != GateState::Pending {
            tracing::error!(%conn_id, %response, "unexpected upgrade response");
            return Err(AckwireError::Handshake(format!(
                "unexpected upgrade response ({response}) while the handshake is {:?}",
                self.gate.state()
            )));
        }

        if response.is_success() {
            self.gate.complete()?;
            tracing::info!(%conn_id, role = %self.role, "[OK] handshake done");
            Ok(Outcome::Continue)
        } else {
            let reason = format!("upgrade rejected: {response}");
            tracing::error!(%conn_id, %response, "[NOK] handshake failed");
            self.gate.fail(AckwireError::Handshake(reason.clone()));
            Err(AckwireError::Handshake(reason))
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<Outcome, AckwireError> {
        let conn_id = self.conn_id;
        match frame {
            Frame::Text(text) => self.on_text(&text),

            // Reserved: accepted, not interpreted.
            Frame::Binary(data) => {
                tracing::info!(%conn_id, len = data.len(), "websocket/in: binary");
                Ok(Outcome::Continue)
            }

            Frame::Ping(payload) => {
                tracing::info!(%conn_id, "websocket/in: ping");
                match self.role {
                    Role::Server => Ok(Outcome::Reply(Frame::Pong(payload))),
                    Role::Client => Ok(Outcome::Continue),
                }
            }

            Frame::Pong(_) => {
                tracing::info!(%conn_id, "websocket/in: pong");
                Ok(Outcome::Continue)
            }

            Frame::Close(reason) => {
                match &reason {
                    Some(CloseReason { code, reason }) => tracing::info!(
                        %conn_id, status_code = code, reason = %reason,
                        "websocket/in: close"
                    ),
                    None => tracing::info!(%conn_id, "websocket/in: close (no status)"),
                }
                Ok(Outcome::Closed(reason))
            }

            Frame::Unrecognized => {
                tracing::warn!(%conn_id, "websocket/in: unhandled frame kind");
                Ok(Outcome::Continue)
            }
        }
    }

    fn on_text(&mut self, text: &str) -> Result<Outcome, AckwireError> {
        let conn_id = self.conn_id;
        tracing::debug!(%conn_id, payload = %text, "websocket/in: text");

        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    %conn_id,
                    error = %e,
                    discriminator = e.discriminator().unwrap_or("-"),
                    "[NOK] dropping text frame that could not be decoded"
                );
                return Ok(Outcome::Continue);
            }
        };

        tracing::info!(%conn_id, kind = %message.kind(), "[OK] websocket/in: message");

        if let Some(inbox) = &self.inbox {
            if inbox.try_send(message.clone()).is_err() {
                tracing::debug!(%conn_id, "inbox unavailable, message not forwarded");
            }
        }

        if message == Message::Disconnect {
            return Ok(Outcome::Disconnect);
        }

        match message.ack() {
            Some(ack) => {
                let payload = self.codec.encode(&ack)?;
                Ok(Outcome::Reply(Frame::Text(payload)))
            }
            None => Ok(Outcome::Continue),
        }
    }
}
