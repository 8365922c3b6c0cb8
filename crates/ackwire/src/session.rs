//! Client session driver: operator lines in, frames out.
//!
//! Each input line becomes exactly one outbound action:
//!
//! | Line           | Action                                         |
//! |----------------|------------------------------------------------|
//! | `ping`         | ping frame with payload `[8, 1, 8, 1]`         |
//! | `deconnection` | `DisconnectMessage`, close, wait for closure   |
//! | anything else  | `TextMessage` carrying the line                |
//!
//! Inbound frames are handled elsewhere (the connection's I/O task); the
//! driver only watches whether the connection is still alive.

use std::borrow::Cow;
use std::time::Duration;

use ackwire_protocol::{Codec, Message};
use ackwire_transport::{Connection, Frame, TransportError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::AckwireError;

/// Payload of the ping frame sent for the `ping` command.
pub const PING_PAYLOAD: [u8; 4] = [8, 1, 8, 1];

/// One parsed operator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Disconnect,
    Text(String),
}

impl Command {
    /// Keywords match the whole line exactly; a trailing `\r` is ignored.
    pub fn parse(line: &str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match line {
            "ping" => Command::Ping,
            "deconnection" => Command::Disconnect,
            text => Command::Text(text.to_string()),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The input source reached end-of-file or could no longer be read.
    InputExhausted,
    /// The operator asked to disconnect.
    Disconnected,
    /// The connection ended underneath the session.
    ConnectionLost,
}

pub struct SessionDriver<'a, T, C> {
    conn: &'a T,
    codec: &'a C,
    close_timeout: Duration,
}

impl<'a, T, C> SessionDriver<'a, T, C>
where
    T: Connection<Error = TransportError>,
    C: Codec,
{
    pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(conn: &'a T, codec: &'a C) -> Self {
        Self {
            conn,
            codec,
            close_timeout: Self::DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// How long `deconnection` waits for the peer to finish closing.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Reads lines from `input` until it ends, the operator disconnects,
    /// or the connection goes away.
    ///
    /// Lines are split on `\n` and need not be UTF-8; invalid bytes are
    /// replaced with U+FFFD. A failed send ends the session with
    /// [`AckwireError::Transport`].
    pub async fn run<R>(&self, mut input: R) -> Result<SessionEnd, AckwireError>
    where
        R: AsyncBufRead + Unpin,
    {
        let conn_id = self.conn.id();
        let mut buf = Vec::new();

        loop {
            if !self.conn.is_open() {
                return Ok(SessionEnd::ConnectionLost);
            }

            buf.clear();
            let read = tokio::select! {
                read = input.read_until(b'\n', &mut buf) => read,
                _ = self.conn.closed() => {
                    tracing::info!(%conn_id, "connection closed, leaving session");
                    return Ok(SessionEnd::ConnectionLost);
                }
            };

            match read {
                Ok(0) => {
                    tracing::info!(%conn_id, "end of input");
                    return Ok(SessionEnd::InputExhausted);
                }
                Err(e) => {
                    tracing::warn!(%conn_id, error = %e, "cannot read input");
                    return Ok(SessionEnd::InputExhausted);
                }
                Ok(_) => {}
            }

            let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
            let line = String::from_utf8_lossy(raw);
            if matches!(line, Cow::Owned(_)) {
                tracing::warn!(%conn_id, "input line is not valid UTF-8, replacing invalid bytes");
            }

            match Command::parse(&line) {
                Command::Ping => {
                    self.conn.send(Frame::Ping(PING_PAYLOAD.to_vec())).await?;
                }
                Command::Text(text) => {
                    self.send_message(&Message::text(text)).await?;
                }
                Command::Disconnect => {
                    self.send_message(&Message::Disconnect).await?;
                    self.conn.close().await?;
                    let closing = tokio::time::timeout(self.close_timeout, self.conn.closed());
                    if closing.await.is_err() {
                        tracing::warn!(%conn_id, timeout = ?self.close_timeout, "peer did not finish closing");
                    }
                    return Ok(SessionEnd::Disconnected);
                }
            }
        }
    }

    async fn send_message(&self, message: &Message) -> Result<(), AckwireError> {
        let payload = self.codec.encode(message)?;
        self.conn.send(Frame::Text(payload)).await?;
        Ok(())
    }
}
