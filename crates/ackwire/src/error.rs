//! Unified error type for ackwire.

use ackwire_protocol::ProtocolError;
use ackwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The variants follow how far a failure reaches:
///
/// | Variant         | Scope                                   |
/// |-----------------|-----------------------------------------|
/// | `Argument`      | process: abort before any socket opens  |
/// | `Handshake`     | one connection: closed                  |
/// | `DispatchState` | one connection: closed                  |
/// | `Transport`     | one connection: closed, no retry        |
/// | `Decode`        | one message: dropped, connection stays  |
#[derive(Debug, thiserror::Error)]
pub enum AckwireError {
    /// Invalid command-line arguments.
    #[error("invalid arguments: {0}")]
    Argument(String),

    /// The upgrade failed, timed out, or a handshake artifact arrived out
    /// of sequence.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A payload could not be decoded into a message.
    #[error(transparent)]
    Decode(#[from] ProtocolError),

    /// A frame arrived in a state where it is not allowed.
    #[error("protocol sequencing violation: {0}")]
    DispatchState(String),

    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AckwireError {
    /// Whether this error ends the connection it happened on.
    ///
    /// Decode errors are local to one frame; everything else except
    /// argument errors (which happen before any connection exists) is
    /// connection-fatal.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            AckwireError::Handshake(_)
                | AckwireError::DispatchState(_)
                | AckwireError::Transport(_)
        )
    }
}
