//! Error types for the protocol layer.
//!
//! Each crate in ackwire defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in one payload, not in the
//! connection that carried it.

use crate::MessageKind;

/// Errors that can occur while encoding or decoding an envelope.
///
/// Every decode variant is local to one message: the frame that produced
/// it is dropped and the connection carries on.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed. Not expected for in-memory messages, but
    /// `serde_json` reports it through a `Result`, so we pass it on.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload is not well-formed JSON.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The payload has no string `type` field.
    #[error("envelope has no \"type\" discriminator")]
    MissingDiscriminator,

    /// The `type` field names no known message kind.
    #[error("unknown discriminator {0:?}")]
    UnknownDiscriminator(String),

    /// The discriminator is known but the fields don't fit that message.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// The discriminator involved, when one was read. Used as a log field.
    pub fn discriminator(&self) -> Option<&str> {
        match self {
            ProtocolError::UnknownDiscriminator(d) => Some(d),
            ProtocolError::InvalidPayload { kind, .. } => Some(kind.discriminator()),
            _ => None,
        }
    }
}
