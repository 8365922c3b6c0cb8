//! Wire protocol for ackwire.
//!
//! This crate defines the "language" that the client and server speak:
//!
//! - **Types** ([`Message`], [`MessageKind`]): the application messages
//!   that travel inside text frames, and the closed set of discriminators
//!   that name them.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from envelope text.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the frame dispatcher (whole text
//! frames) and the rest of the application. It doesn't know about
//! connections or handshakes; it only knows how to turn a payload into a
//! message and which message, if any, answers it.
//!
//! ```text
//! Frame (text) → Codec::decode → Message → Message::ack → Codec::encode → Frame (text)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{AckTextMessage, Message, MessageKind, TextMessage};
