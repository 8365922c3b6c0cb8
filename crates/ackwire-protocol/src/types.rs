//! Core protocol types for ackwire's wire format.
//!
//! This module defines every application message that travels "on the
//! wire" inside a text frame, plus the closed table of discriminators that
//! name them.
//!
//! Think of this as the vocabulary that the client and server share.

// Serde derives do the heavy lifting: `Serialize` turns a message INTO
// JSON, `Deserialize` builds one FROM JSON.
use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// MessageKind: the discriminator allow-list
// ---------------------------------------------------------------------------

/// The closed set of message kinds a peer may name in the `type` field.
///
/// Decoding looks the wire discriminator up in this table *before*
/// deserializing anything. A string that is not listed here can never
/// select a type, so the set of types reachable from the network is
/// exactly the set of variants below.
///
/// Adding a message means: add a variant here, add the matching variant
/// to [`Message`] with the same `rename`, and list it in [`MessageKind::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Disconnect,
    AckText,
}

impl MessageKind {
    /// Every known kind, in declaration order.
    pub const ALL: [MessageKind; 3] = [
        MessageKind::Text,
        MessageKind::Disconnect,
        MessageKind::AckText,
    ];

    /// The fully-qualified name carried in the `type` field.
    pub fn discriminator(self) -> &'static str {
        match self {
            MessageKind::Text => "ackwire.message.TextMessage",
            MessageKind::Disconnect => "ackwire.message.DisconnectMessage",
            MessageKind::AckText => "ackwire.message.AckTextMessage",
        }
    }

    /// Resolves a wire discriminator. Exact, case-sensitive match only.
    pub fn from_discriminator(discriminator: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.discriminator() == discriminator)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.discriminator())
    }
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Free-form text typed by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub text: String,
}

/// Acknowledges a [`TextMessage`].
///
/// `text` echoes what was received so the sender can match the ack to the
/// message it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckTextMessage {
    pub text: String,
    pub accepted: bool,
}

// ---------------------------------------------------------------------------
// Message: the envelope content
// ---------------------------------------------------------------------------

/// An application message, as carried by one text frame.
///
/// `#[serde(tag = "type")]` produces "internally tagged" JSON: the variant
/// name sits next to the payload fields instead of wrapping them.
///   `{ "type": "ackwire.message.TextMessage", "text": "hello" }`
/// The `rename` on each variant must match [`MessageKind::discriminator`];
/// a test below keeps the two in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Either direction: some text. Answered with [`Message::AckText`].
    #[serde(rename = "ackwire.message.TextMessage")]
    Text(TextMessage),

    /// Either direction: "I'm closing this session."
    /// Never acknowledged; the receiver tears the connection down.
    #[serde(rename = "ackwire.message.DisconnectMessage")]
    Disconnect,

    /// Either direction: "I got your text."
    /// Terminal: acks are never acknowledged.
    #[serde(rename = "ackwire.message.AckTextMessage")]
    AckText(AckTextMessage),
}

impl Message {
    /// Shorthand for a [`Message::Text`].
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(TextMessage { text: text.into() })
    }

    /// The kind of this message, i.e. which discriminator it encodes to.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::Disconnect => MessageKind::Disconnect,
            Message::AckText(_) => MessageKind::AckText,
        }
    }

    /// The ack policy: which message, if any, answers this one.
    ///
    /// Pure and stateless. Only text is acknowledged, and an ack never
    /// yields another ack, so two peers can't ping-pong acks forever.
    pub fn ack(&self) -> Option<Message> {
        match self {
            Message::Text(msg) => Some(Message::AckText(AckTextMessage {
                text: msg.text.clone(),
                accepted: true,
            })),
            Message::Disconnect | Message::AckText(_) => None,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
